//! End-to-end tests over real TCP sockets

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use aircast::renderer::NullRenderer;
use aircast::{AirCastServer, ReceiverConfig};

async fn start_server() -> (AirCastServer, u16) {
    let config = ReceiverConfig::with_name("E2E Receiver").port(0);
    let mut server = AirCastServer::new(config, Arc::new(NullRenderer)).unwrap();
    server.start().await.unwrap();
    let port = server.port();
    (server, port)
}

async fn send_request(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("response within timeout")
            .unwrap();
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);

        // Responses end after Content-Length bytes of body
        let text = String::from_utf8_lossy(&response);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("Content-Length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if response.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_server_info_over_tcp() {
    let (_server, port) = start_server().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let response = send_request(
        &mut stream,
        "GET /server-info HTTP/1.1\r\nUser-Agent: AirPlay/377.40\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text/x-apple-plist+xml"));
    assert!(response.contains("<key>features</key>"));
    assert!(response.contains("<integer>639</integer>"));
}

#[tokio::test]
async fn test_reverse_upgrade_over_tcp() {
    let (_server, port) = start_server().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let response = send_request(
        &mut stream,
        "POST /reverse HTTP/1.1\r\nUpgrade: PTTH/1.0\r\nConnection: Upgrade\r\n\
         X-Apple-Purpose: event\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Upgrade: PTTH/1.0"));

    // A second upgrade on another socket is refused
    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let response = send_request(
        &mut second,
        "POST /reverse HTTP/1.1\r\nUpgrade: PTTH/1.0\r\nConnection: Upgrade\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn test_unknown_endpoint_over_tcp() {
    let (_server, port) = start_server().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let response = send_request(&mut stream, "GET /nonexistent HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn test_keep_alive_sequential_requests() {
    let (_server, port) = start_server().await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let first = send_request(&mut stream, "POST /stop HTTP/1.1\r\n\r\n").await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));

    let second = send_request(&mut stream, "POST /rate?value=1.0 HTTP/1.1\r\n\r\n").await;
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
}
