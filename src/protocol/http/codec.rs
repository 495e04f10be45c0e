//! Server-side HTTP codec for parsing requests and generating messages
//!
//! # Sans-IO design
//!
//! The codec performs no I/O. It operates on byte buffers:
//! - `feed()` adds bytes to the internal buffer
//! - `decode()` attempts to parse a complete request
//! - `encode_response()` / `encode_request()` generate wire bytes
//!
//! Bodies are sized by `Content-Length`; chunked transfer is not part of
//! the AirPlay protocol.

use super::{Headers, HttpRequest, HttpResponse, Method, StatusCode, names};
use bytes::BytesMut;
use std::str::{self, FromStr};

/// Errors during HTTP parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Request line could not be parsed
    #[error("invalid request line: {0}")]
    InvalidRequestLine(String),

    /// Unknown HTTP method
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A header line was malformed
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// `Content-Length` was not a number
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// Declared body exceeds the size cap
    #[error("body too large: {size} > {max}")]
    BodyTooLarge {
        /// Declared size
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Header section was not valid UTF-8
    #[error("invalid UTF-8 in headers")]
    InvalidUtf8,
}

/// Maximum allowed body size (playlists are small; 16 MB is generous)
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Maximum header section size
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Incremental HTTP/1.1 request parser
pub struct HttpServerCodec {
    buffer: BytesMut,
}

impl HttpServerCodec {
    /// Create a new server codec
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed bytes into the internal buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Current buffer length
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempt to decode a complete request
    ///
    /// Returns `Ok(Some(request))` for a complete request, `Ok(None)` if
    /// more data is needed.
    ///
    /// # Errors
    /// Returns `ParseError` if the request is malformed.
    pub fn decode(&mut self) -> Result<Option<HttpRequest>, ParseError> {
        let Some(header_end) = self.find_header_end() else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(ParseError::InvalidHeader("headers too large".into()));
            }
            return Ok(None);
        };

        let header_bytes = &self.buffer[..header_end];
        let header_str = str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidUtf8)?;

        let (method, uri, headers) = Self::parse_headers(header_str)?;

        let content_length = headers
            .get(names::CONTENT_LENGTH)
            .map(str::parse::<usize>)
            .transpose()
            .map_err(|_| ParseError::InvalidContentLength("not a number".into()))?
            .unwrap_or(0);

        if content_length > MAX_BODY_SIZE {
            return Err(ParseError::BodyTooLarge {
                size: content_length,
                max: MAX_BODY_SIZE,
            });
        }

        let total_size = header_end + 4 + content_length;
        if self.buffer.len() < total_size {
            return Ok(None);
        }

        let _ = self.buffer.split_to(header_end + 4);
        let body = if content_length > 0 {
            self.buffer.split_to(content_length).to_vec()
        } else {
            Vec::new()
        };

        Ok(Some(HttpRequest {
            method,
            uri,
            headers,
            body,
        }))
    }

    fn find_header_end(&self) -> Option<usize> {
        let needle = b"\r\n\r\n";
        self.buffer
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn parse_headers(header_str: &str) -> Result<(Method, String, Headers), ParseError> {
        let mut lines = header_str.lines();

        // "METHOD /path HTTP/1.1"
        let request_line = lines
            .next()
            .ok_or_else(|| ParseError::InvalidRequestLine("empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        }

        let method = Method::from_str(parts[0])
            .map_err(|()| ParseError::InvalidMethod(parts[0].to_string()))?;
        let uri = parts[1].to_string();

        if !parts[2].starts_with("HTTP/") {
            return Err(ParseError::InvalidRequestLine(format!(
                "invalid protocol: {}",
                parts[2]
            )));
        }

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            if let Some(pos) = line.find(':') {
                let name = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().to_string();
                headers.insert(name, value);
            } else {
                return Err(ParseError::InvalidHeader(line.to_string()));
            }
        }

        Ok((method, uri, headers))
    }
}

impl Default for HttpServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for HTTP responses
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Option<Vec<u8>>,
    close: bool,
}

impl ResponseBuilder {
    /// Create a builder with the given status
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: None,
            close: false,
        }
    }

    /// Create an OK (200) response
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set a body and its content type
    #[must_use]
    pub fn body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.body = Some(body);
        self.headers
            .insert(names::CONTENT_TYPE.to_string(), content_type.to_string());
        self
    }

    /// Mark the connection for closing after this response
    #[must_use]
    pub fn close(mut self) -> Self {
        self.close = true;
        self.headers
            .insert(names::CONNECTION.to_string(), "close".to_string());
        self
    }

    /// Build into an [`HttpResponse`]
    #[must_use]
    pub fn build(mut self) -> HttpResponse {
        if let Some(ref body) = self.body {
            self.headers
                .insert(names::CONTENT_LENGTH.to_string(), body.len().to_string());
        }

        HttpResponse {
            status: self.status,
            reason: self.status.reason().to_string(),
            headers: self.headers,
            body: self.body.unwrap_or_default(),
            close: self.close,
        }
    }
}

/// Encode an HTTP response to wire bytes
#[must_use]
pub fn encode_response(response: &HttpResponse) -> Vec<u8> {
    let mut output = Vec::with_capacity(256 + response.body.len());

    output.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            response.status.as_u16(),
            response.reason
        )
        .as_bytes(),
    );

    for (name, value) in response.headers.iter() {
        output.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    // Responses always declare a length so the peer never has to wait
    // for EOF on a keep-alive socket.
    if !response.headers.contains(names::CONTENT_LENGTH) {
        output.extend_from_slice(
            format!("{}: {}\r\n", names::CONTENT_LENGTH, response.body.len()).as_bytes(),
        );
    }

    output.extend_from_slice(b"\r\n");
    output.extend_from_slice(&response.body);

    output
}

/// Encode an HTTP request to wire bytes (used on the reverse channel)
#[must_use]
pub fn encode_request(request: &HttpRequest) -> Vec<u8> {
    let mut output = Vec::with_capacity(256 + request.body.len());

    output.extend_from_slice(request.method.as_str().as_bytes());
    output.push(b' ');
    output.extend_from_slice(request.uri.as_bytes());
    output.extend_from_slice(b" HTTP/1.1\r\n");

    for (name, value) in request.headers.iter() {
        output.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    if !request.body.is_empty() && !request.headers.contains(names::CONTENT_LENGTH) {
        output.extend_from_slice(
            format!("{}: {}\r\n", names::CONTENT_LENGTH, request.body.len()).as_bytes(),
        );
    }

    output.extend_from_slice(b"\r\n");
    output.extend_from_slice(&request.body);

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple_request() {
        let mut codec = HttpServerCodec::new();
        codec.feed(b"GET /server-info HTTP/1.1\r\nUser-Agent: AirPlay/377.40\r\n\r\n");

        let request = codec.decode().unwrap().expect("complete request");
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.uri, "/server-info");
        assert_eq!(request.headers.get("User-Agent"), Some("AirPlay/377.40"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_decode_request_with_body() {
        let mut codec = HttpServerCodec::new();
        codec.feed(b"POST /action HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");

        let request = codec.decode().unwrap().expect("complete request");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn test_decode_incremental() {
        let mut codec = HttpServerCodec::new();
        codec.feed(b"POST /play HTTP/1.1\r\nContent-Le");
        assert!(codec.decode().unwrap().is_none());

        codec.feed(b"ngth: 4\r\n\r\nab");
        assert!(codec.decode().unwrap().is_none());

        codec.feed(b"cd");
        let request = codec.decode().unwrap().expect("complete request");
        assert_eq!(request.body, b"abcd");
    }

    #[test]
    fn test_decode_pipelined_requests() {
        let mut codec = HttpServerCodec::new();
        codec.feed(b"POST /stop HTTP/1.1\r\n\r\nPOST /rate?value=1.0 HTTP/1.1\r\n\r\n");

        let first = codec.decode().unwrap().expect("first request");
        assert_eq!(first.uri, "/stop");
        let second = codec.decode().unwrap().expect("second request");
        assert_eq!(second.uri, "/rate?value=1.0");
        assert!(codec.decode().unwrap().is_none());
    }

    #[test]
    fn test_decode_bad_method() {
        let mut codec = HttpServerCodec::new();
        codec.feed(b"BREW /coffee HTTP/1.1\r\n\r\n");
        assert!(matches!(
            codec.decode(),
            Err(ParseError::InvalidMethod(_))
        ));
    }

    #[test]
    fn test_encode_response_with_body() {
        let response = ResponseBuilder::ok()
            .body(b"data".to_vec(), "application/octet-stream")
            .build();
        let encoded = encode_response(&response);
        let text = String::from_utf8_lossy(&encoded);

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\ndata"));
    }

    #[test]
    fn test_encode_empty_response_has_length() {
        let response = ResponseBuilder::ok().build();
        let text = String::from_utf8_lossy(&encode_response(&response)).to_string();
        assert!(text.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn test_encode_request_round_trip() {
        let mut request = HttpRequest::new(Method::Post, "/event");
        request.headers.insert("X-Apple-Session-ID", "abc");
        request.body = b"<plist/>".to_vec();

        let encoded = encode_request(&request);
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.starts_with("POST /event HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 8\r\n"));
        assert!(text.ends_with("<plist/>"));
    }
}
