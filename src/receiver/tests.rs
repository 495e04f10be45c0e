//! Dispatcher-level tests driving the receiver the way a sender does

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::mpsc;

use super::config::ReceiverConfig;
use super::connection::ConnectionKind;
use super::dispatcher::{ConnectionContext, dispatch};
use super::server::ServerShared;
use crate::protocol::http::{HttpRequest, HttpResponse, Method, content_types, names};
use crate::protocol::pairing::PairingIdentity;
use crate::protocol::plist::{DictBuilder, PlistValue, encode};
use crate::renderer::{PlaybackInfo, VideoRenderer};

const SESSION_ID: &str = "7e953c1c-67cb-47f4-8c12-6f79b5d0b1d1";
const PLAYBACK_UUID: &str = "b8a24cde-52f8-4d3e-9c0a-2a1b7e6f0c11";
const MASTER_URL: &str = "mlhls://localhost/x/master.m3u8";

const MASTER_PLAYLIST: &str = "#EXTM3U\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",LANGUAGE=\"en\",URI=\"mlhls://localhost/x/en.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,AUDIO=\"aud\"\n\
mlhls://localhost/x/sub.m3u8\n";

const MEDIA_PLAYLIST: &str = "#EXTM3U\n\
#EXT-X-TARGETDURATION:6\n\
#EXTINF:6.0,\n\
seg0.ts\n\
#EXT-X-ENDLIST\n";

struct RecordingRenderer {
    calls: StdMutex<Vec<String>>,
    info: StdMutex<PlaybackInfo>,
}

impl RecordingRenderer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: StdMutex::new(Vec::new()),
            info: StdMutex::new(PlaybackInfo::default()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn set_info(&self, duration: f64, position: f64, rate: f32) {
        let mut info = self.info.lock().unwrap();
        info.duration = duration;
        info.position = position;
        info.rate = rate;
    }
}

impl VideoRenderer for RecordingRenderer {
    fn play(&self, uri: &str, start_position: f32) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("play {uri} @ {start_position}"));
    }

    fn scrub(&self, position: f32) {
        self.calls.lock().unwrap().push(format!("scrub {position}"));
    }

    fn rate(&self, rate: f32) {
        self.calls.lock().unwrap().push(format!("rate {rate}"));
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push("stop".to_string());
    }

    fn reset(&self, hard: bool) {
        self.calls.lock().unwrap().push(format!("reset {hard}"));
    }

    fn acquire_playback_info(&self, info: &mut PlaybackInfo) {
        *info = self.info.lock().unwrap().clone();
    }
}

struct TestRig {
    shared: Arc<ServerShared>,
    renderer: Arc<RecordingRenderer>,
}

impl TestRig {
    fn new() -> Self {
        Self::with_config(ReceiverConfig::with_name("Test Receiver").port(7000))
    }

    fn with_config(config: ReceiverConfig) -> Self {
        let renderer = RecordingRenderer::new();
        let shared = Arc::new(ServerShared::new(
            config,
            PairingIdentity::generate(),
            renderer.clone(),
        ));
        Self { shared, renderer }
    }

    fn connection(&self) -> (ConnectionContext, mpsc::UnboundedReceiver<Vec<u8>>) {
        let id = self.shared.connections.lock().unwrap().register();
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionContext::new(id, self.shared.clone(), tx), rx)
    }

    /// Upgrade a fresh connection to the reverse channel; its receiver
    /// end captures outgoing FCUP requests.
    async fn reverse_channel(&self) -> (ConnectionContext, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (mut ctx, rx) = self.connection();
        let response = dispatch(&mut ctx, reverse_request()).await.response.unwrap();
        assert_eq!(response.status.as_u16(), 101);
        (ctx, rx)
    }
}

fn reverse_request() -> HttpRequest {
    let mut request = HttpRequest::new(Method::Post, "/reverse");
    request.headers.insert(names::CONNECTION, "Upgrade");
    request.headers.insert(names::UPGRADE, "PTTH/1.0");
    request.headers.insert(names::X_APPLE_PURPOSE, "event");
    request
}

fn play_request(uuid: &str, location: &str, start: f64) -> HttpRequest {
    let body = DictBuilder::new()
        .insert("uuid", uuid)
        .insert("Content-Location", location)
        .insert("clientProcName", "YouTube")
        .insert("Start-Position-Seconds", start)
        .build();

    let mut request = HttpRequest::new(Method::Post, "/play");
    request.headers.insert(names::X_APPLE_SESSION_ID, SESSION_ID);
    request
        .headers
        .insert(names::CONTENT_TYPE, content_types::BINARY_PLIST);
    request.body = encode(&body).unwrap();
    request
}

fn action_request(session_id: &str, url: &str, playlist: &str) -> HttpRequest {
    let params = DictBuilder::new()
        .insert("FCUP_Response_URL", url)
        .insert(
            "FCUP_Response_Data",
            PlistValue::Data(playlist.as_bytes().to_vec()),
        )
        .insert("FCUP_Response_StatusCode", 200i64)
        .build();
    let body = DictBuilder::new()
        .insert("type", "unhandledURLResponse")
        .insert("params", params)
        .build();

    let mut request = HttpRequest::new(Method::Post, "/action");
    request.headers.insert(names::X_APPLE_SESSION_ID, session_id);
    request
        .headers
        .insert(names::CONTENT_TYPE, content_types::BINARY_PLIST);
    request.body = encode(&body).unwrap();
    request
}

fn drain_utf8(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        messages.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    messages
}

fn body_text(response: &HttpResponse) -> String {
    String::from_utf8_lossy(&response.body).into_owned()
}

#[tokio::test]
async fn test_server_info() {
    let rig = TestRig::new();
    let (mut ctx, _rx) = rig.connection();

    let response = dispatch(&mut ctx, HttpRequest::new(Method::Get, "/server-info"))
        .await
        .response
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    let text = body_text(&response);
    assert!(text.contains("<key>features</key>"));
    assert!(text.contains("<integer>639</integer>"));
    assert!(text.contains("<key>deviceid</key>"));
    assert!(text.contains("<key>protovers</key>"));
    assert!(text.contains(&rig.shared.config.mac_string()));
}

#[tokio::test]
async fn test_reverse_exclusivity() {
    let rig = TestRig::new();
    let (_reverse_ctx, _rx) = rig.reverse_channel().await;

    // A second upgrade attempt must not switch protocols
    let (mut second, _rx2) = rig.connection();
    let response = dispatch(&mut second, reverse_request()).await.response.unwrap();
    assert_eq!(response.status.as_u16(), 400);
    assert_eq!(second.kind(), ConnectionKind::Control);

    let reverse_count = rig
        .shared
        .connections
        .lock()
        .unwrap()
        .count_kind(ConnectionKind::Reverse);
    assert_eq!(reverse_count, 1);
}

#[tokio::test]
async fn test_play_issues_initial_fcup_request() {
    let rig = TestRig::new();
    let (_reverse_ctx, mut reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();

    let response = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 12.5))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);

    // The session stores the sender prefix and the master was requested
    {
        let registry = rig.shared.registry.lock().await;
        let session = registry.current().unwrap();
        assert_eq!(session.uri_prefix, "mlhls://localhost/x");
        assert!((session.start_position_seconds - 12.5).abs() < f32::EPSILON);
    }

    let fcups = drain_utf8(&mut reverse_rx);
    assert_eq!(fcups.len(), 1);
    assert!(fcups[0].starts_with("POST /event HTTP/1.1\r\n"));
    assert!(fcups[0].contains("unhandledURLRequest"));
    assert!(fcups[0].contains(MASTER_URL));

    assert!(rig.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_full_hls_flow_to_renderer_play() {
    let rig = TestRig::new();
    let (_reverse_ctx, mut reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();

    let _ = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 12.5)).await;
    let _ = drain_utf8(&mut reverse_rx);

    // Master arrives: two children are requested, playback not yet
    let response = dispatch(
        &mut control,
        action_request(SESSION_ID, MASTER_URL, MASTER_PLAYLIST),
    )
    .await
    .response
    .unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let fcups = drain_utf8(&mut reverse_rx);
    assert_eq!(fcups.len(), 2);
    assert!(fcups.iter().any(|m| m.contains("mlhls://localhost/x/sub.m3u8")));
    assert!(fcups.iter().any(|m| m.contains("mlhls://localhost/x/en.m3u8")));
    assert!(rig.renderer.calls().is_empty());

    // The stored master is rewritten to the loopback prefix
    {
        let registry = rig.shared.registry.lock().await;
        let master = registry.current().unwrap().store.master().unwrap();
        assert!(!master.contains("mlhls://"));
        assert!(master.contains("http://localhost:7000/sub.m3u8"));
    }

    // Both media playlists arrive; only then does the renderer start
    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, "mlhls://localhost/x/sub.m3u8", MEDIA_PLAYLIST),
    )
    .await;
    assert!(rig.renderer.calls().is_empty());

    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, "mlhls://localhost/x/en.m3u8", MEDIA_PLAYLIST),
    )
    .await;

    assert_eq!(
        rig.renderer.calls(),
        vec!["play http://localhost:7000/master.m3u8 @ 12.5".to_string()]
    );
    assert!(drain_utf8(&mut reverse_rx).is_empty());
}

#[tokio::test]
async fn test_play_reuses_known_uuid() {
    let rig = TestRig::new();
    let (_reverse_ctx, mut reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();

    let _ = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 12.5)).await;
    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, MASTER_URL, MASTER_PLAYLIST),
    )
    .await;
    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, "mlhls://localhost/x/sub.m3u8", MEDIA_PLAYLIST),
    )
    .await;
    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, "mlhls://localhost/x/en.m3u8", MEDIA_PLAYLIST),
    )
    .await;
    let _ = drain_utf8(&mut reverse_rx);
    assert_eq!(rig.renderer.calls().len(), 1);

    // The same uuid replays from the cache: no new FCUP traffic
    let response = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 12.5))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert!(drain_utf8(&mut reverse_rx).is_empty());
    assert_eq!(
        rig.renderer.calls().last().unwrap(),
        "play http://localhost:7000/master.m3u8 @ 12.5"
    );
}

#[tokio::test]
async fn test_action_session_id_mismatch_rejected() {
    let rig = TestRig::new();
    let (_reverse_ctx, _reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();

    let _ = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 0.0)).await;

    let response = dispatch(
        &mut control,
        action_request("someone-else", MASTER_URL, MASTER_PLAYLIST),
    )
    .await
    .response
    .unwrap();
    assert_eq!(response.status.as_u16(), 400);
    assert!(!response.close);
}

#[tokio::test]
async fn test_playlist_insert_logged_unsupported() {
    let rig = TestRig::new();
    let (_reverse_ctx, _reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();
    let _ = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 0.0)).await;

    let body = DictBuilder::new().insert("type", "playlistInsert").build();
    let mut request = HttpRequest::new(Method::Post, "/action");
    request.headers.insert(names::X_APPLE_SESSION_ID, SESSION_ID);
    request
        .headers
        .insert(names::CONTENT_TYPE, content_types::BINARY_PLIST);
    request.body = encode(&body).unwrap();

    let response = dispatch(&mut control, request).await.response.unwrap();
    assert_eq!(response.status.as_u16(), 501);
    assert!(!response.close);
}

#[tokio::test]
async fn test_hls_loopback_serves_cached_playlists() {
    let rig = TestRig::new();
    let (_reverse_ctx, _reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();

    let _ = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 0.0)).await;
    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, MASTER_URL, MASTER_PLAYLIST),
    )
    .await;
    let _ = dispatch(
        &mut control,
        action_request(SESSION_ID, "mlhls://localhost/x/sub.m3u8", MEDIA_PLAYLIST),
    )
    .await;

    let (mut player, _player_out) = rig.connection();
    let response = dispatch(&mut player, HttpRequest::new(Method::Get, "/master.m3u8"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(
        response.headers.get(names::CONTENT_TYPE),
        Some(content_types::HLS_PLAYLIST)
    );
    assert!(response.headers.get("Date").is_some());
    assert!(!body_text(&response).contains("mlhls://"));
    assert_eq!(player.kind(), ConnectionKind::HlsLoopback);

    let response = dispatch(&mut player, HttpRequest::new(Method::Get, "/sub.m3u8"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(body_text(&response), MEDIA_PLAYLIST);

    let response = dispatch(&mut player, HttpRequest::new(Method::Get, "/missing.m3u8"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 404);
}

#[tokio::test]
async fn test_playback_info_normal() {
    let rig = TestRig::new();
    rig.renderer.set_info(60.0, 10.0, 1.0);
    let (mut ctx, _out) = rig.connection();

    let response = dispatch(&mut ctx, HttpRequest::new(Method::Get, "/playback-info"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let text = body_text(&response);
    assert!(text.contains("<key>duration</key>"));
    assert!(text.contains("<real>60.0</real>"));
    // loadedTimeRanges = [{start: 10, duration: 50}]
    assert!(text.contains("<real>50.0</real>"));
    assert!(text.contains("<real>10.0</real>"));
    // seekableTimeRanges = [{start: 0, duration: 10}]
    assert!(text.contains("<real>0.0</real>"));
}

#[tokio::test]
async fn test_playback_info_finished_sentinel() {
    let rig = TestRig::new();
    rig.renderer.set_info(-1.0, 0.0, 0.0);
    let (mut ctx, _out) = rig.connection();

    let response = dispatch(&mut ctx, HttpRequest::new(Method::Get, "/playback-info"))
        .await
        .response
        .unwrap();
    assert!(response.close);
    assert_eq!(response.headers.get(names::CONNECTION), Some("close"));
    assert_eq!(rig.renderer.calls(), vec!["reset true".to_string()]);
}

#[tokio::test]
async fn test_playback_info_unavailable_sentinel() {
    let rig = TestRig::new();
    rig.renderer.set_info(60.0, -1.0, 0.0);
    let (mut ctx, _out) = rig.connection();

    let outcome = dispatch(&mut ctx, HttpRequest::new(Method::Get, "/playback-info")).await;
    assert!(outcome.response.is_none());
    assert!(rig.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_transport_commands_forwarded() {
    let rig = TestRig::new();
    let (mut ctx, _out) = rig.connection();

    let _ = dispatch(&mut ctx, HttpRequest::new(Method::Post, "/scrub?position=42.5")).await;
    let _ = dispatch(&mut ctx, HttpRequest::new(Method::Post, "/rate?value=1")).await;
    let _ = dispatch(&mut ctx, HttpRequest::new(Method::Post, "/stop")).await;

    assert_eq!(
        rig.renderer.calls(),
        vec![
            "scrub 42.5".to_string(),
            "rate 1".to_string(),
            "stop".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_set_property_selected_media_array() {
    let rig = TestRig::new();
    let (_reverse_ctx, _reverse_rx) = rig.reverse_channel().await;
    let (mut control, _out) = rig.connection();
    let _ = dispatch(&mut control, play_request(PLAYBACK_UUID, MASTER_URL, 0.0)).await;

    let entry = DictBuilder::new()
        .insert("MediaSelectionOptionsName", "English")
        .insert("MediaSelectionOptionsUnicodeLanguageIdentifier", "en")
        .build();
    let body = DictBuilder::new()
        .insert("value", PlistValue::Array(vec![entry]))
        .build();

    let mut request = HttpRequest::new(Method::Put, "/setProperty?selectedMediaArray");
    request
        .headers
        .insert(names::CONTENT_TYPE, content_types::BINARY_PLIST);
    request.body = encode(&body).unwrap();

    let response = dispatch(&mut control, request).await.response.unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let registry = rig.shared.registry.lock().await;
    let session = registry.current().unwrap();
    assert_eq!(session.language_code.as_deref(), Some("en"));
    assert_eq!(session.language_name.as_deref(), Some("English"));
}

#[tokio::test]
async fn test_set_property_known_noop() {
    let rig = TestRig::new();
    let (mut ctx, _out) = rig.connection();

    let response = dispatch(
        &mut ctx,
        HttpRequest::new(Method::Put, "/setProperty?actionAtItemEnd"),
    )
    .await
    .response
    .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert!(body_text(&response).contains("<key>errorCode</key>"));
}

#[tokio::test]
async fn test_fp_setup2_misdirected() {
    let rig = TestRig::new();
    let (mut ctx, _out) = rig.connection();

    let response = dispatch(&mut ctx, HttpRequest::new(Method::Post, "/fp-setup2"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 421);
}

#[tokio::test]
async fn test_digest_gate_when_password_set() {
    let rig = TestRig::with_config(
        ReceiverConfig::with_name("Locked")
            .port(7000)
            .password("secret"),
    );
    let (mut ctx, _out) = rig.connection();

    // Pairing and info endpoints stay open
    let response = dispatch(&mut ctx, HttpRequest::new(Method::Get, "/server-info"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);

    // Control endpoints challenge
    let response = dispatch(&mut ctx, HttpRequest::new(Method::Post, "/stop"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 401);
    let challenge = response.headers.get(names::WWW_AUTHENTICATE).unwrap();
    assert!(challenge.starts_with("Digest realm=\"Locked\""));
    assert!(rig.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_pair_verify_round_trip_over_http() {
    use crate::protocol::crypto::{Ed25519KeyPair, X25519KeyPair};

    let rig = TestRig::new();
    let (mut ctx, _out) = rig.connection();

    let client_ed = Ed25519KeyPair::generate();
    let client_ecdh = X25519KeyPair::generate();

    let mut step1 = vec![1u8, 0, 0, 0];
    step1.extend_from_slice(client_ecdh.public_key().as_bytes());
    step1.extend_from_slice(client_ed.public_key().as_bytes());

    let mut request = HttpRequest::new(Method::Post, "/pair-verify");
    request.body = step1;
    let response = dispatch(&mut ctx, request).await.response.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body.len(), 96);
}

#[tokio::test]
async fn test_pair_setup_returns_public_key() {
    let rig = TestRig::new();
    let (mut ctx, _out) = rig.connection();

    let response = dispatch(&mut ctx, HttpRequest::new(Method::Post, "/pair-setup"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body, rig.shared.identity.public_key().to_vec());
}

#[tokio::test]
async fn test_unknown_path_not_found() {
    let rig = TestRig::new();
    let (mut ctx, _out) = rig.connection();

    let response = dispatch(&mut ctx, HttpRequest::new(Method::Get, "/whatever"))
        .await
        .response
        .unwrap();
    assert_eq!(response.status.as_u16(), 404);
}
