//! Control-plane request handlers
//!
//! One function per endpoint. Handlers return structured results; the
//! dispatcher is the single place that turns errors into HTTP
//! responses.

use std::time::{SystemTime, UNIX_EPOCH};

use super::connection::{ConnectionKind, ReverseChannel};
use super::dispatcher::{ConnectionContext, HandlerError};
use super::events::ReceiverEvent;
use crate::hls::{MASTER_PATH, playlist};
use crate::protocol::http::{
    HttpRequest, HttpResponse, ResponseBuilder, StatusCode, content_types, names,
};
use crate::protocol::pairing::random_pin;
use crate::protocol::plist::{DictBuilder, PlistValue, decode, encode, encode_xml};
use crate::renderer::{PlaybackInfo, TimeRange};

const SUPPORTED_HLS_PROC_NAMES: &str = "YouTube;";

/// `GET /server-info`
pub(crate) fn server_info(ctx: &ConnectionContext) -> Result<HttpResponse, HandlerError> {
    let config = &ctx.shared.config;
    let mac = config.mac_string();

    // First 12 feature bits (R to L): 0x27F = 0010 0111 1111.
    // Bits 0-6 and bit 9: video, photo, FairPlay video, volume control,
    // HLS, slideshow, bit 6, audio.
    let plist = DictBuilder::new()
        .insert("features", 0x27Fi64)
        .insert("macAddress", mac.as_str())
        .insert("model", config.model.as_str())
        .insert("osBuildVersion", config.os_build_version.as_str())
        .insert("protovers", "1.0")
        .insert("srcvers", config.source_version.as_str())
        .insert("vv", config.vv)
        .insert("deviceid", mac.as_str())
        .build();

    Ok(ResponseBuilder::ok()
        .body(encode_xml(&plist).into_bytes(), content_types::XML_PLIST)
        .build())
}

/// `POST /fp-setup`
pub(crate) fn fp_setup(
    ctx: &mut ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let reply = ctx.fairplay.setup(&request.body)?;
    Ok(ResponseBuilder::ok()
        .body(reply, content_types::OCTET_STREAM)
        .build())
}

/// `POST /pair-pin-start` — arm PIN pairing and surface the PIN
pub(crate) fn pair_pin_start(ctx: &ConnectionContext) -> Result<HttpResponse, HandlerError> {
    let pin = match ctx.shared.config.pin {
        Some(fixed) => format!("{fixed:04}"),
        None => format!("{:04}", random_pin()),
    };

    tracing::info!("pairing PIN: {pin}");
    let _ = ctx
        .shared
        .event_tx
        .send(ReceiverEvent::PairingPinRequested { pin: pin.clone() });
    *ctx.shared.active_pin.lock().expect("pin lock") = Some(pin);

    Ok(ResponseBuilder::ok().build())
}

/// `POST /pair-setup-pin` — the three SRP steps, keyed by body fields
pub(crate) fn pair_setup_pin(
    ctx: &mut ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let root = decode(&request.body)
        .map_err(|e| HandlerError::BadRequest(format!("pair-setup-pin plist: {e}")))?;

    if let Some(user) = root.get("user").and_then(PlistValue::as_str) {
        // Step 1: {user, method} -> {pk, salt}
        let pin = ctx
            .shared
            .active_pin
            .lock()
            .expect("pin lock")
            .clone()
            .or_else(|| ctx.shared.config.pin.map(|p| format!("{p:04}")))
            .ok_or_else(|| {
                HandlerError::BadRequest("pair-setup-pin before pair-pin-start".into())
            })?;

        let (salt, server_public) = ctx
            .pairing
            .begin_setup(user, &pin)
            .map_err(HandlerError::from_pairing)?;

        let reply = DictBuilder::new()
            .insert("pk", PlistValue::Data(server_public))
            .insert("salt", PlistValue::Data(salt))
            .build();
        return plist_reply(&reply);
    }

    if let (Some(pk), Some(proof)) = (
        root.get("pk").and_then(PlistValue::as_bytes),
        root.get("proof").and_then(PlistValue::as_bytes),
    ) {
        // Step 2: {pk: A, proof: M1} -> {proof: M2}
        let m2 = ctx
            .pairing
            .validate_proof(pk, proof)
            .map_err(HandlerError::from_pairing)?;

        let reply = DictBuilder::new()
            .insert("proof", PlistValue::Data(m2))
            .build();
        return plist_reply(&reply);
    }

    if let (Some(epk), Some(tag)) = (
        root.get("epk").and_then(PlistValue::as_bytes),
        root.get("authTag").and_then(PlistValue::as_bytes),
    ) {
        // Step 3: {epk, authTag} -> {epk, authTag}
        let (server_epk, server_tag) = ctx
            .pairing
            .confirm_setup(epk, tag)
            .map_err(HandlerError::from_pairing)?;

        if let Some((user, client_pk)) = ctx.pairing.client_identity() {
            tracing::info!("pair-setup confirmed for {user}, client pk {client_pk}");
        }

        let reply = DictBuilder::new()
            .insert("epk", PlistValue::Data(server_epk))
            .insert("authTag", PlistValue::Data(server_tag.to_vec()))
            .build();
        return plist_reply(&reply);
    }

    Err(HandlerError::BadRequest(
        "pair-setup-pin step not recognised".into(),
    ))
}

fn plist_reply(value: &PlistValue) -> Result<HttpResponse, HandlerError> {
    let body =
        encode(value).map_err(|e| HandlerError::Internal(format!("plist encode: {e}")))?;
    Ok(ResponseBuilder::ok()
        .body(body, content_types::OCTET_STREAM)
        .build())
}

/// `POST /pair-setup` — legacy bootstrap, answers our raw public key
pub(crate) fn pair_setup(ctx: &ConnectionContext) -> Result<HttpResponse, HandlerError> {
    Ok(ResponseBuilder::ok()
        .body(
            ctx.shared.identity.public_key().to_vec(),
            content_types::OCTET_STREAM,
        )
        .build())
}

/// `POST /pair-verify` — raw-byte X25519/Ed25519 exchange
pub(crate) fn pair_verify(
    ctx: &mut ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let body = &request.body;
    if body.len() < 68 {
        return Err(HandlerError::BadRequest("pair-verify body too short".into()));
    }

    if body[0] > 0 {
        // Step 1: ephemeral + long-term client keys
        let (server_public, encrypted_signature) = ctx
            .pairing
            .handshake(&body[4..36], &body[36..68])
            .map_err(HandlerError::from_pairing)?;

        let mut reply = Vec::with_capacity(96);
        reply.extend_from_slice(&server_public);
        reply.extend_from_slice(&encrypted_signature);
        Ok(ResponseBuilder::ok()
            .body(reply, content_types::OCTET_STREAM)
            .build())
    } else {
        // Step 2: encrypted client signature
        ctx.pairing
            .finish(&body[4..68])
            .map_err(HandlerError::from_pairing)?;
        tracing::debug!("pair-verify finished");
        Ok(ResponseBuilder::ok().build())
    }
}

/// `POST /reverse` — upgrade this connection to the PTTH channel
pub(crate) fn reverse(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let purpose = request
        .headers
        .get(names::X_APPLE_PURPOSE)
        .unwrap_or("event");
    tracing::info!(
        "client requested reverse connection: {}; purpose: {} \"{}\"",
        request.headers.get(names::CONNECTION).unwrap_or(""),
        request.headers.get(names::UPGRADE).unwrap_or(""),
        purpose
    );

    {
        let mut connections = ctx.shared.connections.lock().expect("connection table");
        if connections.count_kind(ConnectionKind::Reverse) > 0 {
            tracing::error!("multiple PTTH connections are forbidden");
            return Err(HandlerError::BadRequest(
                "reverse channel already established".into(),
            ));
        }
        connections.set_kind(ctx.id, ConnectionKind::Reverse);
    }

    *ctx.shared.reverse.lock().expect("reverse slot") = Some(ReverseChannel {
        connection: ctx.id,
        sender: ctx.out_tx.clone(),
    });

    Ok(ResponseBuilder::new(StatusCode::SWITCHING_PROTOCOLS)
        .header(names::CONNECTION, "Upgrade")
        .header(names::UPGRADE, "PTTH/1.0")
        .build())
}

/// What to do once the registry lock is released
enum AfterAction {
    Fetch(Vec<(String, i64)>),
    Play { uri: String, start: f32 },
    Nothing,
}

/// `POST /play`
pub(crate) async fn play(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let apple_session_id = request
        .headers
        .get(names::X_APPLE_SESSION_ID)
        .ok_or_else(|| HandlerError::Teardown("play request had no X-Apple-Session-ID".into()))?
        .to_string();

    if !request.has_binary_plist_body() {
        return Err(HandlerError::Teardown(
            "play request content is not a binary plist".into(),
        ));
    }
    let root = decode(&request.body)
        .map_err(|e| HandlerError::Teardown(format!("play request plist: {e}")))?;

    let uuid = root
        .get("uuid")
        .and_then(PlistValue::as_str)
        .ok_or_else(|| HandlerError::Teardown("play request without uuid".into()))?;

    let port = ctx.shared.http_port();
    let mut registry = ctx.shared.registry.lock().await;
    let (index, reused) = registry.allocate_for(uuid, &apple_session_id, port);

    if reused {
        // The playlist tree is already stored; hand it straight to the
        // renderer (interruptions by advertisements land here)
        let session = registry.session_mut(index).expect("allocated slot");
        session.playback_started = true;
        let uri = session.local_master_uri();
        let start = session.start_position_seconds;
        drop(registry);

        ctx.shared.renderer.play(&uri, start);
        let _ = ctx
            .shared
            .event_tx
            .send(ReceiverEvent::PlaybackStarted { uri });
        return Ok(ResponseBuilder::ok().build());
    }

    let content_location = root
        .get("Content-Location")
        .and_then(PlistValue::as_str)
        .ok_or_else(|| HandlerError::Teardown("play request without Content-Location".into()))?;

    if let Some(proc_name) = root.get("clientProcName").and_then(PlistValue::as_str) {
        if !SUPPORTED_HLS_PROC_NAMES.contains(proc_name) {
            tracing::warn!(
                "unsupported HLS streaming format: clientProcName {proc_name} not found \
                 in supported list: {SUPPORTED_HLS_PROC_NAMES}"
            );
        }
    } else {
        return Err(HandlerError::Teardown(
            "play request without clientProcName".into(),
        ));
    }

    let start_position = root
        .get("Start-Position-Seconds")
        .and_then(PlistValue::as_f64)
        .unwrap_or_else(|| {
            tracing::info!("no Start-Position-Seconds in play request");
            0.0
        });

    let Some(prefix_len) = content_location.find("/master.m3u8") else {
        return Err(HandlerError::Teardown(format!(
            "Content-Location has unsupported form: {content_location}"
        )));
    };

    let session = registry.session_mut(index).expect("allocated slot");
    session.uri_prefix = content_location[..prefix_len].to_string();
    #[allow(clippy::cast_possible_truncation)]
    {
        session.start_position_seconds = start_position as f32;
    }
    if let Some(code) = ctx.shared.config.language.clone() {
        session.language_code.get_or_insert(code);
    }
    session.note_requested(1);
    let request_id = session.next_request_id();
    drop(registry);

    ctx.shared
        .send_fcup(content_location, request_id, &apple_session_id);

    Ok(ResponseBuilder::ok().build())
}

/// `POST /action`
pub(crate) async fn action(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let apple_session_id = request
        .headers
        .get(names::X_APPLE_SESSION_ID)
        .ok_or_else(|| HandlerError::BadRequest("action request had no X-Apple-Session-ID".into()))?
        .to_string();

    if !request.has_binary_plist_body() {
        return Err(HandlerError::BadRequest(
            "action request did not carry a binary plist".into(),
        ));
    }
    let root = decode(&request.body)
        .map_err(|e| HandlerError::BadRequest(format!("action request plist: {e}")))?;

    let action_type = root
        .get("type")
        .and_then(PlistValue::as_str)
        .ok_or_else(|| HandlerError::BadRequest("action request without type".into()))?;
    tracing::debug!("action type is {action_type}");

    {
        let registry = ctx.shared.registry.lock().await;
        let Some(session) = registry.current() else {
            return Err(HandlerError::BadRequest("no active playback session".into()));
        };
        check_session_id(&session.apple_session_id, &apple_session_id)?;
    }

    match action_type {
        "playlistRemove" => playlist_remove(ctx, &root).await,
        "playlistInsert" => {
            tracing::info!("unhandled action type playlistInsert (add new playback)");
            Err(HandlerError::Unsupported {
                status: StatusCode::NOT_IMPLEMENTED,
                detail: "playlist insertion is not implemented".into(),
            })
        }
        "unhandledURLResponse" => unhandled_url_response(ctx, &root, &apple_session_id).await,
        other => {
            tracing::info!("unknown action type {other} (unhandled)");
            Ok(ResponseBuilder::ok().build())
        }
    }
}

async fn playlist_remove(
    ctx: &ConnectionContext,
    root: &PlistValue,
) -> Result<HttpResponse, HandlerError> {
    let remove_uuid = root
        .get("params")
        .and_then(|p| p.get("item"))
        .and_then(|i| i.get("uuid"))
        .and_then(PlistValue::as_str)
        .ok_or_else(|| HandlerError::BadRequest("playlistRemove without item uuid".into()))?;

    let registry = ctx.shared.registry.lock().await;
    let Some(session) = registry.current() else {
        return Err(HandlerError::BadRequest("no active playback session".into()));
    };

    if session.playback_uuid == remove_uuid {
        tracing::debug!("removal uuid matches playback uuid");
    } else {
        tracing::error!(
            "uuid of playlist removal action request did not match current playlist: \
             current {} remove {remove_uuid}",
            session.playback_uuid
        );
    }

    Ok(ResponseBuilder::ok().build())
}

async fn unhandled_url_response(
    ctx: &ConnectionContext,
    root: &PlistValue,
    apple_session_id: &str,
) -> Result<HttpResponse, HandlerError> {
    let params = root
        .get("params")
        .and_then(PlistValue::as_dict)
        .ok_or_else(|| HandlerError::BadRequest("action request without params".into()))?;

    if let Some(status) = params
        .get("FCUP_Response_StatusCode")
        .and_then(PlistValue::as_i64)
    {
        tracing::debug!("FCUP_Response_StatusCode = {status}");
    }
    if let Some(request_id) = params
        .get("FCUP_Response_RequestID")
        .and_then(PlistValue::as_i64)
    {
        tracing::debug!("FCUP_Response_RequestID = {request_id}");
    }

    let url = params
        .get("FCUP_Response_URL")
        .and_then(PlistValue::as_str)
        .ok_or_else(|| HandlerError::BadRequest("FCUP response without URL".into()))?;
    let data = params
        .get("FCUP_Response_Data")
        .and_then(PlistValue::as_bytes)
        .ok_or_else(|| HandlerError::BadRequest("FCUP response without data".into()))?;
    let text = String::from_utf8_lossy(data).into_owned();

    let after = {
        let mut registry = ctx.shared.registry.lock().await;
        let Some(session) = registry.current_mut() else {
            return Err(HandlerError::BadRequest("no active playback session".into()));
        };
        check_session_id(&session.apple_session_id, apple_session_id)?;

        session.note_response();

        if url.contains("/master.m3u8") {
            let text = match &session.language_code {
                Some(code) => playlist::select_language(&text, code),
                None => text,
            };

            for child in playlist::child_uris(&text, &session.uri_prefix) {
                session.push_pending(child);
            }

            let rewritten =
                playlist::rewrite_master(&text, &session.uri_prefix, &session.local_uri_prefix);
            session.store.set_master(rewritten);
        } else {
            let (chunks, duration) = playlist::analyze_media(&text).unwrap_or((0, 0.0));
            let path = playlist::uri_path(url, &session.uri_prefix);
            if session.store.insert_media(&path, text, chunks, duration) {
                tracing::debug!(
                    "{url}: received media playlist has {chunks} chunks, \
                     total duration {duration:.3} secs"
                );
            } else {
                tracing::debug!("media playlist is a duplicate: do not store");
            }
        }

        let to_fetch = session.drain_pending();
        if to_fetch.is_empty() {
            if session.outstanding() == 0 && !session.playback_started {
                session.playback_started = true;
                AfterAction::Play {
                    uri: session.local_master_uri(),
                    start: session.start_position_seconds,
                }
            } else {
                AfterAction::Nothing
            }
        } else {
            session.note_requested(to_fetch.len());
            let fetches = to_fetch
                .into_iter()
                .map(|uri| (uri, session.next_request_id()))
                .collect();
            AfterAction::Fetch(fetches)
        }
    };

    match after {
        AfterAction::Fetch(fetches) => {
            for (uri, request_id) in fetches {
                ctx.shared.send_fcup(&uri, request_id, apple_session_id);
            }
        }
        AfterAction::Play { uri, start } => {
            ctx.shared.renderer.play(&uri, start);
            let _ = ctx
                .shared
                .event_tx
                .send(ReceiverEvent::PlaybackStarted { uri });
        }
        AfterAction::Nothing => {}
    }

    Ok(ResponseBuilder::ok().build())
}

fn check_session_id(stored: &str, received: &str) -> Result<(), HandlerError> {
    if stored == received {
        Ok(())
    } else {
        tracing::error!("X-Apple-Session-ID has changed: was \"{stored}\" now \"{received}\"");
        Err(HandlerError::BadRequest("X-Apple-Session-ID mismatch".into()))
    }
}

/// `POST /scrub?position=<f>`
pub(crate) fn scrub(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let position = query_float(request, "position");
    tracing::debug!("scrub to position {position:.6}");
    ctx.shared.renderer.scrub(position);
    Ok(ResponseBuilder::ok().build())
}

/// `POST /rate?value=<f>`
pub(crate) fn rate(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let value = query_float(request, "value");
    tracing::debug!("rate set to {value:.6}");
    ctx.shared.renderer.rate(value);
    Ok(ResponseBuilder::ok().build())
}

/// `POST /stop` — stops the renderer, keeps the session
pub(crate) fn stop(ctx: &ConnectionContext) -> Result<HttpResponse, HandlerError> {
    tracing::info!("client HTTP request POST stop");
    ctx.shared.renderer.stop();
    Ok(ResponseBuilder::ok().build())
}

fn query_float(request: &HttpRequest, name: &str) -> f32 {
    request
        .query_param(name)
        .and_then(|raw| raw.parse::<f32>().ok())
        .unwrap_or(0.0)
}

/// `PUT /setProperty?<name>`
pub(crate) async fn set_property(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    let property = request.uri.split_once('?').map_or("", |(_, q)| q);
    tracing::debug!("set_property: {property}");

    match property {
        "selectedMediaArray" => {
            if !request.has_binary_plist_body() {
                tracing::info!(
                    "PUT /setProperty?selectedMediaArray did not provide a binary plist"
                );
                return Ok(empty_ok());
            }
            let Ok(root) = decode(&request.body) else {
                tracing::info!(
                    "PUT /setProperty?selectedMediaArray did not provide expected plist"
                );
                return Ok(empty_ok());
            };
            let Some(entries) = root.get("value").and_then(PlistValue::as_array) else {
                tracing::info!(
                    "PUT /setProperty?selectedMediaArray did not provide expected plist"
                );
                return Ok(empty_ok());
            };

            // The first non-null name and the first non-null language
            // code win, independently of one another
            let mut language_name = None;
            let mut language_code = None;
            for entry in entries {
                if language_name.is_none() {
                    language_name = entry
                        .get("MediaSelectionOptionsName")
                        .and_then(PlistValue::as_str)
                        .map(str::to_string);
                }
                if language_code.is_none() {
                    language_code = entry
                        .get("MediaSelectionOptionsUnicodeLanguageIdentifier")
                        .and_then(PlistValue::as_str)
                        .map(str::to_string);
                }
                if language_name.is_some() && language_code.is_some() {
                    break;
                }
            }

            let mut registry = ctx.shared.registry.lock().await;
            if let Some(session) = registry.current_mut() {
                tracing::info!(
                    "stored language from MediaSelectionOptions: {} \"{}\"",
                    language_code.as_deref().unwrap_or("-"),
                    language_name.as_deref().unwrap_or("-")
                );
                if language_code.is_some() {
                    session.language_code = language_code;
                }
                if language_name.is_some() {
                    session.language_name = language_name;
                }
            }
            Ok(empty_ok())
        }
        "reverseEndTime" | "forwardEndTime" | "actionAtItemEnd" => {
            tracing::debug!("property {property} is known but unhandled");
            let reply = DictBuilder::new().insert("errorCode", 0i64).build();
            Ok(ResponseBuilder::ok()
                .body(encode_xml(&reply).into_bytes(), content_types::XML_PLIST)
                .build())
        }
        _ => {
            tracing::debug!("property {property} is unknown, unhandled");
            Ok(empty_ok())
        }
    }
}

/// `GET /getProperty?<name>` — logged, not implemented
pub(crate) fn get_property(request: &HttpRequest) -> Result<HttpResponse, HandlerError> {
    let property = request.uri.split_once('?').map_or("", |(_, q)| q);
    tracing::debug!("get_property: {property} (unhandled)");
    Ok(empty_ok())
}

fn empty_ok() -> HttpResponse {
    ResponseBuilder::ok()
        .header(names::CONTENT_LENGTH, "0")
        .build()
}

/// `GET /playback-info`
///
/// `duration == -1.0` means playback finished: reset the renderer hard
/// and close the connection. `position == -1.0` means no information
/// yet: answer nothing and let the client retry.
pub(crate) async fn playback_info(
    ctx: &ConnectionContext,
) -> Result<Option<HttpResponse>, HandlerError> {
    let mut info = PlaybackInfo::default();
    ctx.shared.renderer.acquire_playback_info(&mut info);

    if (info.duration - (-1.0)).abs() < f64::EPSILON {
        tracing::debug!("playback info not available (finishing)");
        ctx.shared.renderer.reset(true);
        return Ok(Some(ResponseBuilder::ok().close().build()));
    }
    if (info.position - (-1.0)).abs() < f64::EPSILON {
        tracing::debug!("playback info not available");
        return Ok(None);
    }

    info.loaded_time_ranges = vec![TimeRange {
        start: info.position,
        duration: info.duration - info.position,
    }];
    info.seekable_time_ranges = vec![TimeRange {
        start: 0.0,
        duration: info.position,
    }];

    let plist = playback_info_plist(&info);
    Ok(Some(
        ResponseBuilder::ok()
            .body(encode_xml(&plist).into_bytes(), content_types::XML_PLIST)
            .build(),
    ))
}

fn playback_info_plist(info: &PlaybackInfo) -> PlistValue {
    let ranges = |ranges: &[TimeRange]| {
        PlistValue::Array(
            ranges
                .iter()
                .map(|r| {
                    DictBuilder::new()
                        .insert("duration", r.duration)
                        .insert("start", r.start)
                        .build()
                })
                .collect(),
        )
    };

    DictBuilder::new()
        .insert("duration", info.duration)
        .insert("position", info.position)
        .insert("rate", f64::from(info.rate))
        .insert("readyToPlay", i64::from(info.ready_to_play))
        .insert("playbackBufferEmpty", i64::from(info.playback_buffer_empty))
        .insert("playbackBufferFull", i64::from(info.playback_buffer_full))
        .insert(
            "playbackLikelyToKeepUp",
            i64::from(info.playback_likely_to_keep_up),
        )
        .insert("loadedTimeRanges", ranges(&info.loaded_time_ranges))
        .insert("seekableTimeRanges", ranges(&info.seekable_time_ranges))
        .build()
}

/// `GET /<path>.m3u8` — serve a cached playlist to the local player
pub(crate) async fn hls(
    ctx: &ConnectionContext,
    request: &HttpRequest,
) -> Result<HttpResponse, HandlerError> {
    ctx.shared
        .connections
        .lock()
        .expect("connection table")
        .set_kind(ctx.id, ConnectionKind::HlsLoopback);

    if request.headers.contains(names::UPGRADE) {
        tracing::info!("hls upgrade request declined");
        return Ok(empty_ok());
    }

    let path = request.path().to_string();
    let store = {
        let registry = ctx.shared.registry.lock().await;
        match registry.current() {
            Some(session) => session.store.clone(),
            None => {
                tracing::error!("requested playlist {path} with no active session");
                return Err(HandlerError::NotFound);
            }
        }
    };

    let body = if path == MASTER_PATH {
        store.master()
    } else {
        store.media(&path).map(|entry| {
            tracing::info!(
                "requested media playlist {path} has {} chunks, total duration {:.3} secs",
                entry.chunks,
                entry.duration
            );
            playlist::expand_condensed(&entry.text)
        })
    };

    let Some(body) = body else {
        tracing::error!("requested playlist {path} not found");
        return Err(HandlerError::NotFound);
    };

    Ok(ResponseBuilder::ok()
        .header("Access-Control-Allow-Headers", "Content-type")
        .header("Access-Control-Allow-Origin", "*")
        .header("Date", &http_date())
        .body(body.into_bytes(), content_types::HLS_PLAYLIST)
        .build())
}

/// RFC 7231 date string for response headers
fn http_date() -> String {
    const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    #[allow(clippy::cast_possible_wrap)]
    let days = (secs / 86_400) as i64;
    let tod = secs % 86_400;

    // Civil-from-days (Howard Hinnant's algorithm)
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    #[allow(clippy::cast_sign_loss)]
    let weekday = WEEKDAYS[((days + 4).rem_euclid(7)) as usize];
    #[allow(clippy::cast_sign_loss)]
    let month_name = MONTHS[(month - 1) as usize];

    format!(
        "{weekday}, {day:02} {month_name} {year} {:02}:{:02}:{:02} GMT",
        tod / 3600,
        (tod / 60) % 60,
        tod % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_format() {
        let date = http_date();
        // e.g. "Sat, 01 Aug 2026 12:34:56 GMT"
        assert!(date.ends_with(" GMT"));
        assert_eq!(date.len(), 29);
        assert!(date.contains(", "));
    }

    #[test]
    fn test_playback_info_plist_shape() {
        let info = PlaybackInfo {
            duration: 60.0,
            position: 10.0,
            rate: 1.0,
            loaded_time_ranges: vec![TimeRange {
                start: 10.0,
                duration: 50.0,
            }],
            seekable_time_ranges: vec![TimeRange {
                start: 0.0,
                duration: 10.0,
            }],
            ..PlaybackInfo::default()
        };

        let plist = playback_info_plist(&info);
        let xml = encode_xml(&plist);
        assert!(xml.contains("<key>duration</key>"));
        assert!(xml.contains("<real>60.0</real>"));
        assert!(xml.contains("<key>loadedTimeRanges</key>"));
        assert!(xml.contains("<key>seekableTimeRanges</key>"));
        assert!(xml.contains("<key>playbackLikelyToKeepUp</key>"));
    }
}
