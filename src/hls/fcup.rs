//! FCUP request construction
//!
//! An FCUP request asks the sender to fetch a playlist URL on our
//! behalf. It travels as a server-originated `POST /event` on the
//! reverse channel, with an XML plist body of type
//! `unhandledURLRequest`; the sender answers with a `POST /action` of
//! type `unhandledURLResponse` on the control channel.

use crate::protocol::http::{HttpRequest, Method, content_types, names};
use crate::protocol::plist::{DictBuilder, encode_xml};

// Fixed values observed from Apple TV senders
const SESSION_ID: i64 = 1;
const CLIENT_INFO: i64 = 1;
const CLIENT_REF: i64 = 40_030_004;
const USER_AGENT: &str =
    "AppleCoreMedia/1.0.0.11B554a (Apple TV; U; CPU OS 7_0_4 like Mac OS X; en_us";

/// Build the XML plist body of an FCUP request
#[must_use]
pub fn request_body(url: &str, request_id: i64, playback_session_id: &str) -> String {
    let header = DictBuilder::new()
        .insert("X-Playback-Session-ID", playback_session_id)
        .insert("User-Agent", USER_AGENT)
        .build();

    let request = DictBuilder::new()
        .insert("FCUP_Response_ClientInfo", CLIENT_INFO)
        .insert("FCUP_Response_ClientRef", CLIENT_REF)
        .insert("FCUP_Response_RequestID", request_id)
        .insert("FCUP_Response_URL", url)
        .insert("SessionID", SESSION_ID)
        .insert("FCUP_Response_Header", header)
        .build();

    let root = DictBuilder::new()
        .insert("sessionID", SESSION_ID)
        .insert("type", "unhandledURLRequest")
        .insert("request", request)
        .build();

    encode_xml(&root)
}

/// Build the complete reverse-channel `POST /event` request
#[must_use]
pub fn request_message(url: &str, request_id: i64, apple_session_id: &str) -> HttpRequest {
    let mut request = HttpRequest::new(Method::Post, "/event");
    request
        .headers
        .insert(names::X_APPLE_SESSION_ID, apple_session_id);
    request
        .headers
        .insert(names::CONTENT_TYPE, content_types::XML_PLIST);
    request.body = request_body(url, request_id, apple_session_id).into_bytes();
    request
}
