//! HTTP/1.1 messages for the AirPlay control plane
//!
//! AirPlay video runs over cleartext HTTP/1.1. The same socket may later
//! be upgraded to reverse HTTP ("PTTH"), after which the server writes
//! *requests* onto it; both directions share the message types here.

pub mod codec;

pub use codec::{HttpServerCodec, ParseError, ResponseBuilder, encode_request, encode_response};

use std::collections::HashMap;
use std::str::FromStr;

/// Well-known header names
pub mod names {
    /// Entity length
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// Entity media type
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Playlist tree root sent with `/play`
    pub const CONTENT_LOCATION: &str = "Content-Location";
    /// Connection options (`Upgrade`, `close`)
    pub const CONNECTION: &str = "Connection";
    /// Protocol upgrade target
    pub const UPGRADE: &str = "Upgrade";
    /// Session identifier the sender attaches to every request
    pub const X_APPLE_SESSION_ID: &str = "X-Apple-Session-ID";
    /// Reverse-connection purpose announced on `/reverse`
    pub const X_APPLE_PURPOSE: &str = "X-Apple-Purpose";
    /// Digest credentials
    pub const AUTHORIZATION: &str = "Authorization";
    /// Digest challenge
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
    /// Requesting client identification
    pub const USER_AGENT: &str = "User-Agent";
}

/// Content types used on the wire
pub mod content_types {
    /// Binary property list (request bodies)
    pub const BINARY_PLIST: &str = "application/x-apple-binary-plist";
    /// XML property list (response and FCUP bodies)
    pub const XML_PLIST: &str = "text/x-apple-plist+xml";
    /// HLS playlist served to the local player
    pub const HLS_PLAYLIST: &str = "application/x-mpegURL; charset=utf-8";
    /// Raw bytes (pairing exchanges)
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// HTTP request methods understood by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
}

impl Method {
    /// Wire name of the method
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "OPTIONS" => Ok(Self::Options),
            "HEAD" => Ok(Self::Head),
            _ => Err(()),
        }
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// 101 Switching Protocols
    pub const SWITCHING_PROTOCOLS: Self = Self(101);
    /// 200 OK
    pub const OK: Self = Self(200);
    /// 400 Bad Request
    pub const BAD_REQUEST: Self = Self(400);
    /// 401 Unauthorized
    pub const UNAUTHORIZED: Self = Self(401);
    /// 404 Not Found
    pub const NOT_FOUND: Self = Self(404);
    /// 421 Misdirected Request
    pub const MISDIRECTED_REQUEST: Self = Self(421);
    /// 470 Connection Authorization Required (Apple pairing failure)
    pub const CONNECTION_AUTHORIZATION_REQUIRED: Self = Self(470);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    /// 501 Not Implemented
    pub const NOT_IMPLEMENTED: Self = Self(501);

    /// Numeric value
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// RFC reason phrase
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self.0 {
            101 => "Switching Protocols",
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            421 => "Misdirected Request",
            470 => "Connection Authorization Required",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

/// Header collection with case-insensitive lookup
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Create empty headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any case-insensitive match. The new key
    /// casing is preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name_str = name.into();
        self.inner.retain(|k, _| !k.eq_ignore_ascii_case(&name_str));
        self.inner.insert(name_str, value.into());
    }

    /// Get a header value (case-insensitive)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a header is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get `Content-Length` value
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.parse().ok()
    }

    /// Get `Content-Type` value
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// An HTTP request message
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Request URI (path plus optional query)
    pub uri: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (may be empty)
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Create a new request
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Path portion of the URI (query stripped)
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or(&self.uri)
    }

    /// Value of a query parameter, if present
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let query = self.uri.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Whether the body claims to be a binary property list
    #[must_use]
    pub fn has_binary_plist_body(&self) -> bool {
        self.headers
            .content_type()
            .is_some_and(|ct| ct.contains("apple-binary-plist"))
    }
}

/// An HTTP response message
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Reason phrase
    pub reason: String,
    /// Response headers
    pub headers: Headers,
    /// Response body (may be empty)
    pub body: Vec<u8>,
    /// Close the connection after this response is written
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        assert_eq!(Method::from_str("GET"), Ok(Method::Get));
        assert_eq!(Method::from_str("post"), Ok(Method::Post));
        assert_eq!(Method::from_str("BREW"), Err(()));
        assert_eq!(Method::Put.as_str(), "PUT");
    }

    #[test]
    fn test_status_reason() {
        assert_eq!(StatusCode::SWITCHING_PROTOCOLS.reason(), "Switching Protocols");
        assert_eq!(StatusCode::MISDIRECTED_REQUEST.reason(), "Misdirected Request");
        assert_eq!(
            StatusCode::CONNECTION_AUTHORIZATION_REQUIRED.reason(),
            "Connection Authorization Required"
        );
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));

        headers.insert("CONTENT-TYPE", "application/x-apple-binary-plist");
        assert_eq!(headers.len(), 1);
        assert!(headers.get("Content-Type").unwrap().contains("binary-plist"));
    }

    #[test]
    fn test_query_param() {
        let request = HttpRequest::new(Method::Post, "/scrub?position=12.5");
        assert_eq!(request.path(), "/scrub");
        assert_eq!(request.query_param("position"), Some("12.5"));
        assert_eq!(request.query_param("value"), None);
    }
}
