//! Request dispatcher
//!
//! Routes parsed requests to handlers and is the single place where
//! handler errors become HTTP responses. A failed `/action` keeps the
//! connection alive; a failed pair-verify tears it down.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::connection::{ConnectionId, ConnectionKind};
use super::fairplay::FairPlaySession;
use super::handlers;
use super::server::ServerShared;
use crate::protocol::http::{
    HttpRequest, HttpResponse, Method, ResponseBuilder, StatusCode, names,
};
use crate::protocol::pairing::{PairingError, PairingSession, digest};

/// Per-connection dispatch state
pub(crate) struct ConnectionContext {
    pub(crate) id: ConnectionId,
    pub(crate) shared: Arc<ServerShared>,
    pub(crate) out_tx: mpsc::UnboundedSender<Vec<u8>>,
    pub(crate) pairing: PairingSession,
    pub(crate) fairplay: FairPlaySession,
    auth_nonce: Option<String>,
    authenticated: bool,
}

impl ConnectionContext {
    pub(crate) fn new(
        id: ConnectionId,
        shared: Arc<ServerShared>,
        out_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        let pairing = PairingSession::new(&shared.identity);
        Self {
            id,
            shared,
            out_tx,
            pairing,
            fairplay: FairPlaySession::default(),
            auth_nonce: None,
            authenticated: false,
        }
    }

    pub(crate) fn kind(&self) -> ConnectionKind {
        self.shared
            .connections
            .lock()
            .expect("connection table")
            .kind(self.id)
            .unwrap_or(ConnectionKind::Control)
    }
}

/// Result of handling a request
pub(crate) struct Outcome {
    /// Response to write, if any (`/playback-info` may answer nothing)
    pub(crate) response: Option<HttpResponse>,
}

/// Errors a handler can surface; mapped to HTTP here
#[derive(Debug)]
pub(crate) enum HandlerError {
    /// 400
    BadRequest(String),
    /// 401 with the given `WWW-Authenticate` challenge
    Unauthorized(String),
    /// 470 (Apple pairing failure)
    AuthFailed(String),
    /// 404
    NotFound,
    /// 421 or 501
    Unsupported {
        /// Response status
        status: StatusCode,
        /// Log detail
        detail: String,
    },
    /// 400, then close the connection
    Teardown(String),
    /// 500
    Internal(String),
}

impl HandlerError {
    pub(crate) fn from_pairing(error: PairingError) -> Self {
        match error {
            PairingError::SrpProofMismatch => Self::AuthFailed(error.to_string()),
            PairingError::GcmAuthFailure | PairingError::SignatureMismatch => {
                Self::Teardown(error.to_string())
            }
            PairingError::BadState
            | PairingError::BadPeerKey
            | PairingError::UsernameTooLong => Self::BadRequest(error.to_string()),
        }
    }

    fn into_response(self) -> HttpResponse {
        match self {
            Self::BadRequest(detail) => {
                tracing::warn!("bad request: {detail}");
                ResponseBuilder::new(StatusCode::BAD_REQUEST).build()
            }
            Self::Unauthorized(challenge) => ResponseBuilder::new(StatusCode::UNAUTHORIZED)
                .header(names::WWW_AUTHENTICATE, &challenge)
                .build(),
            Self::AuthFailed(detail) => {
                tracing::warn!("pairing authentication failed: {detail}");
                ResponseBuilder::new(StatusCode::CONNECTION_AUTHORIZATION_REQUIRED).build()
            }
            Self::NotFound => ResponseBuilder::new(StatusCode::NOT_FOUND).build(),
            Self::Unsupported { status, detail } => {
                tracing::error!("{detail}");
                ResponseBuilder::new(status).build()
            }
            Self::Teardown(detail) => {
                tracing::error!("fatal request failure: {detail}");
                ResponseBuilder::new(StatusCode::BAD_REQUEST).close().build()
            }
            Self::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR).build()
            }
        }
    }
}

/// Handle one request, producing at most one response
pub(crate) async fn dispatch(ctx: &mut ConnectionContext, request: HttpRequest) -> Outcome {
    tracing::debug!("{} {}", request.method.as_str(), request.uri);

    if let Err(error) = check_authorization(ctx, &request) {
        return Outcome {
            response: Some(error.into_response()),
        };
    }

    let result = route(ctx, &request).await;
    Outcome {
        response: match result {
            Ok(response) => response,
            Err(error) => Some(error.into_response()),
        },
    }
}

async fn route(
    ctx: &mut ConnectionContext,
    request: &HttpRequest,
) -> Result<Option<HttpResponse>, HandlerError> {
    let path = request.path().to_string();

    match (request.method, path.as_str()) {
        (Method::Get, "/server-info") => handlers::server_info(ctx).map(Some),
        (Method::Post, "/fp-setup") => handlers::fp_setup(ctx, request).map(Some),
        (Method::Post, "/fp-setup2") => Err(HandlerError::Unsupported {
            status: StatusCode::MISDIRECTED_REQUEST,
            detail: "client HTTP request POST fp-setup2 is unhandled".into(),
        }),
        (Method::Post, "/pair-pin-start") => handlers::pair_pin_start(ctx).map(Some),
        (Method::Post, "/pair-setup-pin") => handlers::pair_setup_pin(ctx, request).map(Some),
        (Method::Post, "/pair-setup") => handlers::pair_setup(ctx).map(Some),
        (Method::Post, "/pair-verify") => handlers::pair_verify(ctx, request).map(Some),
        (Method::Post, "/reverse") => handlers::reverse(ctx, request).map(Some),
        (Method::Post, "/play") => handlers::play(ctx, request).await.map(Some),
        (Method::Post, "/action") => handlers::action(ctx, request).await.map(Some),
        (Method::Post, "/scrub") => handlers::scrub(ctx, request).map(Some),
        (Method::Post, "/rate") => handlers::rate(ctx, request).map(Some),
        (Method::Post, "/stop") => handlers::stop(ctx).map(Some),
        (Method::Put, "/setProperty") => handlers::set_property(ctx, request).await.map(Some),
        (Method::Get, "/getProperty") => handlers::get_property(request).map(Some),
        (Method::Get, "/playback-info") => handlers::playback_info(ctx).await,
        (Method::Get, _) if path.ends_with(".m3u8") => handlers::hls(ctx, request).await.map(Some),
        _ => {
            tracing::warn!("unhandled request {} {}", request.method.as_str(), request.uri);
            Err(HandlerError::NotFound)
        }
    }
}

/// Endpoints that stay reachable without digest authentication
fn is_open_endpoint(path: &str) -> bool {
    matches!(
        path,
        "/server-info"
            | "/fp-setup"
            | "/fp-setup2"
            | "/pair-pin-start"
            | "/pair-setup-pin"
            | "/pair-setup"
            | "/pair-verify"
    )
}

fn check_authorization(
    ctx: &mut ConnectionContext,
    request: &HttpRequest,
) -> Result<(), HandlerError> {
    let Some(password) = ctx.shared.config.password.clone() else {
        return Ok(());
    };
    if ctx.authenticated || is_open_endpoint(request.path()) {
        return Ok(());
    }

    if let Some(authorization) = request.headers.get(names::AUTHORIZATION) {
        if digest::verify(
            request.method.as_str(),
            authorization,
            &password,
            ctx.auth_nonce.as_deref(),
        ) {
            ctx.authenticated = true;
            return Ok(());
        }
        tracing::warn!("digest authentication failed");
    }

    let nonce = digest::make_nonce();
    let challenge = digest::challenge(&ctx.shared.config.name, &nonce);
    ctx.auth_nonce = Some(nonce);
    Err(HandlerError::Unauthorized(challenge))
}
