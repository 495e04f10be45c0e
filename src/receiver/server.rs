//! AirPlay HTTP server
//!
//! One accept loop; each connection is serviced by its own task. Within
//! a connection requests are strictly ordered: read, parse, dispatch,
//! respond. Reverse-channel sends go through the same per-connection
//! writer task, so responses and server-originated requests never
//! interleave mid-message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex as StdMutex;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};

use super::config::ReceiverConfig;
use super::connection::{ConnectionKind, ConnectionTable, ReverseChannel};
use super::dispatcher::{self, ConnectionContext};
use super::events::ReceiverEvent;
use crate::error::AirCastError;
use crate::hls::fcup;
use crate::protocol::http::{
    HttpServerCodec, ResponseBuilder, StatusCode, encode_request, encode_response,
};
use crate::protocol::pairing::PairingIdentity;
use crate::renderer::VideoRenderer;
use crate::session::SessionRegistry;

/// State shared by every connection task
pub(crate) struct ServerShared {
    pub(crate) config: ReceiverConfig,
    pub(crate) identity: PairingIdentity,
    pub(crate) renderer: Arc<dyn VideoRenderer>,
    pub(crate) registry: Mutex<SessionRegistry>,
    pub(crate) connections: StdMutex<ConnectionTable>,
    pub(crate) reverse: StdMutex<Option<ReverseChannel>>,
    pub(crate) active_pin: StdMutex<Option<String>>,
    pub(crate) event_tx: broadcast::Sender<ReceiverEvent>,
    http_port: AtomicU16,
}

impl ServerShared {
    pub(crate) fn new(
        config: ReceiverConfig,
        identity: PairingIdentity,
        renderer: Arc<dyn VideoRenderer>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let port = config.port;

        Self {
            config,
            identity,
            renderer,
            registry: Mutex::new(SessionRegistry::new()),
            connections: StdMutex::new(ConnectionTable::new()),
            reverse: StdMutex::new(None),
            active_pin: StdMutex::new(None),
            event_tx,
            http_port: AtomicU16::new(port),
        }
    }

    /// The bound HTTP port (known once the listener is up)
    pub(crate) fn http_port(&self) -> u16 {
        self.http_port.load(Ordering::Relaxed)
    }

    pub(crate) fn set_http_port(&self, port: u16) {
        self.http_port.store(port, Ordering::Relaxed);
    }

    /// Fire an FCUP request onto the reverse channel. Fire-and-forget:
    /// the reply arrives as a `POST /action` on the control channel.
    pub(crate) fn send_fcup(&self, url: &str, request_id: i64, apple_session_id: &str) {
        let message = fcup::request_message(url, request_id, apple_session_id);
        let bytes = encode_request(&message);

        let guard = self.reverse.lock().expect("reverse slot");
        match guard.as_ref() {
            Some(channel) => {
                tracing::debug!("FCUP request #{request_id} for {url}");
                if channel.sender.send(bytes).is_err() {
                    tracing::error!("reverse channel writer is gone");
                }
            }
            None => {
                tracing::error!("FCUP request for {url} with no reverse channel");
            }
        }
    }
}

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not accepting connections
    Stopped,
    /// Binding the listener
    Starting,
    /// Accepting connections
    Running,
    /// Draining
    Stopping,
}

/// The AirPlay-compatible HLS receiver server
pub struct AirCastServer {
    shared: Arc<ServerShared>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    bound_port: u16,
}

impl AirCastServer {
    /// Create a server; loads (or generates) the pairing identity.
    ///
    /// # Errors
    /// Returns [`AirCastError::Fatal`] when a configured key file
    /// exists but cannot be used.
    pub fn new(
        config: ReceiverConfig,
        renderer: Arc<dyn VideoRenderer>,
    ) -> Result<Self, AirCastError> {
        let identity = match &config.key_file {
            Some(path) => PairingIdentity::load_or_generate(path)
                .map_err(|e| AirCastError::Fatal(format!("pairing key file: {e}")))?,
            None => PairingIdentity::generate(),
        };

        Ok(Self {
            shared: Arc::new(ServerShared::new(config, identity, renderer)),
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            shutdown_tx: None,
            bound_port: 0,
        })
    }

    /// Subscribe to receiver events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Long-term public key, for the DNS-SD advertiser
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.shared.identity.public_key()
    }

    /// Bound port once running
    #[must_use]
    pub fn port(&self) -> u16 {
        self.bound_port
    }

    /// Current state
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Bind the listener and start accepting connections
    ///
    /// # Errors
    /// Returns [`AirCastError`] when already running or the port cannot
    /// be bound.
    pub async fn start(&mut self) -> Result<(), AirCastError> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Stopped {
                return Err(AirCastError::Fatal("receiver already running".into()));
            }
            *state = ServerState::Starting;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let listener = TcpListener::bind(("0.0.0.0", self.shared.config.port)).await?;
        let port = listener.local_addr()?.port();
        self.bound_port = port;
        self.shared.set_http_port(port);

        let _ = self.shared.event_tx.send(ReceiverEvent::Started {
            name: self.shared.config.name.clone(),
            port,
        });
        *self.state.write().await = ServerState::Running;

        let shared = self.shared.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                let shared = shared.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, addr, shared).await {
                                        tracing::debug!("connection {addr} ended: {e}");
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("accept error: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            *state.write().await = ServerState::Stopped;
            let _ = shared.event_tx.send(ReceiverEvent::Stopped);
        });

        Ok(())
    }

    /// Stop accepting connections
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
            *self.state.write().await = ServerState::Stopping;
        }
    }
}

/// Service one client connection until it closes
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<ServerShared>,
) -> std::io::Result<()> {
    let id = shared.connections.lock().expect("connection table").register();
    let _ = shared
        .event_tx
        .send(ReceiverEvent::ClientConnected { address: addr });

    let (mut reader, mut writer) = stream.into_split();

    // All outgoing bytes (responses and reverse-channel requests) funnel
    // through one writer task per socket
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_task = tokio::spawn(async move {
        while let Some(chunk) = out_rx.recv().await {
            if writer.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });

    let mut ctx = ConnectionContext::new(id, shared.clone(), out_tx.clone());
    let mut codec = HttpServerCodec::new();
    let mut buf = vec![0u8; 4096];

    'connection: loop {
        let kind = ctx.kind();

        let n = if kind == ConnectionKind::Control {
            match tokio::time::timeout(shared.config.idle_timeout, reader.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::debug!("read error on connection {id}: {e}");
                    break;
                }
                Err(_) => {
                    tracing::debug!("idle timeout on control connection {id}");
                    break;
                }
            }
        } else {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("read error on connection {id}: {e}");
                    break;
                }
            }
        };

        if kind == ConnectionKind::Reverse {
            // Inbound bytes on the upgraded channel are the sender's
            // responses to our requests; nothing to dispatch
            tracing::trace!("discarding {n} bytes on reverse channel");
            continue;
        }

        codec.feed(&buf[..n]);

        loop {
            match codec.decode() {
                Ok(Some(request)) => {
                    let outcome = dispatcher::dispatch(&mut ctx, request).await;
                    if let Some(response) = outcome.response {
                        let close = response.close;
                        if out_tx.send(encode_response(&response)).is_err() {
                            break 'connection;
                        }
                        if close {
                            break 'connection;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("request parse error on connection {id}: {e}");
                    let response = ResponseBuilder::new(StatusCode::BAD_REQUEST).close().build();
                    let _ = out_tx.send(encode_response(&response));
                    break 'connection;
                }
            }
        }
    }

    // Teardown: release the connection slot, the reverse channel if it
    // was ours, and any half-built playback sessions
    let kind = {
        let mut connections = shared.connections.lock().expect("connection table");
        let kind = connections.kind(id);
        connections.unregister(id);
        kind
    };

    if kind == Some(ConnectionKind::Reverse) {
        let mut reverse = shared.reverse.lock().expect("reverse slot");
        if reverse.as_ref().map(|c| c.connection) == Some(id) {
            *reverse = None;
        }
    }
    if kind == Some(ConnectionKind::Control) {
        shared.registry.lock().await.purge_unstarted();
    }

    drop(ctx);
    drop(out_tx);
    let _ = writer_task.await;

    let _ = shared
        .event_tx
        .send(ReceiverEvent::ClientDisconnected { address: addr });
    Ok(())
}
