//! # aircast
//!
//! A pure Rust AirPlay-compatible media receiver for HLS video streaming.
//!
//! The crate implements the AirPlay control plane: device pairing
//! (SRP-6a + Ed25519/X25519), the dual-direction HTTP channel including
//! the reverse-HTTP ("PTTH") upgrade, the HLS playlist proxy that fetches
//! a sender's playlist tree and re-serves it over loopback HTTP, and the
//! playback control endpoints (`/play`, `/scrub`, `/rate`, `/stop`,
//! `/playback-info`). Actual media decoding is delegated to an
//! embedder-supplied [`renderer::VideoRenderer`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use aircast::{AirCastServer, ReceiverConfig};
//! use aircast::renderer::NullRenderer;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), aircast::AirCastError> {
//! let config = ReceiverConfig::with_name("Living Room").port(7000);
//! let mut server = AirCastServer::new(config, Arc::new(NullRenderer))?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// HLS playlist store and rewriting
pub mod hls;
/// Wire protocol building blocks (HTTP, plist, crypto, pairing)
pub mod protocol;
/// Server implementation
pub mod receiver;
/// Media renderer contract
pub mod renderer;
/// Playback session registry
pub mod session;

// Re-exports
pub use error::AirCastError;
pub use receiver::{AirCastServer, ReceiverConfig};
pub use renderer::{PlaybackInfo, TimeRange, VideoRenderer};
