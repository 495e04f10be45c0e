//! HLS playlist store and rewriting
//!
//! Senders hand over their playlist tree through reverse-HTTP "FCUP"
//! fetches: the receiver asks for each playlist with a `POST /event` on
//! the upgraded channel and gets it back as a `POST /action` on the
//! control channel. The store caches the tree — URIs rewritten from the
//! proprietary `mlhls://` / `nfhls://` schemes to a loopback HTTP
//! endpoint — and serves it to the local media player.

pub mod fcup;
pub mod playlist;
mod store;

pub use store::{MediaEntry, PlaylistStore};

/// Fixed path the rewritten master playlist is served under
pub const MASTER_PATH: &str = "/master.m3u8";
