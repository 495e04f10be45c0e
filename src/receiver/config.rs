//! Receiver configuration

use std::path::PathBuf;
use std::time::Duration;

/// Receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Device name shown to senders (also the digest realm)
    pub name: String,

    /// HTTP listen port (0 = auto-assign)
    pub port: u16,

    /// Hardware address reported as `macAddress` / `deviceid`
    pub hw_addr: [u8; 6],

    /// Device model string
    pub model: String,

    /// Reported OS build
    pub os_build_version: String,

    /// Reported source version (`srcvers`)
    pub source_version: String,

    /// Protocol `vv` value
    pub vv: i64,

    /// Access password; when set, control endpoints require HTTP digest
    /// authentication
    pub password: Option<String>,

    /// Fixed pairing PIN; a random one is generated per pairing when
    /// unset
    pub pin: Option<u16>,

    /// Preferred audio language code applied to master playlists
    pub language: Option<String>,

    /// Where the long-term Ed25519 key lives; ephemeral when unset
    pub key_file: Option<PathBuf>,

    /// Idle read timeout on control connections
    pub idle_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: "AirCast".to_string(),
            port: 7000,
            hw_addr: [0x48, 0x5D, 0x60, 0x7C, 0xEE, 0x22],
            model: "AppleTV3,2".to_string(),
            os_build_version: "12B435".to_string(),
            source_version: "220.68".to_string(),
            vv: 2,
            password: None,
            pin: None,
            language: None,
            key_file: None,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl ReceiverConfig {
    /// Create with a custom device name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the listen port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the hardware address
    #[must_use]
    pub fn hw_addr(mut self, addr: [u8; 6]) -> Self {
        self.hw_addr = addr;
        self
    }

    /// Require digest authentication with this password
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Use a fixed pairing PIN
    #[must_use]
    pub fn pin(mut self, pin: u16) -> Self {
        self.pin = Some(pin);
        self
    }

    /// Prefer this audio language when rewriting masters
    #[must_use]
    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.language = Some(code.into());
        self
    }

    /// Persist the pairing key at this path
    #[must_use]
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Colon-separated form of the hardware address
    #[must_use]
    pub fn mac_string(&self) -> String {
        let a = &self.hw_addr;
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}
