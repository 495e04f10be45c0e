use std::fs;
use std::io;
use std::path::Path;

use crate::protocol::crypto::Ed25519KeyPair;

/// Process-scoped long-term Ed25519 identity
///
/// Loaded from a key file at startup; a fresh key is generated and
/// written (mode 0600) when the file does not exist yet. The public key
/// is what the DNS-SD advertiser announces.
pub struct PairingIdentity {
    key: Ed25519KeyPair,
}

impl PairingIdentity {
    /// Generate an ephemeral identity (no persistence)
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: Ed25519KeyPair::generate(),
        }
    }

    /// Load the identity from `path`, generating and storing a new key
    /// when the file is absent.
    ///
    /// # Errors
    /// Returns `io::Error` when the key file exists but cannot be read,
    /// or when a fresh key cannot be written. Treated as fatal at init.
    pub fn load_or_generate(path: &Path) -> io::Result<Self> {
        if path.exists() {
            let bytes = fs::read(path)?;
            let key = Ed25519KeyPair::from_bytes(&bytes).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("bad key file: {e}"))
            })?;
            return Ok(Self { key });
        }

        let key = Ed25519KeyPair::generate();
        fs::write(path, key.secret_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!("generated new pairing key at {}", path.display());
        Ok(Self { key })
    }

    /// Long-term public key (exposed to the advertiser)
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        *self.key.public_key().as_bytes()
    }

    /// Secret key bytes, used to seed per-connection pairing sessions
    #[must_use]
    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }
}
