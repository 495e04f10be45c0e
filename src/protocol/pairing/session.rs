use rand::{Rng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use super::{PairingError, PairingIdentity};
use crate::protocol::crypto::{
    Aes128Ctr, Aes128Gcm, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, SrpServer,
    X25519KeyPair, X25519PublicKey, create_salted_verifier, lengths,
};

const VERIFY_KEY_SALT: &[u8] = b"Pair-Verify-AES-Key";
const VERIFY_IV_SALT: &[u8] = b"Pair-Verify-AES-IV";
const SETUP_KEY_SALT: &[u8] = b"Pair-Setup-AES-Key";
const SETUP_IV_SALT: &[u8] = b"Pair-Setup-AES-IV";

/// Maximum SRP username (client device id) length in bytes
const USERNAME_MAX: usize = 255;

/// Where a pairing session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    /// Nothing has happened yet
    Initial,
    /// Pair-setup (SRP) is in progress
    Setup,
    /// Pair-verify step 1 done, awaiting the client signature
    Handshake,
    /// Both sides authenticated; shared secret established
    Finished,
}

/// SRP artifacts, alive only during `Setup`
struct SrpState {
    salt: [u8; 16],
    server: SrpServer,
    session_key: Option<[u8; 64]>,
}

impl Drop for SrpState {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.session_key {
            key.zeroize();
        }
    }
}

/// Per-connection pairing state machine
///
/// Owns a copy of the receiver's long-term Ed25519 key, the peer keys
/// learned during verification, and the ephemeral X25519 exchange. The
/// shared secret is non-zero only in `Handshake` and `Finished`.
pub struct PairingSession {
    status: PairingStatus,

    ed_ours: Ed25519KeyPair,
    ed_theirs: Option<Ed25519PublicKey>,

    ecdh_ours: Option<X25519KeyPair>,
    ecdh_theirs: Option<X25519PublicKey>,
    ecdh_secret: [u8; 32],

    // CTR stream carried from the outbound handshake encryption into the
    // inbound decrypt; recreating it at offset 0 would XOR with garbage.
    verify_cipher: Option<Aes128Ctr>,

    username: String,
    client_pk: Option<[u8; 32]>,
    pair_setup_confirmed: bool,

    srp: Option<SrpState>,
}

impl PairingSession {
    /// Create a session seeded with the receiver identity
    #[must_use]
    pub fn new(identity: &PairingIdentity) -> Self {
        let ed_ours = Ed25519KeyPair::from_bytes(&identity.secret_bytes())
            .expect("identity secret is always 32 bytes");

        Self {
            status: PairingStatus::Initial,
            ed_ours,
            ed_theirs: None,
            ecdh_ours: None,
            ecdh_theirs: None,
            ecdh_secret: [0u8; 32],
            verify_cipher: None,
            username: String::new(),
            client_pk: None,
            pair_setup_confirmed: false,
            srp: None,
        }
    }

    /// Current lifecycle status
    #[must_use]
    pub fn status(&self) -> PairingStatus {
        self.status
    }

    /// The X25519 shared secret, available once the handshake ran
    #[must_use]
    pub fn shared_secret(&self) -> Option<[u8; 32]> {
        match self.status {
            PairingStatus::Handshake | PairingStatus::Finished => Some(self.ecdh_secret),
            PairingStatus::Initial | PairingStatus::Setup => None,
        }
    }

    /// Username and base64 public key of the client once pair-setup
    /// confirmed it
    #[must_use]
    pub fn client_identity(&self) -> Option<(&str, String)> {
        use base64::Engine as _;
        if !self.pair_setup_confirmed {
            return None;
        }
        let pk = self.client_pk.as_ref()?;
        Some((
            &self.username,
            base64::engine::general_purpose::STANDARD.encode(pk),
        ))
    }

    /// Start pair-setup: record the client device id, create fresh SRP
    /// artifacts and return `(salt, B)`.
    ///
    /// # Errors
    /// `UsernameTooLong` when the device id exceeds 255 bytes.
    pub fn begin_setup(
        &mut self,
        device_id: &str,
        pin: &str,
    ) -> Result<(Vec<u8>, Vec<u8>), PairingError> {
        if device_id.len() > USERNAME_MAX {
            return Err(PairingError::UsernameTooLong);
        }
        self.username = device_id.to_string();
        self.status = PairingStatus::Setup;

        let mut salt = [0u8; lengths::SRP_SALT];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut private_key = [0u8; lengths::SRP_PRIVATE_KEY];
        rand::thread_rng().fill_bytes(&mut private_key);

        let verifier = create_salted_verifier(device_id.as_bytes(), pin.as_bytes(), &salt);
        let server = SrpServer::new(device_id.as_bytes(), &salt, &verifier, &private_key);
        let public = server.public_key().to_vec();

        self.srp = Some(SrpState {
            salt,
            server,
            session_key: None,
        });

        Ok((salt.to_vec(), public))
    }

    /// SRP salt of the setup in progress
    #[must_use]
    pub fn srp_salt(&self) -> Option<[u8; 16]> {
        self.srp.as_ref().map(|s| s.salt)
    }

    /// Check the client's SRP proof `M1`; on success return our proof
    /// `M2` and record the 64-byte session key.
    ///
    /// A mismatch destroys the SRP state — the caller answers HTTP 470
    /// and the client must restart setup.
    ///
    /// # Errors
    /// `BadState` outside of setup, `SrpProofMismatch` on a wrong PIN.
    pub fn validate_proof(
        &mut self,
        client_public: &[u8],
        client_proof: &[u8],
    ) -> Result<Vec<u8>, PairingError> {
        if self.status != PairingStatus::Setup {
            return Err(PairingError::BadState);
        }
        let Some(srp) = self.srp.as_mut() else {
            return Err(PairingError::BadState);
        };

        match srp.server.verify_client(client_public, client_proof) {
            Ok((session_key, m2)) => {
                let mut key = [0u8; 64];
                key.copy_from_slice(session_key.as_bytes());
                srp.session_key = Some(key);
                Ok(m2)
            }
            Err(_) => {
                self.srp = None;
                Err(PairingError::SrpProofMismatch)
            }
        }
    }

    /// Final pair-setup step: decrypt and store the client's long-term
    /// Ed25519 key, then return ours encrypted under the next IV.
    ///
    /// The SRP state is destroyed here regardless of outcome.
    ///
    /// # Errors
    /// `BadState` without a proven SRP session, `GcmAuthFailure` when
    /// the auth tag does not check out, `BadPeerKey` on a malformed key.
    pub fn confirm_setup(
        &mut self,
        epk: &[u8],
        auth_tag: &[u8],
    ) -> Result<(Vec<u8>, [u8; 16]), PairingError> {
        let Some(srp) = self.srp.take() else {
            return Err(PairingError::BadState);
        };
        let Some(session_key) = srp.session_key else {
            return Err(PairingError::BadState);
        };

        let aes_key = derive_key(SETUP_KEY_SALT, &session_key);
        let mut aes_iv = derive_key(SETUP_IV_SALT, &session_key);
        aes_iv[15] = aes_iv[15].wrapping_add(1);

        let gcm = Aes128Gcm::new(&aes_key).map_err(|_| PairingError::BadState)?;
        let client_pk = gcm
            .decrypt(&aes_iv, epk, auth_tag)
            .map_err(|_| PairingError::GcmAuthFailure)?;
        let client_pk: [u8; 32] = client_pk
            .as_slice()
            .try_into()
            .map_err(|_| PairingError::BadPeerKey)?;

        self.client_pk = Some(client_pk);
        self.pair_setup_confirmed = true;

        // The encryption direction consumes one more IV step
        aes_iv[15] = aes_iv[15].wrapping_add(1);
        let ours = self.ed_ours.public_key();
        let (encrypted, tag) = gcm
            .encrypt(&aes_iv, ours.as_bytes())
            .map_err(|_| PairingError::BadState)?;

        Ok((encrypted, tag))
    }

    /// Pair-verify step 1: take the client's ephemeral X25519 key and
    /// long-term Ed25519 key, derive the shared secret and answer with
    /// our X25519 key plus the CTR-encrypted signature over
    /// `ours ‖ theirs`.
    ///
    /// # Errors
    /// `BadState` after `Finished`, `BadPeerKey` on malformed keys.
    pub fn handshake(
        &mut self,
        ecdh_key: &[u8],
        ed_key: &[u8],
    ) -> Result<([u8; 32], Vec<u8>), PairingError> {
        if self.status == PairingStatus::Finished {
            return Err(PairingError::BadState);
        }

        let ecdh_theirs =
            X25519PublicKey::from_bytes(ecdh_key).map_err(|_| PairingError::BadPeerKey)?;
        let ed_theirs =
            Ed25519PublicKey::from_bytes(ed_key).map_err(|_| PairingError::BadPeerKey)?;

        let ecdh_ours = X25519KeyPair::generate();
        let secret = ecdh_ours.diffie_hellman(&ecdh_theirs);
        self.ecdh_secret.copy_from_slice(secret.as_bytes());

        let ours_pub = *ecdh_ours.public_key().as_bytes();

        // Sign the public ECDH keys of both parties, then encrypt with
        // keys derived from the shared secret.
        let mut sig_msg = [0u8; 64];
        sig_msg[..32].copy_from_slice(&ours_pub);
        sig_msg[32..].copy_from_slice(ecdh_theirs.as_bytes());
        let mut signature = self.ed_ours.sign(&sig_msg).to_bytes().to_vec();

        let key = derive_key(VERIFY_KEY_SALT, &self.ecdh_secret);
        let iv = derive_key(VERIFY_IV_SALT, &self.ecdh_secret);
        let mut cipher = Aes128Ctr::new(&key, &iv).map_err(|_| PairingError::BadState)?;
        cipher.apply_keystream(&mut signature);

        self.verify_cipher = Some(cipher);
        self.ecdh_ours = Some(ecdh_ours);
        self.ecdh_theirs = Some(ecdh_theirs);
        self.ed_theirs = Some(ed_theirs);
        self.status = PairingStatus::Handshake;

        Ok((ours_pub, signature))
    }

    /// Pair-verify step 2: decrypt the client signature with the stream
    /// continued from step 1 and verify it over `theirs ‖ ours`.
    ///
    /// # Errors
    /// `BadState` outside of handshake, `SignatureMismatch` on failure
    /// (fatal for the connection).
    pub fn finish(&mut self, encrypted_signature: &[u8]) -> Result<(), PairingError> {
        if self.status != PairingStatus::Handshake {
            return Err(PairingError::BadState);
        }
        let Some(cipher) = self.verify_cipher.as_mut() else {
            return Err(PairingError::BadState);
        };
        let (Some(ecdh_ours), Some(ecdh_theirs), Some(ed_theirs)) =
            (&self.ecdh_ours, &self.ecdh_theirs, &self.ed_theirs)
        else {
            return Err(PairingError::BadState);
        };

        let signature_bytes = cipher.process(encrypted_signature);
        let signature = Ed25519Signature::from_bytes(&signature_bytes)
            .map_err(|_| PairingError::SignatureMismatch)?;

        let mut sig_msg = [0u8; 64];
        sig_msg[..32].copy_from_slice(ecdh_theirs.as_bytes());
        sig_msg[32..].copy_from_slice(ecdh_ours.public_key().as_bytes());

        ed_theirs
            .verify(&sig_msg, &signature)
            .map_err(|_| PairingError::SignatureMismatch)?;

        self.status = PairingStatus::Finished;
        Ok(())
    }
}

/// `SHA512(salt ‖ key_material)[0..16]`, the derivation both pairing
/// flows use for AES keys and IVs
fn derive_key(salt: &[u8], key_material: &[u8]) -> [u8; 16] {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(key_material);
    let hash = hasher.finalize();

    let mut out = [0u8; 16];
    out.copy_from_slice(&hash[..16]);
    out
}

/// Random 4-digit PIN in 1..=9999 for on-screen display
#[must_use]
pub fn random_pin() -> u16 {
    loop {
        let pin = rand::thread_rng().r#gen::<u16>() % 10000;
        if pin != 0 {
            return pin;
        }
    }
}
