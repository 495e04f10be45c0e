//! SRP-6a over the RFC 5054 3072-bit group with SHA-512
//!
//! The server side drives pair-setup; the client side exists so the two
//! halves can be exercised against each other in tests.

use super::CryptoError;
use num_bigint::{BigUint, RandomBits};
use num_traits::Zero;
use rand::Rng;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

/// Byte width of the group modulus (3072 bits)
const PAD_LEN: usize = 384;

struct SrpGroup {
    n: BigUint,
    g: BigUint,
    k: BigUint,
}

impl SrpGroup {
    fn rfc5054_3072() -> Self {
        let n = BigUint::parse_bytes(
            b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08\
              8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
              302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9\
              A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6\
              49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8\
              FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D\
              670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C\
              180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
              3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D\
              04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D\
              B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226\
              1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C\
              BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC\
              E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
            16,
        )
        .expect("well-formed modulus literal");

        let g = BigUint::from(5u32);

        // k = H(N, pad(g))
        let k = {
            let mut hasher = Sha512::new();
            hasher.update(n.to_bytes_be());
            hasher.update(pad(&g.to_bytes_be()));
            BigUint::from_bytes_be(&hasher.finalize())
        };

        Self { n, g, k }
    }
}

fn pad(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() >= PAD_LEN {
        return bytes.to_vec();
    }
    let mut padded = vec![0u8; PAD_LEN];
    padded[PAD_LEN - bytes.len()..].copy_from_slice(bytes);
    padded
}

// x = H(salt, H(username, ":", password))
fn compute_x(username: &[u8], password: &[u8], salt: &[u8]) -> BigUint {
    let mut inner = Sha512::new();
    inner.update(username);
    inner.update(b":");
    inner.update(password);
    let h_up = inner.finalize();

    let mut outer = Sha512::new();
    outer.update(salt);
    outer.update(h_up);
    BigUint::from_bytes_be(&outer.finalize())
}

fn compute_m1(
    group: &SrpGroup,
    username: &[u8],
    salt: &[u8],
    a_pub_padded: &[u8],
    b_pub: &BigUint,
    session_key: &[u8],
) -> Vec<u8> {
    let hn = Sha512::digest(group.n.to_bytes_be());
    let hg = Sha512::digest(group.g.to_bytes_be());
    let mut hn_xor_hg = [0u8; 64];
    for i in 0..64 {
        hn_xor_hg[i] = hn[i] ^ hg[i];
    }

    let mut hasher = Sha512::new();
    hasher.update(hn_xor_hg);
    hasher.update(Sha512::digest(username));
    hasher.update(salt);
    hasher.update(a_pub_padded);
    hasher.update(b_pub.to_bytes_be());
    hasher.update(session_key);
    hasher.finalize().to_vec()
}

fn compute_m2(a_pub: &BigUint, m1: &[u8], session_key: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(a_pub.to_bytes_be());
    hasher.update(m1);
    hasher.update(session_key);
    hasher.finalize().to_vec()
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Create the salted verifier `v = g^x mod N` for a user/PIN pair
#[must_use]
pub fn create_salted_verifier(username: &[u8], password: &[u8], salt: &[u8]) -> Vec<u8> {
    let group = SrpGroup::rfc5054_3072();
    let x = compute_x(username, password, salt);
    group.g.modpow(&x, &group.n).to_bytes_be()
}

/// Server side of the SRP-6a exchange
pub struct SrpServer {
    group: SrpGroup,
    username: Vec<u8>,
    salt: Vec<u8>,
    v: BigUint,
    b: BigUint,
    b_pub: BigUint,
    public_key: Vec<u8>,
}

impl SrpServer {
    /// Build the server state from a stored verifier and a fixed 32-byte
    /// ephemeral private key. Computes `B = k*v + g^b mod N`.
    #[must_use]
    pub fn new(username: &[u8], salt: &[u8], verifier: &[u8], private_key: &[u8; 32]) -> Self {
        let group = SrpGroup::rfc5054_3072();
        let v = BigUint::from_bytes_be(verifier);
        let b = BigUint::from_bytes_be(private_key);

        let b_pub = (&group.k * &v + group.g.modpow(&b, &group.n)) % &group.n;
        let public_key = pad(&b_pub.to_bytes_be());

        Self {
            group,
            username: username.to_vec(),
            salt: salt.to_vec(),
            v,
            b,
            b_pub,
            public_key,
        }
    }

    /// Server public ephemeral `B`, padded to the group width
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Verify the client's proof `M1` against its public ephemeral `A`.
    ///
    /// On success, returns the 64-byte session key and the server proof
    /// `M2` the client uses to authenticate us in turn.
    ///
    /// # Errors
    /// Returns `CryptoError::SrpError` on an invalid `A` or a proof
    /// mismatch (wrong PIN).
    pub fn verify_client(
        &self,
        client_public: &[u8],
        client_proof: &[u8],
    ) -> Result<(SessionKey, Vec<u8>), CryptoError> {
        let a_pub = BigUint::from_bytes_be(client_public);
        if (&a_pub % &self.group.n).is_zero() {
            return Err(CryptoError::SrpError("invalid client public key".into()));
        }

        // u = H(pad(A), pad(B))
        let a_padded = pad(&a_pub.to_bytes_be());
        let u = {
            let mut hasher = Sha512::new();
            hasher.update(&a_padded);
            hasher.update(pad(&self.b_pub.to_bytes_be()));
            BigUint::from_bytes_be(&hasher.finalize())
        };

        // S = (A * v^u) ^ b mod N
        let base = (&a_pub * self.v.modpow(&u, &self.group.n)) % &self.group.n;
        let s_shared = base.modpow(&self.b, &self.group.n);

        let k_session = Sha512::digest(s_shared.to_bytes_be()).to_vec();

        let expected_m1 = compute_m1(
            &self.group,
            &self.username,
            &self.salt,
            &a_padded,
            &self.b_pub,
            &k_session,
        );

        if !ct_eq(&expected_m1, client_proof) {
            return Err(CryptoError::SrpError("client proof mismatch".into()));
        }

        let m2 = compute_m2(&a_pub, &expected_m1, &k_session);
        Ok((SessionKey { key: k_session }, m2))
    }
}

/// Client side of the SRP-6a exchange (test counterpart of [`SrpServer`])
pub struct SrpClient {
    group: SrpGroup,
    a: BigUint,
    public_key: Vec<u8>,
}

impl SrpClient {
    /// Generate a client with a fresh random ephemeral `a`
    #[must_use]
    pub fn new() -> Self {
        let group = SrpGroup::rfc5054_3072();
        let mut rng = rand::thread_rng();
        let a: BigUint = rng.sample(RandomBits::new(256));
        let a = a % &group.n;

        let a_pub = group.g.modpow(&a, &group.n);
        let public_key = pad(&a_pub.to_bytes_be());

        Self {
            group,
            a,
            public_key,
        }
    }

    /// Client public ephemeral `A`, padded to the group width
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Process the server challenge `(salt, B)` and produce the proof
    ///
    /// # Errors
    /// Returns `CryptoError::SrpError` for a degenerate server key.
    pub fn process_challenge(
        &self,
        username: &[u8],
        password: &[u8],
        salt: &[u8],
        server_public: &[u8],
    ) -> Result<SrpVerifier, CryptoError> {
        let b_pub = BigUint::from_bytes_be(server_public);
        if (&b_pub % &self.group.n).is_zero() {
            return Err(CryptoError::SrpError("invalid server public key".into()));
        }

        let a_pub = BigUint::from_bytes_be(&self.public_key);

        // u = H(pad(A), pad(B))
        let u = {
            let mut hasher = Sha512::new();
            hasher.update(&self.public_key);
            hasher.update(pad(&b_pub.to_bytes_be()));
            BigUint::from_bytes_be(&hasher.finalize())
        };

        let x = compute_x(username, password, salt);

        // S = (B - k * g^x) ^ (a + u * x) mod N, kept non-negative
        let g_x = self.group.g.modpow(&x, &self.group.n);
        let k_g_x = (&self.group.k * g_x) % &self.group.n;
        let base = if b_pub >= k_g_x {
            (&b_pub - &k_g_x) % &self.group.n
        } else {
            (&self.group.n - (&k_g_x - &b_pub) % &self.group.n) % &self.group.n
        };

        let exp = &self.a + (&u * x);
        let s_shared = base.modpow(&exp, &self.group.n);

        let k_session = Sha512::digest(s_shared.to_bytes_be()).to_vec();

        let m1 = compute_m1(
            &self.group,
            username,
            salt,
            &self.public_key,
            &b_pub,
            &k_session,
        );

        Ok(SrpVerifier {
            a_pub,
            m1,
            k_session,
        })
    }
}

impl Default for SrpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-side proof state awaiting the server's `M2`
pub struct SrpVerifier {
    a_pub: BigUint,
    m1: Vec<u8>,
    k_session: Vec<u8>,
}

impl SrpVerifier {
    /// Client proof `M1`
    #[must_use]
    pub fn client_proof(&self) -> &[u8] {
        &self.m1
    }

    /// Check the server proof `M2` and release the session key
    ///
    /// # Errors
    /// Returns `CryptoError::SrpError` on mismatch.
    pub fn verify_server(&self, server_proof: &[u8]) -> Result<SessionKey, CryptoError> {
        let expected = compute_m2(&self.a_pub, &self.m1, &self.k_session);
        if !ct_eq(&expected, server_proof) {
            return Err(CryptoError::SrpError("server proof mismatch".into()));
        }
        Ok(SessionKey {
            key: self.k_session.clone(),
        })
    }
}

/// 64-byte SRP session key; zeroed on drop
pub struct SessionKey {
    key: Vec<u8>,
}

impl SessionKey {
    /// Session key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
