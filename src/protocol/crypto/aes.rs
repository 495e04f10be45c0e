use super::{CryptoError, lengths};
use aes::Aes128;
use aes::cipher::consts::U16;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes_gcm::AesGcm;
use aes_gcm::aead::Aead;

/// AES-128-CTR stream cipher
///
/// The keystream position persists across calls, which the pair-verify
/// exchange depends on: the inbound signature is decrypted with the same
/// stream that encrypted the outbound one, continued where it left off.
pub struct Aes128Ctr {
    cipher: Aes128,
    counter_block: [u8; 16],
    keystream: [u8; 16],
    // Position in the current keystream block (0..16); 16 forces a refill
    keystream_pos: usize,
}

impl Aes128Ctr {
    /// Create a cipher with a 16-byte key and 16-byte IV
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyLength` on wrong key or IV size.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != lengths::AES_128_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_KEY,
                actual: key.len(),
            });
        }
        if iv.len() != lengths::AES_128_BLOCK {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_BLOCK,
                actual: iv.len(),
            });
        }

        let mut counter_block = [0u8; 16];
        counter_block.copy_from_slice(iv);

        Ok(Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
            counter_block,
            keystream: [0u8; 16],
            keystream_pos: 16,
        })
    }

    /// Encrypt/decrypt in place (XOR with the keystream)
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            if self.keystream_pos == 16 {
                self.keystream.copy_from_slice(&self.counter_block);
                self.cipher
                    .encrypt_block(GenericArray::from_mut_slice(&mut self.keystream));
                self.increment_counter();
                self.keystream_pos = 0;
            }
            *byte ^= self.keystream[self.keystream_pos];
            self.keystream_pos += 1;
        }
    }

    /// Encrypt/decrypt into a new buffer
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut output = data.to_vec();
        self.apply_keystream(&mut output);
        output
    }

    // Full 128-bit big-endian increment, matching OpenSSL's aes_128_ctr.
    fn increment_counter(&mut self) {
        for byte in self.counter_block.iter_mut().rev() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
    }
}

type GcmCipher = AesGcm<Aes128, U16>;

/// AES-128-GCM with the 16-byte IV the pair-setup exchange uses
///
/// The sender transmits ciphertext and authentication tag as separate
/// fields, so the API keeps them separate too.
pub struct Aes128Gcm {
    cipher: GcmCipher,
}

impl Aes128Gcm {
    /// Create a cipher with a 16-byte key
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyLength` on wrong key size.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != lengths::AES_128_KEY {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_KEY,
                actual: key.len(),
            });
        }

        Ok(Self {
            cipher: GcmCipher::new(GenericArray::from_slice(key)),
        })
    }

    /// Encrypt, returning ciphertext and the 16-byte tag separately
    ///
    /// # Errors
    /// Returns `CryptoError` on wrong IV size or cipher failure.
    pub fn encrypt(
        &self,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; 16]), CryptoError> {
        if iv.len() != lengths::AES_128_BLOCK {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_BLOCK,
                actual: iv.len(),
            });
        }

        let mut combined = self
            .cipher
            .encrypt(GenericArray::from_slice(iv), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let tag_start = combined.len() - lengths::GCM_TAG;
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&combined[tag_start..]);
        combined.truncate(tag_start);

        Ok((combined, tag))
    }

    /// Decrypt ciphertext authenticated by a detached 16-byte tag
    ///
    /// # Errors
    /// Returns `CryptoError::DecryptionFailed` when authentication fails.
    pub fn decrypt(
        &self,
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != lengths::AES_128_BLOCK {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_BLOCK,
                actual: iv.len(),
            });
        }
        if tag.len() != lengths::GCM_TAG {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::GCM_TAG,
                actual: tag.len(),
            });
        }

        let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(tag);

        self.cipher
            .decrypt(GenericArray::from_slice(iv), combined.as_slice())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}
