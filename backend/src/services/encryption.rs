//! Encryption of evidence blobs at rest.
//!
//! Blobs are sealed with AES-256-GCM under a fresh random 96-bit IV per
//! call. The stored form is
//!
//! ```text
//! base64(iv) "::" ciphertext+tag
//! ```
//!
//! The IV is stored next to the ciphertext, never derived from it. The
//! base64 alphabet contains no `:`, so the first `::` is always the
//! separator even when the binary ciphertext contains one.
//!
//! The process-wide key is derived from the configured secret with
//! HMAC-SHA256 and a fixed context string.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the encoded IV and the ciphertext.
pub const SEPARATOR: &[u8] = b"::";

/// IV length for AES-GCM.
pub const IV_LEN: usize = 12;

const KEY_CONTEXT: &[u8] = b"evidence-locker/blob-encryption/aes-256-gcm/v1";

/// Errors that can occur during encryption operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Encrypted blob is not in iv::ciphertext format")]
    InvalidFormat,

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Derive a 32-byte key from the configured secret.
fn derive_key(secret: &str) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(KEY_CONTEXT);
    mac.finalize().into_bytes().into()
}

/// An IV and the ciphertext it was used for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl SealedBlob {
    /// Encode as `base64(iv)::ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let iv = STANDARD.encode(self.iv);
        let mut out = Vec::with_capacity(iv.len() + SEPARATOR.len() + self.ciphertext.len());
        out.extend_from_slice(iv.as_bytes());
        out.extend_from_slice(SEPARATOR);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the on-disk form. Anything without a separator or with an
    /// undecodable IV is `InvalidFormat`.
    pub fn parse(data: &[u8]) -> Result<Self, CipherError> {
        let split = data
            .windows(SEPARATOR.len())
            .position(|w| w == SEPARATOR)
            .ok_or(CipherError::InvalidFormat)?;

        let iv_bytes = STANDARD
            .decode(&data[..split])
            .map_err(|_| CipherError::InvalidFormat)?;
        let iv: [u8; IV_LEN] = iv_bytes
            .try_into()
            .map_err(|_| CipherError::InvalidFormat)?;

        Ok(Self {
            iv,
            ciphertext: data[split + SEPARATOR.len()..].to_vec(),
        })
    }
}

/// AES-256-GCM cipher for evidence blobs.
#[derive(Clone)]
pub struct EvidenceCipher {
    cipher: Aes256Gcm,
}

redacted_debug!(EvidenceCipher { redact cipher });

impl EvidenceCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != 32 {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Create a cipher from the configured secret.
    pub fn from_secret(secret: &str) -> Self {
        let key = derive_key(secret);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Encrypt under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SealedBlob, CipherError> {
        let iv: [u8; IV_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;
        Ok(SealedBlob { iv, ciphertext })
    }

    /// Decrypt ciphertext produced under `iv`.
    pub fn decrypt(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)
    }

    /// Encrypt and encode in the on-disk format.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(self.encrypt(plaintext)?.to_bytes())
    }

    /// Parse the on-disk format and decrypt.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let blob = SealedBlob::parse(data)?;
        self.decrypt(&blob.iv, &blob.ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = EvidenceCipher::from_secret("test-secret");
        let cases: [&[u8]; 4] = [b"", b"AAAAA", &[0u8; 4096], b"::::"];
        for plaintext in cases {
            let sealed = cipher.seal(plaintext).unwrap();
            assert_eq!(cipher.open(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_stored_format() {
        let cipher = EvidenceCipher::from_secret("test-secret");
        let blob = cipher.encrypt(b"photo bytes").unwrap();
        let bytes = blob.to_bytes();

        let encoded_iv = STANDARD.encode(blob.iv);
        assert!(bytes.starts_with(encoded_iv.as_bytes()));
        assert_eq!(&bytes[encoded_iv.len()..encoded_iv.len() + 2], b"::");
        assert_eq!(&bytes[encoded_iv.len() + 2..], &blob.ciphertext[..]);
        assert_eq!(SealedBlob::parse(&bytes).unwrap(), blob);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let cipher = EvidenceCipher::from_secret("key");
        let a = cipher.encrypt(b"same").unwrap();
        let b = cipher.encrypt(b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_missing_separator_is_invalid_format() {
        let cipher = EvidenceCipher::from_secret("key");
        let sealed = cipher.seal(b"evidence").unwrap();
        // Cut inside the base64 IV, before the separator
        assert_eq!(cipher.open(&sealed[..10]), Err(CipherError::InvalidFormat));
        assert_eq!(cipher.open(b""), Err(CipherError::InvalidFormat));
    }

    #[test]
    fn test_bad_iv_is_invalid_format() {
        let cipher = EvidenceCipher::from_secret("key");
        assert_eq!(
            cipher.open(b"not base64!!::ciphertext"),
            Err(CipherError::InvalidFormat)
        );
        // Valid base64 but wrong IV length
        assert_eq!(cipher.open(b"AAAA::ciphertext"), Err(CipherError::InvalidFormat));
    }

    #[test]
    fn test_truncated_ciphertext_fails_decryption() {
        let cipher = EvidenceCipher::from_secret("key");
        let sealed = cipher.seal(b"evidence payload").unwrap();
        let truncated = &sealed[..sealed.len() - 5];
        assert_eq!(cipher.open(truncated), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn test_tampered_ciphertext_fails_decryption() {
        let cipher = EvidenceCipher::from_secret("key");
        let mut sealed = cipher.seal(b"evidence payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert_eq!(cipher.open(&sealed), Err(CipherError::DecryptionFailed));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = EvidenceCipher::from_secret("key-1").seal(b"secret").unwrap();
        assert_eq!(
            EvidenceCipher::from_secret("key-2").open(&sealed),
            Err(CipherError::DecryptionFailed)
        );
    }

    #[test]
    fn test_raw_key_length() {
        assert!(matches!(
            EvidenceCipher::new(&[0u8; 16]),
            Err(CipherError::InvalidKeyLength(16))
        ));
        let cipher = EvidenceCipher::new(&[7u8; 32]).unwrap();
        let sealed = cipher.seal(b"x").unwrap();
        assert_eq!(cipher.open(&sealed).unwrap(), b"x");
    }

    #[test]
    fn test_debug_hides_key() {
        let cipher = EvidenceCipher::from_secret("key");
        assert!(format!("{:?}", cipher).contains("[REDACTED]"));
    }
}
