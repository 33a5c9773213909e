//! Encrypted attachment sealing.
//!
//! Bulk payloads (persisted tables travelling between processes) never go
//! on the wire in the clear. They ride beside a `backup/file` envelope as
//! an opaque blob sealed with a fleet-shared key.

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, XChaCha20Poly1305, XNonce};

use crate::error::{ExchangeError, Result};

/// Nonce length prepended to every sealed blob.
const NONCE_LEN: usize = 24;

/// Seals and opens attachment blobs with a fleet-shared symmetric key.
///
/// The sealed form is `nonce || ciphertext`; the nonce is random per call,
/// so sealing the same plaintext twice yields different blobs.
pub struct AttachmentSealer {
    cipher: XChaCha20Poly1305,
}

impl AttachmentSealer {
    /// Builds a sealer from a 64-character hex key string.
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key).map_err(|_| ExchangeError::BadKey { actual: 0 })?;
        if bytes.len() != 32 {
            return Err(ExchangeError::BadKey { actual: bytes.len() });
        }
        let cipher = XChaCha20Poly1305::new_from_slice(&bytes)
            .map_err(|_| ExchangeError::BadKey { actual: bytes.len() })?;
        Ok(AttachmentSealer { cipher })
    }

    /// Encrypts a payload for transit.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| ExchangeError::Crypto)?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a received blob.
    ///
    /// Fails on truncation, a wrong key, or any bit flip in the ciphertext.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(ExchangeError::Truncated { len: blob.len() });
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| ExchangeError::Crypto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "6368616e676520746869732070617373776f726420746f206120736563726574";
    const OTHER_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_seal_open_round_trip() {
        let sealer = AttachmentSealer::from_hex(KEY).unwrap();
        let blob = sealer.seal(b"warn ledger contents").unwrap();
        assert_eq!(sealer.open(&blob).unwrap(), b"warn ledger contents");
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let sealer = AttachmentSealer::from_hex(KEY).unwrap();
        let a = sealer.seal(b"same").unwrap();
        let b = sealer.seal(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealer = AttachmentSealer::from_hex(KEY).unwrap();
        let other = AttachmentSealer::from_hex(OTHER_KEY).unwrap();
        let blob = sealer.seal(b"secret").unwrap();
        assert!(matches!(other.open(&blob), Err(ExchangeError::Crypto)));
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let sealer = AttachmentSealer::from_hex(KEY).unwrap();
        let mut blob = sealer.seal(b"secret").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(sealer.open(&blob), Err(ExchangeError::Crypto)));
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let sealer = AttachmentSealer::from_hex(KEY).unwrap();
        assert!(matches!(
            sealer.open(&[0u8; 10]),
            Err(ExchangeError::Truncated { len: 10 })
        ));
    }

    #[test]
    fn test_bad_key_lengths_rejected() {
        assert!(AttachmentSealer::from_hex("abcd").is_err());
        assert!(AttachmentSealer::from_hex("not hex").is_err());
        assert!(AttachmentSealer::from_hex(&"ab".repeat(16)).is_err());
    }

    #[test]
    fn test_empty_payload() {
        let sealer = AttachmentSealer::from_hex(KEY).unwrap();
        let blob = sealer.seal(b"").unwrap();
        assert_eq!(sealer.open(&blob).unwrap(), Vec::<u8>::new());
    }
}
