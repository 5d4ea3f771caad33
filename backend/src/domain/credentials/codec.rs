//! Credential material codec: AES-256-GCM with a process-wide key.
//!
//! Wire form is `v1:` followed by base64(nonce ‖ ciphertext). The nonce is
//! 12 bytes and freshly generated per encryption; the GCM tag rides inside
//! the ciphertext. Only the credential store touches this codec — providers
//! and repositories never see key material or plaintext together.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use zeroize::Zeroizing;

/// Versioned wire prefix for encrypted material.
const MATERIAL_V1_PREFIX: &str = "v1:";
/// AES-GCM nonce length in bytes.
const NONCE_BYTES: usize = 12;
/// Required key length in bytes.
pub const KEY_BYTES: usize = 32;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The configured key is not 32 bytes.
    #[error("encryption key must be {KEY_BYTES} bytes, got {got}")]
    BadKeyLength {
        /// Observed length.
        got: usize,
    },
    /// The stored material is not in a recognized wire form.
    #[error("credential material is malformed: {message}")]
    Malformed {
        /// Parse failure description.
        message: String,
    },
    /// Authenticated decryption failed (wrong key or corrupted material).
    #[error("credential material failed authenticated decryption")]
    DecryptionFailed,
    /// Encryption failed.
    #[error("credential material encryption failed")]
    EncryptionFailed,
}

/// Process-wide 32-byte encryption key.
///
/// Accepts 64 hex characters, standard base64 of 32 bytes, or a raw
/// 32-byte string. Material is zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey(Zeroizing<[u8; KEY_BYTES]>);

impl EncryptionKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse key material from its environment representation.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadKeyLength`] when no accepted encoding
    /// yields exactly 32 bytes.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let raw = raw.trim();

        if raw.len() == KEY_BYTES * 2 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut bytes = [0_u8; KEY_BYTES];
            for (i, chunk) in raw.as_bytes().chunks_exact(2).enumerate() {
                let hex = std::str::from_utf8(chunk)
                    .map_err(|_| CodecError::BadKeyLength { got: raw.len() })?;
                bytes[i] = u8::from_str_radix(hex, 16)
                    .map_err(|_| CodecError::BadKeyLength { got: raw.len() })?;
            }
            return Ok(Self::from_bytes(bytes));
        }

        if let Ok(decoded) = BASE64.decode(raw)
            && let Ok(bytes) = <[u8; KEY_BYTES]>::try_from(decoded.as_slice())
        {
            return Ok(Self::from_bytes(bytes));
        }

        <[u8; KEY_BYTES]>::try_from(raw.as_bytes())
            .map(Self::from_bytes)
            .map_err(|_| CodecError::BadKeyLength { got: raw.len() })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Symmetric codec over credential secret material.
#[derive(Debug, Clone)]
pub struct MaterialCodec {
    key: EncryptionKey,
}

impl MaterialCodec {
    /// Build a codec over the process key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypt raw secret material into its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EncryptionFailed`] when the cipher rejects the
    /// payload.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.0.as_ref()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CodecError::EncryptionFailed)?;

        let mut payload = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        payload.extend_from_slice(nonce.as_slice());
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{MATERIAL_V1_PREFIX}{}", BASE64.encode(payload)))
    }

    /// Decrypt wire-form material back into the raw secret.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] for unrecognized wire forms and
    /// [`CodecError::DecryptionFailed`] when authentication fails.
    pub fn decrypt(&self, material: &str) -> Result<Zeroizing<String>, CodecError> {
        let encoded = material
            .strip_prefix(MATERIAL_V1_PREFIX)
            .ok_or_else(|| CodecError::Malformed {
                message: "missing version prefix".to_owned(),
            })?;
        let payload = BASE64.decode(encoded).map_err(|error| CodecError::Malformed {
            message: format!("invalid base64 payload: {error}"),
        })?;
        if payload.len() <= NONCE_BYTES {
            return Err(CodecError::Malformed {
                message: "payload shorter than nonce".to_owned(),
            });
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_BYTES);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.0.as_ref()));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::DecryptionFailed)?;
        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| CodecError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MaterialCodec {
        MaterialCodec::new(EncryptionKey::from_bytes([7_u8; KEY_BYTES]))
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let codec = codec();
        let material = codec.encrypt("sk-test-12345").expect("encrypts");
        assert!(material.starts_with("v1:"));
        assert_eq!(codec.decrypt(&material).expect("decrypts").as_str(), "sk-test-12345");
    }

    #[test]
    fn nonces_are_fresh_per_encryption() {
        let codec = codec();
        let a = codec.encrypt("secret").expect("encrypts");
        let b = codec.encrypt("secret").expect("encrypts");
        assert_ne!(a, b, "same plaintext must not produce identical material");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let material = codec().encrypt("secret").expect("encrypts");
        let other = MaterialCodec::new(EncryptionKey::from_bytes([8_u8; KEY_BYTES]));
        assert_eq!(
            other.decrypt(&material).expect_err("must fail"),
            CodecError::DecryptionFailed
        );
    }

    #[test]
    fn malformed_material_is_rejected() {
        let codec = codec();
        assert!(matches!(
            codec.decrypt("plaintext-key").expect_err("no prefix"),
            CodecError::Malformed { .. }
        ));
        assert!(matches!(
            codec.decrypt("v1:!!!").expect_err("bad base64"),
            CodecError::Malformed { .. }
        ));
        assert!(matches!(
            codec.decrypt("v1:AAAA").expect_err("too short"),
            CodecError::Malformed { .. }
        ));
    }

    #[test]
    fn key_parsing_accepts_hex_base64_and_raw() {
        let bytes = [42_u8; KEY_BYTES];
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        assert!(EncryptionKey::parse(&hex).is_ok());

        let b64 = BASE64.encode(bytes);
        assert!(EncryptionKey::parse(&b64).is_ok());

        let raw = "0123456789abcdef0123456789abcdef";
        assert!(EncryptionKey::parse(raw).is_ok());

        assert!(matches!(
            EncryptionKey::parse("short").expect_err("must fail"),
            CodecError::BadKeyLength { .. }
        ));
    }
}
