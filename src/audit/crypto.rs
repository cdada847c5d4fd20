//! Record transformations: IP anonymization, PII encryption, integrity HMAC.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuditRecord;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;

/// Error type for record crypto operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key must be 32 bytes after base64 decode, got {0}")]
    KeyLength(usize),
    #[error("key is not valid base64")]
    KeyEncoding,
    #[error("ciphertext token is malformed")]
    Malformed,
    #[error("decryption failed")]
    Decrypt,
}

/// Mask the trailing component of an address.
///
/// IPv4 zeroes the last octet; IPv6 zeroes the trailing four groups. Pure
/// and idempotent: anonymizing an anonymized address is a no-op.
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], 0))
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            IpAddr::V6(Ipv6Addr::new(
                segments[0],
                segments[1],
                segments[2],
                segments[3],
                0,
                0,
                0,
                0,
            ))
        }
    }
}

/// AES-256-GCM cipher for PII fields.
///
/// Each encryption uses a fresh random nonce, so equal plaintexts produce
/// distinct tokens. Tokens are `enc:` + base64(nonce || ciphertext), always
/// distinguishable from plaintext.
pub struct PiiCipher {
    cipher: Aes256Gcm,
}

impl PiiCipher {
    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, CryptoError> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(key_b64)
            .map_err(|_| CryptoError::KeyEncoding)?;
        if key_bytes.len() != 32 {
            return Err(CryptoError::KeyLength(key_bytes.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes).expect("length checked above");
        Ok(Self { cipher })
    }

    /// Encrypt a field value into an opaque token.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .expect("AES-GCM encryption is infallible for in-memory buffers");

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        format!(
            "{}{}",
            TOKEN_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(combined)
        )
    }

    /// Recover the plaintext from a token produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let encoded = token.strip_prefix(TOKEN_PREFIX).ok_or(CryptoError::Malformed)?;
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::Malformed)?;
        if combined.len() < NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Whether a value is already an encrypted token.
    pub fn is_token(value: &str) -> bool {
        value.starts_with(TOKEN_PREFIX)
    }
}

/// Keyed integrity hash over serialized audit records.
pub struct IntegritySigner {
    key: Vec<u8>,
}

impl IntegritySigner {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    /// HMAC-SHA256 hex digest over the record with `integrity_hash` absent.
    ///
    /// Deterministic for a fixed record and key; 64 hex characters.
    pub fn sign(&self, record: &AuditRecord) -> String {
        let mut unsigned = record.clone();
        unsigned.integrity_hash = None;
        let bytes = serde_json::to_vec(&unsigned).expect("audit record serializes");

        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(&bytes);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a record's attached hash.
    pub fn verify(&self, record: &AuditRecord) -> bool {
        let Some(attached) = &record.integrity_hash else {
            return false;
        };
        let expected = self.sign(record);
        expected.as_bytes().ct_eq(attached.as_bytes()).into()
    }
}
