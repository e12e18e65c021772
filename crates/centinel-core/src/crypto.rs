// crates/centinel-core/src/crypto.rs
//
// Cryptographic helpers shared by the chain hasher and the checkpoint store.
//
// Checkpoint encryption derives a one-time ChaCha20-Poly1305 key and nonce
// from the long-lived base key with HKDF-SHA256, using the per-save random
// IV as salt. A fresh IV therefore means a fresh key.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::CentinelError;

/// HKDF context string for checkpoint keys. Changing it orphans every
/// checkpoint written under the old value.
pub const CHECKPOINT_KDF_CONTEXT: &[u8] = b"centinel-checkpoint-v2";

/// Length of the per-checkpoint IV / HKDF salt in bytes (128 bits).
pub const IV_LEN: usize = 16;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Compute SHA-256 hash of the given bytes.
///
/// Returns a 32-byte hash.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Lowercase hex SHA-256 of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(hash_bytes(data))
}

/// True if `value` looks like a lowercase or uppercase hex SHA-256 digest.
pub fn is_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Encode bytes as unpadded base64url.
pub fn encode_b64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode base64url, accepting input with or without `=` padding.
pub fn decode_b64url(value: &str) -> Result<Vec<u8>, CentinelError> {
    URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| CentinelError::Serialization(format!("invalid base64url: {}", e)))
}

/// Generate a fresh random 128-bit IV.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// The long-lived 256-bit base key checkpoint keys are derived from.
///
/// Supplied externally, never persisted. `Debug` is redacted and the bytes
/// are zeroized on drop.
#[derive(Clone)]
pub struct BaseKey([u8; KEY_LEN]);

impl BaseKey {
    /// Wrap raw key bytes. Anything other than exactly 32 bytes is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CentinelError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CentinelError::Crypto(format!(
                "base key must be exactly 256 bits, got {} bits",
                bytes.len() * 8
            ))
        })?;
        Ok(Self(key))
    }

    /// Decode a key from hex (64 chars), base64url or standard base64.
    pub fn from_encoded(encoded: &str) -> Result<Self, CentinelError> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(CentinelError::Crypto("base key is empty".to_string()));
        }

        let mut decoded = if is_hex_digest(trimmed) {
            hex::decode(trimmed).map_err(|e| CentinelError::Crypto(e.to_string()))?
        } else {
            let unpadded = trimmed.trim_end_matches('=');
            URL_SAFE_NO_PAD
                .decode(unpadded)
                .or_else(|_| STANDARD_NO_PAD.decode(unpadded))
                .map_err(|_| {
                    CentinelError::Crypto("base key is neither hex nor base64".to_string())
                })?
        };

        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    /// Generate a random key (used by `centinel keygen` and tests).
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Encode as unpadded base64url for handing to an operator.
    pub fn to_b64url(&self) -> String {
        encode_b64url(&self.0)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for BaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BaseKey(<redacted>)")
    }
}

impl Drop for BaseKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// One-time cipher derived for a single checkpoint.
struct DerivedCipher {
    cipher: ChaCha20Poly1305,
    nonce: [u8; NONCE_LEN],
}

fn derive_cipher(base: &BaseKey, iv: &[u8]) -> Result<DerivedCipher, CentinelError> {
    if iv.len() != IV_LEN {
        return Err(CentinelError::Crypto(format!(
            "IV must be {} bytes, got {}",
            IV_LEN,
            iv.len()
        )));
    }

    let hk = Hkdf::<Sha256>::new(Some(iv), base.as_bytes());
    let mut okm = [0u8; KEY_LEN + NONCE_LEN];
    hk.expand(CHECKPOINT_KDF_CONTEXT, &mut okm)
        .map_err(|e| CentinelError::Crypto(format!("hkdf expand failed: {:?}", e)))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&okm[..KEY_LEN]));
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&okm[KEY_LEN..]);
    okm.zeroize();

    Ok(DerivedCipher { cipher, nonce })
}

/// Encrypt `plaintext` under the key derived from `base` and `iv`.
///
/// `aad` is authenticated but not encrypted.
pub fn seal(base: &BaseKey, iv: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CentinelError> {
    let derived = derive_cipher(base, iv)?;
    derived
        .cipher
        .encrypt(
            Nonce::from_slice(&derived.nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CentinelError::Crypto(format!("encryption failed: {:?}", e)))
}

/// Decrypt and authenticate `ciphertext` produced by [`seal`].
pub fn open(base: &BaseKey, iv: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CentinelError> {
    let derived = derive_cipher(base, iv)?;
    derived
        .cipher
        .decrypt(
            Nonce::from_slice(&derived.nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CentinelError::Crypto("authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes() {
        let data = b"centinel";
        let hash = hash_bytes(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, hash_bytes(data));
        assert_ne!(hash, hash_bytes(b"different"));
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(is_hex_digest(&sha256_hex(b"abc")));
        assert!(!is_hex_digest("abc"));
    }

    #[test]
    fn test_base_key_rejects_wrong_length() {
        assert!(BaseKey::from_bytes(&[0u8; 16]).is_err());
        assert!(BaseKey::from_bytes(&[0u8; 33]).is_err());
        assert!(BaseKey::from_encoded("").is_err());
        assert!(BaseKey::from_encoded(&encode_b64url(&[7u8; 24])).is_err());
        assert!(BaseKey::from_encoded("not a key at all!").is_err());
    }

    #[test]
    fn test_base_key_accepts_hex_and_base64() {
        let raw = [42u8; 32];
        assert!(BaseKey::from_encoded(&hex::encode(raw)).is_ok());
        assert!(BaseKey::from_encoded(&encode_b64url(&raw)).is_ok());
        let padded = base64::engine::general_purpose::STANDARD.encode(raw);
        assert!(BaseKey::from_encoded(&padded).is_ok());
    }

    #[test]
    fn test_base_key_debug_is_redacted() {
        let key = BaseKey::from_bytes(&[9u8; 32]).unwrap();
        let rendered = format!("{:?}", key);
        assert_eq!(rendered, "BaseKey(<redacted>)");
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = BaseKey::generate();
        let iv = random_iv();
        let ct = seal(&key, &iv, b"v1/run", b"state").unwrap();
        assert_ne!(ct.as_slice(), b"state");
        assert_eq!(open(&key, &iv, b"v1/run", &ct).unwrap(), b"state");
    }

    #[test]
    fn test_different_iv_yields_unrelated_key() {
        let key = BaseKey::generate();
        let iv_a = random_iv();
        let mut iv_b = iv_a;
        iv_b[0] ^= 0x01;

        let ct = seal(&key, &iv_a, b"", b"payload").unwrap();
        assert!(open(&key, &iv_b, b"", &ct).is_err());
    }

    #[test]
    fn test_open_rejects_wrong_aad_and_bad_iv() {
        let key = BaseKey::generate();
        let iv = random_iv();
        let ct = seal(&key, &iv, b"v1/run-a", b"payload").unwrap();
        assert!(open(&key, &iv, b"v1/run-b", &ct).is_err());
        assert!(open(&key, &iv[..8], b"v1/run-a", &ct).is_err());
    }

    #[test]
    fn test_b64url_roundtrip_with_padding() {
        let data = [1u8, 2, 3, 4, 5];
        let encoded = encode_b64url(&data);
        assert_eq!(decode_b64url(&encoded).unwrap(), data);
        assert_eq!(decode_b64url(&format!("{}=", encoded)).unwrap(), data);
        assert!(decode_b64url("***").is_err());
    }
}
