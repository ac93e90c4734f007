use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// The size of the configured key material in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

const ENCRYPTION_DOMAIN: &[u8] = b"campus-sessions/field-encryption/v1";
const SEARCH_DOMAIN: &[u8] = b"campus-sessions/search-hash/v1";
const SEARCH_SALT: &[u8] = b"c4e1f0a9-search-index-salt";

/// Errors raised while decoding a stored ciphertext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The value is not in `iv:body` form or a component does not decode.
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    /// Padding check failed, usually a wrong or rotated key.
    #[error("decryption failed, check the configured key")]
    Decryption,

    /// The decrypted bytes are not valid UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// Deterministic field cipher for PII stored in session records.
///
/// ⚠️ SECURITY NOTE: this cipher is deterministic on purpose. The IV is
/// derived from `SHA-256(plaintext || key)` instead of being random, so the
/// same plaintext always produces the same ciphertext under the same key.
/// Anyone with read access to the store can tell that two rows hold the same
/// value. That is the price of equality lookups without decrypting every row.
/// Do NOT switch this to a random IV: existing ciphertexts would still
/// decrypt, but duplicate detection and any lookup that compares ciphertext
/// would silently stop matching.
///
/// Lookups go through [`FieldCipher::hash_for_search`], which uses separate
/// derivation material and has no inverse.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldCipher {
    encryption_key: [u8; KEY_SIZE],
    search_key: [u8; KEY_SIZE],
}

impl FieldCipher {
    /// Creates a new `FieldCipher` from the configured key material.
    ///
    /// The raw key is never used directly: the AES key and the search-hash
    /// key are derived from it under different domain strings.
    pub fn new(key_material: &[u8; KEY_SIZE]) -> Self {
        Self {
            encryption_key: derive(ENCRYPTION_DOMAIN, key_material),
            search_key: derive(SEARCH_DOMAIN, key_material),
        }
    }

    /// Encrypts `plaintext` with AES-256-CBC and a plaintext-derived IV.
    ///
    /// # Returns
    ///
    /// `hex(iv) ":" base64(ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let iv = self.derive_iv(plaintext);

        let ciphertext = Aes256CbcEnc::new(&self.encryption_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        format!(
            "{}:{}",
            hex::encode(iv),
            general_purpose::STANDARD.encode(ciphertext)
        )
    }

    /// Decrypts a value produced by [`FieldCipher::encrypt`].
    ///
    /// Never returns an empty or partial value on failure; callers must treat
    /// an error as fatal for the current operation.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let (iv_hex, body_b64) = ciphertext
            .split_once(':')
            .ok_or_else(|| CipherError::Malformed("missing IV separator".to_string()))?;

        let iv: [u8; IV_SIZE] = hex::decode(iv_hex)
            .map_err(|e| CipherError::Malformed(format!("IV is not hex: {}", e)))?
            .try_into()
            .map_err(|_| CipherError::Malformed("IV must be 16 bytes".to_string()))?;

        let body = general_purpose::STANDARD
            .decode(body_b64)
            .map_err(|e| CipherError::Malformed(format!("body is not base64: {}", e)))?;

        if body.is_empty() || body.len() % IV_SIZE != 0 {
            return Err(CipherError::Malformed(
                "body length is not a whole number of blocks".to_string(),
            ));
        }

        let plaintext = Aes256CbcDec::new(&self.encryption_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&body)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }

    /// One-way, salted hash used as an equality-lookup key.
    ///
    /// # Returns
    ///
    /// 64 lowercase hex characters.
    pub fn hash_for_search(&self, plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(SEARCH_DOMAIN);
        hasher.update(plaintext.as_bytes());
        hasher.update(self.search_key);
        hasher.update(SEARCH_SALT);
        hex::encode(hasher.finalize())
    }

    fn derive_iv(&self, plaintext: &str) -> [u8; IV_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(plaintext.as_bytes());
        hasher.update(self.encryption_key);
        let digest = hasher.finalize();

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&digest[..IV_SIZE]);
        iv
    }
}

fn derive(domain: &[u8], key_material: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(key_material);
    hasher.finalize().into()
}
