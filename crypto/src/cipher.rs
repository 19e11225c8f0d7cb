//! Reversible state ciphers

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Cipher failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CipherError {
    #[error("Encryption key is empty")]
    EmptyKey,

    #[error("Ciphertext is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("Decrypted text is not valid UTF-8")]
    InvalidUtf8,
}

/// A reversible text transform keyed by a configured secret
pub trait StateCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// XOR with the repeating key bytes, then Base64
#[derive(Clone)]
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    pub fn new(key: &str) -> Result<Self, CipherError> {
        if key.is_empty() {
            return Err(CipherError::EmptyKey);
        }
        Ok(Self {
            key: key.as_bytes().to_vec(),
        })
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .zip(self.key.iter().cycle())
            .map(|(byte, k)| byte ^ k)
            .collect()
    }
}

impl std::fmt::Debug for XorCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "XorCipher(<{} byte key>)", self.key.len())
    }
}

impl StateCipher for XorCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(STANDARD.encode(self.apply(plaintext.as_bytes())))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CipherError::InvalidEncoding(e.to_string()))?;
        String::from_utf8(self.apply(&bytes)).map_err(|_| CipherError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor_cipher_reversible() {
        let cipher = XorCipher::new("s3cret").unwrap();
        let plaintext = r#"{"theme":"dark","count":3,"name":"Zoë"}"#;

        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert!(!encrypted.contains("theme"));

        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_does_not_recover_plaintext() {
        let plaintext = r#"{"token":"abc"}"#;
        let encrypted = XorCipher::new("right").unwrap().encrypt(plaintext).unwrap();

        let recovered = XorCipher::new("wrong").unwrap().decrypt(&encrypted);
        assert_ne!(recovered.ok().as_deref(), Some(plaintext));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert_eq!(XorCipher::new("").unwrap_err(), CipherError::EmptyKey);
    }

    #[test]
    fn test_invalid_ciphertext() {
        let cipher = XorCipher::new("k").unwrap();
        assert!(matches!(
            cipher.decrypt("not base64!!"),
            Err(CipherError::InvalidEncoding(_))
        ));
    }
}
