//! Authenticated encryption using AES-256-GCM.
//!
//! Sealed data is laid out as `nonce || ciphertext || tag`. For transport
//! through files and pipes it is wrapped as unpadded standard base64, which
//! is the blob format produced by [`encrypt`] and consumed by [`decrypt`].

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

use crate::keys::SymmetricKey;
use kryptr_common::{Error, Result};

/// Nonce size for AES-GCM (12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Blob text encoding: standard alphabet, written unpadded, read either way.
const BLOB_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn cipher(key: &SymmetricKey) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Cipher construction failed: {}", e)))
}

/// Seal plaintext using AES-256-GCM.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is freshly drawn from the OS RNG on every call
/// - The output length is plaintext length + NONCE_SIZE + TAG_SIZE
///
/// # Errors
/// - `Crypto` if the cipher cannot be constructed or sealing fails
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Open data produced by [`seal`].
///
/// # Errors
/// - `Format` if `sealed` is shorter than NONCE_SIZE
/// - `Authentication` if the tag does not verify (tampering, wrong key,
///   corruption or truncation); no plaintext is returned in that case
pub fn open(key: &SymmetricKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(Error::Format(format!(
            "Blob too short: {} bytes, nonce alone is {}",
            sealed.len(),
            NONCE_SIZE
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = cipher(key)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            Error::Authentication("Blob failed integrity verification".to_string())
        })
}

/// Encrypt plaintext into a base64 blob.
///
/// # Errors
/// - Same as [`seal`]
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<String> {
    let sealed = seal(key, plaintext)?;
    Ok(BLOB_ENGINE.encode(sealed))
}

/// Decrypt a base64 blob produced by [`encrypt`].
///
/// Surrounding whitespace, such as the trailing newline of a piped file,
/// is ignored.
///
/// # Errors
/// - `Format` if the blob is not valid base64 or is shorter than a nonce
/// - `Authentication` if the tag does not verify
pub fn decrypt(key: &SymmetricKey, blob: &[u8]) -> Result<Vec<u8>> {
    let sealed = decode_blob(blob)?;
    open(key, &sealed)
}

pub(crate) fn decode_blob(blob: &[u8]) -> Result<Vec<u8>> {
    let text = blob.trim_ascii();
    if text.is_empty() {
        return Err(Error::Format("Blob is empty".to_string()));
    }
    BLOB_ENGINE
        .decode(text)
        .map_err(|e| Error::Format(format!("Blob is not valid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;
    use proptest::prelude::*;

    fn test_key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; KEY_LENGTH])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key(42);
        let plaintext = b"Hello, World!";

        let blob = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, blob.as_bytes()).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_sealed_size() {
        let key = test_key(42);
        let plaintext = b"Test message";

        let sealed = seal(&key, plaintext).unwrap();

        // Size should be nonce + plaintext + tag
        assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_blob_is_unpadded_base64() {
        let key = test_key(42);
        // 1 + 12 + 16 = 29 bytes would need one '=' when padded.
        let blob = encrypt(&key, b"x").unwrap();
        assert!(!blob.contains('='));
    }

    #[test]
    fn test_decrypt_accepts_padding_and_newline() {
        use base64::engine::general_purpose::STANDARD;

        let key = test_key(42);
        let sealed = seal(&key, b"x").unwrap();
        let padded = format!("{}\n", STANDARD.encode(&sealed));

        assert_eq!(decrypt(&key, padded.as_bytes()).unwrap(), b"x");
    }

    #[test]
    fn test_different_nonce_each_time() {
        let key = test_key(42);
        let plaintext = b"Same plaintext";

        let ct1 = seal(&key, plaintext).unwrap();
        let ct2 = seal(&key, plaintext).unwrap();

        // Nonces should be different
        assert_ne!(&ct1[..NONCE_SIZE], &ct2[..NONCE_SIZE]);
        // Ciphertexts should be different
        assert_ne!(ct1, ct2);
        assert_ne!(&ct1[..NONCE_SIZE], &[0u8; NONCE_SIZE]);
    }

    #[test]
    fn test_nonces_do_not_repeat() {
        let key = test_key(42);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..256 {
            let sealed = seal(&key, b"").unwrap();
            assert!(seen.insert(sealed[..NONCE_SIZE].to_vec()));
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let plaintext = b"Secret data";

        let blob = encrypt(&test_key(1), plaintext).unwrap();
        let result = decrypt(&test_key(2), blob.as_bytes());

        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_short_blob_is_format_error() {
        let key = test_key(42);
        assert!(matches!(open(&key, &[0u8; NONCE_SIZE - 1]), Err(Error::Format(_))));
        assert!(matches!(decrypt(&key, b""), Err(Error::Format(_))));
    }

    #[test]
    fn test_nonce_without_tag_fails_authentication() {
        let key = test_key(42);
        let result = open(&key, &[0u8; NONCE_SIZE + 4]);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_invalid_base64_is_format_error() {
        let key = test_key(42);
        assert!(matches!(decrypt(&key, b"not*base64!"), Err(Error::Format(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key(42);

        let blob = encrypt(&key, b"").unwrap();
        let decrypted = decrypt(&key, blob.as_bytes()).unwrap();

        assert!(decrypted.is_empty());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(key in any::<[u8; KEY_LENGTH]>(), plaintext in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let key = SymmetricKey::from_bytes(key);
            let blob = encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(decrypt(&key, blob.as_bytes()).unwrap(), plaintext);
        }

        #[test]
        fn prop_single_byte_tamper_fails(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            position in any::<proptest::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let key = test_key(42);
            let mut sealed = seal(&key, &plaintext).unwrap();
            let i = position.index(sealed.len());
            sealed[i] ^= flip;

            prop_assert!(matches!(open(&key, &sealed), Err(Error::Authentication(_))));
        }
    }
}
