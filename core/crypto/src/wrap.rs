//! Salt wrapping with RSA-OAEP (SHA-512).
//!
//! The wrapped salt is stored as padded standard base64 text.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::{traits::PublicKeyParts, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;

use crate::keys::Salt;
use kryptr_common::{Error, Result};

/// Wrap a salt under a public key.
///
/// # Errors
/// - `Crypto` if the salt is too long for the key or encryption fails
pub fn wrap_salt(public: &RsaPublicKey, salt: &Salt) -> Result<String> {
    let wrapped = public
        .encrypt(&mut OsRng, Oaep::new::<Sha512>(), salt.as_bytes())
        .map_err(|e| Error::Crypto(format!("Salt wrapping failed: {}", e)))?;
    Ok(STANDARD.encode(wrapped))
}

/// Unwrap a salt with the private key of the pair that wrapped it.
///
/// # Errors
/// - `Format` if `wrapped` is not base64
/// - `Decrypt` if the ciphertext length does not match the key size
/// - `KeyMismatch` if OAEP padding fails, which is what a private key from
///   another key pair produces
pub fn unwrap_salt(private: &RsaPrivateKey, wrapped: &[u8]) -> Result<Salt> {
    let ciphertext = STANDARD
        .decode(wrapped.trim_ascii())
        .map_err(|e| Error::Format(format!("Wrapped salt is not valid base64: {}", e)))?;

    if ciphertext.len() != private.size() {
        return Err(Error::Decrypt(format!(
            "Wrapped salt is {} bytes but the private key expects {}",
            ciphertext.len(),
            private.size()
        )));
    }

    match private.decrypt(Oaep::new::<Sha512>(), &ciphertext) {
        Ok(salt) => Ok(Salt::from_bytes(salt)),
        Err(rsa::Error::Decryption) => Err(Error::KeyMismatch(
            "Wrapped salt does not belong to this private key".to_string(),
        )),
        Err(e) => Err(Error::Decrypt(format!("Salt unwrapping failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::{parse_private_key_pem, parse_public_key_pem};

    fn key_a() -> RsaPrivateKey {
        parse_private_key_pem(include_bytes!("../testdata/rsa_a.pem")).unwrap()
    }

    fn key_b() -> RsaPrivateKey {
        parse_private_key_pem(include_bytes!("../testdata/rsa_b.pem")).unwrap()
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let public = parse_public_key_pem(include_bytes!("../testdata/rsa_a.pub.pem")).unwrap();
        let salt = Salt::generate();

        let wrapped = wrap_salt(&public, &salt).unwrap();
        let unwrapped = unwrap_salt(&key_a(), wrapped.as_bytes()).unwrap();

        assert_eq!(unwrapped.as_bytes(), salt.as_bytes());
    }

    #[test]
    fn test_wrapping_is_randomized() {
        let private = key_a();
        let salt = Salt::generate();

        let w1 = wrap_salt(&private.to_public_key(), &salt).unwrap();
        let w2 = wrap_salt(&private.to_public_key(), &salt).unwrap();

        assert_ne!(w1, w2);
    }

    #[test]
    fn test_mismatched_private_key() {
        let salt = Salt::generate();
        let wrapped = wrap_salt(&key_a().to_public_key(), &salt).unwrap();

        let result = unwrap_salt(&key_b(), wrapped.as_bytes());
        assert!(matches!(result, Err(Error::KeyMismatch(_))));
    }

    #[test]
    fn test_trailing_newline_is_ignored() {
        let private = key_a();
        let salt = Salt::generate();
        let wrapped = format!("{}\n", wrap_salt(&private.to_public_key(), &salt).unwrap());

        let unwrapped = unwrap_salt(&private, wrapped.as_bytes()).unwrap();
        assert_eq!(unwrapped.as_bytes(), salt.as_bytes());
    }

    #[test]
    fn test_truncated_ciphertext_is_decrypt_error() {
        let private = key_a();
        let wrapped = wrap_salt(&private.to_public_key(), &Salt::generate()).unwrap();
        let mut raw = STANDARD.decode(&wrapped).unwrap();
        raw.truncate(raw.len() - 1);

        let result = unwrap_salt(&private, STANDARD.encode(raw).as_bytes());
        assert!(matches!(result, Err(Error::Decrypt(_))));
    }

    #[test]
    fn test_garbage_is_format_error() {
        let result = unwrap_salt(&key_a(), b"%%% not base64 %%%");
        assert!(matches!(result, Err(Error::Format(_))));
    }
}
