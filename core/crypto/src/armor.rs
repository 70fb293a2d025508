//! PEM armor for key material.
//!
//! Key files are normally plain PEM blocks. Older key directories may hold
//! passphrase-protected blocks in the RFC 1421 style (`Proc-Type` and
//! `DEK-Info` headers, DES or AES in CBC mode), which are unlocked with an
//! empty passphrase.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use md5::{Digest, Md5};
use pem::{EncodeConfig, LineEnding, Pem};
use zeroize::Zeroizing;

use kryptr_common::{Error, Result, SensitiveBytes};

/// Cipher named by a `DEK-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DekCipher {
    DesCbc,
    DesEde3Cbc,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl DekCipher {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "DES-CBC" => Ok(Self::DesCbc),
            "DES-EDE3-CBC" => Ok(Self::DesEde3Cbc),
            "AES-128-CBC" => Ok(Self::Aes128Cbc),
            "AES-192-CBC" => Ok(Self::Aes192Cbc),
            "AES-256-CBC" => Ok(Self::Aes256Cbc),
            other => Err(Error::Format(format!(
                "Unsupported PEM encryption cipher: {}",
                other
            ))),
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::DesCbc => 8,
            Self::DesEde3Cbc => 24,
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    /// Block size, which is also the IV size.
    fn block_size(self) -> usize {
        match self {
            Self::DesCbc | Self::DesEde3Cbc => 8,
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
        }
    }
}

/// A key block as read from disk.
#[derive(Debug)]
pub enum PemKey {
    /// Unencrypted DER contents.
    Plain { label: String, der: SensitiveBytes },
    /// Passphrase-protected DER contents.
    Encrypted {
        label: String,
        cipher: DekCipher,
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
    },
}

impl PemKey {
    /// Parse a single PEM block.
    ///
    /// # Errors
    /// - `Format` if the text is not PEM, or the encryption headers are
    ///   malformed or name an unsupported cipher
    pub fn parse(text: &[u8]) -> Result<Self> {
        let block =
            pem::parse(text).map_err(|e| Error::Format(format!("Malformed PEM: {}", e)))?;
        let label = block.tag().to_string();

        let Some(dek_info) = block.headers().get("DEK-Info") else {
            return Ok(Self::Plain {
                label,
                der: SensitiveBytes::new(block.contents().to_vec()),
            });
        };

        let (name, iv_hex) = dek_info
            .split_once(',')
            .ok_or_else(|| Error::Format(format!("Malformed DEK-Info header: {}", dek_info)))?;
        let cipher = DekCipher::parse(name.trim())?;
        let iv = hex::decode(iv_hex.trim())
            .map_err(|e| Error::Format(format!("Malformed DEK-Info IV: {}", e)))?;
        if iv.len() != cipher.block_size() {
            return Err(Error::Format(format!(
                "DEK-Info IV must be {} bytes, got {}",
                cipher.block_size(),
                iv.len()
            )));
        }

        let ciphertext = block.contents().to_vec();
        if ciphertext.is_empty() || ciphertext.len() % cipher.block_size() != 0 {
            return Err(Error::Format(
                "Encrypted PEM data is not a multiple of the block size".to_string(),
            ));
        }

        Ok(Self::Encrypted {
            label,
            cipher,
            iv,
            ciphertext,
        })
    }

    /// Block label, e.g. `RSA PRIVATE KEY`.
    pub fn label(&self) -> &str {
        match self {
            Self::Plain { label, .. } | Self::Encrypted { label, .. } => label,
        }
    }

    /// Whether this block needs a passphrase.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }

    /// Recover the DER contents.
    ///
    /// `passphrase` is ignored for plain blocks.
    ///
    /// # Errors
    /// - `Key` if the passphrase is wrong
    pub fn into_der(self, passphrase: &[u8]) -> Result<SensitiveBytes> {
        match self {
            Self::Plain { der, .. } => Ok(der),
            Self::Encrypted {
                cipher,
                iv,
                ciphertext,
                ..
            } => {
                // OpenSSL derives the key from the first 8 IV bytes as salt.
                let key = evp_bytes_to_key(passphrase, &iv[..8], cipher.key_len());
                let invalid = |e: aes::cipher::InvalidLength| {
                    Error::Crypto(format!("Cipher construction failed: {}", e))
                };

                let plain = match cipher {
                    DekCipher::DesCbc => cbc::Decryptor::<des::Des>::new_from_slices(&key, &iv)
                        .map_err(invalid)?
                        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                    DekCipher::DesEde3Cbc => cbc::Decryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
                        .map_err(invalid)?
                        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                    DekCipher::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(&key, &iv)
                        .map_err(invalid)?
                        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                    DekCipher::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(&key, &iv)
                        .map_err(invalid)?
                        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                    DekCipher::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(&key, &iv)
                        .map_err(invalid)?
                        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
                }
                .map_err(|_| Error::Key("Incorrect passphrase for encrypted PEM block".to_string()))?;

                Ok(SensitiveBytes::new(plain))
            }
        }
    }
}

/// Encode DER contents as an unencrypted PEM block with LF line endings.
pub fn encode_plain(label: &str, der: &[u8]) -> Zeroizing<String> {
    let block = Pem::new(label, der.to_vec());
    Zeroizing::new(pem::encode_config(
        &block,
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    ))
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(len + 16));
    let mut digest = Vec::new();

    while key.len() < len {
        let mut hasher = Md5::new();
        hasher.update(&digest);
        hasher.update(passphrase);
        hasher.update(salt);
        digest = hasher.finalize().to_vec();
        key.extend_from_slice(&digest);
    }

    key.truncate(len);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &[u8] = include_bytes!("../testdata/rsa_a.pem");
    const LEGACY: &[u8] = include_bytes!("../testdata/rsa_a_legacy.pem");
    const LEGACY_SECRET: &[u8] = include_bytes!("../testdata/rsa_a_legacy_secret.pem");
    const LEGACY_3DES: &[u8] = include_bytes!("../testdata/rsa_a_legacy_3des.pem");

    #[test]
    fn test_parse_plain_block() {
        let key = PemKey::parse(PLAIN).unwrap();
        assert_eq!(key.label(), "RSA PRIVATE KEY");
        assert!(!key.is_encrypted());
    }

    #[test]
    fn test_parse_encrypted_block() {
        let key = PemKey::parse(LEGACY).unwrap();
        assert_eq!(key.label(), "RSA PRIVATE KEY");
        assert!(key.is_encrypted());

        match key {
            PemKey::Encrypted { cipher, iv, .. } => {
                assert_eq!(cipher, DekCipher::Aes256Cbc);
                assert_eq!(hex::encode_upper(iv), "00112233445566778899AABBCCDDEEFF");
            }
            PemKey::Plain { .. } => panic!("expected an encrypted block"),
        }
    }

    #[test]
    fn test_empty_passphrase_unlocks_legacy_block() {
        let plain = PemKey::parse(PLAIN).unwrap().into_der(b"").unwrap();
        let legacy = PemKey::parse(LEGACY).unwrap().into_der(b"").unwrap();

        assert_eq!(legacy.as_bytes(), plain.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_unlocks_3des_block() {
        let key = PemKey::parse(LEGACY_3DES).unwrap();
        match &key {
            PemKey::Encrypted { cipher, iv, .. } => {
                assert_eq!(*cipher, DekCipher::DesEde3Cbc);
                assert_eq!(iv.len(), 8);
            }
            PemKey::Plain { .. } => panic!("expected an encrypted block"),
        }

        let plain = PemKey::parse(PLAIN).unwrap().into_der(b"").unwrap();
        assert_eq!(key.into_der(b"").unwrap().as_bytes(), plain.as_bytes());
    }

    #[test]
    fn test_des_ciphers_use_8_byte_ivs() {
        assert_eq!(DekCipher::parse("DES-CBC").unwrap(), DekCipher::DesCbc);
        assert_eq!(DekCipher::DesCbc.key_len(), 8);
        assert_eq!(DekCipher::DesEde3Cbc.key_len(), 24);
        assert_eq!(DekCipher::DesCbc.block_size(), 8);

        // A 16-byte IV is valid for AES but not for 3DES.
        let text = String::from_utf8(LEGACY.to_vec())
            .unwrap()
            .replace("AES-256-CBC", "DES-EDE3-CBC");
        assert!(matches!(PemKey::parse(text.as_bytes()), Err(Error::Format(_))));
    }

    #[test]
    fn test_wrong_passphrase_is_key_error() {
        let result = PemKey::parse(LEGACY_SECRET).unwrap().into_der(b"");
        assert!(matches!(result, Err(Error::Key(_))));

        let der = PemKey::parse(LEGACY_SECRET).unwrap().into_der(b"secret").unwrap();
        let plain = PemKey::parse(PLAIN).unwrap().into_der(b"").unwrap();
        assert_eq!(der.as_bytes(), plain.as_bytes());
    }

    #[test]
    fn test_malformed_pem_is_format_error() {
        assert!(matches!(PemKey::parse(b"not a pem"), Err(Error::Format(_))));
    }

    #[test]
    fn test_unsupported_cipher_is_format_error() {
        let text = String::from_utf8(LEGACY.to_vec())
            .unwrap()
            .replace("AES-256-CBC", "RC2-CBC");
        assert!(matches!(PemKey::parse(text.as_bytes()), Err(Error::Format(_))));
    }

    #[test]
    fn test_encode_plain_roundtrip() {
        let text = encode_plain("RSA PUBLIC KEY", b"\x30\x03\x02\x01\x05");
        assert!(text.starts_with("-----BEGIN RSA PUBLIC KEY-----\n"));
        assert!(!text.contains('\r'));

        let parsed = PemKey::parse(text.as_bytes()).unwrap();
        assert_eq!(parsed.label(), "RSA PUBLIC KEY");
        assert_eq!(parsed.into_der(b"").unwrap().as_bytes(), b"\x30\x03\x02\x01\x05");
    }

    #[test]
    fn test_evp_bytes_to_key_lengths() {
        let salt = [1u8; 8];
        assert_eq!(evp_bytes_to_key(b"", &salt, 8).len(), 8);
        assert_eq!(evp_bytes_to_key(b"", &salt, 16).len(), 16);
        assert_eq!(evp_bytes_to_key(b"", &salt, 24).len(), 24);
        assert_eq!(evp_bytes_to_key(b"", &salt, 32).len(), 32);
        // Shorter keys are prefixes of longer ones.
        assert_eq!(
            evp_bytes_to_key(b"", &salt, 16)[..],
            evp_bytes_to_key(b"", &salt, 32)[..16]
        );
    }
}
