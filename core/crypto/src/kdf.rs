//! Symmetric key derivation from a machine fingerprint and a salt.
//!
//! The derivation input is the salt followed by the SHA-256 digest of the
//! fingerprint. It is encoded as unpadded standard base64, each character
//! is substituted through a fixed table, and the first KEY_LENGTH
//! characters become the AES-256 key.
//!
//! Only the first 24 input bytes reach the key. With a full-length salt
//! that means the key is a function of the salt alone, which is what lets
//! the recovery password printed at setup open blobs on any machine.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::keys::{Salt, SymmetricKey, KEY_LENGTH};
use kryptr_common::MachineFingerprint;

/// Substitution for each standard base64 digit. `+` appears at indices 0
/// and 40, so the mapping is not invertible.
const KEY_TABLE: &[u8; 64] =
    b"+!@#0123456789$%:|ABCDEHTUVWacdeifXYZ^&*+?klmnopMNPQRSqrstuvwxyz";

/// Map a standard base64 character to its key table character.
fn substitute(c: u8) -> u8 {
    let index = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'+' => 62,
        _ => 63,
    };
    KEY_TABLE[index as usize]
}

/// Derive the symmetric key for a fingerprint and an unwrapped salt.
///
/// # Postconditions
/// - Identical inputs always produce the identical key
/// - Every key byte is a character of the key alphabet
///
/// # Security
/// Intermediate buffers are zeroized before returning.
pub fn derive_key(fingerprint: &MachineFingerprint, salt: &Salt) -> SymmetricKey {
    let digest = Sha256::digest(fingerprint.as_bytes());

    let mut input = Zeroizing::new(Vec::with_capacity(salt.len() + digest.len()));
    input.extend_from_slice(salt.as_bytes());
    input.extend_from_slice(&digest);

    // A 32-byte digest alone encodes to 43 characters, so there is always
    // at least KEY_LENGTH to take.
    let encoded = Zeroizing::new(STANDARD_NO_PAD.encode(input.as_slice()));

    let mut key = [0u8; KEY_LENGTH];
    for (dst, &src) in key.iter_mut().zip(encoded.as_bytes()) {
        *dst = substitute(src);
    }
    SymmetricKey::from_bytes(key)
}
