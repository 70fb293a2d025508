//! Decryption with an explicitly supplied legacy key.
//!
//! Used for blobs whose key set has since been rotated by a new setup.
//! The password is the AES-256 key itself; no derivation takes place.

use crate::aead::decrypt;
use crate::keys::SymmetricKey;
use kryptr_common::Result;

/// Decrypt a blob with a legacy password.
///
/// # Errors
/// - `InvalidInput` if the password is not exactly 32 bytes, checked before
///   the blob is looked at
/// - Otherwise the errors of [`decrypt`]
pub fn recover(blob: &[u8], legacy_password: &[u8]) -> Result<Vec<u8>> {
    let key = SymmetricKey::from_slice(legacy_password)?;
    decrypt(&key, blob)
}
