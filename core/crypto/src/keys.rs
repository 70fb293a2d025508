//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::{rngs::OsRng, seq::SliceRandom, Rng};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use kryptr_common::{Error, Result};

/// Length of symmetric keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Characters drawn from each pool when generating a salt.
pub const SALT_CHARS_PER_POOL: usize = 8;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SYMBOLS: &[u8] = b"~!@#$%^&*?|=_+[]{}.,<>:;";
const DIGITS: &[u8] = b"0123456789";

/// Character pools a salt samples from, in order.
pub const SALT_POOLS: [&[u8]; 4] = [LOWERCASE, UPPERCASE, SYMBOLS, DIGITS];

/// Length of a generated salt in characters.
pub const SALT_LENGTH: usize = SALT_CHARS_PER_POOL * SALT_POOLS.len();

/// AES-256 key used to seal and open blobs.
///
/// Never persisted. It is either derived per operation from the machine
/// fingerprint and the unwrapped salt, or supplied as a legacy password.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_LENGTH],
}

impl SymmetricKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a key from a slice, checking its length.
    ///
    /// # Errors
    /// - `InvalidInput` if `bytes` is not exactly KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Render this key as the printable password accepted by recovery.
    ///
    /// # Errors
    /// - `InvalidInput` if the key bytes are not printable ASCII
    pub fn to_recovery_password(&self) -> Result<RecoveryPassword> {
        if !self.key.iter().all(|b| b.is_ascii_graphic()) {
            return Err(Error::InvalidInput(
                "Key is not representable as a recovery password".to_string(),
            ));
        }
        let password = self.key.iter().map(|&b| b as char).collect();
        Ok(RecoveryPassword(password))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Secret salt mixed into key derivation.
///
/// Generated salts are printable, but a salt unwrapped from disk is kept
/// as raw bytes since older key directories may hold anything.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generate a random salt.
    ///
    /// # Postconditions
    /// - SALT_LENGTH characters, SALT_CHARS_PER_POOL from each pool
    /// - Pool order is erased by a full shuffle
    ///
    /// # Security
    /// Sampling and shuffling both draw from the operating system RNG.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let mut chars = Vec::with_capacity(SALT_LENGTH);

        for pool in SALT_POOLS {
            for _ in 0..SALT_CHARS_PER_POOL {
                chars.push(pool[rng.gen_range(0..pool.len())]);
            }
        }
        chars.shuffle(&mut rng);

        Self(chars)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt([REDACTED; {} bytes])", self.0.len())
    }
}

/// Password shown once at setup, usable later with recovery.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RecoveryPassword(String);

impl RecoveryPassword {
    /// Get the password text.
    ///
    /// # Security
    /// Only for display to the user; never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecoveryPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoveryPassword([REDACTED])")
    }
}
