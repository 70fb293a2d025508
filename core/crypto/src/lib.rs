//! Cryptographic primitives for kryptr.
//!
//! This module provides:
//! - Authenticated encryption using AES-256-GCM with a nonce-prefixed blob
//! - Symmetric key derivation from a machine fingerprint and a wrapped salt
//! - RSA key pairs with PEM persistence and RSA-OAEP salt wrapping
//! - Decryption with an explicit legacy key for rotated key sets
//!
//! # Security Guarantees
//! - All key material is zeroized on drop
//! - No plaintext or key material is ever logged
//! - Every encryption draws a fresh nonce from the operating system RNG

pub mod aead;
pub mod armor;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod recovery;
pub mod wrap;

pub use aead::{decrypt, encrypt, open, seal};
pub use armor::PemKey;
pub use kdf::derive_key;
pub use keypair::{KeyPair, DEFAULT_KEY_BITS, MIN_KEY_BITS};
pub use keys::{RecoveryPassword, Salt, SymmetricKey, KEY_LENGTH};
pub use recovery::recover;
pub use wrap::{unwrap_salt, wrap_salt};
