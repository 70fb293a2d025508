//! Key directory and file operations for kryptr.
//!
//! This module provides:
//! - The on-disk key directory with atomic, permission-restricted writes
//! - Machine fingerprint providers
//! - Setup, encrypt, decrypt and recover over persisted key material
//!
//! # Architecture
//! The keystore sits between the command line and the cryptographic
//! primitives. It owns every read and write of key material; the
//! primitives never touch the filesystem.

pub mod config;
pub mod fingerprint;
pub mod manager;
pub mod storage;

pub use config::{KeystoreConfig, KeystoreManifest, ManifestVersion};
pub use fingerprint::{FingerprintProvider, FixedFingerprint, SystemFingerprint};
pub use manager::{Keystore, KeystoreInfo, SetupReport};
pub use storage::{write_atomic, KeyDirectory};
