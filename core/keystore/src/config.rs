//! Keystore configuration and manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use kryptr_common::{Error, Result};
use kryptr_crypto::DEFAULT_KEY_BITS;

/// Private key file name in the key directory.
pub const PRIVATE_KEY_FILENAME: &str = "kryptr_rsa";

/// Public key file name in the key directory.
pub const PUBLIC_KEY_FILENAME: &str = "kryptr_rsa.pub";

/// Wrapped salt file name in the key directory.
pub const WRAPPED_SALT_FILENAME: &str = "kryptr_enc";

/// Manifest file name in the key directory.
pub const MANIFEST_FILENAME: &str = "keystore.json";

/// Key directory name under the home directory.
pub const DEFAULT_DIRNAME: &str = ".kryptr.d";

/// Where key material lives and how new key pairs are generated.
///
/// Passed explicitly to the keystore so tests and alternate installs can
/// point it anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreConfig {
    dir: PathBuf,
    key_bits: usize,
}

impl KeystoreConfig {
    /// Create a configuration for the given key directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Configuration for the per-user directory, `~/.kryptr.d`.
    ///
    /// # Errors
    /// - `NotFound` if the home directory cannot be determined
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::NotFound("Cannot determine home directory".to_string()))?;
        Ok(Self::new(home.join(DEFAULT_DIRNAME)))
    }

    /// Set the RSA key size used by setup.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Key directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// RSA modulus size used by setup.
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }
}

/// Manifest format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestVersion {
    pub major: u32,
    pub minor: u32,
}

impl ManifestVersion {
    /// Current manifest format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for ManifestVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Record of the setup that produced the current key material.
///
/// Key directories written before the manifest existed have none, and
/// still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreManifest {
    /// Manifest format version.
    pub version: ManifestVersion,
    /// RSA modulus size in bits.
    pub key_bits: usize,
    /// When setup ran.
    pub created_at: DateTime<Utc>,
}

impl KeystoreManifest {
    /// Create a manifest for a key pair generated now.
    pub fn new(key_bits: usize) -> Self {
        Self {
            version: ManifestVersion::CURRENT,
            key_bits,
            created_at: Utc::now(),
        }
    }

    /// Reject manifests written by an incompatible release.
    ///
    /// # Errors
    /// - `Format` if the major version differs
    pub fn ensure_compatible(&self) -> Result<()> {
        if !self.version.is_compatible() {
            return Err(Error::Format(format!(
                "Incompatible keystore version: {}.{}",
                self.version.major, self.version.minor
            )));
        }
        Ok(())
    }

    /// Serialize manifest to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize manifest from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
