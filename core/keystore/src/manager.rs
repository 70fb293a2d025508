//! Keystore operations over the persisted key material.

use rsa::{traits::PublicKeyParts, RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{
    KeystoreConfig, KeystoreManifest, MANIFEST_FILENAME, PRIVATE_KEY_FILENAME,
    PUBLIC_KEY_FILENAME, WRAPPED_SALT_FILENAME,
};
use crate::fingerprint::{FingerprintProvider, SystemFingerprint};
use crate::storage::KeyDirectory;
use kryptr_common::{Error, Result};
use kryptr_crypto::keypair::{parse_private_key_pem, parse_public_key_pem};
use kryptr_crypto::{self as crypto, KeyPair, RecoveryPassword, Salt, SymmetricKey};

/// Result of a successful setup.
#[derive(Debug)]
pub struct SetupReport {
    /// Shown to the user once; opens every blob encrypted under this key set.
    pub recovery_password: RecoveryPassword,
    /// Manifest written for the new key set.
    pub manifest: KeystoreManifest,
}

/// What the key directory currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct KeystoreInfo {
    pub dir: PathBuf,
    pub private_key: bool,
    pub public_key: bool,
    pub wrapped_salt: bool,
    /// Modulus size read from the public key.
    pub key_bits: Option<usize>,
    /// Absent for key directories written before manifests existed.
    pub manifest: Option<KeystoreManifest>,
}

impl KeystoreInfo {
    /// Whether encrypt and decrypt can run.
    pub fn is_ready(&self) -> bool {
        self.private_key && self.wrapped_salt
    }
}

/// Key material on disk and the operations that use it.
pub struct Keystore {
    config: KeystoreConfig,
    dir: KeyDirectory,
    fingerprint: Arc<dyn FingerprintProvider>,
}

impl Keystore {
    /// Create a keystore bound to this machine's fingerprint.
    pub fn new(config: KeystoreConfig) -> Self {
        Self::with_fingerprint_provider(config, Arc::new(SystemFingerprint::new()))
    }

    /// Create with a custom fingerprint provider.
    pub fn with_fingerprint_provider(
        config: KeystoreConfig,
        fingerprint: Arc<dyn FingerprintProvider>,
    ) -> Self {
        let dir = KeyDirectory::new(config.dir());
        Self {
            config,
            dir,
            fingerprint,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &KeystoreConfig {
        &self.config
    }

    /// Get the key directory.
    pub fn directory(&self) -> &KeyDirectory {
        &self.dir
    }

    /// Generate a new key pair and salt, replacing any existing key set.
    ///
    /// # Preconditions
    /// - `config.key_bits()` is at least 2048
    ///
    /// # Postconditions
    /// - Private key, public key and wrapped salt are staged in full before
    ///   any of them replaces its predecessor, then the manifest is written
    /// - Blobs encrypted under the previous key set only open through
    ///   recovery with that set's password
    ///
    /// # Errors
    /// - `Cancelled` if `cancel` fires before generation finishes; the call
    ///   returns without waiting for the generator and nothing is written
    /// - `InvalidInput` if the key size is too small
    /// - `Crypto` if generation or wrapping fails
    /// - `Io` if the key directory cannot be created or written
    pub async fn setup(&self, cancel: &CancellationToken) -> Result<SetupReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("Setup cancelled".to_string()));
        }

        let bits = self.config.key_bits();
        info!(dir = %self.dir.root().display(), bits, "Generating key material");

        // Detached thread: runtime shutdown never waits on it, and the result
        // of a cancelled generation is dropped when the thread finishes.
        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("kryptr-keygen".to_string())
            .spawn(move || {
                let _ = tx.send(KeyPair::generate(bits));
            })?;

        let pair = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Setup cancelled during key generation");
                return Err(Error::Cancelled(
                    "Setup cancelled during key generation".to_string(),
                ));
            }
            generated = rx => generated
                .map_err(|_| Error::Crypto("Key generation thread exited early".to_string()))??,
        };

        let salt = Salt::generate();
        let wrapped = crypto::wrap_salt(pair.public_key(), &salt)?;
        let fingerprint = self.fingerprint.fingerprint()?;
        let recovery_password = crypto::derive_key(&fingerprint, &salt).to_recovery_password()?;

        let private_pem = pair.private_key_pem()?;
        let public_pem = pair.public_key_pem()?;
        let manifest = KeystoreManifest::new(pair.bits());
        let manifest_json = manifest.to_json()?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled("Setup cancelled".to_string()));
        }

        // Key files are staged as one batch; the manifest goes last.
        self.dir.ensure_exists()?;
        self.dir.write_batch(&[
            (PRIVATE_KEY_FILENAME, private_pem.as_bytes()),
            (PUBLIC_KEY_FILENAME, public_pem.as_bytes()),
            (WRAPPED_SALT_FILENAME, wrapped.as_bytes()),
        ])?;
        self.dir.write(MANIFEST_FILENAME, manifest_json.as_bytes())?;

        info!(dir = %self.dir.root().display(), bits = manifest.key_bits, "Key material written");

        Ok(SetupReport {
            recovery_password,
            manifest,
        })
    }

    /// Load the private key.
    ///
    /// # Errors
    /// - `NotFound` if setup has not run
    /// - `Format` or `Key` if the file does not parse
    pub fn load_private_key(&self) -> Result<RsaPrivateKey> {
        let pem = self.require(PRIVATE_KEY_FILENAME)?;
        parse_private_key_pem(&pem)
    }

    /// Load the public key.
    ///
    /// # Errors
    /// - `NotFound` if setup has not run
    /// - `Format` or `Key` if the file does not parse
    pub fn load_public_key(&self) -> Result<RsaPublicKey> {
        let pem = self.require(PUBLIC_KEY_FILENAME)?;
        parse_public_key_pem(&pem)
    }

    /// Load the manifest, if the directory has one.
    ///
    /// # Errors
    /// - `Serialization` if it does not parse
    /// - `Format` if it was written by an incompatible release
    pub fn load_manifest(&self) -> Result<Option<KeystoreManifest>> {
        if !self.dir.exists(MANIFEST_FILENAME) {
            return Ok(None);
        }
        let manifest = KeystoreManifest::from_bytes(&self.dir.read(MANIFEST_FILENAME)?)?;
        manifest.ensure_compatible()?;
        Ok(Some(manifest))
    }

    /// Unwrap the persisted salt with the private key.
    ///
    /// # Errors
    /// - `NotFound` if key material is missing
    /// - `KeyMismatch` if the private key is not the one the salt was wrapped for
    /// - Otherwise the errors of [`crypto::unwrap_salt`]
    pub fn unwrap_salt(&self) -> Result<Salt> {
        self.load_manifest()?;
        let private = self.load_private_key()?;
        let wrapped = self.require(WRAPPED_SALT_FILENAME)?;
        crypto::unwrap_salt(&private, &wrapped)
    }

    /// Derive the symmetric key for this machine and key set.
    pub fn derive_key(&self) -> Result<SymmetricKey> {
        let salt = self.unwrap_salt()?;
        let fingerprint = self.fingerprint.fingerprint()?;
        if !fingerprint.has_hardware_address() {
            debug!("Deriving key from a hostname-only fingerprint");
        }
        Ok(crypto::derive_key(&fingerprint, &salt))
    }

    /// Encrypt bytes into blob text.
    ///
    /// # Errors
    /// - Errors of [`Keystore::derive_key`]
    /// - `Crypto` if encryption fails
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let key = self.derive_key()?;
        let blob = crypto::encrypt(&key, plaintext)?;
        debug!(plaintext_len = plaintext.len(), blob_len = blob.len(), "Encrypted");
        Ok(blob)
    }

    /// Decrypt blob text with the derived key.
    ///
    /// # Errors
    /// - Errors of [`Keystore::derive_key`]
    /// - `Format` if the blob is malformed
    /// - `Authentication` if the blob was tampered with or belongs to
    ///   another key set
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let key = self.derive_key()?;
        let plaintext = crypto::decrypt(&key, blob)?;
        debug!(plaintext_len = plaintext.len(), "Decrypted");
        Ok(plaintext)
    }

    /// Decrypt blob text with a recovery password from an earlier setup.
    ///
    /// Key material on disk is not consulted.
    ///
    /// # Errors
    /// - `InvalidInput` if the password is not 32 bytes
    /// - Otherwise as [`Keystore::decrypt`]
    pub fn recover(&self, blob: &[u8], password: &[u8]) -> Result<Vec<u8>> {
        let plaintext = crypto::recover(blob, password)?;
        info!(plaintext_len = plaintext.len(), "Recovered with legacy password");
        Ok(plaintext)
    }

    /// Report what the key directory holds.
    ///
    /// # Errors
    /// - `Format`, `Key` or `Serialization` if present files do not parse
    pub fn info(&self) -> Result<KeystoreInfo> {
        let public_key = self.dir.exists(PUBLIC_KEY_FILENAME);
        let key_bits = if public_key {
            Some(self.load_public_key()?.size() * 8)
        } else {
            None
        };

        Ok(KeystoreInfo {
            dir: self.dir.root().to_path_buf(),
            private_key: self.dir.exists(PRIVATE_KEY_FILENAME),
            public_key,
            wrapped_salt: self.dir.exists(WRAPPED_SALT_FILENAME),
            key_bits,
            manifest: self.load_manifest()?,
        })
    }

    fn require(&self, name: &str) -> Result<Vec<u8>> {
        if !self.dir.exists(name) {
            return Err(Error::NotFound(format!(
                "{} is missing from {}, run `kryptr setup` first",
                name,
                self.dir.root().display()
            )));
        }
        self.dir.read(name)
    }
}
