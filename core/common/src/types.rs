//! Common types used throughout kryptr.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Machine identity mixed into symmetric key derivation.
///
/// Built from the hardware address of the first usable network interface
/// followed by the hostname. It is recomputed for every derivation and is
/// never written to disk.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MachineFingerprint {
    value: String,
    has_hardware_address: bool,
}

impl MachineFingerprint {
    /// Create a fingerprint from an optional hardware address and a hostname.
    ///
    /// # Postconditions
    /// - Without a hardware address the fingerprint is the hostname alone
    pub fn new(hardware_address: Option<&str>, hostname: &str) -> Self {
        let mut value = String::with_capacity(
            hardware_address.map_or(0, str::len) + hostname.len(),
        );
        if let Some(addr) = hardware_address {
            value.push_str(addr);
        }
        value.push_str(hostname);

        Self {
            value,
            has_hardware_address: hardware_address.is_some_and(|a| !a.is_empty()),
        }
    }

    /// Get the fingerprint bytes fed into the hash.
    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }

    /// Whether a hardware address contributed to this fingerprint.
    pub fn has_hardware_address(&self) -> bool {
        self.has_hardware_address
    }
}

impl fmt::Debug for MachineFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachineFingerprint([REDACTED; hardware_address={}])",
            self.has_hardware_address
        )
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SensitiveBytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_concatenates_address_and_hostname() {
        let fp = MachineFingerprint::new(Some("00:1a:2b:3c:4d:5e"), "workstation");
        assert_eq!(fp.as_bytes(), b"00:1a:2b:3c:4d:5eworkstation");
        assert!(fp.has_hardware_address());
    }

    #[test]
    fn test_fingerprint_hostname_fallback() {
        let fp = MachineFingerprint::new(None, "workstation");
        assert_eq!(fp.as_bytes(), b"workstation");
        assert!(!fp.has_hardware_address());
    }

    #[test]
    fn test_fingerprint_debug_is_redacted() {
        let fp = MachineFingerprint::new(Some("00:1a:2b:3c:4d:5e"), "workstation");
        let debug = format!("{:?}", fp);
        assert!(!debug.contains("workstation"));
        assert!(!debug.contains("00:1a"));
    }

    #[test]
    fn test_sensitive_bytes_debug_is_redacted() {
        let secret = SensitiveBytes::new(b"hunter2".to_vec());
        assert_eq!(format!("{:?}", secret), "SensitiveBytes([REDACTED; 7 bytes])");
        assert_eq!(secret.len(), 7);
        assert!(!secret.is_empty());
    }
}
