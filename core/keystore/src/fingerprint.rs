//! Machine fingerprint providers.

use pnet_datalink::{MacAddr, NetworkInterface};
use tracing::{debug, warn};

use kryptr_common::{MachineFingerprint, Result};

/// Source of the machine fingerprint used in key derivation.
pub trait FingerprintProvider: Send + Sync {
    /// Compute the fingerprint for this machine.
    ///
    /// # Errors
    /// - `Io` if the machine identity cannot be read
    fn fingerprint(&self) -> Result<MachineFingerprint>;
}

/// Fingerprint from the first active network interface and the hostname.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFingerprint;

impl SystemFingerprint {
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintProvider for SystemFingerprint {
    fn fingerprint(&self) -> Result<MachineFingerprint> {
        let candidates = pnet_datalink::interfaces()
            .iter()
            .map(InterfaceCandidate::from)
            .collect();
        let hardware_address = first_hardware_address(candidates);

        let hostname = hostname::get()?.to_string_lossy().into_owned();

        match &hardware_address {
            Some(_) => debug!("Fingerprint uses hardware address and hostname"),
            None => warn!("No active interface with a hardware address, fingerprint uses hostname only"),
        }

        Ok(MachineFingerprint::new(hardware_address.as_deref(), &hostname))
    }
}

/// Fingerprint fixed at construction.
///
/// Used by tests, and to derive keys that are not bound to a machine.
#[derive(Debug, Clone)]
pub struct FixedFingerprint {
    fingerprint: MachineFingerprint,
}

impl FixedFingerprint {
    pub fn new(hardware_address: Option<&str>, hostname: &str) -> Self {
        Self {
            fingerprint: MachineFingerprint::new(hardware_address, hostname),
        }
    }
}

impl FingerprintProvider for FixedFingerprint {
    fn fingerprint(&self) -> Result<MachineFingerprint> {
        Ok(self.fingerprint.clone())
    }
}

/// The parts of an interface that fingerprint selection looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InterfaceCandidate {
    index: u32,
    up: bool,
    mac: Option<MacAddr>,
}

impl From<&NetworkInterface> for InterfaceCandidate {
    fn from(iface: &NetworkInterface) -> Self {
        Self {
            index: iface.index,
            up: iface.is_up(),
            mac: iface.mac,
        }
    }
}

/// Hardware address of the lowest-index interface that is up and has a
/// non-zero address, formatted as `aa:bb:cc:dd:ee:ff`.
fn first_hardware_address(mut candidates: Vec<InterfaceCandidate>) -> Option<String> {
    candidates.sort_by_key(|c| c.index);
    candidates
        .into_iter()
        .filter(|c| c.up)
        .find_map(|c| c.mac.filter(|mac| *mac != MacAddr::zero()))
        .map(|mac| mac.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: u32, up: bool, mac: Option<MacAddr>) -> InterfaceCandidate {
        InterfaceCandidate { index, up, mac }
    }

    #[test]
    fn test_first_up_interface_with_address_wins() {
        let candidates = vec![
            candidate(3, true, Some(MacAddr::new(0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5f))),
            candidate(1, true, Some(MacAddr::zero())),
            candidate(2, false, Some(MacAddr::new(0xde, 0xad, 0xbe, 0xef, 0x00, 0x01))),
            candidate(4, true, None),
            candidate(2, true, Some(MacAddr::new(0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e))),
        ];

        assert_eq!(
            first_hardware_address(candidates).as_deref(),
            Some("00:1a:2b:3c:4d:5e")
        );
    }

    #[test]
    fn test_no_usable_interface() {
        let candidates = vec![
            candidate(1, true, Some(MacAddr::zero())),
            candidate(2, false, Some(MacAddr::new(1, 2, 3, 4, 5, 6))),
            candidate(3, true, None),
        ];

        assert_eq!(first_hardware_address(candidates), None);
        assert_eq!(first_hardware_address(Vec::new()), None);
    }

    #[test]
    fn test_fixed_fingerprint() {
        let provider = FixedFingerprint::new(Some("00:1a:2b:3c:4d:5e"), "workstation");
        let fp = provider.fingerprint().unwrap();

        assert_eq!(fp.as_bytes(), b"00:1a:2b:3c:4d:5eworkstation");
        assert!(fp.has_hardware_address());
        assert_eq!(provider.fingerprint().unwrap(), fp);
    }

    #[test]
    fn test_system_fingerprint_is_stable() {
        let provider = SystemFingerprint::new();
        let first = provider.fingerprint().unwrap();
        let second = provider.fingerprint().unwrap();

        assert!(!first.as_bytes().is_empty());
        assert_eq!(first, second);
    }
}
