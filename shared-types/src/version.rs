use core::fmt;

use serde::{Deserialize, Serialize};

/// Firmware version as reported at register 0x14, wire order `[patch, minor]`.
///
/// Firmware lines are numbered by `minor` (1.x, 2.x). A higher line is
/// assumed to carry every feature of the lower lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    // Field order gives the derived Ord line-major ordering
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub const fn new(minor: u8, patch: u8) -> Self {
        Self { minor, patch }
    }

    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            minor: bytes[1],
            patch: bytes[0],
        }
    }

    pub const fn to_bytes(self) -> [u8; 2] {
        [self.patch, self.minor]
    }

    /// Same line with at least `min.patch`, or any later line.
    pub const fn is_supported(self, min: FirmwareVersion) -> bool {
        (self.minor == min.minor && self.patch >= min.patch) || self.minor > min.minor
    }

    /// Whether this version is listed in `table` (line, newest known patch).
    pub fn is_known(self, table: &[FirmwareVersion]) -> bool {
        table
            .iter()
            .find(|newest| newest.minor == self.minor)
            .is_some_and(|newest| self.patch <= newest.patch)
    }

    /// Checks against the threshold of this version's own line. A line with
    /// no entry must be newer than every listed line.
    pub fn supports(self, feature: Feature) -> bool {
        let thresholds = feature.thresholds();
        match thresholds.iter().find(|min| min.minor == self.minor) {
            Some(&min) => self.is_supported(min),
            None => thresholds.iter().all(|&min| self.is_supported(min)),
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.minor, self.patch)
    }
}

/// Newest patch of each firmware line this protocol layer understands.
pub const COMPATIBLE_FIRMWARE: [FirmwareVersion; 2] =
    [FirmwareVersion::new(1, 7), FirmwareVersion::new(2, 4)];

// First version of each line, 1.x and 2.x
const OPTIONAL_SETTINGS_SINCE: [FirmwareVersion; 2] =
    [FirmwareVersion::new(1, 4), FirmwareVersion::new(2, 1)];
const WILDCARD_COMBINATION_SINCE: [FirmwareVersion; 2] =
    [FirmwareVersion::new(1, 3), FirmwareVersion::new(2, 0)];
const IMMEDIATE_SHUTDOWN_SINCE: [FirmwareVersion; 2] =
    [FirmwareVersion::new(1, 6), FirmwareVersion::new(2, 3)];

/// Optional device features that only some firmware versions provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Feature {
    /// Register 0x1C
    AutoRecovery,
    /// Register 0x1D
    UsbWake,
    /// Concrete day or month after a wildcard hour/day in one schedule
    WildcardCombination,
    /// Zero-delay relative schedule becomes a direct shutdown request
    ImmediateShutdown,
}

impl Feature {
    /// First version of each firmware line that provides the feature.
    pub const fn thresholds(self) -> &'static [FirmwareVersion] {
        match self {
            Feature::AutoRecovery | Feature::UsbWake => &OPTIONAL_SETTINGS_SINCE,
            Feature::WildcardCombination => &WILDCARD_COMBINATION_SINCE,
            Feature::ImmediateShutdown => &IMMEDIATE_SHUTDOWN_SINCE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Feature::AutoRecovery => "auto recovery",
            Feature::UsbWake => "USB wake",
            Feature::WildcardCombination => "date after wildcard",
            Feature::ImmediateShutdown => "immediate shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_wire() {
        let version = FirmwareVersion::from_bytes([4, 2]);
        assert_eq!(version, FirmwareVersion::new(2, 4));
        assert_eq!(version.to_bytes(), [4, 2]);
        assert_eq!(version.to_string(), "2.4");
    }

    #[test]
    fn test_is_supported() {
        let min = FirmwareVersion::new(1, 4);
        assert!(FirmwareVersion::new(1, 4).is_supported(min));
        assert!(FirmwareVersion::new(1, 7).is_supported(min));
        assert!(!FirmwareVersion::new(1, 3).is_supported(min));
        assert!(FirmwareVersion::new(2, 0).is_supported(min));
        assert!(!FirmwareVersion::new(0, 9).is_supported(min));
    }

    #[test]
    fn test_known_firmware() {
        assert!(FirmwareVersion::new(1, 0).is_known(&COMPATIBLE_FIRMWARE));
        assert!(FirmwareVersion::new(1, 7).is_known(&COMPATIBLE_FIRMWARE));
        assert!(!FirmwareVersion::new(1, 8).is_known(&COMPATIBLE_FIRMWARE));
        assert!(FirmwareVersion::new(2, 4).is_known(&COMPATIBLE_FIRMWARE));
        assert!(!FirmwareVersion::new(2, 5).is_known(&COMPATIBLE_FIRMWARE));
        assert!(!FirmwareVersion::new(3, 0).is_known(&COMPATIBLE_FIRMWARE));
        assert!(!FirmwareVersion::new(0, 0).is_known(&COMPATIBLE_FIRMWARE));
    }

    #[test]
    fn test_auto_recovery_thresholds() {
        assert!(!FirmwareVersion::new(1, 3).supports(Feature::AutoRecovery));
        assert!(FirmwareVersion::new(1, 4).supports(Feature::AutoRecovery));
        assert!(!FirmwareVersion::new(2, 0).supports(Feature::AutoRecovery));
        assert!(FirmwareVersion::new(2, 1).supports(Feature::UsbWake));
        assert!(FirmwareVersion::new(3, 0).supports(Feature::UsbWake));
        assert!(!FirmwareVersion::new(0, 9).supports(Feature::UsbWake));
    }

    #[test]
    fn test_wildcard_combination_thresholds() {
        assert!(!FirmwareVersion::new(1, 2).supports(Feature::WildcardCombination));
        assert!(FirmwareVersion::new(1, 3).supports(Feature::WildcardCombination));
        assert!(FirmwareVersion::new(2, 0).supports(Feature::WildcardCombination));
    }

    #[test]
    fn test_threshold_tables_are_static() {
        let thresholds: &'static [FirmwareVersion] = Feature::UsbWake.thresholds();
        assert_eq!(
            thresholds,
            [FirmwareVersion::new(1, 4), FirmwareVersion::new(2, 1)]
        );
        assert_eq!(
            Feature::ImmediateShutdown.thresholds(),
            [FirmwareVersion::new(1, 6), FirmwareVersion::new(2, 3)]
        );
    }

    #[test]
    fn test_supports_matches_is_supported_on_own_line() {
        for feature in [
            Feature::AutoRecovery,
            Feature::WildcardCombination,
            Feature::ImmediateShutdown,
        ] {
            for &min in feature.thresholds() {
                for patch in 0..10 {
                    let version = FirmwareVersion::new(min.minor, patch);
                    assert_eq!(version.supports(feature), version.is_supported(min));
                }
            }
        }
    }

    #[test]
    fn test_immediate_shutdown_thresholds() {
        assert!(!FirmwareVersion::new(1, 5).supports(Feature::ImmediateShutdown));
        assert!(FirmwareVersion::new(1, 6).supports(Feature::ImmediateShutdown));
        assert!(!FirmwareVersion::new(2, 2).supports(Feature::ImmediateShutdown));
        assert!(FirmwareVersion::new(2, 3).supports(Feature::ImmediateShutdown));
    }
}
