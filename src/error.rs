use std::path::PathBuf;

use embedded_hal::digital;
use shared_types::{Feature, FirmwareVersion};

use crate::config::MAX_SCHEDULES;
use crate::firmware_update::FlashPhase;

/// Malformed schedule input from the command line or a CSV file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected} fields, got {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid {field} value '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} cannot be a wildcard")]
    Wildcard { field: &'static str },

    #[error("{field} '{value}' cannot follow a wildcard on firmware {version}; update the firmware")]
    WildcardCombination {
        field: &'static str,
        value: String,
        version: FirmwareVersion,
    },

    #[error("line {line}: {source}: {content}")]
    Line {
        line: usize,
        content: String,
        source: Box<ParseError>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PmgrError {
    #[error("no power manager at address {address:#04x} (identity {found:#010x}); check the board setup and the secondary address switch")]
    IdentityMismatch { address: u8, found: u32 },

    #[error("firmware {0} is newer than this tool understands; update the tool")]
    UnsupportedFirmware(FirmwareVersion),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{option} value {value} is invalid, expected {expected}")]
    InvalidValue {
        option: &'static str,
        value: i64,
        expected: String,
    },

    #[error("{} is not available on firmware {version}; update the firmware", .feature.name())]
    FeatureUnsupported {
        feature: Feature,
        version: FirmwareVersion,
    },

    #[error("schedule table is full: {stored} stored, {requested} requested, limit {}", MAX_SCHEDULES)]
    CapacityExceeded { stored: u8, requested: usize },

    #[error("no schedule #{index:03}, {count} stored")]
    ScheduleIndex { index: u8, count: u8 },

    #[error("shutdown request and complete signals cannot share GPIO{0}")]
    SignalConflict(u8),

    #[error("current log reports {0} samples")]
    CurrentLogCorrupt(u16),

    #[error("clock registers hold an invalid timestamp {0:02x?}")]
    InvalidTimestamp([u8; 7]),

    #[error("{tool} could not be started: {source}")]
    ExternalToolMissing {
        tool: String,
        source: std::io::Error,
    },

    #[error("flashing failed during {phase}: {detail}")]
    ExternalToolFailure { phase: FlashPhase, detail: String },

    #[error("cannot read firmware image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("GPIO line error: {0:?}")]
    Gpio(digital::ErrorKind),

    #[error("cancelled")]
    Cancelled,
}

impl PmgrError {
    pub(crate) fn gpio<E: digital::Error>(error: E) -> Self {
        PmgrError::Gpio(error.kind())
    }
}
