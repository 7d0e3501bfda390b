//! Host-side control of the RPZ-PowerMGR power management controller.
//!
//! The bus, GPIO lines and delay provider come from the caller as
//! `embedded-hal` 1.0 implementations; this crate only speaks the register
//! protocol and drives the update sequence.

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod firmware_update;
pub mod operation;
pub mod rtc;
pub mod schedule;

pub use bus::{BusAddress, RegisterBus};
pub use device::{ConfigReport, ConfigureOp, DeviceConfig, PowerManager};
pub use error::{ParseError, PmgrError};
pub use firmware_update::{
    Confirm, FirmwareImage, FirmwareUpdater, FlashTool, Question, Stm32Flash, Updater,
};
pub use operation::{Controller, CurrentLogOp, FirmwareUpdateOp, Operation, Outcome, ScheduleOp};
pub use shared_types::{
    Action, DayMatch, Feature, FirmwareVersion, Recurrence, ScheduleRecord, Weekday,
};
