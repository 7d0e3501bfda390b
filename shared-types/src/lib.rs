#![cfg_attr(not(test), no_std)]

//! Wire-level vocabulary of the power manager: register map, BCD packing,
//! packed schedule records and firmware version gating.

pub mod bcd;
pub mod registers;
pub mod schedule;
pub mod version;

pub use registers::{Access, Register};
pub use schedule::{Action, DayMatch, Recurrence, ScheduleRecord, Weekday};
pub use version::{Feature, FirmwareVersion};
