use serde::{Deserialize, Serialize};

// Register map of the power manager:
// - 0x00 [7]: RTC, BCD seconds/minutes/hours/weekday/day/month/year, kept in UTC
// - 0x10 [4]: Device identity, little-endian u32
// - 0x14 [2]: Firmware version, [patch, minor]
// - 0x16 [1]: Startup timer in seconds
// - 0x17 [1]: Shutdown timer in seconds, 0 disables
// - 0x18 [1]: Shutdown request signal, index into the signal GPIO table
// - 0x19 [1]: Shutdown complete signal, index into the signal GPIO table
// - 0x1A [2]: Timezone offset in minutes, little-endian i16
// - 0x1C [1]: Auto recovery enable (firmware 1.4 / 2.1)
// - 0x1D [1]: USB Type-A wake enable (firmware 1.4 / 2.1)
// - 0x20 [2]: Present current draw in mA, little-endian u16
// - 0x22 [2]: Number of current log samples, little-endian u16
// - Write 0x24 [2]: Select current log sample, 0xFFFF restarts the log
// - 0x26 [2]: Selected current log sample in mA, little-endian u16
// - 0x30 [1]: Number of stored schedules
// - Write 0x31 [1]: Select schedule slot (1-based)
// - 0x32 [4]: Read the selected schedule, write appends a schedule
// - Write 0x36 [1]: Remove schedule slot, 0xFF removes all
// - Write 0x40 [1]: 0xFF requests an immediate shutdown

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    Rtc,
    DeviceId,
    FirmwareVersion,
    StartupTimer,
    ShutdownTimer,
    ShutdownRequestSignal,
    ShutdownCompleteSignal,
    TimeZone,
    AutoRecovery,
    UsbWake,
    Current,
    CurrentLogCount,
    CurrentLogIndex,
    CurrentLogSample,
    ScheduleCount,
    ScheduleIndex,
    ScheduleData,
    ScheduleRemove,
    ShutdownRequest,
}

impl Register {
    pub const fn address(self) -> u8 {
        match self {
            Register::Rtc => 0x00,
            Register::DeviceId => 0x10,
            Register::FirmwareVersion => 0x14,
            Register::StartupTimer => 0x16,
            Register::ShutdownTimer => 0x17,
            Register::ShutdownRequestSignal => 0x18,
            Register::ShutdownCompleteSignal => 0x19,
            Register::TimeZone => 0x1A,
            Register::AutoRecovery => 0x1C,
            Register::UsbWake => 0x1D,
            Register::Current => 0x20,
            Register::CurrentLogCount => 0x22,
            Register::CurrentLogIndex => 0x24,
            Register::CurrentLogSample => 0x26,
            Register::ScheduleCount => 0x30,
            Register::ScheduleIndex => 0x31,
            Register::ScheduleData => 0x32,
            Register::ScheduleRemove => 0x36,
            Register::ShutdownRequest => 0x40,
        }
    }

    /// Size of the register block in bytes.
    pub const fn width(self) -> usize {
        match self {
            Register::Rtc => 7,
            Register::DeviceId | Register::ScheduleData => 4,
            Register::FirmwareVersion
            | Register::TimeZone
            | Register::Current
            | Register::CurrentLogCount
            | Register::CurrentLogIndex
            | Register::CurrentLogSample => 2,
            _ => 1,
        }
    }

    pub const fn access(self) -> Access {
        match self {
            Register::DeviceId
            | Register::FirmwareVersion
            | Register::Current
            | Register::CurrentLogCount
            | Register::CurrentLogSample
            | Register::ScheduleCount => Access::ReadOnly,
            Register::CurrentLogIndex
            | Register::ScheduleIndex
            | Register::ScheduleRemove
            | Register::ShutdownRequest => Access::WriteOnly,
            _ => Access::ReadWrite,
        }
    }

    pub const fn is_readable(self) -> bool {
        !matches!(self.access(), Access::WriteOnly)
    }

    pub const fn is_writable(self) -> bool {
        !matches!(self.access(), Access::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_addresses() {
        assert_eq!(Register::Rtc.address(), 0x00);
        assert_eq!(Register::DeviceId.address(), 0x10);
        assert_eq!(Register::TimeZone.address(), 0x1A);
        assert_eq!(Register::ScheduleData.address(), 0x32);
        assert_eq!(Register::ShutdownRequest.address(), 0x40);
    }

    #[test]
    fn test_register_widths() {
        assert_eq!(Register::Rtc.width(), 7);
        assert_eq!(Register::ScheduleData.width(), 4);
        assert_eq!(Register::CurrentLogIndex.width(), 2);
        assert_eq!(Register::ScheduleRemove.width(), 1);
    }

    #[test]
    fn test_register_access() {
        assert!(Register::DeviceId.is_readable());
        assert!(!Register::DeviceId.is_writable());
        assert!(!Register::ScheduleIndex.is_readable());
        assert!(Register::ScheduleData.is_readable() && Register::ScheduleData.is_writable());
    }
}
