use core::fmt;

use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use serde::Serialize;
use shared_types::version::COMPATIBLE_FIRMWARE;
use shared_types::{Action, Feature, FirmwareVersion, Register, ScheduleRecord};

use crate::bus::RegisterBus;
use crate::config::*;
use crate::error::PmgrError;
use crate::rtc::{self, RtcTimestamp};
use crate::schedule::{self, RelativeSchedule};

/// Settings changed by a configure operation. `None` leaves a setting as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureOp {
    pub startup_timer_s: Option<u8>,
    /// 0 disables the shutdown timer
    pub shutdown_timer_s: Option<u8>,
    /// GPIO number, 0 disables the signal
    pub shutdown_request_gpio: Option<u8>,
    /// GPIO number, 0 disables the signal
    pub shutdown_complete_gpio: Option<u8>,
    pub timezone_min: Option<i16>,
    pub auto_recovery: Option<bool>,
    pub usb_wake: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigField {
    StartupTimer,
    ShutdownTimer,
    ShutdownRequestSignal,
    ShutdownCompleteSignal,
    ShutdownSignals,
    TimeZone,
    AutoRecovery,
    UsbWake,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceConfig {
    pub firmware: FirmwareVersion,
    pub startup_timer_s: u8,
    pub shutdown_timer_s: u8,
    pub shutdown_request_gpio: Option<u8>,
    pub shutdown_complete_gpio: Option<u8>,
    pub timezone_min: i16,
    /// `None` when the firmware has no such setting
    pub auto_recovery: Option<bool>,
    pub usb_wake: Option<bool>,
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn signal(gpio: Option<u8>) -> String {
            gpio.map_or_else(|| "disabled".into(), |g| format!("GPIO{g}"))
        }
        fn flag(enabled: bool) -> &'static str {
            if enabled { "enabled" } else { "disabled" }
        }

        writeln!(f, "Firmware version: {}", self.firmware)?;
        writeln!(f, "Startup timer: {} s", self.startup_timer_s)?;
        match self.shutdown_timer_s {
            0 => writeln!(f, "Shutdown timer: disabled")?,
            s => writeln!(f, "Shutdown timer: {s} s")?,
        }
        writeln!(f, "Shutdown request signal: {}", signal(self.shutdown_request_gpio))?;
        writeln!(f, "Shutdown complete signal: {}", signal(self.shutdown_complete_gpio))?;
        write!(f, "Timezone offset: {} min", self.timezone_min)?;
        if let Some(enabled) = self.auto_recovery {
            write!(f, "\nAuto recovery: {}", flag(enabled))?;
        }
        if let Some(enabled) = self.usb_wake {
            write!(f, "\nUSB Type-A wake: {}", flag(enabled))?;
        }
        Ok(())
    }
}

/// Outcome of a configure operation, one entry per requested field.
#[derive(Debug)]
pub struct ConfigReport {
    pub applied: Vec<ConfigField>,
    pub failures: Vec<(ConfigField, PmgrError)>,
    pub config: DeviceConfig,
}

impl ConfigReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A power manager that passed the identity and firmware checks.
pub struct PowerManager<I2C> {
    bus: RegisterBus<I2C>,
    version: FirmwareVersion,
}

impl<I2C: I2c> PowerManager<I2C> {
    /// Check the identity register and the firmware version before any
    /// other register is trusted.
    pub fn connect(mut bus: RegisterBus<I2C>) -> Result<Self, PmgrError> {
        let found = bus.read_u32(Register::DeviceId);
        if found != DEVICE_ID {
            error!("Unexpected device identity 0x{:08x}", found);
            return Err(PmgrError::IdentityMismatch {
                address: bus.address(),
                found,
            });
        }

        let version = FirmwareVersion::from_bytes(bus.read(Register::FirmwareVersion));
        if !version.is_known(&COMPATIBLE_FIRMWARE) {
            error!("Firmware {} is not supported", version);
            return Err(PmgrError::UnsupportedFirmware(version));
        }

        info!(
            "Connected to power manager at 0x{:02x}, firmware {}",
            bus.address(),
            version
        );
        Ok(Self { bus, version })
    }

    pub fn version(&self) -> FirmwareVersion {
        self.version
    }

    pub fn release(self) -> RegisterBus<I2C> {
        self.bus
    }

    fn require(&self, feature: Feature) -> Result<(), PmgrError> {
        if self.version.supports(feature) {
            Ok(())
        } else {
            Err(PmgrError::FeatureUnsupported {
                feature,
                version: self.version,
            })
        }
    }

    pub fn timezone_min(&mut self) -> i16 {
        self.bus.read_i16(Register::TimeZone)
    }

    /// Device clock in local time.
    pub fn read_clock(&mut self) -> Result<RtcTimestamp, PmgrError> {
        let bcd = self.bus.read(Register::Rtc);
        let tz = self.timezone_min();
        rtc::decode(&bcd, tz)
    }

    pub fn request_shutdown(&mut self) {
        info!("Requesting shutdown");
        self.bus
            .write_u8(Register::ShutdownRequest, SHUTDOWN_REQUEST_VALUE);
    }

    // Configuration

    pub fn read_config(&mut self) -> DeviceConfig {
        let optional = self.version.supports(Feature::AutoRecovery);
        DeviceConfig {
            firmware: self.version,
            startup_timer_s: self.bus.read_u8(Register::StartupTimer),
            shutdown_timer_s: self.bus.read_u8(Register::ShutdownTimer),
            shutdown_request_gpio: signal_gpio(self.bus.read_u8(Register::ShutdownRequestSignal)),
            shutdown_complete_gpio: signal_gpio(
                self.bus.read_u8(Register::ShutdownCompleteSignal),
            ),
            timezone_min: self.timezone_min(),
            auto_recovery: optional.then(|| self.bus.read_u8(Register::AutoRecovery) != 0),
            usb_wake: optional.then(|| self.bus.read_u8(Register::UsbWake) != 0),
        }
    }

    /// Validate and apply each requested field on its own. A failed field
    /// does not undo or block the others.
    pub fn configure(&mut self, op: &ConfigureOp) -> ConfigReport {
        let mut results = Vec::new();

        if let Some(seconds) = op.startup_timer_s {
            let result = check_range("startup timer", seconds, STARTUP_TIMER_RANGE)
                .map(|_| self.bus.write_u8(Register::StartupTimer, seconds));
            results.push((ConfigField::StartupTimer, result));
        }

        if let Some(seconds) = op.shutdown_timer_s {
            let result = check_range("shutdown timer", seconds, SHUTDOWN_TIMER_RANGE)
                .map(|_| self.bus.write_u8(Register::ShutdownTimer, seconds));
            results.push((ConfigField::ShutdownTimer, result));
        }

        if op.shutdown_request_gpio.is_some() || op.shutdown_complete_gpio.is_some() {
            self.configure_signals(op, &mut results);
        }

        if let Some(minutes) = op.timezone_min {
            let result = check_range("timezone", minutes, TIMEZONE_RANGE)
                .map(|_| self.bus.write_i16(Register::TimeZone, minutes));
            results.push((ConfigField::TimeZone, result));
        }

        if let Some(enabled) = op.auto_recovery {
            let result = self
                .require(Feature::AutoRecovery)
                .map(|_| self.bus.write_u8(Register::AutoRecovery, enabled.into()));
            results.push((ConfigField::AutoRecovery, result));
        }

        if let Some(enabled) = op.usb_wake {
            let result = self
                .require(Feature::UsbWake)
                .map(|_| self.bus.write_u8(Register::UsbWake, enabled.into()));
            results.push((ConfigField::UsbWake, result));
        }

        let mut applied = Vec::new();
        let mut failures = Vec::new();
        for (field, result) in results {
            match result {
                Ok(()) => {
                    info!("Applied {:?}", field);
                    applied.push(field);
                }
                Err(e) => {
                    warn!("{:?} not applied: {}", field, e);
                    failures.push((field, e));
                }
            }
        }

        ConfigReport {
            applied,
            failures,
            config: self.read_config(),
        }
    }

    fn configure_signals(
        &mut self,
        op: &ConfigureOp,
        results: &mut Vec<(ConfigField, Result<(), PmgrError>)>,
    ) {
        let mut request_index = self.bus.read_u8(Register::ShutdownRequestSignal);
        let mut complete_index = self.bus.read_u8(Register::ShutdownCompleteSignal);

        let mut request = None;
        if let Some(gpio) = op.shutdown_request_gpio {
            match signal_index(gpio) {
                Ok(index) => {
                    request_index = index;
                    request = Some(index);
                }
                Err(e) => results.push((ConfigField::ShutdownRequestSignal, Err(e))),
            }
        }

        let mut complete = None;
        if let Some(gpio) = op.shutdown_complete_gpio {
            match signal_index(gpio) {
                Ok(index) => {
                    complete_index = index;
                    complete = Some(index);
                }
                Err(e) => results.push((ConfigField::ShutdownCompleteSignal, Err(e))),
            }
        }

        if request.is_none() && complete.is_none() {
            return;
        }

        if request_index != 0 && request_index == complete_index {
            let gpio = SIGNAL_GPIOS[usize::from(request_index)];
            results.push((ConfigField::ShutdownSignals, Err(PmgrError::SignalConflict(gpio))));
            return;
        }

        if let Some(index) = request {
            if complete.is_some() {
                // Clear first so the two never point at the same line
                self.bus.write_u8(Register::ShutdownCompleteSignal, 0);
            }
            self.bus.write_u8(Register::ShutdownRequestSignal, index);
            results.push((ConfigField::ShutdownRequestSignal, Ok(())));
        }
        if let Some(index) = complete {
            self.bus.write_u8(Register::ShutdownCompleteSignal, index);
            results.push((ConfigField::ShutdownCompleteSignal, Ok(())));
        }
    }

    // Schedules

    pub fn schedule_count(&mut self) -> u8 {
        self.bus.read_u8(Register::ScheduleCount)
    }

    /// Select slot `index` (1-based) and read it back. The two transfers are
    /// not atomic; this tool is assumed to be the only client.
    pub fn read_schedule(&mut self, index: u8) -> ScheduleRecord {
        self.bus.write_u8(Register::ScheduleIndex, index);
        ScheduleRecord::from_bytes(self.bus.read(Register::ScheduleData))
    }

    pub fn schedules(&mut self) -> Vec<ScheduleRecord> {
        let count = self.schedule_count();
        (1..=count).map(|index| self.read_schedule(index)).collect()
    }

    pub fn add_schedule(&mut self, record: ScheduleRecord) -> Result<(), PmgrError> {
        self.add_schedules(&[record])
    }

    /// Store all records, or none if they would not fit.
    pub fn add_schedules(&mut self, records: &[ScheduleRecord]) -> Result<(), PmgrError> {
        let stored = self.schedule_count();
        if usize::from(stored) + records.len() > usize::from(MAX_SCHEDULES) {
            error!("Schedule table full: {} stored", stored);
            return Err(PmgrError::CapacityExceeded {
                stored,
                requested: records.len(),
            });
        }
        for record in records {
            debug!("Adding schedule {}", record);
            self.bus.write(Register::ScheduleData, &record.to_bytes());
        }
        info!("Added {} schedules", records.len());
        Ok(())
    }

    /// Schedule `action` in `delay_minutes`, or shut down right away when
    /// the firmware allows it.
    pub fn add_relative(
        &mut self,
        action: Action,
        delay_minutes: u16,
    ) -> Result<RelativeSchedule, PmgrError> {
        if schedule::is_immediate_shutdown(delay_minutes, self.version) {
            self.request_shutdown();
            return Ok(RelativeSchedule::ShutdownNow);
        }
        let now = self.read_clock()?;
        let relative =
            schedule::relative_schedule(now.datetime, action, delay_minutes, self.version)?;
        if let RelativeSchedule::Record(record) = relative {
            self.add_schedule(record)?;
        }
        Ok(relative)
    }

    /// Remove slot `index` (1-based), or every slot with [`REMOVE_ALL_SCHEDULES`].
    pub fn remove_schedule(&mut self, index: u8) -> Result<(), PmgrError> {
        let count = self.schedule_count();
        if index != REMOVE_ALL_SCHEDULES && !(1..=count).contains(&index) {
            return Err(PmgrError::ScheduleIndex { index, count });
        }
        self.bus.write_u8(Register::ScheduleRemove, index);
        if index == REMOVE_ALL_SCHEDULES {
            info!("Removed all schedules");
        } else {
            info!("Removed schedule #{:03}", index);
        }
        Ok(())
    }

    // Current draw

    pub fn current_ma(&mut self) -> u16 {
        self.bus.read_u16(Register::Current)
    }

    /// Logged samples, one per second since the log was started.
    pub fn current_log(&mut self) -> Result<Vec<u16>, PmgrError> {
        let count = self.bus.read_u16(Register::CurrentLogCount);
        if count > MAX_CURRENT_LOG_SAMPLES {
            return Err(PmgrError::CurrentLogCorrupt(count));
        }
        Ok((0..count)
            .map(|index| {
                self.bus.write_u16(Register::CurrentLogIndex, index);
                self.bus.read_u16(Register::CurrentLogSample)
            })
            .collect())
    }

    pub fn restart_current_log(&mut self) {
        info!("Restarting current log");
        self.bus
            .write_u16(Register::CurrentLogIndex, CURRENT_LOG_RESTART);
    }
}

/// Header line followed by `second, milliamps` per sample.
pub fn current_log_csv(samples: &[u16]) -> String {
    let mut out = String::from(CSV_CURRENT_LOG_HEADER);
    out.push('\n');
    for (second, sample) in samples.iter().enumerate() {
        out.push_str(&format!("{second}, {sample}\n"));
    }
    out
}

fn check_range<T>(
    option: &'static str,
    value: T,
    range: core::ops::RangeInclusive<T>,
) -> Result<(), PmgrError>
where
    T: PartialOrd + Copy + Into<i64> + fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(PmgrError::InvalidValue {
            option,
            value: value.into(),
            expected: format!("{} - {}", range.start(), range.end()),
        })
    }
}

fn signal_index(gpio: u8) -> Result<u8, PmgrError> {
    SIGNAL_GPIOS
        .iter()
        .position(|&g| g == gpio)
        .map(|index| index as u8)
        .ok_or_else(|| PmgrError::InvalidValue {
            option: "signal GPIO",
            value: i64::from(gpio),
            expected: format!("one of {SIGNAL_GPIOS:?}"),
        })
}

fn signal_gpio(index: u8) -> Option<u8> {
    match SIGNAL_GPIOS.get(usize::from(index)) {
        Some(0) => None,
        Some(&gpio) => Some(gpio),
        None => {
            warn!("Unknown signal index {}", index);
            None
        }
    }
}
