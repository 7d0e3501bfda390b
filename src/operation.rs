use embedded_hal::i2c::I2c;
use log::{info, warn};
use shared_types::{Action, FirmwareVersion, Register, ScheduleRecord};

use crate::bus::{BusAddress, RegisterBus};
use crate::config::{DEVICE_ID, REMOVE_ALL_SCHEDULES};
use crate::device::{self, ConfigReport, ConfigureOp, DeviceConfig, PowerManager};
use crate::error::PmgrError;
use crate::firmware_update::{Confirm, FirmwareImage, Updater};
use crate::rtc::RtcTimestamp;
use crate::schedule::{self, RelativeSchedule, ScheduleRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOp {
    List,
    Add(ScheduleRequest),
    AddRelative { action: Action, delay_minutes: u16 },
    /// 1-based slot
    Remove(u8),
    RemoveAll,
    /// CSV document, header line first
    Import(String),
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentLogOp {
    Now,
    Read,
    Restart,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareUpdateOp {
    pub image: FirmwareImage,
    /// Read the identity and version back once the new firmware runs
    pub health_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Status,
    Configure(ConfigureOp),
    Schedule(ScheduleOp),
    CurrentLog(CurrentLogOp),
    Shutdown,
    FirmwareUpdate(FirmwareUpdateOp),
}

#[derive(Debug)]
pub enum Outcome {
    /// The clock is reported separately so an unset RTC does not hide the
    /// configuration.
    Status {
        config: DeviceConfig,
        clock: Result<RtcTimestamp, PmgrError>,
    },
    Configured(ConfigReport),
    Schedules(Vec<ScheduleRecord>),
    ScheduleAdded(ScheduleRecord),
    SchedulesImported(usize),
    SchedulesRemoved,
    ShutdownRequested,
    Csv(String),
    Current(u16),
    CurrentLog(Vec<u16>),
    CurrentLogRestarted,
    /// `running` is the version read back by the health check
    Updated { running: Option<FirmwareVersion> },
}

/// Runs one operation against the board.
///
/// Every operation except the firmware update first checks the identity and
/// firmware version, so a wrong or too-new device never sees a write.
pub struct Controller<I2C, U> {
    i2c: I2C,
    address: BusAddress,
    updater: U,
}

impl<I2C: I2c, U: Updater> Controller<I2C, U> {
    pub fn new(i2c: I2C, address: BusAddress, updater: U) -> Self {
        Self {
            i2c,
            address,
            updater,
        }
    }

    pub fn release(self) -> (I2C, U) {
        (self.i2c, self.updater)
    }

    pub fn execute(
        &mut self,
        operation: Operation,
        confirm: &mut dyn Confirm,
    ) -> Result<Outcome, PmgrError> {
        match operation {
            Operation::Status => {
                let mut pm = self.connect()?;
                let config = pm.read_config();
                let clock = pm.read_clock();
                if let Err(e) = &clock {
                    warn!("Clock not readable: {}", e);
                }
                Ok(Outcome::Status { config, clock })
            }
            Operation::Configure(op) => Ok(Outcome::Configured(self.connect()?.configure(&op))),
            Operation::Schedule(op) => schedule_op(&mut self.connect()?, op),
            Operation::CurrentLog(op) => current_log_op(&mut self.connect()?, op),
            Operation::Shutdown => {
                self.connect()?.request_shutdown();
                Ok(Outcome::ShutdownRequested)
            }
            Operation::FirmwareUpdate(op) => self.update_firmware(&op, confirm),
        }
    }

    fn connect(&mut self) -> Result<PowerManager<&mut I2C>, PmgrError> {
        PowerManager::connect(RegisterBus::new(&mut self.i2c, self.address))
    }

    fn update_firmware(
        &mut self,
        op: &FirmwareUpdateOp,
        confirm: &mut dyn Confirm,
    ) -> Result<Outcome, PmgrError> {
        self.updater.update(&op.image, confirm)?;
        let running = if op.health_check {
            self.health_check()
        } else {
            None
        };
        Ok(Outcome::Updated { running })
    }

    // Only reports; a device that does not answer yet is not an update failure
    fn health_check(&mut self) -> Option<FirmwareVersion> {
        let mut bus = RegisterBus::new(&mut self.i2c, self.address);
        let found = bus.read_u32(Register::DeviceId);
        if found != DEVICE_ID {
            warn!("Health check: no power manager answering (identity 0x{:08x})", found);
            return None;
        }
        let version = FirmwareVersion::from_bytes(bus.read(Register::FirmwareVersion));
        info!("Health check: firmware {} running", version);
        Some(version)
    }
}

fn schedule_op<I2C: I2c>(pm: &mut PowerManager<I2C>, op: ScheduleOp) -> Result<Outcome, PmgrError> {
    let version = pm.version();
    match op {
        ScheduleOp::List => Ok(Outcome::Schedules(pm.schedules())),
        ScheduleOp::Add(request) => {
            let record = schedule::parse_request(&request, version)?;
            pm.add_schedule(record)?;
            Ok(Outcome::ScheduleAdded(record))
        }
        ScheduleOp::AddRelative {
            action,
            delay_minutes,
        } => match pm.add_relative(action, delay_minutes)? {
            RelativeSchedule::ShutdownNow => Ok(Outcome::ShutdownRequested),
            RelativeSchedule::Record(record) => Ok(Outcome::ScheduleAdded(record)),
        },
        ScheduleOp::Remove(index) => {
            pm.remove_schedule(index)?;
            Ok(Outcome::SchedulesRemoved)
        }
        ScheduleOp::RemoveAll => {
            pm.remove_schedule(REMOVE_ALL_SCHEDULES)?;
            Ok(Outcome::SchedulesRemoved)
        }
        ScheduleOp::Import(content) => {
            let records = schedule::parse_csv(&content, version)?;
            pm.add_schedules(&records)?;
            Ok(Outcome::SchedulesImported(records.len()))
        }
        ScheduleOp::Export => Ok(Outcome::Csv(schedule::to_csv(&pm.schedules()))),
    }
}

fn current_log_op<I2C: I2c>(
    pm: &mut PowerManager<I2C>,
    op: CurrentLogOp,
) -> Result<Outcome, PmgrError> {
    match op {
        CurrentLogOp::Now => Ok(Outcome::Current(pm.current_ma())),
        CurrentLogOp::Read => Ok(Outcome::CurrentLog(pm.current_log()?)),
        CurrentLogOp::Restart => {
            pm.restart_current_log();
            Ok(Outcome::CurrentLogRestarted)
        }
        CurrentLogOp::Export => Ok(Outcome::Csv(device::current_log_csv(&pm.current_log()?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware_update::Question;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use shared_types::Recurrence;

    const ADDR: u8 = 0x22;

    #[derive(Default)]
    struct FakeUpdater {
        images: Vec<String>,
    }

    impl Updater for FakeUpdater {
        fn update(
            &mut self,
            image: &FirmwareImage,
            confirm: &mut dyn Confirm,
        ) -> Result<(), PmgrError> {
            if !confirm.confirm(&Question::StartUpdate) {
                return Err(PmgrError::Cancelled);
            }
            self.images.push(image.digest().to_string());
            Ok(())
        }
    }

    fn read(register: u8, data: &[u8]) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, vec![register], data.to_vec())
    }

    fn write(register: u8, data: &[u8]) -> I2cTransaction {
        let mut frame = vec![register];
        frame.extend_from_slice(data);
        I2cTransaction::write(ADDR, frame)
    }

    fn identity(version: [u8; 2]) -> [I2cTransaction; 2] {
        [read(0x10, &[0x50, 0x4D, 0x47, 0x52]), read(0x14, &version)]
    }

    fn controller(i2c: &I2cMock) -> Controller<I2cMock, FakeUpdater> {
        Controller::new(i2c.clone(), BusAddress::Secondary, FakeUpdater::default())
    }

    fn accept(_: &Question) -> bool {
        true
    }

    #[test]
    fn test_status_keeps_config_when_clock_unset() {
        let mut expectations = identity([4, 2]).to_vec();
        expectations.extend([
            read(0x16, &[30]),
            read(0x17, &[60]),
            read(0x18, &[1]),
            read(0x19, &[4]),
            read(0x1A, &540i16.to_le_bytes()),
            read(0x1C, &[1]),
            read(0x1D, &[0]),
            read(0x00, &[0; 7]),
            read(0x1A, &540i16.to_le_bytes()),
        ]);
        let mut i2c = I2cMock::new(&expectations);
        let mut ctl = controller(&i2c);

        let outcome = ctl.execute(Operation::Status, &mut accept).unwrap();
        let Outcome::Status { config, clock } = outcome else {
            panic!("expected status");
        };
        assert_eq!(config.startup_timer_s, 30);
        assert_eq!(config.shutdown_request_gpio, Some(16));
        assert_eq!(config.shutdown_complete_gpio, Some(27));
        assert_eq!(config.timezone_min, 540);
        assert_eq!(config.auto_recovery, Some(true));
        assert!(matches!(clock, Err(PmgrError::InvalidTimestamp(_))));
        i2c.done();
    }

    #[test]
    fn test_wrong_device_sees_no_write() {
        let mut i2c = I2cMock::new(&[read(0x10, &[0x12, 0x34, 0x56, 0x78])]);
        let mut ctl = controller(&i2c);
        let result = ctl.execute(Operation::Shutdown, &mut accept);
        assert!(matches!(
            result,
            Err(PmgrError::IdentityMismatch { address: 0x22, found: 0x7856_3412 })
        ));
        i2c.done();
    }

    #[test]
    fn test_add_schedule_from_request() {
        let mut expectations = identity([4, 2]).to_vec();
        expectations.push(read(0x30, &[0]));
        expectations.push(write(0x32, &[0x80 | 0x40 | 30, 22, 0x80, 0x80]));
        let mut i2c = I2cMock::new(&expectations);
        let mut ctl = controller(&i2c);

        let op = Operation::Schedule(ScheduleOp::Add(ScheduleRequest {
            action: Action::Off,
            recurrence: Recurrence::OneTime,
            date: None,
            time: "22:30".into(),
        }));
        let outcome = ctl.execute(op, &mut accept).unwrap();
        assert!(matches!(outcome, Outcome::ScheduleAdded(r) if r.hour() == Some(22)));
        i2c.done();
    }

    #[test]
    fn test_import_rejects_bad_line_before_writing() {
        let mut i2c = I2cMock::new(&identity([4, 2]));
        let mut ctl = controller(&i2c);

        let csv = "ON/OFF, Repeat/OneTime, Month, Day, Hour, Minute\n\
                   ON, Repeat, 05, 10, 21, 30\n\
                   ON, Repeat, 05, 10, 21, *\n";
        let result = ctl.execute(Operation::Schedule(ScheduleOp::Import(csv.into())), &mut accept);
        assert!(matches!(
            result,
            Err(PmgrError::Parse(crate::error::ParseError::Line { line: 3, .. }))
        ));
        i2c.done();
    }

    #[test]
    fn test_export_schedules() {
        let mut expectations = identity([7, 1]).to_vec();
        expectations.extend([read(0x30, &[1]), write(0x31, &[1]), read(0x32, &[30, 21, 10, 5])]);
        let mut i2c = I2cMock::new(&expectations);
        let mut ctl = controller(&i2c);

        let outcome = ctl
            .execute(Operation::Schedule(ScheduleOp::Export), &mut accept)
            .unwrap();
        let Outcome::Csv(csv) = outcome else {
            panic!("expected csv");
        };
        assert_eq!(
            csv,
            "ON/OFF, Repeat/OneTime, Month, Day, Hour, Minute\nON, Repeat, 05, 10, 21, 30\n"
        );
        i2c.done();
    }

    #[test]
    fn test_current_now() {
        let mut expectations = identity([4, 2]).to_vec();
        expectations.push(read(0x20, &[0xF4, 0x01]));
        let mut i2c = I2cMock::new(&expectations);
        let mut ctl = controller(&i2c);

        let outcome = ctl
            .execute(Operation::CurrentLog(CurrentLogOp::Now), &mut accept)
            .unwrap();
        assert!(matches!(outcome, Outcome::Current(500)));
        i2c.done();
    }

    #[test]
    fn test_update_skips_device_checks() {
        let mut i2c = I2cMock::new(&[]);
        let mut ctl = controller(&i2c);
        let op = FirmwareUpdateOp {
            image: FirmwareImage::from_bytes("fw.bin", b"image"),
            health_check: false,
        };

        let outcome = ctl.execute(Operation::FirmwareUpdate(op), &mut accept).unwrap();
        assert!(matches!(outcome, Outcome::Updated { running: None }));
        let (_, updater) = ctl.release();
        assert_eq!(updater.images.len(), 1);
        i2c.done();
    }

    #[test]
    fn test_update_health_check() {
        let mut i2c = I2cMock::new(&[
            read(0x10, &[0x50, 0x4D, 0x47, 0x52]),
            read(0x14, &[5, 2]),
        ]);
        let mut ctl = controller(&i2c);
        let op = FirmwareUpdateOp {
            image: FirmwareImage::from_bytes("fw.bin", b"image"),
            health_check: true,
        };

        let outcome = ctl.execute(Operation::FirmwareUpdate(op), &mut accept).unwrap();
        // A newer firmware than the tool knows is still reported
        assert!(matches!(
            outcome,
            Outcome::Updated { running: Some(v) } if v == FirmwareVersion::new(2, 5)
        ));
        i2c.done();
    }

    #[test]
    fn test_declined_update() {
        let mut i2c = I2cMock::new(&[]);
        let mut ctl = controller(&i2c);
        let op = FirmwareUpdateOp {
            image: FirmwareImage::from_bytes("fw.bin", b"image"),
            health_check: true,
        };

        let result = ctl.execute(Operation::FirmwareUpdate(op), &mut |_: &Question| false);
        assert!(matches!(result, Err(PmgrError::Cancelled)));
        i2c.done();
    }
}
