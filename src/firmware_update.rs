// Firmware update through the STM32 system bootloader
//
// Sequence: probe the flashing tool, check the image digest, then for each of
// the three phases pulse the boot/reset lines into the bootloader and run the
// tool once. Each tool run resets the controller, so the bootloader is
// re-entered before every phase.

use core::fmt;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};

use crate::config::{
    BOOT_PULSE_MS, BOOTLOADER_I2C_ADDR, FLASH_FAILURE_MARKER, FLASH_TOOL, FLASH_TOOL_DEVICE,
    KNOWN_FIRMWARE,
};
use crate::error::PmgrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    /// `-j`
    ReadProtect,
    /// `-k`
    ReadUnprotect,
    /// `-e 0 -w <image> -v -R`
    Program,
}

impl FlashPhase {
    pub const ALL: [FlashPhase; 3] = [
        FlashPhase::ReadProtect,
        FlashPhase::ReadUnprotect,
        FlashPhase::Program,
    ];

    /// Tool arguments for this phase.
    pub fn args(self, image: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            FLASH_TOOL_DEVICE.into(),
            "-a".into(),
            BOOTLOADER_I2C_ADDR.into(),
        ];
        match self {
            FlashPhase::ReadProtect => args.push("-j".into()),
            FlashPhase::ReadUnprotect => args.push("-k".into()),
            FlashPhase::Program => {
                args.extend(["-e", "0", "-w"].map(OsString::from));
                args.push(image.as_os_str().to_owned());
                args.extend(["-v", "-R"].map(OsString::from));
            }
        }
        args
    }

    // The protection passes report failure in their output only; the
    // programming pass has a meaningful exit status
    fn check(self, output: &ToolOutput) -> Result<(), PmgrError> {
        let failed = match self {
            FlashPhase::ReadProtect | FlashPhase::ReadUnprotect => {
                output.output.contains(FLASH_FAILURE_MARKER)
            }
            FlashPhase::Program => !output.success,
        };
        if !failed {
            return Ok(());
        }

        let detail = output
            .output
            .lines()
            .find(|line| line.contains(FLASH_FAILURE_MARKER))
            .or_else(|| output.output.lines().rev().find(|line| !line.trim().is_empty()))
            .unwrap_or("tool reported failure")
            .trim()
            .to_string();
        Err(PmgrError::ExternalToolFailure {
            phase: self,
            detail,
        })
    }
}

impl fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashPhase::ReadProtect => f.write_str("read protect"),
            FlashPhase::ReadUnprotect => f.write_str("read unprotect"),
            FlashPhase::Program => f.write_str("erase, write and verify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    HashChecked,
    BootloaderEntered,
    Flashing(FlashPhase),
    Done,
    Failed,
}

/// Captured result of one tool run, stdout and stderr combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

pub trait FlashTool {
    /// Run the tool without arguments to check that it can be started.
    fn probe(&mut self) -> Result<(), PmgrError>;

    fn run(&mut self, args: &[OsString]) -> Result<ToolOutput, PmgrError>;
}

/// `stm32flash` as a child process.
pub struct Stm32Flash {
    program: OsString,
}

impl Stm32Flash {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn missing(&self, source: std::io::Error) -> PmgrError {
        PmgrError::ExternalToolMissing {
            tool: self.program.to_string_lossy().into_owned(),
            source,
        }
    }
}

impl Default for Stm32Flash {
    fn default() -> Self {
        Self::new(FLASH_TOOL)
    }
}

impl FlashTool for Stm32Flash {
    fn probe(&mut self) -> Result<(), PmgrError> {
        // Exit status is irrelevant, the tool prints usage and fails
        Command::new(&self.program)
            .output()
            .map(|_| ())
            .map_err(|e| self.missing(e))
    }

    fn run(&mut self, args: &[OsString]) -> Result<ToolOutput, PmgrError> {
        debug!("Running {:?} {:?}", self.program, args);
        let result = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| self.missing(e))?;

        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&result.stderr));
        debug!("{}", output);
        Ok(ToolOutput {
            success: result.status.success(),
            output,
        })
    }
}

/// Decision points that need the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    UnknownImage { path: PathBuf, digest: String },
    StartUpdate,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Question::UnknownImage { path, digest } => write!(
                f,
                "{} (sha256 {}) is not a known firmware image. Continue?",
                path.display(),
                digest
            ),
            Question::StartUpdate => f.write_str(
                "Check that DSW1-1, 3 and 4 are ON. Start the firmware update?",
            ),
        }
    }
}

pub trait Confirm {
    fn confirm(&mut self, question: &Question) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&Question) -> bool,
{
    fn confirm(&mut self, question: &Question) -> bool {
        self(question)
    }
}

/// Image file with its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    path: PathBuf,
    digest: String,
}

impl FirmwareImage {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PmgrError> {
        let path = path.into();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Self::from_bytes(path, &bytes)),
            Err(source) => Err(PmgrError::Image { path, source }),
        }
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);

        let mut digest = String::with_capacity(64);
        for byte in hasher.finalize() {
            let _ = write!(&mut digest, "{byte:02x}");
        }

        Self {
            path: path.into(),
            digest,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Release this image was published as, if its digest is on record.
    pub fn known_version(&self) -> Option<&'static str> {
        KNOWN_FIRMWARE
            .iter()
            .find(|(_, digest)| *digest == self.digest)
            .map(|(version, _)| *version)
    }
}

pub trait Updater {
    fn update(&mut self, image: &FirmwareImage, confirm: &mut dyn Confirm)
    -> Result<(), PmgrError>;
}

pub struct FirmwareUpdater<RST, BOOT, D, T> {
    reset: RST,
    boot: BOOT,
    delay: D,
    tool: T,
    state: UpdateState,
}

impl<RST, BOOT, D, T> FirmwareUpdater<RST, BOOT, D, T>
where
    RST: OutputPin,
    BOOT: OutputPin,
    D: DelayNs,
    T: FlashTool,
{
    pub fn new(reset: RST, boot: BOOT, delay: D, tool: T) -> Self {
        Self {
            reset,
            boot,
            delay,
            tool,
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn release(self) -> (RST, BOOT, D, T) {
        (self.reset, self.boot, self.delay, self.tool)
    }

    fn run(&mut self, image: &FirmwareImage, confirm: &mut dyn Confirm) -> Result<(), PmgrError> {
        self.tool.probe()?;

        match image.known_version() {
            Some(version) => info!(
                "Firmware image {} is release {}",
                image.path().display(),
                version
            ),
            None => {
                warn!("Unknown firmware image digest {}", image.digest());
                let question = Question::UnknownImage {
                    path: image.path().to_path_buf(),
                    digest: image.digest().to_string(),
                };
                if !confirm.confirm(&question) {
                    return Err(PmgrError::Cancelled);
                }
            }
        }
        transition(&mut self.state, UpdateState::HashChecked);

        if !confirm.confirm(&Question::StartUpdate) {
            return Err(PmgrError::Cancelled);
        }

        let mut lines = BootLines {
            reset: &mut self.reset,
            boot: &mut self.boot,
            delay: &mut self.delay,
        };

        for phase in FlashPhase::ALL {
            lines.enter_bootloader()?;
            transition(&mut self.state, UpdateState::BootloaderEntered);

            transition(&mut self.state, UpdateState::Flashing(phase));
            let output = self.tool.run(&phase.args(image.path()))?;
            phase.check(&output)?;
        }

        transition(&mut self.state, UpdateState::Done);
        info!("Firmware update complete");
        Ok(())
    }
}

impl<RST, BOOT, D, T> Updater for FirmwareUpdater<RST, BOOT, D, T>
where
    RST: OutputPin,
    BOOT: OutputPin,
    D: DelayNs,
    T: FlashTool,
{
    fn update(
        &mut self,
        image: &FirmwareImage,
        confirm: &mut dyn Confirm,
    ) -> Result<(), PmgrError> {
        self.state = UpdateState::Idle;
        let result = self.run(image, confirm);
        match &result {
            Ok(()) => {}
            Err(PmgrError::Cancelled) => {
                info!("Firmware update cancelled");
                transition(&mut self.state, UpdateState::Idle);
            }
            Err(e) => {
                error!("Firmware update failed: {}", e);
                transition(&mut self.state, UpdateState::Failed);
            }
        }
        result
    }
}

fn transition(state: &mut UpdateState, next: UpdateState) {
    if *state != next {
        info!("Transitioning from {:?} to {:?}", state, next);
        *state = next;
    }
}

// Boot and reset lines, held for the duration of the flashing phases and
// returned to run mode (boot low, reset high) when dropped
struct BootLines<'a, RST: OutputPin, BOOT: OutputPin, D: DelayNs> {
    reset: &'a mut RST,
    boot: &'a mut BOOT,
    delay: &'a mut D,
}

impl<RST: OutputPin, BOOT: OutputPin, D: DelayNs> BootLines<'_, RST, BOOT, D> {
    fn enter_bootloader(&mut self) -> Result<(), PmgrError> {
        self.boot.set_high().map_err(PmgrError::gpio)?;
        self.delay.delay_ms(BOOT_PULSE_MS);
        self.reset.set_low().map_err(PmgrError::gpio)?;
        self.delay.delay_ms(BOOT_PULSE_MS);
        self.reset.set_high().map_err(PmgrError::gpio)?;
        self.delay.delay_ms(BOOT_PULSE_MS);
        self.boot.set_low().map_err(PmgrError::gpio)?;
        self.delay.delay_ms(BOOT_PULSE_MS);
        debug!("Bootloader entry sequence sent");
        Ok(())
    }
}

impl<RST: OutputPin, BOOT: OutputPin, D: DelayNs> Drop for BootLines<'_, RST, BOOT, D> {
    fn drop(&mut self) {
        let boot = self.boot.set_low();
        let reset = self.reset.set_high();
        if boot.is_err() || reset.is_err() {
            warn!("Failed to release the boot/reset lines");
        } else {
            debug!("Boot/reset lines released");
        }
    }
}
