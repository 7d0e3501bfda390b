use core::ops::RangeInclusive;

pub const PRIMARY_I2C_ADDR: u8 = 0x20;
// Selected on the board with DSW1-6 before entering run mode
pub const SECONDARY_I2C_ADDR: u8 = 0x22;

/// "PMGR", read little-endian from the identity register.
pub const DEVICE_ID: u32 = 0x5247_4D50;

pub const MAX_SCHEDULES: u8 = 250;
pub const REMOVE_ALL_SCHEDULES: u8 = 0xFF;

// One sample per second for up to an hour
pub const MAX_CURRENT_LOG_SAMPLES: u16 = 3600;
pub const CURRENT_LOG_RESTART: u16 = 0xFFFF;

pub const SHUTDOWN_REQUEST_VALUE: u8 = 0xFF;

/// GPIO numbers selectable for the shutdown signals, indexed by the register value.
pub const SIGNAL_GPIOS: [u8; 5] = [0, 16, 17, 26, 27];

pub const STARTUP_TIMER_RANGE: RangeInclusive<u8> = 1..=250;
pub const SHUTDOWN_TIMER_RANGE: RangeInclusive<u8> = 0..=250;
pub const TIMEZONE_RANGE: RangeInclusive<i16> = -720..=840;

pub const MAX_RELATIVE_DELAY_MIN: u16 = 999;
// Zero-delay schedules: 60 s so the minute carries, plus 15 s for communication
pub const ZERO_DELAY_MARGIN_S: i64 = 60 + 15;

pub const CSV_SCHEDULE_HEADER: &str = "ON/OFF, Repeat/OneTime, Month, Day, Hour, Minute";
pub const CSV_CURRENT_LOG_HEADER: &str = "time[s], current[mA]";

// BCM numbers of the bootloader control lines
pub const GPIO_RESET: u8 = 7;
pub const GPIO_BOOT: u8 = 25;
pub const BOOT_PULSE_MS: u32 = 10;

pub const FLASH_TOOL: &str = "stm32flash";
pub const FLASH_TOOL_DEVICE: &str = "/dev/i2c-1";
pub const BOOTLOADER_I2C_ADDR: &str = "0x42";
pub const FLASH_FAILURE_MARKER: &str = "Fail";

/// SHA-256 of every released firmware image.
pub const KNOWN_FIRMWARE: [(&str, &str); 13] = [
    ("1.0", "cf0d1818ade696bc5b7af150ff4a085266fdc829f196f26ed2ed127b7ba12eb3"),
    ("1.1", "1a6fdf815b5b23a6e39c79d6b734bfd3bd51ddf59b803912425bfc07504f0d1b"),
    ("1.2", "5764c3cc8442930997fefcc048e35a8242df9bdcdf5f302ed4fb43f1a4fd8c24"),
    ("1.3", "a37fe6f36a4e99bab07e3106cb99306d13f88d4c72c68b309a4fd9eb8e4c44e8"),
    ("1.4", "36313403baab9d50183f17d0f9cea991455baf7b1b0478e1ef8773cee0ea91cc"),
    ("1.5", "c3f465e5c8e2e004b23d85a6f5846931e106fd8a06715d48e54750c875cfe882"),
    ("1.6", "6aff47c6ceb831cf48662a71dcc0090b437a6129aa8b29d5bcebb5e0cd46e98b"),
    ("1.7", "14fcce2876dc004f5598d50d36eef4898e048197566a5de319ede510019df031"),
    ("2.0", "0bdb41e819fcd8380a9bf1f551a6a7692bd22bcdb3734580413e4401fa613490"),
    ("2.1", "f5aa9ab42affd8004238bf1f747d93095b5138602473660eb7965a24d03b167b"),
    ("2.2", "a49c1fa3c1f540fcbb77d69be4d599791d3a5a88508e7519aaab2c5426f0fb0c"),
    ("2.3", "c39cc7100644abafd3f69bc0b61304093b4a535097fd637282837ed8fe007821"),
    ("2.4", "39498cf80856838cf9676c0e40316d1e7ae283d03179d1d538d1cca992a0e9cc"),
];
