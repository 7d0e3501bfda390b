use core::fmt;

use serde::{Deserialize, Serialize};

// Packed schedule layout (4 bytes):
// - byte 0: bit 7 OneTime, bit 6 OFF, bits 5-0 minute
// - byte 1: bit 7 any hour, else hour
// - byte 2: bit 7 any day, else bit 6 weekday (bits 2-0, 1 = Sun), else day of month
// - byte 3: bit 7 any month, else month

const ONE_TIME: u8 = 0x80;
const OFF: u8 = 0x40;
const MINUTE_MASK: u8 = 0x3F;
const WILDCARD: u8 = 0x80;
const WEEKDAY: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    On,
    Off,
}

impl Action {
    pub const fn name(self) -> &'static str {
        match self {
            Action::On => "ON",
            Action::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recurrence {
    Repeat,
    OneTime,
}

impl Recurrence {
    pub const fn name(self) -> &'static str {
        match self {
            Recurrence::Repeat => "Repeat",
            Recurrence::OneTime => "OneTime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Weekday {
    Sun = 1,
    Mon = 2,
    Tue = 3,
    Wed = 4,
    Thu = 5,
    Fri = 6,
    Sat = 7,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ];

    /// 1 = Sunday .. 7 = Saturday
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub const fn number(self) -> u8 {
        self as u8
    }

    pub const fn abbreviation(self) -> &'static str {
        match self {
            Weekday::Sun => "Sun",
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
        }
    }

    /// Case-insensitive three-letter name.
    pub fn from_abbreviation(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|day| day.abbreviation().eq_ignore_ascii_case(name))
    }
}

/// Day field of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DayMatch {
    Any,
    Date(u8),
    Weekday(Weekday),
    /// Weekday flag with a number outside 1-7, as read from the device
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleRecord([u8; 4]);

impl ScheduleRecord {
    /// Wildcards are `None`. Field ranges are the caller's responsibility.
    pub fn new(
        action: Action,
        recurrence: Recurrence,
        month: Option<u8>,
        day: DayMatch,
        hour: Option<u8>,
        minute: u8,
    ) -> Self {
        let mut flags = minute & MINUTE_MASK;
        if action == Action::Off {
            flags |= OFF;
        }
        if recurrence == Recurrence::OneTime {
            flags |= ONE_TIME;
        }
        let day = match day {
            DayMatch::Any => WILDCARD,
            DayMatch::Date(date) => date & 0x3F,
            DayMatch::Weekday(weekday) => WEEKDAY | weekday.number(),
            DayMatch::Unknown(raw) => WEEKDAY | (raw & 0x07),
        };
        Self([
            flags,
            hour.map_or(WILDCARD, |h| h & 0x7F),
            day,
            month.map_or(WILDCARD, |m| m & 0x7F),
        ])
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    pub fn action(&self) -> Action {
        if self.0[0] & OFF == 0 {
            Action::On
        } else {
            Action::Off
        }
    }

    pub fn recurrence(&self) -> Recurrence {
        if self.0[0] & ONE_TIME == 0 {
            Recurrence::Repeat
        } else {
            Recurrence::OneTime
        }
    }

    pub fn minute(&self) -> u8 {
        self.0[0] & MINUTE_MASK
    }

    pub fn hour(&self) -> Option<u8> {
        wildcard_field(self.0[1])
    }

    pub fn day(&self) -> DayMatch {
        let raw = self.0[2];
        if raw & WILDCARD != 0 {
            DayMatch::Any
        } else if raw & WEEKDAY != 0 {
            let n = raw & 0x07;
            Weekday::from_number(n).map_or(DayMatch::Unknown(n), DayMatch::Weekday)
        } else {
            DayMatch::Date(raw & 0x3F)
        }
    }

    pub fn month(&self) -> Option<u8> {
        wildcard_field(self.0[3])
    }
}

fn wildcard_field(raw: u8) -> Option<u8> {
    if raw & WILDCARD != 0 {
        None
    } else {
        Some(raw & 0x7F)
    }
}

/// Fixed-column form, e.g. `ON  Repeat  05/10  21:30`.
impl fmt::Display for ScheduleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<4}{:<8}",
            self.action().name(),
            self.recurrence().name()
        )?;
        match self.month() {
            Some(month) => write!(f, "{month:02}/")?,
            None => f.write_str("**/")?,
        }
        match self.day() {
            DayMatch::Any => f.write_str("**  ")?,
            DayMatch::Date(date) => write!(f, "{date:02}  ")?,
            DayMatch::Weekday(weekday) => write!(f, "{} ", weekday.abbreviation())?,
            DayMatch::Unknown(_) => f.write_str("??? ")?,
        }
        match self.hour() {
            Some(hour) => write!(f, "{hour:02}:")?,
            None => f.write_str("**:")?,
        }
        write!(f, "{:02}", self.minute())
    }
}
