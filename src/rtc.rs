use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use shared_types::bcd::ClockFields;

use crate::error::PmgrError;

/// Local time read from the device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RtcTimestamp {
    pub datetime: NaiveDateTime,
    /// Weekday register, 1 = Sunday .. 7 = Saturday, shifted with the date
    pub weekday: u8,
}

/// Decode the clock block and move it from UTC to local time.
pub fn decode(bcd: &[u8; 7], tz_offset_minutes: i16) -> Result<RtcTimestamp, PmgrError> {
    let invalid = || PmgrError::InvalidTimestamp(*bcd);
    let fields = ClockFields::from_bcd(bcd).ok_or_else(invalid)?;

    let utc = NaiveDate::from_ymd_opt(
        2000 + i32::from(fields.year),
        u32::from(fields.month),
        u32::from(fields.day),
    )
    .and_then(|date| {
        date.and_hms_opt(
            u32::from(fields.hour),
            u32::from(fields.minute),
            u32::from(fields.second),
        )
    })
    .ok_or_else(invalid)?;

    let local = utc
        .checked_add_signed(Duration::minutes(i64::from(tz_offset_minutes)))
        .ok_or_else(invalid)?;

    let weekday = if (1..=7).contains(&fields.weekday) {
        let shift = (local.date() - utc.date()).num_days();
        // Offsets never exceed a day, so the result stays within 1-7
        ((i64::from(fields.weekday) - 1 + shift).rem_euclid(7) + 1) as u8
    } else {
        fields.weekday
    };

    Ok(RtcTimestamp {
        datetime: local,
        weekday,
    })
}

/// Convert local time back to the UTC clock block.
///
/// Returns `None` outside 2000-2099 once the offset is removed.
pub fn encode(local: NaiveDateTime, tz_offset_minutes: i16) -> Option<[u8; 7]> {
    let utc = local.checked_sub_signed(Duration::minutes(i64::from(tz_offset_minutes)))?;
    if !(2000..=2099).contains(&utc.year()) {
        return None;
    }
    let fields = ClockFields {
        second: utc.second() as u8,
        minute: utc.minute() as u8,
        hour: utc.hour() as u8,
        weekday: utc.weekday().number_from_sunday() as u8,
        day: utc.day() as u8,
        month: utc.month() as u8,
        year: (utc.year() - 2000) as u8,
    };
    Some(fields.to_bcd())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_decode_utc() {
        let ts = decode(&[0x30, 0x45, 0x12, 0x03, 0x15, 0x06, 0x23], 0).unwrap();
        assert_eq!(ts.datetime, at(2023, 6, 15, 12, 45, 30));
        assert_eq!(ts.weekday, 3);
    }

    #[test]
    fn test_decode_applies_timezone() {
        // 2023-12-31 20:00 UTC is 2024-01-01 05:00 in UTC+9
        let ts = decode(&[0x00, 0x00, 0x20, 0x01, 0x31, 0x12, 0x23], 540).unwrap();
        assert_eq!(ts.datetime, at(2024, 1, 1, 5, 0, 0));
        assert_eq!(ts.weekday, 2);

        let ts = decode(&[0x00, 0x30, 0x02, 0x01, 0x01, 0x03, 0x24], -300).unwrap();
        assert_eq!(ts.datetime, at(2024, 2, 29, 21, 30, 0));
        assert_eq!(ts.weekday, 7);
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        // Nibble out of range
        assert!(matches!(
            decode(&[0x3A, 0x45, 0x12, 0x03, 0x15, 0x06, 0x23], 0),
            Err(PmgrError::InvalidTimestamp(_))
        ));
        // February 30th
        assert!(matches!(
            decode(&[0x00, 0x00, 0x00, 0x01, 0x30, 0x02, 0x23], 0),
            Err(PmgrError::InvalidTimestamp(_))
        ));
        // All-zero block from a failed read
        assert!(decode(&[0; 7], 0).is_err());
    }

    #[test]
    fn test_encode_removes_timezone() {
        let bcd = encode(at(2024, 1, 1, 5, 0, 0), 540).unwrap();
        assert_eq!(bcd, [0x00, 0x00, 0x20, 0x01, 0x31, 0x12, 0x23]);
        assert_eq!(decode(&bcd, 540).unwrap().datetime, at(2024, 1, 1, 5, 0, 0));
        assert!(encode(at(1999, 12, 31, 23, 0, 0), 0).is_none());
    }
}
