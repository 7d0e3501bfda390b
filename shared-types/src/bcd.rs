use serde::{Deserialize, Serialize};

pub fn dec_to_bcd(n: u8) -> u8 {
    ((n / 10 % 10) << 4) | (n % 10)
}

/// Returns `None` if either nibble is not a decimal digit.
pub fn bcd_to_dec(n: u8) -> Option<u8> {
    let (tens, ones) = (n >> 4, n & 0x0F);
    if tens > 9 || ones > 9 {
        return None;
    }
    Some(tens * 10 + ones)
}

/// Decimal fields of the 7-byte clock block, in register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockFields {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    /// 1 = Sunday .. 7 = Saturday. Stored as a plain byte.
    pub weekday: u8,
    pub day: u8,
    pub month: u8,
    /// Two-digit year, 0-99 meaning 2000-2099.
    pub year: u8,
}

impl ClockFields {
    pub fn from_bcd(bcd: &[u8; 7]) -> Option<Self> {
        Some(Self {
            second: bcd_to_dec(bcd[0])?,
            minute: bcd_to_dec(bcd[1])?,
            hour: bcd_to_dec(bcd[2])?,
            weekday: bcd[3],
            day: bcd_to_dec(bcd[4])?,
            month: bcd_to_dec(bcd[5])?,
            year: bcd_to_dec(bcd[6])?,
        })
    }

    pub fn to_bcd(&self) -> [u8; 7] {
        [
            dec_to_bcd(self.second),
            dec_to_bcd(self.minute),
            dec_to_bcd(self.hour),
            self.weekday,
            dec_to_bcd(self.day),
            dec_to_bcd(self.month),
            dec_to_bcd(self.year % 100),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_nibbles() {
        assert_eq!(dec_to_bcd(59), 0x59);
        assert_eq!(dec_to_bcd(7), 0x07);
        assert_eq!(bcd_to_dec(0x45), Some(45));
        assert_eq!(bcd_to_dec(0x1A), None);
        assert_eq!(bcd_to_dec(0xA1), None);
    }

    #[test]
    fn test_clock_fields_from_bcd() {
        let fields = ClockFields::from_bcd(&[0x30, 0x45, 0x12, 0x03, 0x15, 0x06, 0x23]).unwrap();
        assert_eq!(
            fields,
            ClockFields {
                second: 30,
                minute: 45,
                hour: 12,
                weekday: 3,
                day: 15,
                month: 6,
                year: 23,
            }
        );
        assert_eq!(fields.to_bcd(), [0x30, 0x45, 0x12, 0x03, 0x15, 0x06, 0x23]);
    }

    #[test]
    fn test_clock_fields_reject_bad_nibble() {
        assert!(ClockFields::from_bcd(&[0x3F, 0x45, 0x12, 0x03, 0x15, 0x06, 0x23]).is_none());
    }
}
