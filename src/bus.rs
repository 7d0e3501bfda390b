use embedded_hal::i2c::{Error as _, I2c};
use log::{debug, warn};
use shared_types::Register;

use crate::config::{PRIMARY_I2C_ADDR, SECONDARY_I2C_ADDR};

/// Which of the two fixed addresses the board answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusAddress {
    #[default]
    Primary,
    Secondary,
}

impl BusAddress {
    pub const fn address(self) -> u8 {
        match self {
            BusAddress::Primary => PRIMARY_I2C_ADDR,
            BusAddress::Secondary => SECONDARY_I2C_ADDR,
        }
    }
}

/// Best-effort register access.
///
/// A failed read yields zeros and a failed write is dropped. Callers that
/// need to know whether the device is there check the identity register.
pub struct RegisterBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> RegisterBus<I2C> {
    pub fn new(i2c: I2C, address: BusAddress) -> Self {
        Self {
            i2c,
            address: address.address(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    pub fn read_raw(&mut self, register: u8, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        if let Err(e) = self.i2c.write_read(self.address, &[register], &mut buf) {
            warn!(
                "read of {} bytes at 0x{:02x} failed: {:?}",
                len,
                register,
                e.kind()
            );
            buf.fill(0);
        }
        debug!("read 0x{:02x}: {:02x?}", register, buf);
        buf
    }

    pub fn write_raw(&mut self, register: u8, data: &[u8]) {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        debug!("write 0x{:02x}: {:02x?}", register, data);
        if let Err(e) = self.i2c.write(self.address, &frame) {
            warn!("write at 0x{:02x} failed: {:?}", register, e.kind());
        }
    }

    pub fn read<const N: usize>(&mut self, register: Register) -> [u8; N] {
        debug_assert!(register.is_readable());
        debug_assert_eq!(register.width(), N);
        let mut out = [0u8; N];
        out.copy_from_slice(&self.read_raw(register.address(), N));
        out
    }

    pub fn write(&mut self, register: Register, data: &[u8]) {
        debug_assert!(register.is_writable());
        debug_assert_eq!(register.width(), data.len());
        self.write_raw(register.address(), data);
    }

    pub fn read_u8(&mut self, register: Register) -> u8 {
        let value: [u8; 1] = self.read(register);
        value[0]
    }

    pub fn read_u16(&mut self, register: Register) -> u16 {
        u16::from_le_bytes(self.read(register))
    }

    pub fn read_i16(&mut self, register: Register) -> i16 {
        i16::from_le_bytes(self.read(register))
    }

    pub fn read_u32(&mut self, register: Register) -> u32 {
        u32::from_le_bytes(self.read(register))
    }

    pub fn write_u8(&mut self, register: Register, value: u8) {
        self.write(register, &[value]);
    }

    pub fn write_u16(&mut self, register: Register, value: u16) {
        self.write(register, &value.to_le_bytes());
    }

    pub fn write_i16(&mut self, register: Register, value: i16) {
        self.write(register, &value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn test_read_little_endian() {
        let expectations = [
            I2cTransaction::write_read(0x20, vec![0x1A], vec![0x1C, 0x02]),
            I2cTransaction::write_read(0x20, vec![0x22], vec![0x10, 0x0E]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = RegisterBus::new(i2c.clone(), BusAddress::Primary);

        assert_eq!(bus.read_i16(Register::TimeZone), 540);
        assert_eq!(bus.read_u16(Register::CurrentLogCount), 3600);
        i2c.done();
    }

    #[test]
    fn test_failed_read_is_zero_filled() {
        let expectations = [
            I2cTransaction::write_read(0x22, vec![0x10], vec![0x50, 0x4D, 0x47, 0x52])
                .with_error(ErrorKind::Other),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = RegisterBus::new(i2c.clone(), BusAddress::Secondary);

        assert_eq!(bus.read_u32(Register::DeviceId), 0);
        i2c.done();
    }

    #[test]
    fn test_write_prefixes_register() {
        let expectations = [
            I2cTransaction::write(0x20, vec![0x24, 0xFF, 0xFF]),
            I2cTransaction::write(0x20, vec![0x1A, 0xD0, 0xFD]).with_error(ErrorKind::Other),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = RegisterBus::new(i2c.clone(), BusAddress::Primary);

        bus.write_u16(Register::CurrentLogIndex, 0xFFFF);
        // Dropped silently
        bus.write_i16(Register::TimeZone, -560);
        i2c.done();
    }
}
