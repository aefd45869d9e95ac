//! MPU6050 over the blocking I2C path: identity check, wake-up, raw burst
//! read. Scaling to physical units is left to the caller.

use core::fmt;

use crate::i2c::{Error, I2cRegisters, MemAddressSize, TransferHandle};
use crate::log::Logger;

/// AD0 low.
pub const DEFAULT_ADDRESS: u8 = 0x68;

// Register map
pub const ACCEL_XOUT_H: u8 = 0x3B;
const GYRO_CONFIG: u8 = 0x1B;
const ACCEL_CONFIG: u8 = 0x1C;
const PWR_MGMT_1: u8 = 0x6B;
const WHO_AM_I: u8 = 0x75;

const WHO_AM_I_VALUE: u8 = 0x68;

/// ACCEL_XOUT_H through GYRO_ZOUT_L.
pub const BURST_LEN: usize = 14;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mpu6050Error {
    I2c(Error),
    UnexpectedId(u8),
}

impl From<Error> for Mpu6050Error {
    fn from(error: Error) -> Self {
        Mpu6050Error::I2c(error)
    }
}

impl fmt::Display for Mpu6050Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mpu6050Error::I2c(error) => write!(f, "i2c: {error}"),
            Mpu6050Error::UnexpectedId(id) => write!(f, "WHO_AM_I returned {id:#04x}"),
        }
    }
}

/// One burst of sensor registers, as signed big-endian counts.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RawReading {
    pub accel: [i16; 3],
    pub temp: i16,
    pub gyro: [i16; 3],
}

impl RawReading {
    pub fn from_bytes(bytes: &[u8; BURST_LEN]) -> Self {
        let word = |i: usize| i16::from_be_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Self {
            accel: [word(0), word(1), word(2)],
            temp: word(3),
            gyro: [word(4), word(5), word(6)],
        }
    }
}

pub struct Mpu6050 {
    address: u8,
}

impl Default for Mpu6050 {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

impl Mpu6050 {
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Checks WHO_AM_I, leaves sleep mode and selects ±250 °/s and ±2 g.
    pub fn init<R: I2cRegisters, L: Logger>(
        &self,
        i2c: &mut TransferHandle<'_, R, L>,
    ) -> Result<(), Mpu6050Error> {
        let mut id = [0u8; 1];
        i2c.mem_read(self.address, WHO_AM_I.into(), MemAddressSize::Bits8, &mut id)?;
        if id[0] != WHO_AM_I_VALUE {
            return Err(Mpu6050Error::UnexpectedId(id[0]));
        }

        self.write_register(i2c, PWR_MGMT_1, 0x00)?;
        self.write_register(i2c, GYRO_CONFIG, 0x00)?;
        self.write_register(i2c, ACCEL_CONFIG, 0x00)?;
        Ok(())
    }

    pub fn read_raw<R: I2cRegisters, L: Logger>(
        &self,
        i2c: &mut TransferHandle<'_, R, L>,
    ) -> Result<RawReading, Mpu6050Error> {
        let mut buf = [0u8; BURST_LEN];
        i2c.mem_read(self.address, ACCEL_XOUT_H.into(), MemAddressSize::Bits8, &mut buf)?;
        Ok(RawReading::from_bytes(&buf))
    }

    fn write_register<R: I2cRegisters, L: Logger>(
        &self,
        i2c: &mut TransferHandle<'_, R, L>,
        register: u8,
        value: u8,
    ) -> Result<(), Error> {
        i2c.master_transmit(&[register, value], self.address, false)
    }
}
