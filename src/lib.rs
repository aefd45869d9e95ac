//! Blocking and interrupt-driven I2C for the STM32F407.
//!
//! [`i2c::TransferHandle`] owns one controller. Its blocking half polls the
//! status flags on the caller's stack; wrapped in an [`i2c::I2cEngine`] it
//! also runs transfers byte by byte from the event and error interrupts.
#![cfg_attr(not(test), no_std)]

pub mod i2c;
pub mod log;
pub mod mpu6050;
