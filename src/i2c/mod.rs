//! I2C master/slave transfer engine.
//!
//! A [`TransferHandle`] owns one controller's registers and the bookkeeping
//! of at most one transfer. Blocking transfers ([`blocking`]) poll the
//! status flags and keep everything on the caller's stack. Asynchronous
//! transfers ([`interrupt`]) park the caller's buffer in the handle and make
//! progress from the event and error interrupts until the close routines
//! hand the buffer back.

pub mod blocking;
pub mod config;
pub mod instance;
pub mod interrupt;
pub mod regs;
#[cfg(test)]
pub(crate) mod sim;

use core::fmt;

use crate::log::{Logger, NoOpLogger};

pub use config::{DutyCycle, ErrorPolicy, I2cConfig, I2cConfigBuilder, I2cSpeed};
pub use instance::Instance;
pub use interrupt::{EventCode, EventHandler, I2cEngine, I2cEvent, NoOpHandler};
pub use regs::{Control1, Control2, I2cRegisters, Status1, Status2};

use config::RegisterSetup;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferState {
    Ready,
    BusyTx,
    BusyRx,
}

/// R/W bit of the address byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Width of the register address sent by [`TransferHandle::mem_read`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemAddressSize {
    Bits8,
    Bits16,
}

/// A hardware error flag reported by the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusError {
    /// Misplaced START or STOP (BERR).
    Bus,
    ArbitrationLost,
    /// No ACK after an address or data byte (AF).
    AcknowledgeFailure,
    /// Overrun or underrun (OVR).
    Overrun,
    /// SCL held low too long (TIMEOUT).
    Timeout,
}

impl BusError {
    /// SR1 bit that signals this error.
    #[must_use]
    pub const fn flag(self) -> Status1 {
        match self {
            BusError::Bus => Status1::BERR,
            BusError::ArbitrationLost => Status1::ARLO,
            BusError::AcknowledgeFailure => Status1::AF,
            BusError::Overrun => Status1::OVR,
            BusError::Timeout => Status1::TIMEOUT,
        }
    }

    /// First error set in `status`, in BERR, ARLO, AF, OVR, TIMEOUT order.
    #[must_use]
    pub fn from_status(status: Status1) -> Option<Self> {
        Self::from_flags(status).next()
    }

    /// Every error set in `status`, in BERR, ARLO, AF, OVR, TIMEOUT order.
    pub fn from_flags(status: Status1) -> impl Iterator<Item = BusError> {
        [
            BusError::Bus,
            BusError::ArbitrationLost,
            BusError::AcknowledgeFailure,
            BusError::Overrun,
            BusError::Timeout,
        ]
        .into_iter()
        .filter(move |error| status.contains(error.flag()))
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BusError::Bus => "bus error",
            BusError::ArbitrationLost => "arbitration lost",
            BusError::AcknowledgeFailure => "acknowledge failure",
            BusError::Overrun => "overrun",
            BusError::Timeout => "SCL timeout",
        };
        f.write_str(text)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An asynchronous transfer owns the handle.
    Busy,
    /// The poll budget ran out before the flag was set.
    Timeout,
    Bus(BusError),
}

impl From<BusError> for Error {
    fn from(error: BusError) -> Self {
        Error::Bus(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Busy => f.write_str("transfer in progress"),
            Error::Timeout => f.write_str("timed out waiting for the bus"),
            Error::Bus(error) => write!(f, "{error}"),
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            Error::Bus(BusError::Bus) => ErrorKind::Bus,
            Error::Bus(BusError::ArbitrationLost) => ErrorKind::ArbitrationLoss,
            Error::Bus(BusError::AcknowledgeFailure) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
            }
            Error::Bus(BusError::Overrun) => ErrorKind::Overrun,
            Error::Bus(BusError::Timeout) | Error::Timeout | Error::Busy => ErrorKind::Other,
        }
    }
}

/// An asynchronous start that was turned away. `buffer` is the caller's,
/// untouched; `state` is the handle's state at the time of the call.
#[derive(Debug, PartialEq, Eq)]
pub struct Rejected<B> {
    pub state: TransferState,
    pub buffer: B,
}

/// One controller plus the state of its in-flight asynchronous transfer.
///
/// `'a` is the lifetime of the buffers lent to [`transmit_async`] and
/// [`receive_async`].
///
/// [`transmit_async`]: TransferHandle::transmit_async
/// [`receive_async`]: TransferHandle::receive_async
pub struct TransferHandle<'a, R, L = NoOpLogger> {
    regs: R,
    config: I2cConfig,
    tx: Option<&'a [u8]>,
    rx: Option<&'a mut [u8]>,
    tx_remaining: usize,
    rx_remaining: usize,
    rx_total: usize,
    state: TransferState,
    address: u8,
    repeated_start: bool,
    logger: L,
}

impl<'a, R: I2cRegisters> TransferHandle<'a, R, NoOpLogger> {
    pub fn new(regs: R, config: I2cConfig) -> Self {
        Self::with_logger(regs, config, NoOpLogger)
    }
}

impl<'a, R: I2cRegisters, L: Logger> TransferHandle<'a, R, L> {
    pub fn with_logger(regs: R, config: I2cConfig, logger: L) -> Self {
        Self {
            regs,
            config,
            tx: None,
            rx: None,
            tx_remaining: 0,
            rx_remaining: 0,
            rx_total: 0,
            state: TransferState::Ready,
            address: 0,
            repeated_start: false,
            logger,
        }
    }

    /// Programs clock control, rise time and own address for an APB1 clock
    /// of `pclk1_hz`. Leaves the peripheral disabled; the RCC clock of the
    /// instance must already be running.
    pub fn init(&mut self, pclk1_hz: u32) {
        let setup = RegisterSetup::compute(&self.config, pclk1_hz);
        self.set_enabled(false);
        self.regs.configure(&setup);
        self.logger.debug(format_args!(
            "i2c: init {} Hz, ccr {:#06x}, trise {}",
            self.config.speed.hz(),
            setup.ccr,
            setup.trise
        ));
    }

    /// Replaces the configuration and reprograms the controller. The
    /// peripheral is left disabled.
    pub fn reconfigure(&mut self, config: I2cConfig, pclk1_hz: u32) -> Result<(), Error> {
        self.ensure_ready()?;
        self.config = config;
        self.init(pclk1_hz);
        Ok(())
    }

    /// Sets or clears CR1.PE.
    ///
    /// The controller drops ACK whenever PE is cleared, so enabling also
    /// reapplies the configured acknowledge policy.
    pub fn set_enabled(&mut self, enable: bool) {
        let ack = self.config.ack;
        self.regs.modify_control1(|cr1| {
            if !enable {
                cr1 - Control1::PE
            } else if ack {
                cr1 | Control1::PE | Control1::ACK
            } else {
                cr1 | Control1::PE
            }
        });
    }

    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn logger_mut(&mut self) -> &mut L {
        &mut self.logger
    }

    /// Releases the registers and the logger.
    pub fn free(self) -> (R, L) {
        (self.regs, self.logger)
    }

    pub fn generate_start(&mut self) {
        self.regs.modify_control1(|cr1| cr1 | Control1::START);
    }

    pub fn generate_stop(&mut self) {
        self.regs.modify_control1(|cr1| cr1 | Control1::STOP);
    }

    /// Writes the 7-bit `address` and the R/W bit to DR.
    pub fn send_address(&mut self, address: u8, direction: Direction) {
        self.regs.write_data(((address & 0x7F) << 1) | direction as u8);
    }

    /// Clears ADDR by reading SR1 then SR2.
    ///
    /// A single-byte asynchronous receive must NACK its only byte, so ACK is
    /// dropped before the clear lets the controller clock it in.
    pub fn clear_address_flag(&mut self) {
        if self.state == TransferState::BusyRx && self.rx_total == 1 {
            self.manage_ack(false);
        }
        let _ = self.regs.status1();
        let _ = self.regs.status2();
    }

    pub fn manage_ack(&mut self, enable: bool) {
        self.regs.modify_control1(|cr1| {
            if enable {
                cr1 | Control1::ACK
            } else {
                cr1 - Control1::ACK
            }
        });
    }

    pub fn flag_status(&self, flag: Status1) -> bool {
        self.regs.status1().contains(flag)
    }

    /// Sets or clears ITBUFEN, ITEVTEN and ITERREN, for a controller that
    /// waits to be addressed.
    pub fn enable_slave_events(&mut self, enable: bool) {
        self.regs.modify_control2(|cr2| {
            if enable {
                cr2 | Control2::ALL_INTERRUPTS
            } else {
                cr2 - Control2::ALL_INTERRUPTS
            }
        });
    }

    pub fn slave_transmit(&mut self, byte: u8) {
        self.regs.write_data(byte);
    }

    pub fn slave_receive(&mut self) -> u8 {
        self.regs.read_data()
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            TransferState::Ready => Ok(()),
            _ => Err(Error::Busy),
        }
    }

    /// Polls SR1 until `flag` is set.
    ///
    /// Under [`ErrorPolicy::Propagate`] every poll also looks at the error
    /// flags and gives up on the first one.
    pub(crate) fn wait_for(&mut self, flag: Status1) -> Result<(), Error> {
        let mut budget = self.config.timeout;
        loop {
            let status = self.regs.status1();
            if self.config.error_policy == ErrorPolicy::Propagate {
                if let Some(error) = BusError::from_status(status) {
                    return Err(self.abort(error));
                }
            }
            if status.contains(flag) {
                return Ok(());
            }
            if let Some(polls) = budget.as_mut() {
                if *polls == 0 {
                    self.logger
                        .error(format_args!("i2c: timeout waiting for {:?}", flag));
                    return Err(Error::Timeout);
                }
                *polls -= 1;
            }
        }
    }

    fn abort(&mut self, error: BusError) -> Error {
        self.regs.clear_status1(error.flag());
        if error == BusError::AcknowledgeFailure {
            self.generate_stop();
        }
        if self.config.ack {
            self.manage_ack(true);
        }
        self.logger
            .error(format_args!("i2c: {} (addr {:#04x})", error, self.address));
        Error::Bus(error)
    }
}
