//! Typed view of the I2C register block.
//!
//! The transfer engine never touches raw bit positions. It reads and writes
//! the controller through [`I2cRegisters`], whose status and control words are
//! the bit-flag types below. The three PAC controller singletons implement the
//! trait; tests use a simulated block instead.
//!
//! Several status bits are cleared by *access sequences* rather than writes:
//!
//! - SB: read SR1, then write DR.
//! - ADDR: read SR1, then read SR2.
//! - STOPF: read SR1, then write CR1.
//! - BERR/ARLO/AF/OVR/TIMEOUT: write 0 to the bit (rc_w0).
//!
//! Every accessor here is a real register access, so call order matters.

use bitflags::bitflags;
use stm32f4::stm32f407 as pac;

use super::config::RegisterSetup;

bitflags! {
    /// SR1
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status1: u32 {
        /// Start condition generated (master).
        const SB = 1 << 0;
        /// Address sent (master) or matched (slave).
        const ADDR = 1 << 1;
        /// Byte transfer finished.
        const BTF = 1 << 2;
        const ADD10 = 1 << 3;
        /// Stop detected (slave).
        const STOPF = 1 << 4;
        const RXNE = 1 << 6;
        const TXE = 1 << 7;
        const BERR = 1 << 8;
        const ARLO = 1 << 9;
        const AF = 1 << 10;
        const OVR = 1 << 11;
        const PECERR = 1 << 12;
        /// Timeout or Tlow error.
        const TIMEOUT = 1 << 14;
        const SMBALERT = 1 << 15;
    }
}

bitflags! {
    /// SR2
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status2: u32 {
        /// Master mode.
        const MSL = 1 << 0;
        const BUSY = 1 << 1;
        /// Transmitter (data bytes are being sent).
        const TRA = 1 << 2;
        const GENCALL = 1 << 4;
        const DUALF = 1 << 7;
    }
}

bitflags! {
    /// CR1
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control1: u32 {
        const PE = 1 << 0;
        const START = 1 << 8;
        const STOP = 1 << 9;
        const ACK = 1 << 10;
        const POS = 1 << 11;
        const SWRST = 1 << 15;
    }
}

bitflags! {
    /// CR2
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control2: u32 {
        /// Peripheral clock in MHz.
        const FREQ = 0x3F;
        const ITERREN = 1 << 8;
        const ITEVTEN = 1 << 9;
        const ITBUFEN = 1 << 10;
        const DMAEN = 1 << 11;
        const LAST = 1 << 12;
    }
}

impl Control2 {
    /// Buffer, event and error interrupt enables.
    pub const ALL_INTERRUPTS: Control2 = Control2::ITBUFEN
        .union(Control2::ITEVTEN)
        .union(Control2::ITERREN);
}

/// Register-level access to one I2C controller.
pub trait I2cRegisters {
    /// Read SR1.
    fn status1(&self) -> Status1;

    /// Read SR2. Following an SR1 read this clears ADDR.
    fn status2(&self) -> Status2;

    /// Write 0 to the given rc_w0 bits of SR1, leaving the others alone.
    fn clear_status1(&self, flags: Status1);

    fn control1(&self) -> Control1;

    fn modify_control1(&self, f: impl FnOnce(Control1) -> Control1);

    fn control2(&self) -> Control2;

    fn modify_control2(&self, f: impl FnOnce(Control2) -> Control2);

    fn read_data(&self) -> u8;

    fn write_data(&self, byte: u8);

    /// Program CR1.ACK, CR2.FREQ, OAR1, CCR and TRISE in one go.
    ///
    /// The peripheral must be disabled (PE = 0) while CCR and TRISE change.
    fn configure(&self, setup: &RegisterSetup);
}

impl I2cRegisters for pac::i2c1::RegisterBlock {
    fn status1(&self) -> Status1 {
        Status1::from_bits_retain(self.sr1.read().bits())
    }

    fn status2(&self) -> Status2 {
        Status2::from_bits_retain(self.sr2.read().bits())
    }

    fn clear_status1(&self, flags: Status1) {
        self.sr1
            .modify(|r, w| unsafe { w.bits(r.bits() & !flags.bits()) });
    }

    fn control1(&self) -> Control1 {
        Control1::from_bits_retain(self.cr1.read().bits())
    }

    fn modify_control1(&self, f: impl FnOnce(Control1) -> Control1) {
        self.cr1.modify(|r, w| unsafe {
            w.bits(f(Control1::from_bits_retain(r.bits())).bits())
        });
    }

    fn control2(&self) -> Control2 {
        Control2::from_bits_retain(self.cr2.read().bits())
    }

    fn modify_control2(&self, f: impl FnOnce(Control2) -> Control2) {
        self.cr2.modify(|r, w| unsafe {
            w.bits(f(Control2::from_bits_retain(r.bits())).bits())
        });
    }

    fn read_data(&self) -> u8 {
        self.dr.read().dr().bits()
    }

    fn write_data(&self, byte: u8) {
        self.dr.write(|w| w.dr().bits(byte));
    }

    fn configure(&self, setup: &RegisterSetup) {
        self.cr1.modify(|_, w| w.ack().bit(setup.ack));
        self.cr2
            .modify(|_, w| unsafe { w.freq().bits(setup.freq_mhz) });
        self.oar1.write(|w| unsafe { w.bits(setup.oar1) });
        self.ccr.write(|w| unsafe { w.bits(setup.ccr) });
        self.trise.write(|w| unsafe { w.bits(setup.trise) });
    }
}

// The PAC singletons all deref to the shared `i2c1::RegisterBlock`.
macro_rules! impl_registers {
    ($($I2C:ident),+) => { $(
        impl I2cRegisters for pac::$I2C {
            #[inline]
            fn status1(&self) -> Status1 {
                (**self).status1()
            }

            #[inline]
            fn status2(&self) -> Status2 {
                (**self).status2()
            }

            #[inline]
            fn clear_status1(&self, flags: Status1) {
                (**self).clear_status1(flags)
            }

            #[inline]
            fn control1(&self) -> Control1 {
                (**self).control1()
            }

            #[inline]
            fn modify_control1(&self, f: impl FnOnce(Control1) -> Control1) {
                (**self).modify_control1(f)
            }

            #[inline]
            fn control2(&self) -> Control2 {
                (**self).control2()
            }

            #[inline]
            fn modify_control2(&self, f: impl FnOnce(Control2) -> Control2) {
                (**self).modify_control2(f)
            }

            #[inline]
            fn read_data(&self) -> u8 {
                (**self).read_data()
            }

            #[inline]
            fn write_data(&self, byte: u8) {
                (**self).write_data(byte)
            }

            #[inline]
            fn configure(&self, setup: &RegisterSetup) {
                (**self).configure(setup)
            }
        }
    )+ };
}

impl_registers!(I2C1, I2C2, I2C3);
