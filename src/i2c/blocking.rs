//! Polling transfers.
//!
//! Every step polls SR1 for the flag the next register access depends on,
//! then performs that access. With the default [`ErrorPolicy::Legacy`] and no
//! poll budget a missing device hangs the caller, exactly like the hardware
//! sequence it mirrors; configure a `timeout` or [`ErrorPolicy::Propagate`]
//! to get an `Err` instead.
//!
//! [`ErrorPolicy::Legacy`]: super::ErrorPolicy::Legacy
//! [`ErrorPolicy::Propagate`]: super::ErrorPolicy::Propagate

use core::mem::discriminant;

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use super::{Direction, Error, I2cRegisters, MemAddressSize, Status1, TransferHandle};
use crate::log::Logger;

impl<'a, R: I2cRegisters, L: Logger> TransferHandle<'a, R, L> {
    /// Sends `buf` to `address`. With `repeated_start` the bus is kept and
    /// no STOP is generated, so the next transfer begins with a repeated
    /// START.
    pub fn master_transmit(
        &mut self,
        buf: &[u8],
        address: u8,
        repeated_start: bool,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        self.logger
            .debug(format_args!("i2c: write {} to {:#04x}", buf.len(), address));
        self.begin(address, Direction::Write)?;
        self.clear_address_flag();
        self.write_payload(buf)?;
        self.end_write(repeated_start)
    }

    /// Fills `buf` from `address`, NACKing the last byte. An empty `buf`
    /// returns at once without touching the bus.
    pub fn master_receive(
        &mut self,
        buf: &mut [u8],
        address: u8,
        repeated_start: bool,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        if buf.is_empty() {
            return Ok(());
        }
        self.logger
            .debug(format_args!("i2c: read {} from {:#04x}", buf.len(), address));
        let len = buf.len();
        self.read_phase(buf.iter_mut(), len, address, repeated_start)
    }

    /// Register read: sends `mem_address` (big-endian, `size` wide) and
    /// then reads `buf.len()` bytes behind a repeated START. An empty `buf`
    /// returns at once, like [`master_receive`](Self::master_receive).
    pub fn mem_read(
        &mut self,
        address: u8,
        mem_address: u16,
        size: MemAddressSize,
        buf: &mut [u8],
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        if buf.is_empty() {
            return Ok(());
        }
        let bytes = mem_address.to_be_bytes();
        let pointer = match size {
            MemAddressSize::Bits8 => &bytes[1..],
            MemAddressSize::Bits16 => &bytes[..],
        };
        self.master_transmit(pointer, address, true)?;
        self.master_receive(buf, address, false)
    }

    /// START, address, and wait until the peer has acknowledged it. ADDR is
    /// left set for the caller to clear.
    fn begin(&mut self, address: u8, direction: Direction) -> Result<(), Error> {
        self.address = address;
        self.generate_start();
        self.wait_for(Status1::SB)?;
        self.send_address(address, direction);
        self.wait_for(Status1::ADDR)
    }

    fn write_payload(&mut self, buf: &[u8]) -> Result<(), Error> {
        for &byte in buf {
            self.wait_for(Status1::TXE)?;
            self.regs.write_data(byte);
        }
        Ok(())
    }

    fn end_write(&mut self, repeated_start: bool) -> Result<(), Error> {
        self.wait_for(Status1::TXE)?;
        self.wait_for(Status1::BTF)?;
        if !repeated_start {
            self.generate_stop();
        }
        Ok(())
    }

    /// One addressed read of `len` bytes into `slots`, which may span
    /// several buffers.
    fn read_phase<'b>(
        &mut self,
        slots: impl Iterator<Item = &'b mut u8>,
        len: usize,
        address: u8,
        repeated_start: bool,
    ) -> Result<(), Error> {
        self.begin(address, Direction::Read)?;
        let result = self.read_payload(slots, len, repeated_start);
        if self.config.ack {
            self.manage_ack(true);
        }
        result
    }

    fn read_payload<'b>(
        &mut self,
        mut slots: impl Iterator<Item = &'b mut u8>,
        len: usize,
        repeated_start: bool,
    ) -> Result<(), Error> {
        if len == 1 {
            // NACK the only byte: ACK has to be off before ADDR is cleared.
            self.manage_ack(false);
            self.clear_address_flag();
            self.wait_for(Status1::RXNE)?;
            if !repeated_start {
                self.generate_stop();
            }
            let byte = self.regs.read_data();
            if let Some(slot) = slots.next() {
                *slot = byte;
            }
            return Ok(());
        }

        self.clear_address_flag();
        for (i, slot) in slots.enumerate() {
            self.wait_for(Status1::RXNE)?;
            if len - i == 2 {
                self.manage_ack(false);
                if !repeated_start {
                    self.generate_stop();
                }
            }
            *slot = self.regs.read_data();
        }
        Ok(())
    }
}

impl<'a, R: I2cRegisters, L: Logger> ErrorType for TransferHandle<'a, R, L> {
    type Error = Error;
}

impl<'a, R: I2cRegisters, L: Logger> I2c<SevenBitAddress> for TransferHandle<'a, R, L> {
    /// Adjacent writes share one addressed phase, and so do adjacent reads:
    /// their bytes are ACKed across buffer boundaries and only the final one
    /// is NACKed. Each change of direction begins with a repeated START and
    /// the last operation ends with STOP.
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.ensure_ready()?;
        let count = operations.len();
        let mut bus_held = false;
        let mut i = 0;

        while i < count {
            let kind = discriminant(&operations[i]);
            let end = operations[i..]
                .iter()
                .position(|op| discriminant(op) != kind)
                .map_or(count, |n| i + n);
            let last = end == count;
            let group = &mut operations[i..end];
            i = end;

            if let Operation::Write(_) = group[0] {
                self.begin(address, Direction::Write)?;
                self.clear_address_flag();
                for op in group.iter() {
                    if let Operation::Write(bytes) = op {
                        self.write_payload(bytes)?;
                    }
                }
                self.end_write(!last)?;
                bus_held = !last;
                continue;
            }

            let len: usize = group
                .iter()
                .map(|op| match op {
                    Operation::Read(buf) => buf.len(),
                    Operation::Write(_) => 0,
                })
                .sum();
            if len == 0 {
                continue;
            }
            let slots = group
                .iter_mut()
                .filter_map(|op| match op {
                    Operation::Read(buf) => Some(buf.iter_mut()),
                    Operation::Write(_) => None,
                })
                .flatten();
            self.read_phase(slots, len, address, !last)?;
            bus_held = !last;
        }

        // A trailing empty read never got to release the bus.
        if bus_held {
            self.generate_stop();
        }
        Ok(())
    }
}
