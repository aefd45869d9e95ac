//! Interrupt-driven transfers.
//!
//! [`TransferHandle::transmit_async`] and [`TransferHandle::receive_async`]
//! park the caller's buffer in the handle, generate START and enable the
//! controller interrupts. From then on [`I2cEngine::on_event_interrupt`]
//! moves one step per flag, and [`I2cEngine::on_error_interrupt`] reports
//! bus errors. Completion releases the buffer and passes it to the
//! [`EventHandler`] together with the event.

use core::ops::{Deref, DerefMut};

use super::{
    BusError, Control1, Control2, Direction, I2cRegisters, Rejected, Status1, Status2,
    TransferHandle, TransferState,
};
use crate::log::{Logger, NoOpLogger};

/// Numeric event codes, as reported to applications that log or forward
/// them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventCode {
    TxComplete = 0,
    RxComplete = 1,
    Stop = 2,
    BusError = 3,
    ArbitrationLost = 4,
    AcknowledgeFailure = 5,
    Overrun = 6,
    Timeout = 7,
    DataRequest = 8,
    DataReceived = 9,
}

#[derive(Debug, PartialEq, Eq)]
pub enum I2cEvent<'a> {
    /// Master transmit finished; the buffer lent to `transmit_async`.
    TxComplete(&'a [u8]),
    /// Master receive finished; the buffer lent to `receive_async`, filled.
    RxComplete(&'a mut [u8]),
    /// Slave: the remote master generated STOP.
    Stop,
    /// Slave transmitter: DR is empty, supply a byte with `slave_transmit`.
    DataRequest,
    /// Slave receiver: a byte is waiting, fetch it with `slave_receive`.
    DataReceived,
    Error(BusError),
}

impl I2cEvent<'_> {
    pub fn code(&self) -> EventCode {
        match self {
            I2cEvent::TxComplete(_) => EventCode::TxComplete,
            I2cEvent::RxComplete(_) => EventCode::RxComplete,
            I2cEvent::Stop => EventCode::Stop,
            I2cEvent::DataRequest => EventCode::DataRequest,
            I2cEvent::DataReceived => EventCode::DataReceived,
            I2cEvent::Error(BusError::Bus) => EventCode::BusError,
            I2cEvent::Error(BusError::ArbitrationLost) => EventCode::ArbitrationLost,
            I2cEvent::Error(BusError::AcknowledgeFailure) => EventCode::AcknowledgeFailure,
            I2cEvent::Error(BusError::Overrun) => EventCode::Overrun,
            I2cEvent::Error(BusError::Timeout) => EventCode::Timeout,
        }
    }
}

/// Application side of the interrupt engine.
///
/// Runs in interrupt context. The handle is lent back so the handler can
/// chain the next transfer, serve a slave byte, or reset the bus after an
/// error.
pub trait EventHandler<'a, R, L> {
    fn on_event(&mut self, handle: &mut TransferHandle<'a, R, L>, event: I2cEvent<'a>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl<'a, R, L> EventHandler<'a, R, L> for NoOpHandler {
    fn on_event(&mut self, _handle: &mut TransferHandle<'a, R, L>, _event: I2cEvent<'a>) {}
}

impl<'a, R: I2cRegisters, L: Logger> TransferHandle<'a, R, L> {
    /// Starts sending `buf` to `address` from the interrupts.
    ///
    /// While another transfer is in flight nothing changes and the buffer
    /// comes back in the `Err` along with the current state.
    pub fn transmit_async(
        &mut self,
        buf: &'a [u8],
        address: u8,
        repeated_start: bool,
    ) -> Result<(), Rejected<&'a [u8]>> {
        if self.state != TransferState::Ready {
            return Err(Rejected {
                state: self.state,
                buffer: buf,
            });
        }
        self.tx_remaining = buf.len();
        self.tx = Some(buf);
        self.arm(address, repeated_start, TransferState::BusyTx);
        Ok(())
    }

    /// Starts filling `buf` from `address` from the interrupts.
    ///
    /// Refused like [`transmit_async`](Self::transmit_async) while busy, and
    /// also for an empty `buf`, which would never complete.
    pub fn receive_async(
        &mut self,
        buf: &'a mut [u8],
        address: u8,
        repeated_start: bool,
    ) -> Result<(), Rejected<&'a mut [u8]>> {
        if self.state != TransferState::Ready || buf.is_empty() {
            return Err(Rejected {
                state: self.state,
                buffer: buf,
            });
        }
        self.rx_remaining = buf.len();
        self.rx_total = buf.len();
        self.rx = Some(buf);
        self.arm(address, repeated_start, TransferState::BusyRx);
        Ok(())
    }

    fn arm(&mut self, address: u8, repeated_start: bool, state: TransferState) {
        self.address = address;
        self.repeated_start = repeated_start;
        self.state = state;
        self.logger.debug(format_args!(
            "i2c: {:?} {:#04x}, {} bytes",
            state,
            address,
            self.tx_remaining.max(self.rx_remaining)
        ));
        self.generate_start();
        self.regs.modify_control2(|cr2| cr2 | Control2::ALL_INTERRUPTS);
    }

    /// Ends the transmit: buffer and event interrupts off, state `Ready`.
    /// Returns the buffer that was lent to `transmit_async`.
    pub fn close_transmit(&mut self) -> Option<&'a [u8]> {
        self.regs
            .modify_control2(|cr2| cr2 - (Control2::ITBUFEN | Control2::ITEVTEN));
        self.state = TransferState::Ready;
        self.tx_remaining = 0;
        self.tx.take()
    }

    /// Ends the receive like [`close_transmit`](Self::close_transmit) and
    /// restores ACK when the configuration asks for it.
    pub fn close_receive(&mut self) -> Option<&'a mut [u8]> {
        self.regs
            .modify_control2(|cr2| cr2 - (Control2::ITBUFEN | Control2::ITEVTEN));
        self.state = TransferState::Ready;
        self.rx_remaining = 0;
        self.rx_total = 0;
        if self.config.ack {
            self.manage_ack(true);
        }
        self.rx.take()
    }

    fn is_master(&self) -> bool {
        self.regs.status2().contains(Status2::MSL)
    }

    fn transmit_next(&mut self) {
        if let Some(tx) = self.tx {
            let index = tx.len() - self.tx_remaining;
            if let Some(&byte) = tx.get(index) {
                self.regs.write_data(byte);
            }
        }
        self.tx_remaining -= 1;
    }

    /// Moves one byte into the receive buffer. `true` once the last one is in.
    fn receive_next(&mut self) -> bool {
        // For longer transfers ACK has to drop while the second-to-last byte
        // is still in DR, so the byte behind it is NACKed.
        if self.rx_total > 1 && self.rx_remaining == 2 {
            self.manage_ack(false);
        }
        let byte = self.regs.read_data();
        let index = self.rx_total - self.rx_remaining;
        if let Some(slot) = self.rx.as_deref_mut().and_then(|rx| rx.get_mut(index)) {
            *slot = byte;
        }
        self.rx_remaining -= 1;
        self.rx_remaining == 0
    }
}

/// A handle plus the application's [`EventHandler`]: the object the two
/// interrupt vectors of one controller drive.
pub struct I2cEngine<'a, R, H = NoOpHandler, L = NoOpLogger> {
    handle: TransferHandle<'a, R, L>,
    handler: H,
}

impl<'a, R, H, L> Deref for I2cEngine<'a, R, H, L> {
    type Target = TransferHandle<'a, R, L>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<'a, R, H, L> DerefMut for I2cEngine<'a, R, H, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.handle
    }
}

impl<'a, R, H, L> I2cEngine<'a, R, H, L>
where
    R: I2cRegisters,
    H: EventHandler<'a, R, L>,
    L: Logger,
{
    pub fn new(handle: TransferHandle<'a, R, L>, handler: H) -> Self {
        Self { handle, handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_parts(self) -> (TransferHandle<'a, R, L>, H) {
        (self.handle, self.handler)
    }

    fn notify(&mut self, event: I2cEvent<'a>) {
        self.handler.on_event(&mut self.handle, event);
    }

    /// Event vector body (`I2Cx_EV`).
    ///
    /// Each flag is checked on its own, in this order: SB, ADDR, BTF, STOPF,
    /// TXE, RXNE. All are gated on ITEVTEN; TXE and RXNE also need ITBUFEN.
    pub fn on_event_interrupt(&mut self) {
        let cr2 = self.handle.regs.control2();
        if !cr2.contains(Control2::ITEVTEN) {
            return;
        }
        let buffer_events = cr2.contains(Control2::ITBUFEN);

        if self.handle.flag_status(Status1::SB) {
            let address = self.handle.address;
            match self.handle.state {
                TransferState::BusyTx => self.handle.send_address(address, Direction::Write),
                TransferState::BusyRx => self.handle.send_address(address, Direction::Read),
                TransferState::Ready => {}
            }
        }

        if self.handle.flag_status(Status1::ADDR) {
            self.handle.clear_address_flag();
        }

        if self.handle.flag_status(Status1::BTF)
            && self.handle.state == TransferState::BusyTx
            && self.handle.flag_status(Status1::TXE)
            && self.handle.tx_remaining == 0
        {
            if !self.handle.repeated_start {
                self.handle.generate_stop();
            }
            let buf = self.handle.close_transmit().unwrap_or_default();
            self.handle
                .logger
                .debug(format_args!("i2c: sent {} bytes", buf.len()));
            self.notify(I2cEvent::TxComplete(buf));
        }

        if self.handle.flag_status(Status1::STOPF) {
            // STOPF clears on SR1 read followed by a CR1 write.
            let _ = self.handle.regs.status1();
            self.handle.regs.modify_control1(|cr1: Control1| cr1);
            self.notify(I2cEvent::Stop);
        }

        if buffer_events && self.handle.flag_status(Status1::TXE) {
            if self.handle.is_master() {
                if self.handle.state == TransferState::BusyTx && self.handle.tx_remaining > 0 {
                    self.handle.transmit_next();
                }
            } else if self.handle.regs.status2().contains(Status2::TRA) {
                self.notify(I2cEvent::DataRequest);
            }
        }

        if buffer_events && self.handle.flag_status(Status1::RXNE) {
            if self.handle.is_master() {
                if self.handle.state == TransferState::BusyRx && self.handle.receive_next() {
                    if !self.handle.repeated_start {
                        self.handle.generate_stop();
                    }
                    let buf = self.handle.close_receive().unwrap_or_default();
                    self.handle
                        .logger
                        .debug(format_args!("i2c: received {} bytes", buf.len()));
                    self.notify(I2cEvent::RxComplete(buf));
                }
            } else if !self.handle.regs.status2().contains(Status2::TRA) {
                self.notify(I2cEvent::DataReceived);
            }
        }
    }

    /// Error vector body (`I2Cx_ER`).
    ///
    /// Clears and reports each set error flag. The transfer state is left
    /// alone; the handler decides whether to stop and close.
    pub fn on_error_interrupt(&mut self) {
        if !self.handle.regs.control2().contains(Control2::ITERREN) {
            return;
        }
        for error in BusError::from_flags(self.handle.regs.status1()) {
            self.handle.regs.clear_status1(error.flag());
            self.handle.logger.error(format_args!(
                "i2c: {} during {:?} (addr {:#04x})",
                error, self.handle.state, self.handle.address
            ));
            self.notify(I2cEvent::Error(error));
        }
    }
}
