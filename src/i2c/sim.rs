//! Host-side model of one I2C controller and the device behind it.
//!
//! Only the behaviour the engine depends on is modelled: the SB/ADDR/STOPF
//! clear-on-access sequences, TXE/BTF after each transmitted byte, RXNE with
//! ACK sampled from CR1 when a byte is clocked in, and a STOP requested
//! during master receive taking effect after the byte in flight. Transfers
//! complete instantly. In master receive the bus keeps clocking until a STOP
//! or START goes out: after an ACKed byte the next one is clocked when DR is
//! read, after a NACKed byte on the next SR1 poll once DR has been read.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::config::RegisterSetup;
use super::regs::{Control1, Control2, I2cRegisters, Status1, Status2};
use super::BusError;

/// What a logic analyser on the bus would show.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wire {
    Start,
    Address(u8),
    Write(u8),
    Read { byte: u8, ack: bool },
    Stop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    MasterTx,
    MasterRx,
    Slave,
}

#[derive(Default)]
struct Device {
    address: u8,
    present: bool,
    responses: VecDeque<u8>,
    received: Vec<u8>,
    nack_after: Option<usize>,
}

struct State {
    sr1: Status1,
    sr2: Status2,
    cr1: Control1,
    cr2: Control2,
    setup: Option<RegisterSetup>,
    dr: u8,
    sr1_read: bool,
    mode: Mode,
    last_acked: bool,
    stop_pending: bool,
    resume: bool,
    device: Device,
    wire: Vec<Wire>,
    slave_sent: Vec<u8>,
}

pub struct SimI2c {
    state: RefCell<State>,
}

impl SimI2c {
    /// A bus with nothing attached.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                sr1: Status1::empty(),
                sr2: Status2::empty(),
                cr1: Control1::empty(),
                cr2: Control2::empty(),
                setup: None,
                dr: 0,
                sr1_read: false,
                mode: Mode::Idle,
                last_acked: false,
                stop_pending: false,
                resume: false,
                device: Device::default(),
                wire: Vec::new(),
                slave_sent: Vec::new(),
            }),
        }
    }

    /// A bus with one device answering at `address`.
    pub fn with_device(address: u8) -> Self {
        let sim = Self::new();
        {
            let mut s = sim.state.borrow_mut();
            s.device.address = address;
            s.device.present = true;
        }
        sim
    }

    /// Queue bytes the device returns on reads. Reads past the end get 0xFF.
    pub fn respond_with(&self, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .device
            .responses
            .extend(bytes.iter().copied());
    }

    /// Make the device NACK every data byte after the first `count`.
    pub fn nack_after(&self, count: usize) {
        self.state.borrow_mut().device.nack_after = Some(count);
    }

    pub fn device_received(&self) -> Vec<u8> {
        self.state.borrow().device.received.clone()
    }

    pub fn wire(&self) -> Vec<Wire> {
        self.state.borrow().wire.clone()
    }

    pub fn clear_wire(&self) {
        self.state.borrow_mut().wire.clear();
    }

    pub fn setup(&self) -> Option<RegisterSetup> {
        self.state.borrow().setup
    }

    /// Force status bits, e.g. an error flag.
    pub fn raise(&self, flags: Status1) {
        self.state.borrow_mut().sr1 |= flags;
    }

    /// Another master addressed us. `transmitter` selects the TRA bit.
    pub fn address_as_slave(&self, transmitter: bool) {
        let mut s = self.state.borrow_mut();
        s.mode = Mode::Slave;
        s.sr1 |= Status1::ADDR;
        s.sr2 = Status2::BUSY;
        if transmitter {
            s.sr2 |= Status2::TRA;
            s.sr1 |= Status1::TXE;
        }
    }

    /// The remote master wrote `byte` to us.
    pub fn slave_byte_in(&self, byte: u8) {
        let mut s = self.state.borrow_mut();
        s.dr = byte;
        s.sr1 |= Status1::RXNE;
    }

    /// The remote master ended the transfer.
    pub fn slave_stop(&self) {
        self.state.borrow_mut().sr1 |= Status1::STOPF;
    }

    /// Bytes we returned to a remote master.
    pub fn slave_sent(&self) -> Vec<u8> {
        self.state.borrow().slave_sent.clone()
    }

    /// Whether the event vector would be pending.
    pub fn event_pending(&self) -> bool {
        let s = self.state.borrow();
        if !s.cr2.contains(Control2::ITEVTEN) {
            return false;
        }
        let events = Status1::SB | Status1::ADDR | Status1::BTF | Status1::STOPF;
        let buffer = Status1::TXE | Status1::RXNE;
        s.sr1.intersects(events)
            || (s.cr2.contains(Control2::ITBUFEN) && s.sr1.intersects(buffer))
    }

    /// Whether the error vector would be pending.
    pub fn error_pending(&self) -> bool {
        let s = self.state.borrow();
        s.cr2.contains(Control2::ITERREN)
            && BusError::from_status(s.sr1).is_some()
    }
}

impl State {
    fn start(&mut self) {
        self.wire.push(Wire::Start);
        self.sr1 -= Status1::TXE | Status1::BTF;
        self.sr1 |= Status1::SB;
        self.sr2 |= Status2::MSL | Status2::BUSY;
        self.mode = Mode::Idle;
        self.stop_pending = false;
        self.resume = false;
    }

    fn stop(&mut self) {
        if self.mode == Mode::MasterRx && self.last_acked {
            self.stop_pending = true;
        } else {
            self.emit_stop();
        }
    }

    fn emit_stop(&mut self) {
        self.wire.push(Wire::Stop);
        self.sr1 -= Status1::TXE | Status1::BTF;
        self.sr2 -= Status2::MSL | Status2::BUSY | Status2::TRA;
        self.mode = Mode::Idle;
        self.stop_pending = false;
        self.resume = false;
    }

    fn address(&mut self, byte: u8) {
        self.sr1 -= Status1::SB;
        self.wire.push(Wire::Address(byte));
        let read = byte & 1 == 1;
        if self.device.present && byte >> 1 == self.device.address {
            self.sr1 |= Status1::ADDR;
            if read {
                self.mode = Mode::MasterRx;
                self.sr2 -= Status2::TRA;
            } else {
                self.mode = Mode::MasterTx;
                self.sr2 |= Status2::TRA;
            }
        } else {
            self.sr1 |= Status1::AF;
        }
    }

    fn address_cleared(&mut self) {
        match self.mode {
            // The address byte counts as a finished transfer with DR empty.
            Mode::MasterTx => self.sr1 |= Status1::TXE | Status1::BTF,
            Mode::MasterRx => self.clock_in(),
            Mode::Idle | Mode::Slave => {}
        }
    }

    fn clock_in(&mut self) {
        let byte = self.device.responses.pop_front().unwrap_or(0xFF);
        let ack = self.cr1.contains(Control1::ACK);
        self.wire.push(Wire::Read { byte, ack });
        self.dr = byte;
        self.sr1 |= Status1::RXNE;
        self.last_acked = ack;
        if self.stop_pending {
            self.emit_stop();
        }
    }

    fn transmit(&mut self, byte: u8) {
        self.wire.push(Wire::Write(byte));
        self.sr1 -= Status1::TXE | Status1::BTF;
        let accepted = self
            .device
            .nack_after
            .map_or(true, |limit| self.device.received.len() < limit);
        if accepted {
            self.device.received.push(byte);
            self.sr1 |= Status1::TXE | Status1::BTF;
        } else {
            self.sr1 |= Status1::AF;
        }
    }
}

impl I2cRegisters for SimI2c {
    fn status1(&self) -> Status1 {
        let mut s = self.state.borrow_mut();
        if s.mode == Mode::MasterRx && s.resume && !s.sr1.contains(Status1::RXNE) {
            s.resume = false;
            s.clock_in();
        }
        s.sr1_read = true;
        s.sr1
    }

    fn status2(&self) -> Status2 {
        let mut s = self.state.borrow_mut();
        let sr2 = s.sr2;
        if s.sr1_read && s.sr1.contains(Status1::ADDR) {
            s.sr1 -= Status1::ADDR;
            s.address_cleared();
        }
        s.sr1_read = false;
        sr2
    }

    fn clear_status1(&self, flags: Status1) {
        self.state.borrow_mut().sr1 -= flags;
    }

    fn control1(&self) -> Control1 {
        self.state.borrow().cr1
    }

    fn modify_control1(&self, f: impl FnOnce(Control1) -> Control1) {
        let mut s = self.state.borrow_mut();
        let requested = f(s.cr1);
        s.cr1 = requested - (Control1::START | Control1::STOP);

        if s.sr1_read && s.sr1.contains(Status1::STOPF) {
            s.sr1 -= Status1::STOPF;
            s.sr2 -= Status2::BUSY;
            s.mode = Mode::Idle;
            s.sr1_read = false;
        }
        if !s.cr1.contains(Control1::PE) {
            return;
        }
        if requested.contains(Control1::START) {
            s.start();
        }
        if requested.contains(Control1::STOP) {
            s.stop();
        }
    }

    fn control2(&self) -> Control2 {
        self.state.borrow().cr2
    }

    fn modify_control2(&self, f: impl FnOnce(Control2) -> Control2) {
        let mut s = self.state.borrow_mut();
        s.cr2 = f(s.cr2);
    }

    fn read_data(&self) -> u8 {
        let mut s = self.state.borrow_mut();
        s.sr1 -= Status1::RXNE;
        s.sr1_read = false;
        let byte = s.dr;
        if s.mode == Mode::MasterRx {
            if s.last_acked {
                s.clock_in();
            } else {
                s.resume = true;
            }
        }
        byte
    }

    fn write_data(&self, byte: u8) {
        let mut s = self.state.borrow_mut();
        if s.sr1.contains(Status1::SB) && s.sr1_read {
            s.sr1_read = false;
            s.address(byte);
            return;
        }
        match s.mode {
            Mode::MasterTx => s.transmit(byte),
            Mode::Slave => {
                s.slave_sent.push(byte);
                s.sr1 -= Status1::TXE;
            }
            Mode::Idle | Mode::MasterRx => {}
        }
    }

    fn configure(&self, setup: &RegisterSetup) {
        let mut s = self.state.borrow_mut();
        s.cr1.set(Control1::ACK, setup.ack);
        s.cr2 = (s.cr2 - Control2::FREQ)
            | Control2::from_bits_retain(u32::from(setup.freq_mhz));
        s.setup = Some(*setup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_needs_peripheral_enabled() {
        let sim = SimI2c::new();
        sim.modify_control1(|c| c | Control1::START);
        assert!(sim.wire().is_empty());

        sim.modify_control1(|c| c | Control1::PE | Control1::START);
        assert_eq!(sim.wire(), [Wire::Start]);
        assert!(sim.status1().contains(Status1::SB));
        assert!(!sim.control1().contains(Control1::START));
    }

    #[test]
    fn address_clear_needs_sr1_then_sr2() {
        let sim = SimI2c::with_device(0x3C);
        sim.modify_control1(|c| c | Control1::PE | Control1::START);
        let _ = sim.status1();
        sim.write_data(0x3C << 1);

        let _ = sim.status2();
        assert!(sim.status1().contains(Status1::ADDR));
        let _ = sim.status2();
        assert!(sim.status1().contains(Status1::TXE | Status1::BTF));
        assert!(!sim.status1().contains(Status1::ADDR));
    }

    #[test]
    fn stop_during_receive_waits_for_byte_in_flight() {
        let sim = SimI2c::with_device(0x3C);
        sim.respond_with(&[1, 2]);
        sim.modify_control1(|c| c | Control1::PE | Control1::ACK | Control1::START);
        let _ = sim.status1();
        sim.write_data((0x3C << 1) | 1);
        let _ = sim.status1();
        let _ = sim.status2();

        sim.modify_control1(|c| (c - Control1::ACK) | Control1::STOP);
        assert_eq!(sim.wire().last(), Some(&Wire::Read { byte: 1, ack: true }));
        assert_eq!(sim.read_data(), 1);
        assert_eq!(sim.read_data(), 2);
        assert_eq!(
            sim.wire()[2..],
            [
                Wire::Read { byte: 1, ack: true },
                Wire::Read { byte: 2, ack: false },
                Wire::Stop
            ]
        );
    }

    #[test]
    fn receive_keeps_clocking_after_nack_until_stop() {
        let sim = SimI2c::with_device(0x3C);
        sim.respond_with(&[1, 2, 3]);
        sim.modify_control1(|c| (c | Control1::PE | Control1::START) - Control1::ACK);
        let _ = sim.status1();
        sim.write_data((0x3C << 1) | 1);
        let _ = sim.status1();
        let _ = sim.status2();

        assert_eq!(sim.read_data(), 1);
        assert!(sim.status1().contains(Status1::RXNE));
        assert_eq!(sim.read_data(), 2);
        sim.modify_control1(|c| c | Control1::STOP);
        assert!(!sim.status1().contains(Status1::RXNE));
        assert_eq!(
            sim.wire()[2..],
            [
                Wire::Read { byte: 1, ack: false },
                Wire::Read { byte: 2, ack: false },
                Wire::Stop
            ]
        );
    }
}
