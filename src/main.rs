#![no_std]
#![no_main]

use core::cell::RefCell;

use cortex_m_rt::entry;
use critical_section::Mutex;
use panic_halt as _;
use rtt_target::{rprintln, rtt_init_print};
use stm32f4::stm32f407::{self as pac, interrupt};

use stm32f407_i2c::i2c::{
    instance, BusError, EventHandler, I2cEngine, I2cEvent, Instance, TransferHandle,
    TransferState,
};
use stm32f407_i2c::log::RttLogger;
use stm32f407_i2c::mpu6050::{Mpu6050, RawReading, ACCEL_XOUT_H, BURST_LEN};

mod clock;
mod config;

type Bus = I2cEngine<'static, pac::I2C1, ImuPoller, RttLogger>;

static I2C1_BUS: Mutex<RefCell<Option<Bus>>> = Mutex::new(RefCell::new(None));

static ACCEL_REGISTER: [u8; 1] = [ACCEL_XOUT_H];

/// Reads the MPU6050 burst from the interrupts: register pointer write with
/// repeated START, then a 14-byte receive into `buf`.
struct ImuPoller {
    buf: Option<&'static mut [u8]>,
    latest: Option<RawReading>,
    errors: u32,
}

impl EventHandler<'static, pac::I2C1, RttLogger> for ImuPoller {
    fn on_event(
        &mut self,
        handle: &mut TransferHandle<'static, pac::I2C1, RttLogger>,
        event: I2cEvent<'static>,
    ) {
        match event {
            I2cEvent::TxComplete(_) => {
                if let Some(buf) = self.buf.take() {
                    if let Err(rejected) =
                        handle.receive_async(buf, config::MPU6050_DEV_ADDR, false)
                    {
                        self.buf = Some(rejected.buffer);
                    }
                }
            }
            I2cEvent::RxComplete(buf) => {
                if let Ok(bytes) = <&[u8; BURST_LEN]>::try_from(&*buf) {
                    self.latest = Some(RawReading::from_bytes(bytes));
                }
                self.buf = Some(buf);
            }
            I2cEvent::Error(BusError::AcknowledgeFailure) => {
                self.errors += 1;
                handle.generate_stop();
                match handle.state() {
                    TransferState::BusyTx => {
                        let _ = handle.close_transmit();
                    }
                    TransferState::BusyRx => {
                        if let Some(buf) = handle.close_receive() {
                            self.buf = Some(buf);
                        }
                    }
                    TransferState::Ready => {}
                }
            }
            I2cEvent::Error(_) => self.errors += 1,
            _ => {}
        }
    }
}

#[entry]
fn main() -> ! {
    rtt_init_print!();

    let dp = pac::Peripherals::take().unwrap();
    let mut cp = cortex_m::Peripherals::take().unwrap();

    clock::setup_system_clocks_168mhz(&dp.RCC, &dp.PWR, &dp.FLASH);

    instance::configure_i2c1_pins(&dp.RCC, &dp.GPIOB);
    pac::I2C1::enable_clock(&dp.RCC);
    pac::I2C1::reset(&dp.RCC);

    let mut i2c = TransferHandle::with_logger(dp.I2C1, config::bus_config(), RttLogger);
    i2c.init(clock::PCLK1_HZ);
    i2c.set_enabled(true);

    clock::delay_ms(config::MPU6050_STARTUP_MS);

    let imu = Mpu6050::new(config::MPU6050_DEV_ADDR);
    match imu.init(&mut i2c) {
        Ok(()) => rprintln!("mpu6050 ready"),
        Err(e) => rprintln!("mpu6050 init failed: {}", e),
    }
    match imu.read_raw(&mut i2c) {
        Ok(r) => rprintln!("blocking read: accel {:?} gyro {:?}", r.accel, r.gyro),
        Err(e) => rprintln!("blocking read failed: {}", e),
    }

    // From here on the bus belongs to the interrupt handlers.
    let buf: &'static mut [u8] =
        cortex_m::singleton!(: [u8; BURST_LEN] = [0; BURST_LEN]).unwrap();
    let poller = ImuPoller {
        buf: Some(buf),
        latest: None,
        errors: 0,
    };
    critical_section::with(|cs| {
        I2C1_BUS
            .borrow_ref_mut(cs)
            .replace(I2cEngine::new(i2c, poller));
    });
    instance::enable_interrupts::<pac::I2C1>(&mut cp.NVIC, config::I2C_IRQ_PRIORITY);

    loop {
        let (reading, errors) = critical_section::with(|cs| {
            let mut bus = I2C1_BUS.borrow_ref_mut(cs);
            let Some(bus) = bus.as_mut() else {
                return (None, 0);
            };
            let reading = bus.handler_mut().latest.take();
            if bus.state() == TransferState::Ready && bus.handler().buf.is_some() {
                let _ = bus.transmit_async(&ACCEL_REGISTER, config::MPU6050_DEV_ADDR, true);
            }
            (reading, bus.handler().errors)
        });

        if let Some(r) = reading {
            rprintln!(
                "accel {:?} temp {} gyro {:?} (bus errors {})",
                r.accel,
                r.temp,
                r.gyro,
                errors
            );
        }
        clock::delay_ms(config::SAMPLE_PERIOD_MS);
    }
}

#[interrupt]
fn I2C1_EV() {
    critical_section::with(|cs| {
        if let Some(bus) = I2C1_BUS.borrow_ref_mut(cs).as_mut() {
            bus.on_event_interrupt();
        }
    });
}

#[interrupt]
fn I2C1_ER() {
    critical_section::with(|cs| {
        if let Some(bus) = I2C1_BUS.borrow_ref_mut(cs).as_mut() {
            bus.on_error_interrupt();
        }
    });
}
