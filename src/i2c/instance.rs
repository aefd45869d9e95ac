//! Per-controller RCC, NVIC and pin wiring.

use cortex_m::peripheral::NVIC;
use stm32f4::stm32f407 as pac;

use super::I2cRegisters;

/// One of the three I2C controllers.
pub trait Instance: I2cRegisters {
    const EVENT_IRQ: pac::Interrupt;
    const ERROR_IRQ: pac::Interrupt;

    fn enable_clock(rcc: &pac::RCC);
    fn disable_clock(rcc: &pac::RCC);
    /// Pulses the APB1 reset line, returning every register to its reset
    /// value.
    fn reset(rcc: &pac::RCC);
}

macro_rules! instance {
    ($I2C:ident, $en:ident, $rst:ident, $EV:ident, $ER:ident) => {
        impl Instance for pac::$I2C {
            const EVENT_IRQ: pac::Interrupt = pac::Interrupt::$EV;
            const ERROR_IRQ: pac::Interrupt = pac::Interrupt::$ER;

            fn enable_clock(rcc: &pac::RCC) {
                rcc.apb1enr.modify(|_, w| w.$en().enabled());
            }

            fn disable_clock(rcc: &pac::RCC) {
                rcc.apb1enr.modify(|_, w| w.$en().disabled());
            }

            fn reset(rcc: &pac::RCC) {
                rcc.apb1rstr.modify(|_, w| w.$rst().set_bit());
                rcc.apb1rstr.modify(|_, w| w.$rst().clear_bit());
            }
        }
    };
}

instance!(I2C1, i2c1en, i2c1rst, I2C1_EV, I2C1_ER);
instance!(I2C2, i2c2en, i2c2rst, I2C2_EV, I2C2_ER);
instance!(I2C3, i2c3en, i2c3rst, I2C3_EV, I2C3_ER);

/// Unmasks the event and error vectors of `I` at `priority` (0 highest,
/// 15 lowest; the F407 implements the top four priority bits).
pub fn enable_interrupts<I: Instance>(nvic: &mut NVIC, priority: u8) {
    let level = (priority & 0x0F) << 4;
    unsafe {
        nvic.set_priority(I::EVENT_IRQ, level);
        nvic.set_priority(I::ERROR_IRQ, level);
        NVIC::unmask(I::EVENT_IRQ);
        NVIC::unmask(I::ERROR_IRQ);
    }
}

pub fn disable_interrupts<I: Instance>() {
    NVIC::mask(I::EVENT_IRQ);
    NVIC::mask(I::ERROR_IRQ);
}

// GPIO alternate function number of I2C1..3 on port B.
const AF_I2C: u32 = 4;

/// Sets `pins` of GPIOB to AF4, open-drain, pull-up, high speed.
fn configure_port_b(rcc: &pac::RCC, gpiob: &pac::GPIOB, pins: [u32; 2]) {
    rcc.ahb1enr.modify(|_, w| w.gpioben().enabled());

    let mut moder = gpiob.moder.read().bits();
    let mut otyper = gpiob.otyper.read().bits();
    let mut ospeedr = gpiob.ospeedr.read().bits();
    let mut pupdr = gpiob.pupdr.read().bits();
    let mut afrl = gpiob.afrl.read().bits();
    let mut afrh = gpiob.afrh.read().bits();

    for pin in pins {
        let two = pin * 2;
        moder = (moder & !(0b11 << two)) | (0b10 << two);
        otyper |= 1 << pin;
        ospeedr = (ospeedr & !(0b11 << two)) | (0b10 << two);
        pupdr = (pupdr & !(0b11 << two)) | (0b01 << two);
        if pin < 8 {
            let shift = pin * 4;
            afrl = (afrl & !(0xF << shift)) | (AF_I2C << shift);
        } else {
            let shift = (pin - 8) * 4;
            afrh = (afrh & !(0xF << shift)) | (AF_I2C << shift);
        }
    }

    // Alternate function first, so the pins switch straight to the
    // peripheral once MODER changes.
    gpiob.afrl.write(|w| unsafe { w.bits(afrl) });
    gpiob.afrh.write(|w| unsafe { w.bits(afrh) });
    gpiob.otyper.write(|w| unsafe { w.bits(otyper) });
    gpiob.ospeedr.write(|w| unsafe { w.bits(ospeedr) });
    gpiob.pupdr.write(|w| unsafe { w.bits(pupdr) });
    gpiob.moder.write(|w| unsafe { w.bits(moder) });
}

/// I2C1 on PB6 (SCL) and PB7 (SDA).
pub fn configure_i2c1_pins(rcc: &pac::RCC, gpiob: &pac::GPIOB) {
    configure_port_b(rcc, gpiob, [6, 7]);
}

/// I2C2 on PB10 (SCL) and PB11 (SDA).
pub fn configure_i2c2_pins(rcc: &pac::RCC, gpiob: &pac::GPIOB) {
    configure_port_b(rcc, gpiob, [10, 11]);
}
