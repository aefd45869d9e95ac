//! Clock tree for the Discovery board: 8 MHz HSE into the PLL, 168 MHz
//! SYSCLK, APB1 at 42 MHz (the I2C kernel clock).
use stm32f4::stm32f407 as pac;

pub const SYSCLK_HZ: u32 = 168_000_000;
pub const PCLK1_HZ: u32 = SYSCLK_HZ / 4;

pub fn setup_system_clocks_168mhz(rcc: &pac::RCC, pwr: &pac::PWR, flash: &pac::FLASH) {
    rcc.cr.modify(|_, w| w.hseon().on());
    while rcc.cr.read().hserdy().is_not_ready() {}

    // Regulator scale 1 (VOS, PWR_CR bit 14) is required above 144 MHz.
    rcc.apb1enr.modify(|_, w| w.pwren().enabled());
    pwr.cr.modify(|r, w| unsafe { w.bits(r.bits() | (1 << 14)) });

    // 5 wait states for 168MHz at 3.3V
    flash.acr.modify(|_, w| unsafe {
        w.latency()
            .bits(5)
            .icen()
            .set_bit()
            .dcen()
            .set_bit()
            .prften()
            .set_bit()
    });

    // AHB=1, APB1=4, APB2=2
    rcc.cfgr
        .modify(|_, w| w.hpre().div1().ppre1().div4().ppre2().div2());

    // PLLSRC=HSE, PLLM=8, PLLN=336, PLLP=2, PLLQ=7
    let pllm: u32 = 8;
    let plln: u32 = 336;
    let pllp_bits: u32 = 0b00; // /2
    let pllq: u32 = 7;
    let pllcfgr = (1 << 22)
        | (pllm & 0x3F)
        | ((plln & 0x1FF) << 6)
        | (pllp_bits << 16)
        | ((pllq & 0x0F) << 24);
    rcc.pllcfgr.write(|w| unsafe { w.bits(pllcfgr) });

    rcc.cr.modify(|_, w| w.pllon().on());
    while rcc.cr.read().pllrdy().is_not_ready() {}

    rcc.cfgr.modify(|_, w| w.sw().pll());
    while !rcc.cfgr.read().sws().is_pll() {}

    rcc.cr.modify(|_, w| w.hsion().off());
}

// Busy-wait, assumes SYSCLK_HZ
pub fn delay_ms(ms: u32) {
    cortex_m::asm::delay(SYSCLK_HZ / 1_000 * ms);
}
