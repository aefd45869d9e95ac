//! Controller configuration and the register values derived from it.

/// SCL frequency class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast200k = 200_000,
    Fast = 400_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn hz(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn is_fast(self) -> bool {
        self.hz() > I2cSpeed::Standard.hz()
    }
}

/// Fast-mode Tlow/Thigh ratio. Ignored in standard mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DutyCycle {
    /// Tlow/Thigh = 2
    Ratio2,
    /// Tlow/Thigh = 16/9
    Ratio16By9,
}

/// How the blocking transfers treat bus error flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Poll only for the progress flags and report success whenever the
    /// polls complete. Bus errors go unnoticed on the blocking path.
    Legacy,
    /// Check BERR/ARLO/AF/OVR/TIMEOUT on every poll and fail the transfer on
    /// the first one seen.
    Propagate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cConfig {
    pub speed: I2cSpeed,
    pub duty_cycle: DutyCycle,
    /// ACK incoming bytes by default. Receive paths restore this after
    /// NACKing the final byte.
    pub ack: bool,
    /// Own 7-bit address (used when addressed as a slave).
    pub own_address: u8,
    /// Poll budget for each blocking wait; `None` waits forever.
    pub timeout: Option<u32>,
    pub error_policy: ErrorPolicy,
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfigBuilder::new().build()
    }
}

impl I2cConfig {
    #[must_use]
    pub fn builder() -> I2cConfigBuilder {
        I2cConfigBuilder::new()
    }
}

pub struct I2cConfigBuilder {
    speed: I2cSpeed,
    duty_cycle: DutyCycle,
    ack: bool,
    own_address: u8,
    timeout: Option<u32>,
    error_policy: ErrorPolicy,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            speed: I2cSpeed::Standard,
            duty_cycle: DutyCycle::Ratio2,
            ack: true,
            own_address: 0,
            timeout: None,
            error_policy: ErrorPolicy::Legacy,
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = speed;
        self
    }
    #[must_use]
    pub fn duty_cycle(mut self, duty_cycle: DutyCycle) -> Self {
        self.duty_cycle = duty_cycle;
        self
    }
    #[must_use]
    pub fn ack(mut self, enabled: bool) -> Self {
        self.ack = enabled;
        self
    }
    #[must_use]
    pub fn own_address(mut self, address: u8) -> Self {
        self.own_address = address & 0x7F;
        self
    }
    #[must_use]
    pub fn timeout(mut self, polls: u32) -> Self {
        self.timeout = Some(polls);
        self
    }
    #[must_use]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            speed: self.speed,
            duty_cycle: self.duty_cycle,
            ack: self.ack,
            own_address: self.own_address,
            timeout: self.timeout,
            error_policy: self.error_policy,
        }
    }
}

// CCR
const CCR_FS: u32 = 1 << 15;
const CCR_DUTY: u32 = 1 << 14;
const CCR_MASK: u32 = 0xFFF;
// OAR1 bit 14 must be kept at 1 by software.
const OAR1_RESERVED: u32 = 1 << 14;

/// Register values for one controller, computed from an [`I2cConfig`] and the
/// APB1 clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterSetup {
    pub ack: bool,
    pub freq_mhz: u8,
    pub oar1: u32,
    pub ccr: u32,
    pub trise: u32,
}

impl RegisterSetup {
    #[must_use]
    pub fn compute(config: &I2cConfig, pclk1_hz: u32) -> Self {
        let pclk_mhz = pclk1_hz / 1_000_000;
        let speed = config.speed.hz();

        let ccr = if config.speed.is_fast() {
            let (duty, divider) = match config.duty_cycle {
                DutyCycle::Ratio2 => (0, 3),
                DutyCycle::Ratio16By9 => (CCR_DUTY, 25),
            };
            CCR_FS | duty | ((pclk1_hz / (divider * speed)) & CCR_MASK)
        } else {
            (pclk1_hz / (2 * speed)) & CCR_MASK
        };

        // Maximum rise time is 1000 ns in standard mode, 300 ns in fast mode.
        let trise = if config.speed.is_fast() {
            (u64::from(pclk1_hz) * 300 / 1_000_000_000) as u32 + 1
        } else {
            pclk_mhz + 1
        };

        Self {
            ack: config.ack,
            freq_mhz: (pclk_mhz & 0x3F) as u8,
            oar1: (u32::from(config.own_address) << 1) | OAR1_RESERVED,
            ccr,
            trise: trise & 0x3F,
        }
    }
}
