use stm32f407_i2c::i2c::{ErrorPolicy, I2cConfig, I2cSpeed};

pub const MPU6050_DEV_ADDR: u8 = 0x68;

pub const BUS_SPEED: I2cSpeed = I2cSpeed::Standard;

// SR1 polls before a blocking wait gives up.
pub const POLL_BUDGET: u32 = 100_000;

// NVIC priority (0..=15) of I2C1_EV/I2C1_ER.
pub const I2C_IRQ_PRIORITY: u8 = 2;

// MPU6050 needs ~30 ms after power-up before it answers.
pub const MPU6050_STARTUP_MS: u32 = 100;

pub const SAMPLE_PERIOD_MS: u32 = 100;

pub fn bus_config() -> I2cConfig {
    I2cConfig::builder()
        .speed(BUS_SPEED)
        .timeout(POLL_BUDGET)
        .error_policy(ErrorPolicy::Propagate)
        .build()
}
