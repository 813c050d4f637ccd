use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest angle a hobby servo can be commanded to.
pub const SERVO_RANGE_DEGREES: u16 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max angle must be between 1 and 180 degrees, got {0}")]
    InvalidMaxAngle(u16),
    #[error("servo step must be between 1 and {max_angle} degrees, got {step}")]
    InvalidServoStep { step: u16, max_angle: u16 },
    #[error("max brightness must be non-zero")]
    ZeroBrightness,
    #[error("tick interval must be non-zero")]
    ZeroTickInterval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceplateConfig {
    pub max_angle: u16,
    pub servo_step: u16,
    pub step_delay_ms: u64,
    pub fade_delay_ms: u64,
    pub max_brightness: u8,
    pub cooldown_ms: u64,
    pub debounce_ms: u64,
    pub tick_interval_ms: u64,
    pub toggle_wait_timeout_ms: u64,
}

impl Default for FaceplateConfig {
    fn default() -> Self {
        Self {
            max_angle: 130,
            servo_step: 13,
            step_delay_ms: 50,
            fade_delay_ms: 5,
            max_brightness: 255,
            cooldown_ms: 1_000,
            debounce_ms: 50,
            tick_interval_ms: 5,
            toggle_wait_timeout_ms: 5_000,
        }
    }
}

impl FaceplateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_angle == 0 || self.max_angle > SERVO_RANGE_DEGREES {
            return Err(ConfigError::InvalidMaxAngle(self.max_angle));
        }
        if self.servo_step == 0 || self.servo_step > self.max_angle {
            return Err(ConfigError::InvalidServoStep {
                step: self.servo_step,
                max_angle: self.max_angle,
            });
        }
        if self.max_brightness == 0 {
            return Err(ConfigError::ZeroBrightness);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        self.max_angle = self.max_angle.clamp(1, SERVO_RANGE_DEGREES);
        self.servo_step = self.servo_step.clamp(1, self.max_angle);
        self.max_brightness = self.max_brightness.max(1);
        self.tick_interval_ms = self.tick_interval_ms.max(1);
    }

    /// Worst-case duration of one full toggle: every servo step plus every fade step.
    pub fn toggle_duration_ms(&self) -> u64 {
        let step = u64::from(self.servo_step.max(1));
        let servo_steps = u64::from(self.max_angle).div_ceil(step);
        servo_steps * self.step_delay_ms + u64::from(self.max_brightness) * self.fade_delay_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    pub servo_a_pin: i32,
    pub servo_b_pin: i32,
    pub light_pin: i32,
    pub button_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            servo_a_pin: 20,
            servo_b_pin: 21,
            light_pin: 2,
            button_pin: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub join_timeout_ms: u64,
    pub join_poll_ms: u64,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            join_timeout_ms: 10_000,
            join_poll_ms: 500,
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub faceplate: FaceplateConfig,
    pub pins: PinConfig,
    pub network: NetworkConfig,
}
