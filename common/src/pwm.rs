//! Duty-cycle math for the LEDC channels driving the servos and the light.

pub const SERVO_PWM_FREQ_HZ: u32 = 50;
pub const SERVO_PERIOD_US: u32 = 20_000;
pub const SERVO_MIN_PULSE_US: u32 = 500;
pub const SERVO_MAX_PULSE_US: u32 = 2_500;
pub const LIGHT_PWM_FREQ_HZ: u32 = 5_000;

/// Converts an angle (0-180) to a duty value for a 50 Hz channel with `max_duty` resolution.
pub fn servo_duty(angle: u16, max_duty: u32) -> u32 {
    let angle = u64::from(angle.min(180));
    let span = u64::from(SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US);
    let pulse_us = u64::from(SERVO_MIN_PULSE_US) + angle * span / 180;
    (pulse_us * u64::from(max_duty) / u64::from(SERVO_PERIOD_US)) as u32
}

/// Scales a brightness level to the channel's duty range.
pub fn light_duty(level: u8, max_brightness: u8, max_duty: u32) -> u32 {
    if max_brightness == 0 {
        return 0;
    }
    let level = u64::from(level.min(max_brightness));
    (level * u64::from(max_duty) / u64::from(max_brightness)) as u32
}
