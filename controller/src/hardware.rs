use esp_idf_hal::{
    gpio::{AnyIOPin, Input, PinDriver, Pull},
    ledc::LedcDriver,
};
use esp_idf_sys::EspError;
use log::info;

use faceplate_common::{pwm, EngineAction};

/// Hobby servo on a 50 Hz LEDC channel.
pub struct ServoDriver<'d> {
    ledc: LedcDriver<'d>,
    max_duty: u32,
}

impl<'d> ServoDriver<'d> {
    pub fn new(ledc: LedcDriver<'d>) -> Self {
        let max_duty = ledc.get_max_duty();
        Self { ledc, max_duty }
    }

    pub fn set_angle(&mut self, angle: u16) -> Result<(), EspError> {
        self.ledc.set_duty(pwm::servo_duty(angle, self.max_duty))
    }
}

/// Dimmable light on its own LEDC timer.
pub struct LightDriver<'d> {
    ledc: LedcDriver<'d>,
    max_duty: u32,
    max_brightness: u8,
}

impl<'d> LightDriver<'d> {
    pub fn new(ledc: LedcDriver<'d>, max_brightness: u8) -> Self {
        let max_duty = ledc.get_max_duty();
        Self {
            ledc,
            max_duty,
            max_brightness,
        }
    }

    pub fn set_level(&mut self, level: u8) -> Result<(), EspError> {
        self.ledc
            .set_duty(pwm::light_duty(level, self.max_brightness, self.max_duty))
    }
}

pub struct FaceplateHardware<'d> {
    pub servo_a: ServoDriver<'d>,
    pub servo_b: ServoDriver<'d>,
    pub light: LightDriver<'d>,
}

impl FaceplateHardware<'_> {
    pub fn apply(&mut self, action: &EngineAction) -> Result<(), EspError> {
        match *action {
            EngineAction::MoveServos { a, b } => {
                self.servo_a.set_angle(a)?;
                self.servo_b.set_angle(b)
            }
            EngineAction::SetBrightness(level) => self.light.set_level(level),
            EngineAction::Completed(state) => {
                info!("faceplate {} | light transition completed", state.label());
                Ok(())
            }
        }
    }
}

/// Active-low push button with the internal pull-up enabled.
pub struct Button<'d> {
    pin: PinDriver<'d, AnyIOPin, Input>,
}

impl<'d> Button<'d> {
    pub fn new(mut pin: PinDriver<'d, AnyIOPin, Input>) -> Result<Self, EspError> {
        pin.set_pull(Pull::Up)?;
        Ok(Self { pin })
    }

    pub fn is_high(&self) -> bool {
        self.pin.is_high()
    }
}
