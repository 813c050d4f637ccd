pub mod actuator;
pub mod config;
pub mod debounce;
pub mod faceplate;
pub mod illumination;
pub mod pwm;
pub mod types;

pub use actuator::{ActuatorMotion, ActuatorPair};
pub use config::{ConfigError, FaceplateConfig, PinConfig, RuntimeConfig};
pub use debounce::{ButtonEdge, ButtonTrigger, Debouncer};
pub use faceplate::{EngineAction, FaceplateEngine, ToggleRun};
pub use illumination::{target_brightness, BrightnessRamp};
pub use types::{FaceplateState, FaceplateStatus, ToggleOutcome, TogglePayload};
