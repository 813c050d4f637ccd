#[cfg(feature = "esp32")]
use faceplate_common::{FaceplateState, TogglePayload};
use faceplate_common::ToggleOutcome;

pub const INDEX_HTML: &str = include_str!("../web/index.html");
pub const CONTROL_HTML: &str = include_str!("../web/control.html");

#[cfg(feature = "esp32")]
pub const ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");

#[cfg(feature = "esp32")]
pub fn toggle_body(state: FaceplateState) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&TogglePayload { state })
}

pub fn describe_outcome(outcome: &ToggleOutcome) -> String {
    match outcome {
        ToggleOutcome::Started { ticket, target } => {
            format!("toggle #{ticket} started, moving to {}", target.label())
        }
        ToggleOutcome::Cooldown {
            state,
            remaining_ms,
        } => format!(
            "toggle ignored: cooldown has {remaining_ms}ms left, faceplate stays {}",
            state.label()
        ),
        ToggleOutcome::Busy { state } => format!(
            "toggle ignored: movement in progress, faceplate {}",
            state.label()
        ),
    }
}
