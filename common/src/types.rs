use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaceplateState {
    Open,
    Closed,
}

impl FaceplateState {
    /// Actuator A resting at zero means the faceplate is down.
    pub fn from_angle(angle_a: u16) -> Self {
        if angle_a == 0 {
            Self::Closed
        } else {
            Self::Open
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Movement began; the toggle is finished once `completed_toggles` reaches `ticket`.
    Started { ticket: u64, target: FaceplateState },
    Cooldown {
        state: FaceplateState,
        remaining_ms: u64,
    },
    Busy { state: FaceplateState },
}

impl ToggleOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

/// Body of the `POST /toggle` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TogglePayload {
    pub state: FaceplateState,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceplateStatus {
    pub state: FaceplateState,
    #[serde(rename = "angleA")]
    pub angle_a: u16,
    #[serde(rename = "angleB")]
    pub angle_b: u16,
    pub brightness: u8,
    pub busy: bool,
    #[serde(rename = "inCooldown")]
    pub in_cooldown: bool,
    #[serde(rename = "cooldownRemainingMs")]
    pub cooldown_remaining_ms: u64,
    #[serde(rename = "completedToggles")]
    pub completed_toggles: u64,
}
