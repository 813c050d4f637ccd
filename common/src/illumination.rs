use crate::types::FaceplateState;

/// Light level that accompanies a faceplate state: lit when closed, dark when open.
pub fn target_brightness(state: FaceplateState, max_brightness: u8) -> u8 {
    match state {
        FaceplateState::Closed => max_brightness,
        FaceplateState::Open => 0,
    }
}

/// Linear fade that moves the light one level per step.
#[derive(Debug, Clone)]
pub struct BrightnessRamp {
    level: u8,
    target: u8,
}

impl BrightnessRamp {
    pub fn new(level: u8, target: u8) -> Self {
        Self { level, target }
    }

    #[cfg(test)]
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_complete(&self) -> bool {
        self.level == self.target
    }

    pub fn step(&mut self) -> Option<u8> {
        if self.level < self.target {
            self.level += 1;
        } else if self.level > self.target {
            self.level -= 1;
        } else {
            return None;
        }
        Some(self.level)
    }
}
