use crate::{faceplate::FaceplateEngine, types::ToggleOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

/// Time-window debouncer for an active-low button with a pull-up.
///
/// A raw level must stay unchanged for `debounce_ms` before it becomes the stable
/// level; each stable transition is reported once.
#[derive(Debug, Clone)]
pub struct Debouncer {
    debounce_ms: u64,
    raw_high: bool,
    stable_high: bool,
    last_change_ms: u64,
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            raw_high: true,
            stable_high: true,
            last_change_ms: 0,
        }
    }

    #[cfg(test)]
    pub fn is_pressed(&self) -> bool {
        !self.stable_high
    }

    pub fn update(&mut self, is_high: bool, now_ms: u64) -> Option<ButtonEdge> {
        if is_high != self.raw_high {
            self.raw_high = is_high;
            self.last_change_ms = now_ms;
            return None;
        }

        if self.raw_high == self.stable_high {
            return None;
        }

        if now_ms.saturating_sub(self.last_change_ms) < self.debounce_ms {
            return None;
        }

        self.stable_high = self.raw_high;
        Some(if self.stable_high {
            ButtonEdge::Released
        } else {
            ButtonEdge::Pressed
        })
    }
}

/// Turns debounced presses of the faceplate button into toggle requests.
#[derive(Debug, Clone)]
pub struct ButtonTrigger {
    debouncer: Debouncer,
}

impl ButtonTrigger {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debouncer: Debouncer::new(debounce_ms),
        }
    }

    /// Feeds one raw sample; returns the outcome when a stable press requested a toggle.
    pub fn poll(
        &mut self,
        engine: &mut FaceplateEngine,
        is_high: bool,
        now_ms: u64,
    ) -> Option<ToggleOutcome> {
        match self.debouncer.update(is_high, now_ms)? {
            ButtonEdge::Pressed => Some(engine.request_toggle(now_ms)),
            ButtonEdge::Released => None,
        }
    }
}
