use std::cmp::Ordering;

use crate::types::FaceplateState;

/// Angles of the two faceplate servos. B is mounted mirrored, so at rest `a + b == max_angle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorPair {
    pub a: u16,
    pub b: u16,
}

impl ActuatorPair {
    pub fn closed(max_angle: u16) -> Self {
        Self { a: 0, b: max_angle }
    }

    pub fn open(max_angle: u16) -> Self {
        Self { a: max_angle, b: 0 }
    }

    pub fn state(self) -> FaceplateState {
        FaceplateState::from_angle(self.a)
    }

    /// Target pair for the opposite logical state.
    pub fn toggled_target(self, max_angle: u16) -> Self {
        if self.a == 0 {
            Self::open(max_angle)
        } else {
            Self::closed(max_angle)
        }
    }
}

/// Lock-step movement of both servos toward a target pair, one fixed step per call.
#[derive(Debug, Clone)]
pub struct ActuatorMotion {
    current: ActuatorPair,
    target: ActuatorPair,
    step: u16,
    max_angle: u16,
}

impl ActuatorMotion {
    pub fn new(current: ActuatorPair, target: ActuatorPair, step: u16, max_angle: u16) -> Self {
        let clamp = |angle: u16| angle.min(max_angle);
        Self {
            current: ActuatorPair {
                a: clamp(current.a),
                b: clamp(current.b),
            },
            target: ActuatorPair {
                a: clamp(target.a),
                b: clamp(target.b),
            },
            step: step.max(1),
            max_angle,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current == self.target
    }

    /// Advances both servos by one step and returns the angles to write, or `None` once at target.
    pub fn step(&mut self) -> Option<ActuatorPair> {
        if self.is_complete() {
            return None;
        }

        self.current = ActuatorPair {
            a: advance(self.current.a, self.target.a, self.step, self.max_angle),
            b: advance(self.current.b, self.target.b, self.step, self.max_angle),
        };
        Some(self.current)
    }
}

fn advance(current: u16, target: u16, step: u16, max_angle: u16) -> u16 {
    // The last step may overshoot; never pass the target or leave the range.
    let next = match target.cmp(&current) {
        Ordering::Greater => current.saturating_add(step).min(target),
        Ordering::Less => current.saturating_sub(step).max(target),
        Ordering::Equal => current,
    };
    next.min(max_angle)
}
