use crate::{
    actuator::{ActuatorMotion, ActuatorPair},
    config::FaceplateConfig,
    illumination::{target_brightness, BrightnessRamp},
    types::{FaceplateState, FaceplateStatus, ToggleOutcome},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    MoveServos { a: u16, b: u16 },
    SetBrightness(u8),
    Completed(FaceplateState),
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Moving(ActuatorMotion),
    Ramping(BrightnessRamp),
}

/// Result of driving a toggle to completion on a simulated clock.
#[derive(Debug, Clone)]
pub struct ToggleRun {
    pub outcome: ToggleOutcome,
    pub state: FaceplateState,
    pub actions: Vec<EngineAction>,
    pub finished_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FaceplateEngine {
    pub config: FaceplateConfig,

    actuators: ActuatorPair,
    brightness: u8,
    phase: Phase,
    next_step_ms: u64,

    last_action_ms: Option<u64>,
    started_toggles: u64,
    completed_toggles: u64,
}

impl FaceplateEngine {
    /// Starts closed with the light at full brightness.
    pub fn new(mut config: FaceplateConfig) -> Self {
        config.sanitize();
        Self {
            actuators: ActuatorPair::closed(config.max_angle),
            brightness: config.max_brightness,
            config,
            phase: Phase::Idle,
            next_step_ms: 0,
            last_action_ms: None,
            started_toggles: 0,
            completed_toggles: 0,
        }
    }

    pub fn state(&self) -> FaceplateState {
        self.actuators.state()
    }

    pub fn actuators(&self) -> ActuatorPair {
        self.actuators
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn completed_toggles(&self) -> u64 {
        self.completed_toggles
    }

    #[cfg(test)]
    pub fn last_action_ms(&self) -> Option<u64> {
        self.last_action_ms
    }

    pub fn cooldown_remaining_ms(&self, now_ms: u64) -> u64 {
        match self.last_action_ms {
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                self.config.cooldown_ms.saturating_sub(elapsed)
            }
            None => 0,
        }
    }

    /// Outputs to write at power-on so the hardware matches the tracked state.
    pub fn initial_actions(&self) -> Vec<EngineAction> {
        vec![
            EngineAction::MoveServos {
                a: self.actuators.a,
                b: self.actuators.b,
            },
            EngineAction::SetBrightness(self.brightness),
        ]
    }

    pub fn request_toggle(&mut self, now_ms: u64) -> ToggleOutcome {
        let state = self.state();

        if self.is_busy() {
            return ToggleOutcome::Busy { state };
        }

        let remaining_ms = self.cooldown_remaining_ms(now_ms);
        if remaining_ms > 0 {
            return ToggleOutcome::Cooldown {
                state,
                remaining_ms,
            };
        }

        let target = self.actuators.toggled_target(self.config.max_angle);
        self.phase = Phase::Moving(ActuatorMotion::new(
            self.actuators,
            target,
            self.config.servo_step,
            self.config.max_angle,
        ));
        self.next_step_ms = now_ms;
        self.started_toggles += 1;

        ToggleOutcome::Started {
            ticket: self.started_toggles,
            target: target.state(),
        }
    }

    /// Performs at most one movement or fade step if its delay has elapsed.
    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        if !self.is_busy() || now_ms < self.next_step_ms {
            return actions;
        }

        self.phase = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => Phase::Idle,
            Phase::Moving(motion) => self.advance_motion(motion, now_ms, &mut actions),
            Phase::Ramping(ramp) => self.advance_ramp(ramp, now_ms, &mut actions),
        };

        actions
    }

    /// Requests a toggle and steps it to completion, advancing the clock by the
    /// configured delays instead of sleeping.
    pub fn toggle(&mut self, now_ms: u64) -> ToggleRun {
        let outcome = self.request_toggle(now_ms);
        let mut actions = Vec::new();
        let mut clock_ms = now_ms;

        while self.is_busy() {
            clock_ms = clock_ms.max(self.next_step_ms);
            actions.extend(self.tick(clock_ms));
        }

        ToggleRun {
            outcome,
            state: self.state(),
            actions,
            finished_ms: clock_ms,
        }
    }

    pub fn status(&self, now_ms: u64) -> FaceplateStatus {
        let cooldown_remaining_ms = self.cooldown_remaining_ms(now_ms);
        FaceplateStatus {
            state: self.state(),
            angle_a: self.actuators.a,
            angle_b: self.actuators.b,
            brightness: self.brightness,
            busy: self.is_busy(),
            in_cooldown: cooldown_remaining_ms > 0,
            cooldown_remaining_ms,
            completed_toggles: self.completed_toggles,
        }
    }

    fn advance_motion(
        &mut self,
        mut motion: ActuatorMotion,
        now_ms: u64,
        actions: &mut Vec<EngineAction>,
    ) -> Phase {
        if let Some(pair) = motion.step() {
            self.actuators = pair;
            actions.push(EngineAction::MoveServos {
                a: pair.a,
                b: pair.b,
            });
        }
        self.next_step_ms = now_ms.saturating_add(self.config.step_delay_ms);

        if !motion.is_complete() {
            return Phase::Moving(motion);
        }

        let target = target_brightness(self.state(), self.config.max_brightness);
        Phase::Ramping(BrightnessRamp::new(self.brightness, target))
    }

    fn advance_ramp(
        &mut self,
        mut ramp: BrightnessRamp,
        now_ms: u64,
        actions: &mut Vec<EngineAction>,
    ) -> Phase {
        if let Some(level) = ramp.step() {
            self.brightness = level;
            actions.push(EngineAction::SetBrightness(level));
        }
        self.next_step_ms = now_ms.saturating_add(self.config.fade_delay_ms);

        if !ramp.is_complete() {
            return Phase::Ramping(ramp);
        }

        self.last_action_ms = Some(now_ms);
        self.completed_toggles += 1;
        actions.push(EngineAction::Completed(self.state()));
        Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn engine() -> FaceplateEngine {
        FaceplateEngine::new(FaceplateConfig::default())
    }

    fn servo_moves(actions: &[EngineAction]) -> usize {
        actions
            .iter()
            .filter(|action| matches!(action, EngineAction::MoveServos { .. }))
            .count()
    }

    #[test]
    fn starts_closed_and_lit() {
        let engine = engine();

        assert_eq!(engine.state(), FaceplateState::Closed);
        assert_eq!(engine.actuators(), ActuatorPair { a: 0, b: 130 });
        assert_eq!(engine.brightness(), 255);
        assert_eq!(
            engine.initial_actions(),
            vec![
                EngineAction::MoveServos { a: 0, b: 130 },
                EngineAction::SetBrightness(255),
            ]
        );
    }

    #[test]
    fn toggle_opens_and_darkens() {
        let mut engine = engine();
        let run = engine.toggle(10_000);

        assert!(run.outcome.is_started());
        assert_eq!(run.state, FaceplateState::Open);
        assert_eq!(engine.actuators(), ActuatorPair { a: 130, b: 0 });
        assert_eq!(engine.brightness(), 0);
        assert_eq!(
            run.actions.last(),
            Some(&EngineAction::Completed(FaceplateState::Open))
        );
        assert_eq!(engine.last_action_ms(), Some(run.finished_ms));
    }

    #[test]
    fn movement_precedes_fade() {
        let mut engine = engine();
        let run = engine.toggle(0);

        let first_fade = run
            .actions
            .iter()
            .position(|action| matches!(action, EngineAction::SetBrightness(_)))
            .unwrap();
        let last_move = run
            .actions
            .iter()
            .rposition(|action| matches!(action, EngineAction::MoveServos { .. }))
            .unwrap();

        assert!(last_move < first_fade);
        assert_eq!(servo_moves(&run.actions), 10);
        assert_eq!(run.actions.len(), 10 + 255 + 1);
    }

    #[test]
    fn angles_stay_mirrored_at_every_step() {
        let mut engine = engine();
        let mut now_ms = 0;
        for _ in 0..4 {
            let run = engine.toggle(now_ms);
            for action in &run.actions {
                if let EngineAction::MoveServos { a, b } = action {
                    assert_eq!(a + b, 130);
                }
            }
            let pair = engine.actuators();
            assert_eq!(pair.a + pair.b, 130);
            now_ms = run.finished_ms + engine.config.cooldown_ms;
        }
    }

    #[test]
    fn second_toggle_within_cooldown_is_ignored() {
        let mut engine = engine();
        let first = engine.toggle(0);
        let second = engine.toggle(first.finished_ms + 10);

        assert_eq!(
            second.outcome,
            ToggleOutcome::Cooldown {
                state: FaceplateState::Open,
                remaining_ms: 990,
            }
        );
        assert!(second.actions.is_empty());
        assert_eq!(second.state, FaceplateState::Open);
        assert_eq!(engine.actuators(), ActuatorPair { a: 130, b: 0 });
        assert_eq!(engine.brightness(), 0);
        assert_eq!(engine.completed_toggles(), 1);
    }

    #[test]
    fn round_trip_after_cooldown_restores_start() {
        let mut engine = engine();
        let first = engine.toggle(0);
        let second = engine.toggle(first.finished_ms + 1_000);

        assert!(second.outcome.is_started());
        assert_eq!(second.state, FaceplateState::Closed);
        assert_eq!(engine.actuators(), ActuatorPair { a: 0, b: 130 });
        assert_eq!(engine.brightness(), 255);
        assert_eq!(engine.completed_toggles(), 2);
    }

    #[test]
    fn first_toggle_after_boot_is_not_in_cooldown() {
        let mut engine = engine();
        assert!(engine.request_toggle(0).is_started());
    }

    #[test]
    fn request_while_moving_is_busy() {
        let mut engine = engine();
        assert!(engine.request_toggle(0).is_started());
        let _ = engine.tick(0);

        assert_eq!(
            engine.request_toggle(10),
            ToggleOutcome::Busy {
                state: FaceplateState::Open
            }
        );
    }

    #[test]
    fn tick_waits_for_step_delay() {
        let mut engine = engine();
        let _ = engine.request_toggle(1_000);

        assert_eq!(
            engine.tick(1_000),
            vec![EngineAction::MoveServos { a: 13, b: 117 }]
        );
        assert!(engine.tick(1_049).is_empty());
        assert_eq!(
            engine.tick(1_050),
            vec![EngineAction::MoveServos { a: 26, b: 104 }]
        );
    }

    #[test]
    fn idle_tick_does_nothing() {
        let mut engine = engine();
        assert!(engine.tick(5_000).is_empty());
        assert!(!engine.is_busy());
    }

    #[test]
    fn uneven_step_still_completes() {
        let mut engine = FaceplateEngine::new(FaceplateConfig {
            servo_step: 12,
            ..FaceplateConfig::default()
        });
        let run = engine.toggle(0);

        assert_eq!(run.state, FaceplateState::Open);
        assert_eq!(servo_moves(&run.actions), 11);
        assert_eq!(engine.actuators(), ActuatorPair { a: 130, b: 0 });
    }

    #[test]
    fn status_reports_cooldown() {
        let mut engine = engine();
        let run = engine.toggle(0);
        let status = engine.status(run.finished_ms + 400);

        assert_eq!(status.state, FaceplateState::Open);
        assert_eq!(status.angle_a, 130);
        assert_eq!(status.angle_b, 0);
        assert_eq!(status.brightness, 0);
        assert!(!status.busy);
        assert!(status.in_cooldown);
        assert_eq!(status.cooldown_remaining_ms, 600);
        assert_eq!(status.completed_toggles, 1);
    }
}
