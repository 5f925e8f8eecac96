//! Rotation state machine
//!
//! Owns the current board index and the interrupt/resume transitions. The
//! controller itself is pure: every transition returns a [`TimerAction`]
//! telling the engine what to do with the single board-duration timer, which
//! keeps timer ownership in one place and makes every transition testable
//! with simulated time.

use std::time::Duration;

use crate::models::BoardInstance;

// ============================================================================
// States and actions
// ============================================================================

/// Where the rotation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// Empty board list: no render target, no timer. A terminal non-error.
    Idle,
    /// Normal rotation at the given index
    Rotating(usize),
    /// Preempted by the countdown interrupt board
    SuspendedForCountdown,
}

/// What the caller must do with the single board timer after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Leave the running timer alone (idempotent re-entry)
    Keep,
    /// Cancel any running timer and arm one for this duration
    Arm(Duration),
    /// Cancel any running timer
    Cancel,
}

// ============================================================================
// Controller
// ============================================================================

/// The rotation controller state machine
pub struct RotationController {
    boards: Vec<BoardInstance>,
    state: RotationState,
    /// Index the live timer was armed for, if any
    armed: Option<usize>,
}

impl RotationController {
    pub fn new() -> Self {
        Self {
            boards: Vec::new(),
            state: RotationState::Idle,
            armed: None,
        }
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    /// The board currently on screen, if any
    pub fn current(&self) -> Option<&BoardInstance> {
        match self.state {
            RotationState::Idle => None,
            RotationState::Rotating(i) => self.boards.get(i),
            RotationState::SuspendedForCountdown => {
                self.boards.iter().find(|b| b.is_countdown())
            }
        }
    }

    /// Up to `count` distinct boards following the current one, for preloading
    pub fn upcoming(&self, count: usize) -> Vec<&BoardInstance> {
        let RotationState::Rotating(i) = self.state else {
            return Vec::new();
        };
        let len = self.boards.len();
        if len < 2 {
            return Vec::new();
        }

        (1..=count.min(len - 1))
            .map(|step| &self.boards[(i + step) % len])
            .collect()
    }

    /// Replace the derived board list
    ///
    /// The current index always stays valid for the new list: out of range
    /// resets to 0. Re-entering the index the live timer was armed for does
    /// not re-arm it.
    pub fn set_boards(&mut self, boards: Vec<BoardInstance>) -> TimerAction {
        self.boards = boards;

        match self.state {
            RotationState::SuspendedForCountdown => TimerAction::Keep,
            RotationState::Idle => {
                if self.boards.is_empty() {
                    TimerAction::Keep
                } else {
                    self.enter(0)
                }
            }
            RotationState::Rotating(i) => {
                if self.boards.is_empty() {
                    self.state = RotationState::Idle;
                    self.armed = None;
                    TimerAction::Cancel
                } else {
                    let index = if i >= self.boards.len() { 0 } else { i };
                    self.enter(index)
                }
            }
        }
    }

    /// The board timer fired: advance to the next board
    pub fn on_timer_fired(&mut self) -> TimerAction {
        let RotationState::Rotating(i) = self.state else {
            // Stale fire against a superseded state; nothing to do
            return TimerAction::Keep;
        };

        let next = (i + 1) % self.boards.len();
        self.force_enter(next)
    }

    /// Manual override: advance one board
    pub fn next(&mut self) -> TimerAction {
        let RotationState::Rotating(i) = self.state else {
            return TimerAction::Keep;
        };
        self.force_enter((i + 1) % self.boards.len())
    }

    /// Manual override: go back one board
    pub fn previous(&mut self) -> TimerAction {
        let RotationState::Rotating(i) = self.state else {
            return TimerAction::Keep;
        };
        let len = self.boards.len();
        self.force_enter((i + len - 1) % len)
    }

    /// Manual override: jump to the board with the given slide key
    pub fn jump_to(&mut self, slide_key: &str) -> TimerAction {
        if !matches!(self.state, RotationState::Rotating(_)) {
            return TimerAction::Keep;
        }
        match self.boards.iter().position(|b| b.slide_key == slide_key) {
            Some(index) => self.force_enter(index),
            None => TimerAction::Keep,
        }
    }

    /// The countdown monitor entered its window: preempt rotation
    pub fn on_countdown_entered(&mut self) -> TimerAction {
        self.state = RotationState::SuspendedForCountdown;
        self.armed = None;
        TimerAction::Cancel
    }

    /// The countdown window ended: forced reset to index 0
    ///
    /// Deliberately not a resume of the prior position; the product resets the
    /// rotation from the top after the interrupt.
    pub fn on_countdown_exited(&mut self) -> TimerAction {
        if self.boards.is_empty() {
            self.state = RotationState::Idle;
            self.armed = None;
            return TimerAction::Cancel;
        }
        self.force_enter(0)
    }

    /// Enter an index, keeping a timer already armed for it
    fn enter(&mut self, index: usize) -> TimerAction {
        self.state = RotationState::Rotating(index);
        if self.armed == Some(index) {
            return TimerAction::Keep;
        }
        self.armed = Some(index);
        TimerAction::Arm(self.boards[index].duration)
    }

    /// Enter an index and always re-arm (explicit transitions)
    fn force_enter(&mut self, index: usize) -> TimerAction {
        self.state = RotationState::Rotating(index);
        self.armed = Some(index);
        TimerAction::Arm(self.boards[index].duration)
    }
}

impl Default for RotationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoardInstance, BoardKind};
    use serde_json::Value;

    fn board(key: &str, secs: u64) -> BoardInstance {
        BoardInstance {
            kind: BoardKind::Announcements,
            name: key.to_string(),
            duration: Duration::from_secs(secs),
            slide_key: key.to_string(),
            props: Value::Null,
            design: None,
        }
    }

    fn two_board_controller() -> RotationController {
        let mut controller = RotationController::new();
        controller.set_boards(vec![board("a", 120), board("b", 60)]);
        controller
    }

    #[test]
    fn test_empty_list_is_idle_without_timer() {
        let mut controller = RotationController::new();
        let action = controller.set_boards(Vec::new());

        assert_eq!(controller.state(), RotationState::Idle);
        assert_eq!(action, TimerAction::Keep);
        assert!(controller.current().is_none());
        assert!(controller.upcoming(2).is_empty());
    }

    #[test]
    fn test_first_boards_arm_first_duration() {
        let mut controller = RotationController::new();
        let action = controller.set_boards(vec![board("a", 120), board("b", 60)]);

        assert_eq!(controller.state(), RotationState::Rotating(0));
        assert_eq!(action, TimerAction::Arm(Duration::from_secs(120)));
        assert_eq!(controller.current().unwrap().slide_key, "a");
    }

    #[test]
    fn test_rotation_advances_and_wraps() {
        // After 120 simulated seconds the index moves 0 -> 1, after another
        // 60 it wraps back to 0
        let mut controller = two_board_controller();

        let action = controller.on_timer_fired();
        assert_eq!(controller.state(), RotationState::Rotating(1));
        assert_eq!(action, TimerAction::Arm(Duration::from_secs(60)));

        let action = controller.on_timer_fired();
        assert_eq!(controller.state(), RotationState::Rotating(0));
        assert_eq!(action, TimerAction::Arm(Duration::from_secs(120)));
    }

    #[test]
    fn test_reentry_same_index_keeps_timer() {
        let mut controller = two_board_controller();

        // Re-evaluation produced the same list again
        let action = controller.set_boards(vec![board("a", 120), board("b", 60)]);
        assert_eq!(action, TimerAction::Keep);
        assert_eq!(controller.state(), RotationState::Rotating(0));
    }

    #[test]
    fn test_shrinking_list_resets_index() {
        let mut controller = two_board_controller();
        controller.on_timer_fired();
        assert_eq!(controller.state(), RotationState::Rotating(1));

        let action = controller.set_boards(vec![board("a", 120)]);
        assert_eq!(controller.state(), RotationState::Rotating(0));
        assert_eq!(action, TimerAction::Arm(Duration::from_secs(120)));
    }

    #[test]
    fn test_list_emptied_mid_rotation_cancels() {
        let mut controller = two_board_controller();
        let action = controller.set_boards(Vec::new());

        assert_eq!(controller.state(), RotationState::Idle);
        assert_eq!(action, TimerAction::Cancel);
        assert!(controller.current().is_none());
    }

    #[test]
    fn test_countdown_preempts_and_forces_reset() {
        let mut controller = two_board_controller();
        controller.on_timer_fired(); // now at index 1

        let action = controller.on_countdown_entered();
        assert_eq!(controller.state(), RotationState::SuspendedForCountdown);
        assert_eq!(action, TimerAction::Cancel);

        // The evaluator injects the interrupt board while suspended
        controller.set_boards(vec![
            board("a", 120),
            board("b", 60),
            BoardInstance::countdown_interrupt(),
        ]);
        assert!(controller.current().unwrap().is_countdown());

        // Exit forces index 0, not a resume of index 1
        let action = controller.on_countdown_exited();
        assert_eq!(controller.state(), RotationState::Rotating(0));
        assert_eq!(action, TimerAction::Arm(Duration::from_secs(120)));
    }

    #[test]
    fn test_countdown_exit_with_empty_list_goes_idle() {
        let mut controller = RotationController::new();
        controller.on_countdown_entered();

        let action = controller.on_countdown_exited();
        assert_eq!(controller.state(), RotationState::Idle);
        assert_eq!(action, TimerAction::Cancel);
    }

    #[test]
    fn test_manual_next_previous_wrap() {
        let mut controller = two_board_controller();

        controller.next();
        assert_eq!(controller.state(), RotationState::Rotating(1));
        controller.next();
        assert_eq!(controller.state(), RotationState::Rotating(0));
        controller.previous();
        assert_eq!(controller.state(), RotationState::Rotating(1));
    }

    #[test]
    fn test_manual_controls_ignored_while_suspended() {
        let mut controller = two_board_controller();
        controller.on_countdown_entered();

        assert_eq!(controller.next(), TimerAction::Keep);
        assert_eq!(controller.previous(), TimerAction::Keep);
        assert_eq!(controller.jump_to("b"), TimerAction::Keep);
        assert_eq!(controller.state(), RotationState::SuspendedForCountdown);
    }

    #[test]
    fn test_jump_to_known_and_unknown_keys() {
        let mut controller = two_board_controller();

        let action = controller.jump_to("b");
        assert_eq!(controller.state(), RotationState::Rotating(1));
        assert_eq!(action, TimerAction::Arm(Duration::from_secs(60)));

        let action = controller.jump_to("nonexistent");
        assert_eq!(action, TimerAction::Keep);
        assert_eq!(controller.state(), RotationState::Rotating(1));
    }

    #[test]
    fn test_upcoming_wraps_without_duplicates() {
        let mut controller = RotationController::new();
        controller.set_boards(vec![board("a", 10), board("b", 10), board("c", 10)]);

        let upcoming: Vec<_> = controller
            .upcoming(2)
            .iter()
            .map(|b| b.slide_key.clone())
            .collect();
        assert_eq!(upcoming, vec!["b", "c"]);

        // With two boards only one distinct upcoming board exists
        controller.set_boards(vec![board("a", 10), board("b", 10)]);
        assert_eq!(controller.upcoming(2).len(), 1);
    }

    #[test]
    fn test_stale_timer_fire_is_ignored() {
        let mut controller = RotationController::new();
        controller.set_boards(Vec::new());
        assert_eq!(controller.on_timer_fired(), TimerAction::Keep);
    }
}
