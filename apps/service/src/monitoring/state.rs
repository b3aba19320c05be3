//! Per-monitor status state machine.
//!
//! ```text
//! pending --success--> up
//! pending --failures >= threshold--> down
//! up      --failures >= threshold--> down
//! down    --success--> up            (never debounced)
//! ```
//!
//! Failures below the threshold only bump `consecutive_failures`; the status
//! keeps its previous value. A success always resets the counter.

use super::types::{CheckOutcome, MonitorStatus};

/// Status fields of a monitor that checks mutate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
}

/// A status change caused by one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: MonitorStatus,
    pub to: MonitorStatus,
}

impl MonitorState {
    pub fn new(status: MonitorStatus, consecutive_failures: u32) -> Self {
        Self { status, consecutive_failures }
    }

    /// Fold one definitive check outcome into the state
    pub fn apply(&mut self, outcome: CheckOutcome, failure_threshold: u32) -> Option<StateChange> {
        let from = self.status;

        match outcome {
            CheckOutcome::Up => {
                self.consecutive_failures = 0;
                self.status = MonitorStatus::Up;
            }
            CheckOutcome::Down => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= failure_threshold.max(1) {
                    self.status = MonitorStatus::Down;
                }
            }
        }

        (from != self.status).then_some(StateChange { from, to: self.status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CheckOutcome::{Down, Up};

    #[test]
    fn test_first_check_leaves_pending() {
        let mut state = MonitorState::default();
        assert_eq!(
            state.apply(Up, 1),
            Some(StateChange { from: MonitorStatus::Pending, to: MonitorStatus::Up })
        );

        let mut state = MonitorState::default();
        assert_eq!(
            state.apply(Down, 1),
            Some(StateChange { from: MonitorStatus::Pending, to: MonitorStatus::Down })
        );
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn test_pending_waits_for_threshold() {
        let mut state = MonitorState::default();
        assert_eq!(state.apply(Down, 3), None);
        assert_eq!(state.apply(Down, 3), None);
        assert_eq!(state.status, MonitorStatus::Pending);
        assert_eq!(
            state.apply(Down, 3),
            Some(StateChange { from: MonitorStatus::Pending, to: MonitorStatus::Down })
        );
    }

    #[test]
    fn test_goes_down_exactly_once_at_threshold() {
        for threshold in 1..=4u32 {
            for successes in 1..=3 {
                let mut state = MonitorState::default();
                for _ in 0..successes {
                    state.apply(Up, threshold);
                }

                let failures = threshold + 3;
                let transitions: Vec<(u32, StateChange)> = (1..=failures)
                    .filter_map(|check| state.apply(Down, threshold).map(|change| (check, change)))
                    .collect();

                assert_eq!(transitions.len(), 1, "threshold {threshold}");
                let (check, change) = transitions[0];
                assert_eq!(check, threshold);
                assert_eq!(change, StateChange { from: MonitorStatus::Up, to: MonitorStatus::Down });
                assert_eq!(state.consecutive_failures, failures);
            }
        }
    }

    #[test]
    fn test_single_success_recovers() {
        let mut state = MonitorState::new(MonitorStatus::Down, 7);
        assert_eq!(
            state.apply(Up, 3),
            Some(StateChange { from: MonitorStatus::Down, to: MonitorStatus::Up })
        );
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_flap_below_threshold_stays_up() {
        let mut state = MonitorState::new(MonitorStatus::Up, 0);
        assert_eq!(state.apply(Down, 2), None);
        assert_eq!(state.apply(Up, 2), None);
        assert_eq!(state.apply(Down, 2), None);
        assert_eq!(state.status, MonitorStatus::Up);
        assert_eq!(state.consecutive_failures, 1);
    }

    #[test]
    fn test_down_to_down_is_not_a_transition() {
        let mut state = MonitorState::new(MonitorStatus::Down, 1);
        assert_eq!(state.apply(Down, 1), None);
        assert_eq!(state.consecutive_failures, 2);
    }
}
