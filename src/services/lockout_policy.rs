//! Lockout exit rules
//!
//! Pure decision function: given the configured method, the obstruction state
//! of the current frame and the lockout timer, decide whether the door stays
//! locked and what should happen to the timer. The controller owns the timer
//! and applies the returned action.

use crate::domain::types::LockoutMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    StayLocked,
    Unlock,
}

/// What the caller should do with its lockout timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Keep,
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutStep {
    pub decision: LockDecision,
    pub timer: TimerAction,
}

impl LockoutStep {
    const fn new(decision: LockDecision, timer: TimerAction) -> Self {
        Self { decision, timer }
    }
}

/// Whether the lockout timer runs from the moment the door locks
pub fn starts_timer_on_entry(method: LockoutMethod) -> bool {
    !matches!(method, LockoutMethod::ObstructThenTimer)
}

/// Decide one lockout frame.
///
/// `elapsed` is the lockout timer reading in seconds, `None` when stopped.
/// All timer comparisons are inclusive.
pub fn decide(
    method: LockoutMethod,
    obstructed: bool,
    elapsed: Option<f64>,
    lockout_time: f64,
) -> LockoutStep {
    use LockDecision::*;
    use TimerAction::*;

    let expired = elapsed.is_some_and(|e| e >= lockout_time);

    match method {
        LockoutMethod::TimerOnly => match elapsed {
            None if lockout_time <= 0.0 => LockoutStep::new(Unlock, Start),
            None => LockoutStep::new(StayLocked, Start),
            Some(_) if expired => LockoutStep::new(Unlock, Keep),
            Some(_) => LockoutStep::new(StayLocked, Keep),
        },
        LockoutMethod::ObstructOrTimer => {
            if !obstructed || expired {
                LockoutStep::new(Unlock, Keep)
            } else if elapsed.is_none() {
                LockoutStep::new(StayLocked, Start)
            } else {
                LockoutStep::new(StayLocked, Keep)
            }
        }
        LockoutMethod::ObstructThenTimer => {
            if obstructed {
                // Re-obstruction restarts the wait for a clear view
                LockoutStep::new(StayLocked, Stop)
            } else if elapsed.is_none() {
                if lockout_time <= 0.0 {
                    LockoutStep::new(Unlock, Start)
                } else {
                    LockoutStep::new(StayLocked, Start)
                }
            } else if expired {
                LockoutStep::new(Unlock, Keep)
            } else {
                LockoutStep::new(StayLocked, Keep)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: f64 = 2.0;

    #[test]
    fn test_timer_only_ignores_obstruction() {
        for obstructed in [true, false] {
            let step = decide(LockoutMethod::TimerOnly, obstructed, Some(1.0), T);
            assert_eq!(step.decision, LockDecision::StayLocked);
            let step = decide(LockoutMethod::TimerOnly, obstructed, Some(2.0), T);
            assert_eq!(step.decision, LockDecision::Unlock);
        }
    }

    #[test]
    fn test_exact_timeout_unlocks() {
        let step = decide(LockoutMethod::ObstructOrTimer, true, Some(T), T);
        assert_eq!(step.decision, LockDecision::Unlock);
        let step = decide(LockoutMethod::TimerOnly, true, Some(T - 0.001), T);
        assert_eq!(step.decision, LockDecision::StayLocked);
    }

    #[test]
    fn test_obstruct_or_timer_unlocks_on_clear() {
        let step = decide(LockoutMethod::ObstructOrTimer, false, Some(0.1), T);
        assert_eq!(step.decision, LockDecision::Unlock);
        let step = decide(LockoutMethod::ObstructOrTimer, true, Some(0.1), T);
        assert_eq!(step, LockoutStep::new(LockDecision::StayLocked, TimerAction::Keep));
    }

    #[test]
    fn test_obstruct_then_timer_waits_for_clear() {
        // Still obstructed: timer held stopped regardless of how long we've been locked
        let step = decide(LockoutMethod::ObstructThenTimer, true, None, T);
        assert_eq!(step, LockoutStep::new(LockDecision::StayLocked, TimerAction::Stop));

        // First clear frame starts the wait
        let step = decide(LockoutMethod::ObstructThenTimer, false, None, T);
        assert_eq!(step, LockoutStep::new(LockDecision::StayLocked, TimerAction::Start));

        let step = decide(LockoutMethod::ObstructThenTimer, false, Some(1.0), T);
        assert_eq!(step.decision, LockDecision::StayLocked);

        // Re-obstruction while waiting resets it
        let step = decide(LockoutMethod::ObstructThenTimer, true, Some(1.9), T);
        assert_eq!(step, LockoutStep::new(LockDecision::StayLocked, TimerAction::Stop));

        let step = decide(LockoutMethod::ObstructThenTimer, false, Some(2.0), T);
        assert_eq!(step.decision, LockDecision::Unlock);
    }

    #[test]
    fn test_entry_timer() {
        assert!(starts_timer_on_entry(LockoutMethod::TimerOnly));
        assert!(starts_timer_on_entry(LockoutMethod::ObstructOrTimer));
        assert!(!starts_timer_on_entry(LockoutMethod::ObstructThenTimer));
    }
}
