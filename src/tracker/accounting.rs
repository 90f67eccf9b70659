//! Remainder based accounting. The active bucket is never advanced by a delta: it is derived as
//! "time since the week started minus every other bucket", so a late or skipped tick is absorbed
//! by the next one instead of being lost.

use chrono::{DateTime, Duration, TimeZone};
use tracing::warn;

use crate::utils::time::elapsed_since_week_start;

use super::{
    rollover::{roll_over, Rollover},
    state::{AccountingState, OTHER},
};

/// Brings the active bucket up to date with `now`. Calling it again with the same `now` changes
/// nothing.
pub fn reconcile<Tz: TimeZone>(now: &DateTime<Tz>, mut state: AccountingState) -> AccountingState {
    let since_week_start = elapsed_since_week_start(now);

    match state.active.filter(|i| *i < state.activities.len()) {
        Some(index) => {
            let others = state
                .activities
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .fold(state.other, |acc, (_, v)| acc + v.elapsed);
            let activity = &mut state.activities[index];
            activity.elapsed = settle(&activity.name, activity.elapsed, since_week_start - others);
        }
        None => {
            let remainder = since_week_start - state.activities_total();
            state.other = settle(OTHER, state.other, remainder);
        }
    }
    state
}

/// A bucket never moves backwards. A remainder below the current value means the clock jumped
/// back or the stored totals overshoot the week; keep the known value until time catches up.
fn settle(name: &str, previous: Duration, remainder: Duration) -> Duration {
    if remainder < Duration::zero() {
        warn!("Negative duration anomaly for {name}: remainder {remainder}, keeping {previous}");
        previous
    } else if remainder < previous {
        warn!("Duration of {name} would shrink from {previous} to {remainder}, keeping it");
        previous
    } else {
        remainder
    }
}

/// One tick of the accounting loop: week boundary check first, then reconciliation.
pub fn tick<Tz: TimeZone>(now: &DateTime<Tz>, state: AccountingState) -> Rollover {
    let Rollover { state, archived } = roll_over(now, state);
    Rollover {
        state: reconcile(now, state),
        archived,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::{
        tracker::{
            selection::{select_activity, select_other},
            state::AccountingState,
        },
        utils::time::{elapsed_since_week_start, start_of_week},
    };

    use super::{reconcile, tick};

    fn week_start() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    fn assert_invariant(now: &DateTime<Utc>, state: &AccountingState) {
        let difference = (state.total() - elapsed_since_week_start(now)).abs();
        assert!(
            difference <= Duration::milliseconds(1),
            "totals {} drifted from week time {} at {now}",
            state.total(),
            elapsed_since_week_start(now)
        );
    }

    #[test]
    fn test_fresh_state_accrues_other() {
        let now = week_start() + Duration::seconds(10);
        let state = reconcile(&now, AccountingState::default());
        assert_eq!(state.other, Duration::seconds(10));
        assert!(state.activities.iter().all(|v| v.elapsed.is_zero()));
    }

    #[test]
    fn test_switching_between_activities() {
        let state = select_activity(AccountingState::default(), 0).unwrap();
        let state = reconcile(&(week_start() + Duration::seconds(5)), state);
        let state = select_activity(state, 1).unwrap();
        let state = reconcile(&(week_start() + Duration::seconds(8)), state);

        assert_eq!(state.activities[0].elapsed, Duration::seconds(5));
        assert_eq!(state.activities[1].elapsed, Duration::seconds(3));
        assert_eq!(state.other, Duration::zero());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let now = week_start() + Duration::minutes(90);
        let state = select_activity(AccountingState::default(), 3).unwrap();
        let once = reconcile(&now, state);
        let twice = reconcile(&now, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missed_ticks_are_absorbed() {
        let mut state = reconcile(&(week_start() + Duration::seconds(30)), AccountingState::default());
        state = select_activity(state, 2).unwrap();
        // Nothing ran for an hour, the next tick credits all of it
        let now = week_start() + Duration::seconds(30) + Duration::hours(1);
        state = reconcile(&now, state);
        assert_eq!(state.activities[2].elapsed, Duration::hours(1));
        assert_eq!(state.other, Duration::seconds(30));
        assert_invariant(&now, &state);
    }

    #[test]
    fn test_clock_going_back_keeps_known_values() {
        let state = select_activity(AccountingState::default(), 0).unwrap();
        let state = reconcile(&(week_start() + Duration::seconds(100)), state);
        let state = reconcile(&(week_start() + Duration::seconds(40)), state);
        assert_eq!(state.activities[0].elapsed, Duration::seconds(100));
    }

    #[test]
    fn test_overshooting_totals_never_go_negative() {
        let mut state = AccountingState::default();
        state.activities[4].elapsed = Duration::hours(2);
        state.active = Some(0);
        let state = reconcile(&(week_start() + Duration::hours(1)), state);
        assert_eq!(state.activities[0].elapsed, Duration::zero());

        let state = select_other(state);
        let state = reconcile(&(week_start() + Duration::hours(1)), state);
        assert_eq!(state.other, Duration::zero());
    }

    #[test]
    fn test_invariant_holds_over_a_session() {
        let start = week_start() + Duration::hours(7);
        let mut state = tick(&start, AccountingState::default()).state;
        let plan = [Some(0), None, Some(5), Some(5), Some(11), None, Some(0), Some(3)];
        for (step, selection) in plan.iter().enumerate() {
            state = match selection {
                Some(index) => select_activity(state, *index).unwrap(),
                None => select_other(state),
            };
            let now = start + Duration::milliseconds(1_234_567 * (step as i64 + 1));
            state = tick(&now, state).state;
            assert_invariant(&now, &state);
            assert_eq!(start_of_week(&now), week_start());
        }
    }
}
