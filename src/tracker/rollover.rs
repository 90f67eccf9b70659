use chrono::{DateTime, Duration, TimeZone};
use tracing::{debug, info};

use crate::utils::time::{elapsed_since_week_start, WeekId};

use super::state::{AccountingState, OTHER};

/// Final totals of a completed week. Never changed once created.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekArchiveEntry {
    pub week: WeekId,
    /// Activity totals in slot order, [OTHER] last.
    pub totals: Vec<(String, Duration)>,
}

impl WeekArchiveEntry {
    /// Snapshots the live accumulators. Activities sharing a name are merged.
    pub fn snapshot(week: WeekId, state: &AccountingState) -> Self {
        let mut totals: Vec<(String, Duration)> = Vec::with_capacity(state.activities.len() + 1);
        let named = state
            .activities
            .iter()
            .map(|v| (v.name.as_ref(), v.elapsed))
            .chain([(OTHER, state.other)]);
        for (name, elapsed) in named {
            match totals.iter_mut().find(|(existing, _)| existing.as_str() == name) {
                Some((_, total)) => *total += elapsed,
                None => totals.push((name.to_string(), elapsed)),
            }
        }
        Self { week, totals }
    }

    pub fn total(&self) -> Duration {
        self.totals
            .iter()
            .fold(Duration::zero(), |acc, (_, v)| acc + *v)
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.totals
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rollover {
    pub state: AccountingState,
    /// Present when a week boundary was crossed and the completed week was archived.
    pub archived: Option<WeekArchiveEntry>,
}

/// Detects a week boundary between the live accumulators and `now`.
///
/// On a crossing the completed week is snapshotted under the week it belongs to, every bucket is
/// reset, and the time already elapsed in the new week is seeded into the active activity. With
/// "Other" active the seed is dropped, the next reconcile credits it to "Other" anyway. Archiving
/// and the week update happen in one step, so a second call for the same boundary is a no-op.
pub fn roll_over<Tz: TimeZone>(now: &DateTime<Tz>, mut state: AccountingState) -> Rollover {
    let current = WeekId::of(now);

    let completed = match state.week {
        Some(week) if week == current => {
            return Rollover {
                state,
                archived: None,
            }
        }
        Some(week) => week,
        None => {
            debug!("Adopting week {current}");
            state.week = Some(current);
            return Rollover {
                state,
                archived: None,
            };
        }
    };

    let archived = WeekArchiveEntry::snapshot(completed, &state);
    info!(
        "Week {completed} ended with {}s tracked, starting {current}",
        archived.total().num_seconds()
    );

    let overflow = elapsed_since_week_start(now);
    for activity in state.activities.iter_mut() {
        activity.elapsed = Duration::zero();
    }
    state.other = Duration::zero();
    if let Some(activity) = state.active.and_then(|i| state.activities.get_mut(i)) {
        activity.elapsed = overflow;
    }
    state.week = Some(current);

    Rollover {
        state,
        archived: Some(archived),
    }
}
