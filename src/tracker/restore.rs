use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{info, warn};

use super::state::{AccountingState, OTHER};

/// Backfills the time that passed while nothing was running. Whatever was selected at the last
/// save is assumed to have stayed selected, so the whole gap goes to that bucket.
///
/// The gap stops at the end of the stored week: a boundary crossed while down is left for the
/// next tick to roll over, and the archived week then holds exactly the time that belonged to it.
pub fn restore<Tz: TimeZone>(now: &DateTime<Tz>, mut state: AccountingState) -> AccountingState {
    let Some(last_persisted) = state.last_persisted else {
        info!("No previous save found, nothing to backfill");
        return state;
    };

    let mut until = now.with_timezone(&Utc);
    if let Some(week) = state.week {
        until = until.min(week.end(&now.timezone()).with_timezone(&Utc));
    }

    let mut gap = until - last_persisted;
    if gap < Duration::zero() {
        warn!("Last save at {last_persisted} is after {until}, clock moved backwards");
        gap = Duration::zero();
    }

    match state.active.and_then(|i| state.activities.get_mut(i)) {
        Some(activity) => {
            info!("Backfilling {}s into {}", gap.num_seconds(), activity.name);
            activity.elapsed += gap;
        }
        None => {
            info!("Backfilling {}s into {OTHER}", gap.num_seconds());
            state.other += gap;
        }
    }
    state
}
