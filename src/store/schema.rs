//! Stable keys and encodings of everything the tracker persists. Values are JSON; durations and
//! instants are seconds as floating point numbers, instants counted from
//! [REFERENCE_DATE](crate::utils::time::REFERENCE_DATE).
//!
//! Reads never fail: a missing, unreadable or malformed value falls back to its default. Writes
//! report every failure.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    tracker::{
        rollover::WeekArchiveEntry,
        state::{AccountingState, ActivityRecord, OTHER},
    },
    utils::time::{duration_to_seconds, from_reference, seconds_to_duration, since_reference, WeekId},
};

use super::StateStore;

pub const IS_TASK_RUNNING: &str = "isTaskRunning";
pub const TASK_ELAPSED_TIMES: &str = "taskElapsedTimes";
pub const TASK_NAMES: &str = "taskNames";
pub const OTHER_ELAPSED_TIME: &str = "otherElapsedTime";
pub const CURRENT_WEEK_NUMBER: &str = "currentWeekNumber";
pub const CURRENT_WEEK_YEAR: &str = "currentWeekYear";
pub const LAST_SAVED_TIME: &str = "lastSavedTime";
pub const PREVIOUS_WEEKS_DATA: &str = "previousWeeksData";

/// Archive as persisted: `"{year}-{week}"` to activity name (or "Other") to seconds.
pub type StoredArchive = BTreeMap<String, BTreeMap<String, f64>>;

fn read_value<S, T>(store: &S, key: &str) -> Option<T>
where
    S: StateStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get(key) {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes)
            .inspect_err(|e| warn!("Malformed value under {key}, using default: {e}"))
            .ok(),
        Ok(None) => {
            debug!("Nothing stored under {key}");
            None
        }
        Err(e) => {
            warn!("Failed to read {key}, using default: {e:?}");
            None
        }
    }
}

fn write_value<S, T>(store: &mut S, key: &str, value: &T) -> Result<()>
where
    S: StateStore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    store
        .set(key, bytes)
        .with_context(|| format!("Failed to write {key}"))
}

fn stored_duration(key: &str, seconds: f64) -> Duration {
    match seconds_to_duration(seconds) {
        Some(v) if v >= Duration::zero() => v,
        _ => {
            warn!("Invalid duration {seconds} under {key}, using zero");
            Duration::zero()
        }
    }
}

/// Loads the live state. `defaults` fixes the number of activity slots and names any slot the
/// store has no name for. `now` is only used to date legacy week numbers stored without a year.
pub fn read_state<S, Tz>(store: &S, defaults: &[String], now: &DateTime<Tz>) -> AccountingState
where
    S: StateStore + ?Sized,
    Tz: TimeZone,
{
    let slots = defaults.len();

    let names: Vec<String> = read_value(store, TASK_NAMES).unwrap_or_default();
    let elapsed: Vec<f64> = read_value(store, TASK_ELAPSED_TIMES).unwrap_or_default();
    let running: Vec<bool> = read_value(store, IS_TASK_RUNNING).unwrap_or_default();

    if names.len() > slots || elapsed.len() > slots || running.len() > slots {
        warn!("Stored state has more than {slots} activities, extra slots are dropped");
    }

    let activities = defaults
        .iter()
        .enumerate()
        .map(|(i, default)| ActivityRecord {
            name: names
                .get(i)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
                .as_str()
                .into(),
            elapsed: elapsed
                .get(i)
                .map_or(Duration::zero(), |v| stored_duration(TASK_ELAPSED_TIMES, *v)),
        })
        .collect();

    let running_slots = running.iter().take(slots).filter(|v| **v).count();
    if running_slots > 1 {
        warn!("{running_slots} activities were stored as running, keeping the first one");
    }
    let active = running.iter().take(slots).position(|v| *v);

    let other = read_value::<_, f64>(store, OTHER_ELAPSED_TIME)
        .map_or(Duration::zero(), |v| stored_duration(OTHER_ELAPSED_TIME, v));

    let week = read_value::<_, u32>(store, CURRENT_WEEK_NUMBER)
        .filter(|v| *v > 0)
        .and_then(|week| {
            let year = read_value::<_, i32>(store, CURRENT_WEEK_YEAR)
                .unwrap_or_else(|| infer_week_year(week, now));
            let id = WeekId::new(year, week);
            if id.is_none() {
                warn!("Stored week {year}-{week} doesn't exist, starting a new week");
            }
            id
        });

    let last_persisted = read_value::<_, f64>(store, LAST_SAVED_TIME).and_then(|v| {
        let moment = from_reference(v);
        if moment.is_none() {
            warn!("Invalid {LAST_SAVED_TIME} {v}, ignoring it");
        }
        moment
    });

    AccountingState {
        activities,
        active,
        other,
        week,
        last_persisted,
    }
}

/// Stores written before the year was kept only have a week number. It belongs to the most recent
/// year in which that week is not in the future.
fn infer_week_year<Tz: TimeZone>(week: u32, now: &DateTime<Tz>) -> i32 {
    let current = WeekId::of(now);
    let year = if week <= current.week {
        current.year
    } else {
        current.year - 1
    };
    debug!("Inferred year {year} for stored week {week}");
    year
}

/// Writes every key of the live state. `saved_at` becomes the stored `lastSavedTime`.
pub fn write_state<S>(store: &mut S, state: &AccountingState, saved_at: DateTime<Utc>) -> Result<()>
where
    S: StateStore + ?Sized,
{
    let running: Vec<bool> = (0..state.activities.len())
        .map(|i| state.active == Some(i))
        .collect();
    let elapsed: Vec<f64> = state
        .activities
        .iter()
        .map(|v| duration_to_seconds(v.elapsed))
        .collect();
    let names: Vec<&str> = state.activities.iter().map(|v| v.name.as_ref()).collect();

    write_value(store, IS_TASK_RUNNING, &running)?;
    write_value(store, TASK_ELAPSED_TIMES, &elapsed)?;
    write_value(store, TASK_NAMES, &names)?;
    write_value(store, OTHER_ELAPSED_TIME, &duration_to_seconds(state.other))?;
    if let Some(week) = state.week {
        write_value(store, CURRENT_WEEK_NUMBER, &week.week)?;
        write_value(store, CURRENT_WEEK_YEAR, &week.year)?;
    }
    write_value(store, LAST_SAVED_TIME, &since_reference(saved_at))?;
    Ok(())
}

/// Reads the raw archive. Unlike the live state a malformed archive is an error, since the next
/// append would otherwise overwrite the history with an empty one.
pub fn read_stored_archive<S>(store: &S) -> Result<StoredArchive>
where
    S: StateStore + ?Sized,
{
    match store
        .get(PREVIOUS_WEEKS_DATA)
        .context("Failed to read archived weeks")?
    {
        Some(bytes) => {
            serde_json::from_slice(&bytes).context("Archived weeks are not in the expected format")
        }
        None => Ok(StoredArchive::new()),
    }
}

/// Adds completed weeks to the archive. A week that is already archived keeps its stored totals.
pub fn append_archive<S>(store: &mut S, entries: &[WeekArchiveEntry]) -> Result<()>
where
    S: StateStore + ?Sized,
{
    if entries.is_empty() {
        return Ok(());
    }
    let mut archive = read_stored_archive(store)?;
    for entry in entries {
        let key = entry.week.archive_key();
        if archive.contains_key(&key) {
            warn!("Week {key} is already archived, keeping the stored totals");
            continue;
        }
        let totals = entry
            .totals
            .iter()
            .map(|(name, elapsed)| (name.clone(), duration_to_seconds(*elapsed)))
            .collect();
        archive.insert(key, totals);
    }
    write_value(store, PREVIOUS_WEEKS_DATA, &archive)
}

/// Decodes the archive into entries ordered by week. Entries with an unrecognised key are skipped.
pub fn read_archive<S>(store: &S) -> Result<Vec<WeekArchiveEntry>>
where
    S: StateStore + ?Sized,
{
    let archive = read_stored_archive(store)?;
    let mut entries: Vec<WeekArchiveEntry> = archive
        .into_iter()
        .filter_map(|(key, totals)| {
            let Some(week) = WeekId::parse_archive_key(&key) else {
                warn!("Skipping archived week with unknown key {key}");
                return None;
            };
            let mut totals: Vec<(String, Duration)> = totals
                .into_iter()
                .map(|(name, seconds)| {
                    let elapsed = stored_duration(PREVIOUS_WEEKS_DATA, seconds);
                    (name, elapsed)
                })
                .collect();
            // Named activities first, "Other" last like in the live listing
            totals.sort_by_key(|(name, _)| name == OTHER);
            Some(WeekArchiveEntry { week, totals })
        })
        .collect();
    entries.sort_by_key(|v| v.week);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::{
        store::{MemoryStore, StateStore},
        tracker::{
            rollover::WeekArchiveEntry,
            state::{default_activity_names, AccountingState, OTHER},
        },
        utils::time::{since_reference, WeekId},
    };

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 3, 12, 0, 0).unwrap()
    }

    fn archived(year: i32, week: u32, state: &AccountingState) -> WeekArchiveEntry {
        WeekArchiveEntry::snapshot(WeekId::new(year, week).unwrap(), state)
    }

    fn set_json(store: &mut MemoryStore, key: &str, value: serde_json::Value) {
        store.set(key, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_empty_store_gives_defaults() {
        let store = MemoryStore::new();
        let state = read_state(&store, &default_activity_names(), &now());
        assert_eq!(state, AccountingState::default());
    }

    #[test]
    fn test_state_survives_a_write_and_read() {
        let mut state = AccountingState::default();
        state.activities[3].elapsed = Duration::milliseconds(12_345);
        state.activities[3].name = "Climbing".into();
        state.other = Duration::seconds(42);
        state.active = Some(3);
        state.week = Some(WeekId::of(&now()));

        let mut store = MemoryStore::new();
        write_state(&mut store, &state, now()).unwrap();

        let restored = read_state(&store, &default_activity_names(), &now());
        state.last_persisted = Some(now());
        assert_eq!(restored, state);
    }

    #[test]
    fn test_stored_layout_matches_schema() {
        let mut state = AccountingState::new(["a", "b"]);
        state.active = Some(1);
        state.activities[1].elapsed = Duration::milliseconds(1500);
        state.week = Some(WeekId::new(2024, 27).unwrap());
        let mut store = MemoryStore::new();
        write_state(&mut store, &state, now()).unwrap();

        let get = |key: &str| -> serde_json::Value {
            serde_json::from_slice(&store.get(key).unwrap().unwrap()).unwrap()
        };
        assert_eq!(get(IS_TASK_RUNNING), serde_json::json!([false, true]));
        assert_eq!(get(TASK_ELAPSED_TIMES), serde_json::json!([0.0, 1.5]));
        assert_eq!(get(TASK_NAMES), serde_json::json!(["a", "b"]));
        assert_eq!(get(CURRENT_WEEK_NUMBER), serde_json::json!(27));
        assert_eq!(get(CURRENT_WEEK_YEAR), serde_json::json!(2024));
        assert_eq!(get(LAST_SAVED_TIME), serde_json::json!(since_reference(now())));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let mut store = MemoryStore::new();
        set_json(&mut store, TASK_ELAPSED_TIMES, serde_json::json!("not a list"));
        set_json(&mut store, TASK_NAMES, serde_json::json!(["Rest", ""]));
        set_json(&mut store, OTHER_ELAPSED_TIME, serde_json::json!(-4.0));
        set_json(&mut store, IS_TASK_RUNNING, serde_json::json!([false, true, true]));
        set_json(&mut store, CURRENT_WEEK_NUMBER, serde_json::json!(0));

        let state = read_state(&store, &default_activity_names(), &now());
        assert_eq!(&*state.activities[0].name, "Rest");
        assert_eq!(&*state.activities[1].name, "Beats");
        assert!(state.activities.iter().all(|v| v.elapsed.is_zero()));
        assert_eq!(state.other, Duration::zero());
        assert_eq!(state.active, Some(1));
        assert_eq!(state.week, None);
    }

    #[test]
    fn test_short_sequences_are_padded() {
        let mut store = MemoryStore::new();
        set_json(&mut store, TASK_ELAPSED_TIMES, serde_json::json!([1.0, 2.0]));
        set_json(&mut store, IS_TASK_RUNNING, serde_json::json!([false]));
        let state = read_state(&store, &default_activity_names(), &now());
        assert_eq!(state.activities.len(), 12);
        assert_eq!(state.activities[1].elapsed, Duration::seconds(2));
        assert_eq!(state.activities[11].elapsed, Duration::zero());
        assert_eq!(state.active, None);
    }

    #[test]
    fn test_legacy_week_number_infers_year() {
        let mut store = MemoryStore::new();
        // 2024-07-03 is in week 27 of 2024
        set_json(&mut store, CURRENT_WEEK_NUMBER, serde_json::json!(26));
        let state = read_state(&store, &default_activity_names(), &now());
        assert_eq!(state.week, WeekId::new(2024, 26));

        set_json(&mut store, CURRENT_WEEK_NUMBER, serde_json::json!(50));
        let state = read_state(&store, &default_activity_names(), &now());
        assert_eq!(state.week, WeekId::new(2023, 50));
    }

    #[test]
    fn test_archive_append_and_read() {
        let mut store = MemoryStore::new();
        let mut state = AccountingState::default();
        state.activities[0].elapsed = Duration::seconds(3600);
        state.other = Duration::seconds(1800);
        let week_10 = archived(2024, 10, &state);
        let week_9 = archived(2024, 9, &AccountingState::default());

        append_archive(&mut store, &[week_10.clone()]).unwrap();
        append_archive(&mut store, &[week_9.clone()]).unwrap();

        let raw = read_stored_archive(&store).unwrap();
        assert_eq!(raw["2024-10"]["Sleep"], 3600.);
        assert_eq!(raw["2024-10"][OTHER], 1800.);

        let entries = read_archive(&store).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].week, WeekId::new(2024, 9).unwrap());
        assert_eq!(entries[1].get("Sleep"), Some(Duration::seconds(3600)));
        assert_eq!(entries[1].totals.last().map(|v| v.0.as_str()), Some(OTHER));
    }

    #[test]
    fn test_archived_week_is_never_overwritten() {
        let mut store = MemoryStore::new();
        let mut state = AccountingState::default();
        state.other = Duration::seconds(10);
        append_archive(&mut store, &[archived(2024, 10, &state)]).unwrap();

        state.other = Duration::seconds(99);
        append_archive(&mut store, &[archived(2024, 10, &state)]).unwrap();

        let entries = read_archive(&store).unwrap();
        assert_eq!(entries[0].get(OTHER), Some(Duration::seconds(10)));
    }

    #[test]
    fn test_malformed_archive_is_not_overwritten() {
        let mut store = MemoryStore::new();
        set_json(&mut store, PREVIOUS_WEEKS_DATA, serde_json::json!(["broken"]));
        let entry = archived(2024, 10, &AccountingState::default());
        assert!(append_archive(&mut store, &[entry]).is_err());
        assert!(read_archive(&store).is_err());
    }

    #[test]
    fn test_unknown_archive_keys_are_skipped() {
        let mut store = MemoryStore::new();
        set_json(
            &mut store,
            PREVIOUS_WEEKS_DATA,
            serde_json::json!({ "someday": { "Other": 1.0 }, "2023-5": { "Other": 2.0 } }),
        );
        let entries = read_archive(&store).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].week, WeekId::new(2023, 5).unwrap());
    }
}
