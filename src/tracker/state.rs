use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};

use crate::utils::time::WeekId;

/// Name of the implicit bucket that accrues time while no activity is selected.
pub const OTHER: &str = "Other";

pub const DEFAULT_ACTIVITIES: [&str; 12] = [
    "Sleep",
    "Beats",
    "Family",
    "Friends",
    "Sport",
    "We Have Sun",
    "Luarikot",
    "Tokinoki",
    "You",
    "Human Maintenance",
    "Transport",
    "Nothing",
];

pub fn default_activity_names() -> Vec<String> {
    DEFAULT_ACTIVITIES.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub name: Arc<str>,
    /// Time accrued during the live week.
    pub elapsed: Duration,
}

impl ActivityRecord {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            elapsed: Duration::zero(),
        }
    }
}

/// The live accounting record. Exactly one bucket accrues time at any moment: the activity at
/// `active`, or [OTHER] when it is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountingState {
    pub activities: Vec<ActivityRecord>,
    pub active: Option<usize>,
    pub other: Duration,
    /// Week the live accumulators belong to. `None` until a week has been adopted.
    pub week: Option<WeekId>,
    pub last_persisted: Option<DateTime<Utc>>,
}

impl AccountingState {
    pub fn new<S: Into<Arc<str>>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            activities: names.into_iter().map(ActivityRecord::new).collect(),
            active: None,
            other: Duration::zero(),
            week: None,
            last_persisted: None,
        }
    }

    /// Sum of every bucket, "Other" included.
    pub fn total(&self) -> Duration {
        self.activities_total() + self.other
    }

    pub fn activities_total(&self) -> Duration {
        self.activities
            .iter()
            .fold(Duration::zero(), |acc, v| acc + v.elapsed)
    }

    pub fn elapsed_of(&self, index: usize) -> Option<Duration> {
        self.activities.get(index).map(|v| v.elapsed)
    }

    pub fn active_name(&self) -> &str {
        self.active
            .and_then(|i| self.activities.get(i))
            .map_or(OTHER, |v| v.name.as_ref())
    }

    /// Resolves user input into an activity index. Accepts the 1-based number shown in listings
    /// or a case-insensitive name.
    pub fn find_activity(&self, query: &str) -> Option<usize> {
        let query = query.trim();
        if let Ok(number) = query.parse::<usize>() {
            return number
                .checked_sub(1)
                .filter(|index| *index < self.activities.len());
        }
        self.activities
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(query))
    }

    /// Renames an activity in place. Accrued time stays with the slot, archived weeks keep the
    /// name they were recorded under.
    pub fn rename(&mut self, index: usize, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Activity name can't be empty");
        }
        if name.eq_ignore_ascii_case(OTHER) {
            bail!("{OTHER} is reserved for time without an activity");
        }
        if self
            .activities
            .iter()
            .enumerate()
            .any(|(i, v)| i != index && v.name.eq_ignore_ascii_case(name))
        {
            bail!("Activity {name} already exists");
        }
        let Some(activity) = self.activities.get_mut(index) else {
            bail!("There is no activity number {}", index + 1);
        };
        activity.name = name.into();
        Ok(())
    }
}

impl Default for AccountingState {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITIES)
    }
}
