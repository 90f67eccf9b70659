use anyhow::Result;
use chrono::Duration;

use crate::{tracker::rollover::WeekArchiveEntry, utils::time::WeekId};

use super::{schema::read_archive, StateStore};

/// Read-only view over the completed weeks.
pub struct ArchiveReader<'a, S: StateStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: StateStore + ?Sized> ArchiveReader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Every archived week, oldest first.
    pub fn weeks(&self) -> Result<Vec<WeekArchiveEntry>> {
        read_archive(self.store)
    }

    pub fn week(&self, week: WeekId) -> Result<Option<WeekArchiveEntry>> {
        Ok(self.weeks()?.into_iter().find(|v| v.week == week))
    }

    /// Archived weeks from `from` to `to`, both inclusive. A missing bound leaves that side open.
    pub fn between(&self, from: Option<WeekId>, to: Option<WeekId>) -> Result<Vec<WeekArchiveEntry>> {
        Ok(self
            .weeks()?
            .into_iter()
            .filter(|v| from.map_or(true, |from| from <= v.week))
            .filter(|v| to.map_or(true, |to| v.week <= to))
            .collect())
    }

    /// Totals per name over the archived weeks of one ISO week-year, in first-seen order.
    pub fn year_totals(&self, year: i32) -> Result<Vec<(String, Duration)>> {
        let mut totals: Vec<(String, Duration)> = Vec::new();
        for entry in self.weeks()?.into_iter().filter(|v| v.week.year == year) {
            for (name, elapsed) in entry.totals {
                match totals.iter_mut().find(|(existing, _)| *existing == name) {
                    Some((_, total)) => *total += elapsed,
                    None => totals.push((name, elapsed)),
                }
            }
        }
        Ok(totals)
    }

    /// ISO week-years that have at least one archived week.
    pub fn years(&self) -> Result<Vec<i32>> {
        let mut years: Vec<i32> = self.weeks()?.iter().map(|v| v.week.year).collect();
        years.dedup();
        Ok(years)
    }
}
