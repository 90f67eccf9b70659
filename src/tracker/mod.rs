//! The time accounting core.
//!
//! Every function in the submodules takes an [AccountingState] and returns the next one:
//!  - [accounting] derives the active bucket from the time elapsed in the week.
//!  - [rollover] archives and resets the accumulators when a week ends.
//!  - [selection] switches the active bucket.
//!  - [restore] backfills the time that passed while nothing was running.
//!
//! [Tracker] wires those to a clock and a [StateStore] and decides when to persist.

pub mod accounting;
pub mod restore;
pub mod rollover;
pub mod selection;
pub mod state;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rollover::{Rollover, WeekArchiveEntry};
use state::AccountingState;
use tracing::{debug, info, instrument};

use crate::{
    store::{
        schema::{append_archive, read_state, write_state},
        StateStore,
    },
    utils::clock::Clock,
};

/// Owns the live state and is its only writer.
pub struct Tracker<S: StateStore, Tz: TimeZone> {
    store: S,
    clock: Box<dyn Clock>,
    tz: Tz,
    state: AccountingState,
    /// Completed weeks not yet durably written.
    pending_archive: Vec<WeekArchiveEntry>,
}

impl<S: StateStore, Tz: TimeZone> Tracker<S, Tz> {
    /// Restores the persisted state and backfills the time since it was saved. No week boundary
    /// is evaluated here, the first [Tracker::tick] does that.
    pub fn open(store: S, clock: Box<dyn Clock>, tz: Tz, activity_names: &[String]) -> Self {
        let now = clock.now().with_timezone(&tz);
        let stored = read_state(&store, activity_names, &now);
        debug!("Loaded state {stored:?}");
        let state = restore::restore(&now, stored);
        Self {
            store,
            clock,
            tz,
            state,
            pending_archive: Vec::new(),
        }
    }

    pub fn state(&self) -> &AccountingState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    /// Brings the state up to date with the clock. A crossed week boundary is persisted right
    /// away together with the archived week; the returned entry is that week.
    pub fn tick(&mut self) -> Result<Option<WeekArchiveEntry>> {
        let now = self.now();
        let Rollover { state, archived } = accounting::tick(&now, self.take_state());
        self.state = state;

        let Some(archived) = archived else {
            return Ok(None);
        };
        self.pending_archive.push(archived.clone());
        self.persist()?;
        Ok(Some(archived))
    }

    /// Switches to an activity. The previous bucket is credited up to now before the switch and
    /// the switch point is persisted immediately. A failed save still leaves the switch applied in
    /// memory; the first error is returned.
    #[instrument(skip(self))]
    pub fn select_activity(&mut self, index: usize) -> Result<()> {
        let ticked = self.tick();
        let state = selection::select_activity(self.state.clone(), index)?;
        if self.state.active != Some(index) {
            info!("Switched from {} to {}", self.state.active_name(), state.active_name());
        }
        self.state = state;
        let persisted = self.persist();
        ticked.and(persisted)
    }

    #[instrument(skip(self))]
    pub fn select_other(&mut self) -> Result<()> {
        let ticked = self.tick();
        if self.state.active.is_some() {
            info!("Switched from {} to {}", self.state.active_name(), state::OTHER);
        }
        self.state = selection::select_other(self.take_state());
        let persisted = self.persist();
        ticked.and(persisted)
    }

    #[instrument(skip(self))]
    pub fn rename(&mut self, index: usize, name: &str) -> Result<()> {
        self.state.rename(index, name)?;
        self.persist()
    }

    /// Durably writes pending archive entries and the live state in one flush. On failure
    /// nothing is dropped, the next call tries again.
    pub fn persist(&mut self) -> Result<()> {
        let saved_at = self.clock.now();
        self.write(saved_at)
            .context("Failed to save state, time tracked since the last save may be lost on restart")?;
        self.pending_archive.clear();
        self.state.last_persisted = Some(saved_at);
        Ok(())
    }

    fn write(&mut self, saved_at: DateTime<Utc>) -> Result<()> {
        append_archive(&mut self.store, &self.pending_archive)?;
        write_state(&mut self.store, &self.state, saved_at)?;
        self.store.flush()
    }

    fn take_state(&mut self) -> AccountingState {
        std::mem::replace(&mut self.state, AccountingState::new(Vec::<String>::new()))
    }
}
