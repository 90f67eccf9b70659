use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::TimeZone;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::{
    cli::output::{render_history, render_week},
    store::{archive::ArchiveReader, StateStore},
    tracker::Tracker,
};

use super::command::{SessionCommand, USAGE};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How often the accounting is reconciled with the clock.
    pub tick_interval: Duration,
    /// How often the live state is saved when nothing else triggers a save.
    pub save_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            save_interval: Duration::from_secs(1),
        }
    }
}

/// Drives a [Tracker] from a periodic tick and from user commands. Both arrive on this one task,
/// which makes it the single writer of the accounting state.
pub struct TickModule<S: StateStore, Tz: TimeZone> {
    tracker: Tracker<S, Tz>,
    commands: mpsc::Receiver<SessionCommand>,
    shutdown: CancellationToken,
    config: SessionConfig,
}

impl<S: StateStore, Tz: TimeZone> TickModule<S, Tz> {
    pub fn new(
        tracker: Tracker<S, Tz>,
        commands: mpsc::Receiver<SessionCommand>,
        shutdown: CancellationToken,
        config: SessionConfig,
    ) -> Self {
        Self {
            tracker,
            commands,
            shutdown,
            config,
        }
    }

    /// Executes the tick loop until shutdown or `quit`. The state is saved one last time before
    /// returning the tracker.
    #[instrument(name = "session", skip_all)]
    pub async fn run(mut self) -> Result<Tracker<S, Tz>> {
        self.tick();
        let mut next_tick = self.tracker.clock().instant() + self.config.tick_interval;
        let mut last_save = self.tracker.clock().instant();
        let mut input_open = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.commands.recv(), if input_open => match command {
                    Some(SessionCommand::Quit) => break,
                    Some(command) => {
                        if self.handle(command) {
                            last_save = self.tracker.clock().instant();
                        }
                    }
                    None => {
                        debug!("Input closed, ticking until shutdown");
                        input_open = false;
                    }
                },
                _ = self.tracker.clock().sleep_until(next_tick) => {
                    next_tick += self.config.tick_interval;
                    self.tick();
                    let now = self.tracker.clock().instant();
                    if now.duration_since(last_save) >= self.config.save_interval {
                        self.save();
                        last_save = now;
                    }
                }
            }
        }

        // Lets the input reader and the signal watcher know the session is over
        self.shutdown.cancel();
        self.tick();
        self.tracker
            .persist()
            .inspect_err(|e| error!("Final save failed {e:?}"))?;
        info!("Session stopped");
        Ok(self.tracker)
    }

    fn tick(&mut self) {
        match self.tracker.tick() {
            Ok(Some(archived)) => {
                println!("Week {} is over and archived", archived.week);
            }
            Ok(None) => {}
            Err(e) => report_save_failure(&e),
        }
    }

    fn save(&mut self) {
        if let Err(e) = self.tracker.persist() {
            report_save_failure(&e);
        }
    }

    /// Applies a user command. Returns whether it saved the state.
    fn handle(&mut self, command: SessionCommand) -> bool {
        debug!("Handling {command:?}");
        let result = match command {
            SessionCommand::Start(query) => match self.tracker.state().find_activity(&query) {
                Some(index) => self.tracker.select_activity(index),
                None => Err(anyhow!("No activity matches {query:?}")),
            },
            SessionCommand::Other => self.tracker.select_other(),
            SessionCommand::Rename { activity, name } => {
                match self.tracker.state().find_activity(&activity) {
                    Some(index) => self.tracker.rename(index, &name),
                    None => Err(anyhow!("No activity matches {activity:?}")),
                }
            }
            SessionCommand::Status => {
                self.tick();
                print!("{}", render_week(self.tracker.state(), &self.tracker.now()));
                return false;
            }
            SessionCommand::History => {
                match ArchiveReader::new(self.tracker.store()).weeks() {
                    Ok(weeks) => print!("{}", render_history(&weeks)),
                    Err(e) => eprintln!("Can't read archived weeks: {e:#}"),
                }
                return false;
            }
            SessionCommand::Help => {
                println!("{USAGE}");
                return false;
            }
            SessionCommand::Quit => return false,
        };

        match result {
            Ok(()) => {
                info!("Now tracking {}", self.tracker.state().active_name());
                true
            }
            Err(e) => {
                eprintln!("{e:#}");
                error!("Command failed {e:?}");
                false
            }
        }
    }
}

/// Saving failures never stop the loop, but the user has to know the session may not survive a
/// restart.
fn report_save_failure(e: &anyhow::Error) {
    error!("Failed to save state {e:?}");
    eprintln!("Warning: {e:#}");
}
