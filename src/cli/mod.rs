pub mod history;
pub mod output;

use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use history::{process_history_command, HistoryCommand};
use output::render_week;
use tracing::level_filters::LevelFilter;

use crate::{
    session::{run_session, SessionConfig},
    store::{json_store::JsonFileStore, StateStore},
    tracker::{state::default_activity_names, Tracker},
    utils::{
        clock::SystemClock, dir::create_application_default_path, logging::enable_logging,
        runtime::single_thread_runtime,
    },
};

#[derive(Parser, Debug)]
#[command(name = "every-second", version, long_about = None)]
#[command(about = "Accounts for every second of the week across your activities", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable verbose logging to the console")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Run an interactive session that keeps accounting until Ctrl-C or quit")]
    Serve {
        #[arg(long, default_value_t = 100, help = "Milliseconds between two ticks")]
        tick_ms: u64,
        #[arg(long, default_value_t = 1, help = "Seconds between two periodic saves")]
        save_every_s: u64,
    },
    #[command(about = "Show the time accounted this week")]
    Status,
    #[command(about = "Start tracking an activity, by number or name")]
    Start { activity: String },
    #[command(about = "Stop the current activity, time goes to Other")]
    Other,
    #[command(about = "Rename an activity. Archived weeks keep the old name")]
    Rename { activity: String, name: String },
    #[command(about = "Show completed weeks")]
    History {
        #[command(flatten)]
        command: HistoryCommand,
    },
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();
    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(&dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Serve {
            tick_ms,
            save_every_s,
        } => {
            if tick_ms == 0 {
                return Err(anyhow!("--tick-ms has to be positive"));
            }
            let config = SessionConfig {
                tick_interval: Duration::from_millis(tick_ms),
                save_interval: Duration::from_secs(save_every_s),
            };
            single_thread_runtime()?.block_on(run_session(&dir, config))
        }
        Commands::Status => with_tracker(&dir, |_| Ok(())),
        Commands::Start { activity } => with_tracker(&dir, |tracker| {
            let index = tracker
                .state()
                .find_activity(&activity)
                .ok_or_else(|| anyhow!("No activity matches {activity:?}"))?;
            tracker.select_activity(index)
        }),
        Commands::Other => with_tracker(&dir, |tracker| tracker.select_other()),
        Commands::Rename { activity, name } => with_tracker(&dir, |tracker| {
            let index = tracker
                .state()
                .find_activity(&activity)
                .ok_or_else(|| anyhow!("No activity matches {activity:?}"))?;
            tracker.rename(index, &name)
        }),
        Commands::History { command } => process_history_command(&dir, command),
    }
}

type CliTracker = Tracker<JsonFileStore, Local>;

/// Runs one command against the stored state: restore, tick, apply, save, then print the week.
fn with_tracker(
    dir: &std::path::Path,
    apply: impl FnOnce(&mut CliTracker) -> Result<()>,
) -> Result<()> {
    let store = JsonFileStore::open_in(dir)?;
    let mut tracker = Tracker::open(
        store,
        Box::new(SystemClock),
        Local,
        &default_activity_names(),
    );
    let result = run_one_shot(&mut tracker, apply);
    print!("{}", render_week(tracker.state(), &tracker.now()));
    result
}

/// A failed save doesn't stop the command from being applied. The first error is returned once
/// everything ran.
fn run_one_shot<S: StateStore, Tz: TimeZone>(
    tracker: &mut Tracker<S, Tz>,
    apply: impl FnOnce(&mut Tracker<S, Tz>) -> Result<()>,
) -> Result<()> {
    let ticked = tracker.tick();
    if let Ok(Some(archived)) = &ticked {
        println!("Week {} is over and archived", archived.week);
    }
    let applied = apply(tracker);
    let persisted = tracker.persist();
    applied.and(ticked).and(persisted)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use tokio::time::Instant;

    use crate::{
        store::{schema::write_state, MemoryStore, MockStateStore, StateStore},
        tracker::{
            state::{default_activity_names, AccountingState},
            Tracker,
        },
        utils::{clock::Clock, time::WeekId},
    };

    use super::run_one_shot;

    struct FixedClock(DateTime<Utc>);

    #[async_trait]
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    #[test]
    fn test_one_shot_start_survives_failed_rollover_save() {
        let stored_week = WeekId::new(2024, 9).unwrap();
        let mut seeded = MemoryStore::new();
        let mut state = AccountingState::default();
        state.week = Some(stored_week);
        write_state(&mut seeded, &state, stored_week.start(&Utc) + Duration::hours(1)).unwrap();

        let mut failing = MockStateStore::new();
        failing
            .expect_get()
            .returning(move |key| seeded.get(key));
        failing.expect_set().returning(|_, _| Ok(()));
        failing
            .expect_flush()
            .returning(|| Err(anyhow!("read-only file system")));

        let now = WeekId::new(2024, 10).unwrap().start(&Utc) + Duration::hours(2);
        let mut tracker = Tracker::open(
            failing,
            Box::new(FixedClock(now)),
            Utc,
            &default_activity_names(),
        );

        let result = run_one_shot(&mut tracker, |tracker| tracker.select_activity(3));
        assert!(result.is_err());
        assert_eq!(tracker.state().active, Some(3));
        assert_eq!(tracker.state().week, WeekId::new(2024, 10));
    }
}
