//! Interactive session: a tick loop owning the [Tracker] plus a line based command reader.

use std::{io::BufReader, path::Path};

use anyhow::Result;
use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    cli::output::render_week,
    store::json_store::JsonFileStore,
    tracker::{state::default_activity_names, Tracker},
    utils::clock::SystemClock,
};

pub mod command;
pub mod input;
pub mod shutdown;
pub mod ticker;

pub use ticker::{SessionConfig, TickModule};

/// Runs a session on the state stored in `dir` until Ctrl-C or `quit`.
pub async fn run_session(dir: &Path, config: SessionConfig) -> Result<()> {
    let store = JsonFileStore::open_in(dir)?;
    info!("Using state file {:?}", store.path());
    let tracker = Tracker::open(
        store,
        Box::new(SystemClock),
        Local,
        &default_activity_names(),
    );
    print!("{}", render_week(tracker.state(), &tracker.now()));
    println!("{}", command::USAGE);

    let (sender, receiver) = mpsc::channel::<command::SessionCommand>(10);
    let shutdown_token = CancellationToken::new();

    // Not joined, a pending read on stdin can't be interrupted. The thread ends with the process.
    input::spawn_input_reader(BufReader::new(std::io::stdin()), sender);

    let module = TickModule::new(tracker, receiver, shutdown_token.clone(), config);
    let (_, result) = tokio::join!(shutdown::detect_shutdown(shutdown_token), module.run());

    if let Err(e) = &result {
        error!("Session ended with an error {e:?}");
    }
    result.map(|_| ())
}
