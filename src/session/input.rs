use std::{io::BufRead, thread::JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::command::SessionCommand;

/// Reads commands line by line on a dedicated thread. Reading a terminal blocks, and a blocking
/// read inside the runtime would keep it from shutting down.
///
/// The thread ends when input is exhausted or the session stops listening.
pub fn spawn_input_reader(
    input: impl BufRead + Send + 'static,
    sender: mpsc::Sender<SessionCommand>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to read input {e:?}");
                    break;
                }
            };
            match line.parse::<SessionCommand>() {
                Ok(command) => {
                    debug!("Read command {command:?}");
                    if sender.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            }
        }
        debug!("Input reader finished");
    })
}
