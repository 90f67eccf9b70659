use std::str::FromStr;

use anyhow::{anyhow, bail};

pub const USAGE: &str = "\
Commands:
  start <number|name>     start tracking an activity
  other                   track time as Other
  rename <number> <name>  rename an activity
  status                  show this week
  history                 show archived weeks
  quit                    save and exit";

/// A request typed into a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Start(String),
    Other,
    Rename { activity: String, name: String },
    Status,
    History,
    Help,
    Quit,
}

impl FromStr for SessionCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (word, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let rest = rest.trim();

        let command = match word.to_lowercase().as_str() {
            "start" | "s" if !rest.is_empty() => Self::Start(rest.to_string()),
            "start" | "s" => bail!("Which activity? Usage: start <number|name>"),
            "other" | "o" => Self::Other,
            "rename" => {
                let (activity, name) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("Usage: rename <number> <name>"))?;
                Self::Rename {
                    activity: activity.to_string(),
                    name: name.trim().to_string(),
                }
            }
            "status" | "" => Self::Status,
            "history" => Self::History,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => bail!("Unknown command {word:?}\n{USAGE}"),
        };
        Ok(command)
    }
}
