use std::{fmt::Display, path::Path};

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    store::{archive::ArchiveReader, json_store::JsonFileStore},
    utils::time::WeekId,
};

use super::{
    output::{render_history, render_year_totals},
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    #[arg(
        long = "start",
        short,
        help = "Any day of the first week to show. Examples are \"last monday\", \"2 weeks ago\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Any day of the last week to show. Examples are \"yesterday\", \"1 week ago\", \"15/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Print totals per year instead of every week")]
    year: bool,
}

/// Inclusive range of weeks, either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WeekRange {
    from: Option<WeekId>,
    to: Option<WeekId>,
}

impl WeekRange {
    fn contains_year(&self, year: i32) -> bool {
        self.from.map_or(true, |from| from.year <= year) && self.to.map_or(true, |to| year <= to.year)
    }
}

/// Prints archived weeks, or per-year totals with `--year`, from the state in `dir`.
pub fn process_history_command(dir: &Path, command: HistoryCommand) -> Result<()> {
    let range = parse_range(
        command.start_date.as_deref(),
        command.end_date.as_deref(),
        command.date_style,
        &Local::now(),
    )?;

    let store = JsonFileStore::open_in(dir)?;
    let reader = ArchiveReader::new(&store);

    if command.year {
        let years: Vec<i32> = reader
            .years()?
            .into_iter()
            .filter(|v| range.contains_year(*v))
            .collect();
        if years.is_empty() {
            println!("No completed weeks yet");
        }
        for year in years {
            println!("{}", render_year_totals(year, &reader.year_totals(year)?));
        }
    } else {
        let weeks = reader.between(range.from, range.to)?;
        print!("{}", render_history(&weeks));
    }
    Ok(())
}

fn parse_range<Tz>(
    start_date: Option<&str>,
    end_date: Option<&str>,
    date_style: DateStyle,
    now: &DateTime<Tz>,
) -> Result<WeekRange>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let dialect: chrono_english::Dialect = date_style.into();
    let parse = |value: Option<&str>, what: &str| -> Result<Option<WeekId>> {
        let Some(value) = value else {
            return Ok(None);
        };
        match parse_date_string(value, now.clone(), dialect) {
            Ok(v) => Ok(Some(WeekId::of(&v))),
            Err(e) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate {what} date {value:?}: {e}"),
                )
                .into()),
        }
    };
    Ok(WeekRange {
        from: parse(start_date, "start")?,
        to: parse(end_date, "end")?,
    })
}
