use std::fmt::Write;

use chrono::{DateTime, Duration, TimeZone};

use crate::{
    tracker::{
        rollover::WeekArchiveEntry,
        state::{AccountingState, OTHER},
    },
    utils::time::{elapsed_since_week_start, WeekId},
};

/// `HH:MM:SS:mmm`, hours are not wrapped.
pub fn format_elapsed(v: Duration) -> String {
    let millis = v.num_milliseconds().max(0);
    format!(
        "{:02}:{:02}:{:02}:{:03}",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    )
}

/// `HH:MM:SS`, used where millisecond precision is noise.
pub fn format_total(v: Duration) -> String {
    let seconds = v.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

fn share(part: Duration, whole: Duration) -> f64 {
    if whole <= Duration::zero() {
        0.
    } else {
        part.num_milliseconds() as f64 / whole.num_milliseconds() as f64 * 100.
    }
}

/// Listing of the live week. Activities are numbered the way `start` expects them, the running
/// one is marked with `*`.
pub fn render_week<Tz: TimeZone>(state: &AccountingState, now: &DateTime<Tz>) -> String {
    let mut out = String::new();
    let week = state.week.unwrap_or_else(|| WeekId::of(now));
    let _ = writeln!(
        out,
        "Week {week}, {} since it started",
        format_elapsed(elapsed_since_week_start(now))
    );

    let width = state
        .activities
        .iter()
        .map(|v| v.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(OTHER.len());

    for (i, activity) in state.activities.iter().enumerate() {
        let marker = if state.active == Some(i) { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {:>2}  {:<width$}  {}",
            i + 1,
            activity.name,
            format_elapsed(activity.elapsed)
        );
    }
    let marker = if state.active.is_none() { '*' } else { ' ' };
    let _ = writeln!(
        out,
        "{marker}     {:<width$}  {}",
        OTHER,
        format_elapsed(state.other)
    );
    out
}

pub fn render_history(entries: &[WeekArchiveEntry]) -> String {
    if entries.is_empty() {
        return "No completed weeks yet\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{}", entry.week);
        render_totals(&mut out, &entry.totals, entry.total());
        out.push('\n');
    }
    out
}

pub fn render_year_totals(year: i32, totals: &[(String, Duration)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{year}");
    let whole = totals.iter().fold(Duration::zero(), |acc, v| acc + v.1);
    render_totals(&mut out, totals, whole);
    out
}

fn render_totals(out: &mut String, totals: &[(String, Duration)], whole: Duration) {
    let width = totals
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);
    for (name, elapsed) in totals {
        let _ = writeln!(
            out,
            "  {name:<width$}  {}\t{}%",
            format_total(*elapsed),
            share(*elapsed, whole) as i32
        );
    }
}
