//! Weekly time tracker that accounts for every second of the week. Time goes to the activity you
//! selected, or to "Other" when none is, and each completed week is archived under its ISO week.
//!

pub mod cli;
pub mod session;
pub mod store;
pub mod tracker;
pub mod utils;
