//! Slot computation and conflict checks. Everything here is a pure function
//! of its inputs: no shared state, nothing is mutated.

mod availability;
mod conflict;
mod error;

pub use availability::{
    available_slots, compute_day_slots, free_windows, merge_overlapping, subtract_intervals,
    suggest_alternatives,
};
pub use conflict::{find_conflict, is_range_available};
pub use error::EngineError;

pub(crate) use conflict::{check_no_conflict, validate_booking, validate_query_window};
