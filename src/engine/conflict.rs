use crate::model::*;

use super::EngineError;

/// Reject bookings the store should never see.
pub(crate) fn validate_booking(
    start: Ms,
    duration_minutes: u32,
    label: Option<&str>,
) -> Result<(), EngineError> {
    use crate::limits::*;
    if duration_minutes == 0 {
        return Err(EngineError::InvalidBooking("duration must be at least one minute"));
    }
    if duration_minutes > MAX_BOOKING_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("booking too long"));
    }
    // Range-check start first: with start bounded and duration capped, the
    // end computation cannot overflow.
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let end = start + duration_minutes as Ms * MINUTE_MS;
    if end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if label.is_some_and(|l| l.len() > MAX_LABEL_LEN) {
        return Err(EngineError::LimitExceeded("label too long"));
    }
    Ok(())
}

/// Reject availability queries outside the valid timestamp range or wider
/// than `MAX_QUERY_WINDOW_MS`.
pub(crate) fn validate_query_window(start: Ms, end: Ms) -> Result<(), EngineError> {
    use crate::limits::*;
    if start >= end {
        return Err(EngineError::InvalidBooking("range start must be before end"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// First booking overlapping `span`, if any.
pub fn find_conflict<'a>(span: &Span, bookings: &'a [Booking]) -> Option<&'a Booking> {
    bookings.iter().find(|b| b.span().overlaps(span))
}

/// True iff no booking overlaps `[candidate_start, candidate_end)`.
/// An empty or inverted candidate overlaps nothing.
pub fn is_range_available(candidate_start: Ms, candidate_end: Ms, bookings: &[Booking]) -> bool {
    bookings
        .iter()
        .all(|b| !(candidate_start < b.end() && candidate_end > b.start))
}

pub(crate) fn check_no_conflict(table: &BookingTable, span: &Span) -> Result<(), EngineError> {
    match table.overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict {
            booking_id: existing.id,
            span: existing.span(),
        }),
        None => Ok(()),
    }
}
