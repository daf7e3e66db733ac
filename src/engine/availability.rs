use crate::model::*;

use super::conflict::is_range_available;

// ── Slot computation ──────────────────────────────────────────────

/// Fixed-duration slots of one resource for one day, each flagged against
/// that day's bookings.
///
/// `day` is the instant of local midnight. Bookings are assumed to belong to
/// the resource and day being queried; their order does not matter.
/// Slots come back sorted, contiguous and exactly `slot_duration_minutes`
/// long; a trailing window shorter than that is never emitted. A policy with
/// `day_start >= day_end` or a zero slot duration yields no slots.
pub fn compute_day_slots(day: Ms, bookings: &[Booking], policy: &WorkingHoursPolicy) -> Vec<Slot> {
    let Some(window) = policy.window(day) else {
        return Vec::new();
    };
    let step = policy.slot_ms();
    if step <= 0 {
        return Vec::new();
    }

    let busy = busy_spans(bookings, &window);
    let mut slots = Vec::with_capacity((window.duration_ms() / step) as usize);
    let mut bi = 0;
    let mut cursor = window.start;

    while cursor + step <= window.end {
        let slot = Span::new(cursor, cursor + step);
        while bi < busy.len() && busy[bi].end <= slot.start {
            bi += 1;
        }
        let taken = bi < busy.len() && busy[bi].start < slot.end;
        slots.push(Slot {
            start: slot.start,
            end: slot.end,
            is_available: !taken,
        });
        cursor = slot.end;
    }

    slots
}

/// Only the bookable slots of the day.
pub fn available_slots(day: Ms, bookings: &[Booking], policy: &WorkingHoursPolicy) -> Vec<Slot> {
    let mut slots = compute_day_slots(day, bookings, policy);
    slots.retain(|s| s.is_available);
    slots
}

/// Merged free time within working hours, independent of the slot grid.
pub fn free_windows(day: Ms, bookings: &[Booking], policy: &WorkingHoursPolicy) -> Vec<Span> {
    let Some(window) = policy.window(day) else {
        return Vec::new();
    };
    let busy = busy_spans(bookings, &window);
    subtract_intervals(&[window], &busy)
}

/// Grid-aligned start times where a booking of `duration_minutes` would fit
/// inside working hours without conflict. At most `limit` are returned.
pub fn suggest_alternatives(
    day: Ms,
    bookings: &[Booking],
    policy: &WorkingHoursPolicy,
    duration_minutes: u32,
    limit: usize,
) -> Vec<Span> {
    let Some(window) = policy.window(day) else {
        return Vec::new();
    };
    let step = policy.slot_ms();
    let length = duration_minutes as Ms * MINUTE_MS;
    if step <= 0 || length <= 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut cursor = window.start;
    while cursor + length <= window.end && out.len() < limit {
        if is_range_available(cursor, cursor + length, bookings) {
            out.push(Span::new(cursor, cursor + length));
        }
        cursor += step;
    }
    out
}

/// Booking spans touching `window`, sorted and merged.
fn busy_spans(bookings: &[Booking], window: &Span) -> Vec<Span> {
    let mut busy: Vec<Span> = bookings
        .iter()
        .map(Booking::span)
        .filter(|s| s.overlaps(window))
        .collect();
    busy.sort_by_key(|s| s.start);
    merge_overlapping(&busy)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
