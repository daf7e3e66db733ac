use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 24 * 60 * MINUTE_MS;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Local midnight of the day containing `t`, for a zone `utc_offset_minutes`
/// ahead of UTC.
pub fn local_midnight(t: Ms, utc_offset_minutes: i32) -> Ms {
    let offset = utc_offset_minutes as Ms * MINUTE_MS;
    (t + offset).div_euclid(DAY_MS) * DAY_MS - offset
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// `self.start < other.end && other.start < self.end`. Abutting spans do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Working hours of a resource, in minutes after local midnight.
///
/// A trailing window shorter than `slot_duration_minutes` is never offered,
/// so `day_end - day_start` need not be a multiple of the slot duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHoursPolicy {
    pub day_start_minute: u32,
    pub day_end_minute: u32,
    pub slot_duration_minutes: u32,
}

impl WorkingHoursPolicy {
    pub fn new(
        day_start_minute: u32,
        day_end_minute: u32,
        slot_duration_minutes: u32,
    ) -> Result<Self, EngineError> {
        let policy = Self {
            day_start_minute,
            day_end_minute,
            slot_duration_minutes,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.slot_duration_minutes == 0 {
            return Err(EngineError::InvalidPolicy("slot duration must be positive"));
        }
        if self.day_start_minute >= self.day_end_minute {
            return Err(EngineError::InvalidPolicy("day start must be before day end"));
        }
        if self.day_end_minute > MINUTES_PER_DAY {
            return Err(EngineError::InvalidPolicy("day end past midnight"));
        }
        Ok(())
    }

    /// Working window of `day` (the instant of its local midnight).
    /// `None` when the policy describes an empty day.
    pub fn window(&self, day: Ms) -> Option<Span> {
        if self.day_start_minute >= self.day_end_minute {
            return None;
        }
        Some(Span::new(
            day + self.day_start_minute as Ms * MINUTE_MS,
            day + self.day_end_minute as Ms * MINUTE_MS,
        ))
    }

    pub fn slot_ms(&self) -> Ms {
        self.slot_duration_minutes as Ms * MINUTE_MS
    }
}

impl Default for WorkingHoursPolicy {
    /// 09:00–17:00 in 30-minute slots.
    fn default() -> Self {
        Self {
            day_start_minute: 540,
            day_end_minute: 1020,
            slot_duration_minutes: 30,
        }
    }
}

/// A committed reservation of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub start: Ms,
    pub duration_minutes: u32,
    pub label: Option<String>,
}

impl Booking {
    pub fn end(&self) -> Ms {
        self.start + self.duration_minutes as Ms * MINUTE_MS
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end())
    }
}

/// A candidate booking window, built fresh for every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(rename = "startTime")]
    pub start: Ms,
    #[serde(rename = "endTime")]
    pub end: Ms,
    pub is_available: bool,
}

/// Bookings of one resource, sorted by `start`. Committed bookings never overlap.
#[derive(Debug, Clone)]
pub struct BookingTable {
    pub resource_id: Ulid,
    pub bookings: Vec<Booking>,
}

impl BookingTable {
    pub fn new(resource_id: Ulid) -> Self {
        Self {
            resource_id,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by start.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.start, |b| b.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end() > query.start)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingConfirmed {
        id: Ulid,
        resource_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    },
    BookingCancelled {
        id: Ulid,
        resource_id: Ulid,
    },
}

impl Event {
    pub fn confirmed(booking: &Booking) -> Self {
        Event::BookingConfirmed {
            id: booking.id,
            resource_id: booking.resource_id,
            start: booking.start,
            duration_minutes: booking.duration_minutes,
            label: booking.label.clone(),
        }
    }

    pub fn resource_id(&self) -> Ulid {
        match self {
            Event::BookingConfirmed { resource_id, .. }
            | Event::BookingCancelled { resource_id, .. } => *resource_id,
        }
    }
}
