use crate::model::Ms;

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_LABEL_LEN: usize = 512;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;
pub const MAX_RESOURCES_PER_TENANT: usize = 10_000;

/// A single booking may not outlast a day.
pub const MAX_BOOKING_DURATION_MINUTES: u32 = 24 * 60;

/// Longest accepted protocol line, in bytes.
pub const MAX_LINE_LEN: usize = 4096;

/// Widest range a single availability check may cover.
pub const MAX_QUERY_WINDOW_MS: Ms = 31 * 24 * 3_600_000;

/// Largest WAL record payload accepted on replay.
pub const MAX_WAL_RECORD_LEN: usize = 64 * 1024;

/// Cap on alternatives returned alongside a conflict.
pub const MAX_SUGGESTIONS: usize = 5;

// 2000-01-01 .. 2100-01-01 UTC
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
