//! Persistence behind the booking gate.
//!
//! A `Store` owns the exclusion constraint: `insert_booking_if_no_conflict`
//! must atomically refuse any booking that overlaps a committed booking of
//! the same resource, no matter what the caller checked beforehand.

mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{Booking, Ms};

#[async_trait]
pub trait Store: Send + Sync {
    /// Bookings of `resource_id` overlapping `[day, day + 24h)`, sorted by start.
    async fn load_bookings(&self, resource_id: Ulid, day: Ms) -> Result<Vec<Booking>, EngineError>;

    /// Commit a booking unless it overlaps a committed one, in which case
    /// `EngineError::Conflict` names the booking in the way.
    async fn insert_booking_if_no_conflict(
        &self,
        resource_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    ) -> Result<Booking, EngineError>;

    /// Remove a booking. Returns the resource it belonged to.
    async fn cancel_booking(&self, booking_id: Ulid) -> Result<Ulid, EngineError>;

    /// Every booking of the resource, sorted by start.
    async fn list_bookings(&self, resource_id: Ulid) -> Result<Vec<Booking>, EngineError>;
}
