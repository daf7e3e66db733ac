use std::sync::Arc;

use tracing::{debug, info};
use ulid::Ulid;

use crate::engine::{find_conflict, validate_booking, EngineError};
use crate::model::*;
use crate::observability::{BOOKINGS_COMMITTED_TOTAL, BOOKING_CONFLICTS_TOTAL};
use crate::store::Store;

/// Check-then-commit for new bookings.
///
/// The in-memory check is an optimistic fast path. Between the read and the
/// insert another caller may commit an overlapping booking; the store's
/// conditional insert is the authority and reports that as `Conflict` too.
/// The gate never retries.
pub struct BookingGate<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for BookingGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> BookingGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn try_book(
        &self,
        resource_id: Ulid,
        day: Ms,
        candidate_start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    ) -> Result<Booking, EngineError> {
        validate_booking(candidate_start, duration_minutes, label.as_deref())?;
        let candidate = Span::new(
            candidate_start,
            candidate_start + duration_minutes as Ms * MINUTE_MS,
        );

        let existing = self.store.load_bookings(resource_id, day).await?;
        if let Some(hit) = find_conflict(&candidate, &existing) {
            metrics::counter!(BOOKING_CONFLICTS_TOTAL, "stage" => "precheck").increment(1);
            debug!("booking on {resource_id} rejected: overlaps {}", hit.id);
            return Err(EngineError::Conflict {
                booking_id: hit.id,
                span: hit.span(),
            });
        }

        match self
            .store
            .insert_booking_if_no_conflict(resource_id, candidate_start, duration_minutes, label)
            .await
        {
            Ok(booking) => {
                metrics::counter!(BOOKINGS_COMMITTED_TOTAL).increment(1);
                info!("booked {} on {resource_id} [{}, {})", booking.id, candidate.start, candidate.end);
                Ok(booking)
            }
            Err(e) if e.is_conflict() => {
                metrics::counter!(BOOKING_CONFLICTS_TOTAL, "stage" => "commit").increment(1);
                debug!("booking on {resource_id} lost race: {e}");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
