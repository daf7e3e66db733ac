use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::engine::{check_no_conflict, validate_booking, EngineError};
use crate::limits::{MAX_BOOKINGS_PER_RESOURCE, MAX_RESOURCES_PER_TENANT};
use crate::model::*;

use super::Store;

pub type SharedBookingTable = Arc<RwLock<BookingTable>>;

/// Booking tables keyed by resource. Each table sits behind its own lock, so
/// inserts on different resources never contend.
pub struct InMemoryStore {
    tables: DashMap<Ulid, SharedBookingTable>,
    /// Reverse lookup: booking id → resource id
    booking_to_resource: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            booking_to_resource: DashMap::new(),
        }
    }

    pub fn resource_count(&self) -> usize {
        self.tables.len()
    }

    pub fn get_table(&self, resource_id: &Ulid) -> Option<SharedBookingTable> {
        self.tables.get(resource_id).map(|e| e.value().clone())
    }

    /// Table for the resource, created empty on first use.
    pub(crate) fn table_for(&self, resource_id: Ulid) -> SharedBookingTable {
        self.tables
            .entry(resource_id)
            .or_insert_with(|| Arc::new(RwLock::new(BookingTable::new(resource_id))))
            .value()
            .clone()
    }

    /// Table to insert a new booking into. The booking is validated before a
    /// table is created, so rejected requests leave nothing behind.
    pub(crate) fn table_for_insert(
        &self,
        resource_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        label: Option<&str>,
    ) -> Result<SharedBookingTable, EngineError> {
        validate_booking(start, duration_minutes, label)?;
        if let Some(table) = self.get_table(&resource_id) {
            return Ok(table);
        }
        if self.tables.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        Ok(self.table_for(resource_id))
    }

    pub(crate) fn resource_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_resource.get(booking_id).map(|e| *e.value())
    }

    /// Conflict-check a validated booking against a locked table.
    /// Nothing is mutated; the caller applies the returned booking.
    pub(crate) fn prepare_insert(
        table: &BookingTable,
        start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    ) -> Result<Booking, EngineError> {
        if table.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }
        let booking = Booking {
            id: Ulid::new(),
            resource_id: table.resource_id,
            start,
            duration_minutes,
            label,
        };
        check_no_conflict(table, &booking.span())?;
        Ok(booking)
    }

    /// Apply an event to a table the caller already holds the lock for.
    pub(crate) fn apply_event(&self, table: &mut BookingTable, event: &Event) {
        match event {
            Event::BookingConfirmed {
                id,
                resource_id,
                start,
                duration_minutes,
                label,
            } => {
                table.insert(Booking {
                    id: *id,
                    resource_id: *resource_id,
                    start: *start,
                    duration_minutes: *duration_minutes,
                    label: label.clone(),
                });
                self.booking_to_resource.insert(*id, *resource_id);
            }
            Event::BookingCancelled { id, .. } => {
                table.remove(*id);
                self.booking_to_resource.remove(id);
            }
        }
    }

    /// Resolve booking → resource and take that resource's write lock.
    pub(crate) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<BookingTable>), EngineError> {
        let resource_id = self
            .resource_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let table = self
            .get_table(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = table.write_owned().await;
        // Cancelled while we waited for the lock.
        if !guard.bookings.iter().any(|b| b.id == *booking_id) {
            return Err(EngineError::NotFound(*booking_id));
        }
        Ok((resource_id, guard))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_bookings(&self, resource_id: Ulid, day: Ms) -> Result<Vec<Booking>, EngineError> {
        let Some(table) = self.get_table(&resource_id) else {
            return Ok(Vec::new());
        };
        let guard = table.read().await;
        let window = Span::new(day, day + DAY_MS);
        Ok(guard.overlapping(&window).cloned().collect())
    }

    async fn insert_booking_if_no_conflict(
        &self,
        resource_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    ) -> Result<Booking, EngineError> {
        let table = self.table_for_insert(resource_id, start, duration_minutes, label.as_deref())?;
        let mut guard = table.write().await;
        let booking = Self::prepare_insert(&guard, start, duration_minutes, label)?;
        self.apply_event(&mut guard, &Event::confirmed(&booking));
        Ok(booking)
    }

    async fn cancel_booking(&self, booking_id: Ulid) -> Result<Ulid, EngineError> {
        let (resource_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let event = Event::BookingCancelled {
            id: booking_id,
            resource_id,
        };
        self.apply_event(&mut guard, &event);
        Ok(resource_id)
    }

    async fn list_bookings(&self, resource_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let Some(table) = self.get_table(&resource_id) else {
            return Ok(Vec::new());
        };
        let guard = table.read().await;
        Ok(guard.bookings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const M: Ms = MINUTE_MS;
    /// Midnight of 2030-01-07 UTC.
    const DAY: Ms = 1_893_974_400_000;

    #[tokio::test]
    async fn insert_then_load_same_day() {
        let store = InMemoryStore::new();
        let rid = Ulid::new();
        let b = store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H, 30, Some("checkup".into()))
            .await
            .unwrap();
        assert_eq!(b.resource_id, rid);
        assert_eq!(b.end(), DAY + 9 * H + 30 * M);

        let loaded = store.load_bookings(rid, DAY).await.unwrap();
        assert_eq!(loaded, vec![b]);
        assert!(store.load_bookings(rid, DAY + DAY_MS).await.unwrap().is_empty());
        assert!(store.load_bookings(Ulid::new(), DAY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_insert_is_refused() {
        let store = InMemoryStore::new();
        let rid = Ulid::new();
        let first = store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H, 60, None)
            .await
            .unwrap();
        let err = store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H + 45 * M, 30, None)
            .await
            .unwrap_err();
        match err {
            EngineError::Conflict { booking_id, span } => {
                assert_eq!(booking_id, first.id);
                assert_eq!(span, first.span());
            }
            other => panic!("expected conflict, got {other}"),
        }
        assert_eq!(store.list_bookings(rid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn abutting_insert_is_accepted() {
        let store = InMemoryStore::new();
        let rid = Ulid::new();
        store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H, 30, None)
            .await
            .unwrap();
        store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H + 30 * M, 30, None)
            .await
            .unwrap();
        store
            .insert_booking_if_no_conflict(rid, DAY + 8 * H + 30 * M, 30, None)
            .await
            .unwrap();
        let starts: Vec<Ms> = store
            .list_bookings(rid)
            .await
            .unwrap()
            .iter()
            .map(|b| b.start)
            .collect();
        assert_eq!(starts, vec![DAY + 8 * H + 30 * M, DAY + 9 * H, DAY + 9 * H + 30 * M]);
    }

    #[tokio::test]
    async fn resources_are_independent() {
        let store = InMemoryStore::new();
        let (a, b) = (Ulid::new(), Ulid::new());
        store
            .insert_booking_if_no_conflict(a, DAY + 9 * H, 30, None)
            .await
            .unwrap();
        store
            .insert_booking_if_no_conflict(b, DAY + 9 * H, 30, None)
            .await
            .unwrap();
        assert_eq!(store.resource_count(), 2);
    }

    #[tokio::test]
    async fn invalid_bookings_are_rejected() {
        let store = InMemoryStore::new();
        let rid = Ulid::new();
        assert!(matches!(
            store.insert_booking_if_no_conflict(rid, DAY, 0, None).await,
            Err(EngineError::InvalidBooking(_))
        ));
        assert!(matches!(
            store.insert_booking_if_no_conflict(rid, 0, 30, None).await,
            Err(EngineError::LimitExceeded("timestamp out of range"))
        ));
        assert!(matches!(
            store
                .insert_booking_if_no_conflict(rid, DAY, 30, Some("x".repeat(10_000)))
                .await,
            Err(EngineError::LimitExceeded("label too long"))
        ));
    }

    #[tokio::test]
    async fn cancel_frees_the_range() {
        let store = InMemoryStore::new();
        let rid = Ulid::new();
        let b = store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H, 30, None)
            .await
            .unwrap();
        assert_eq!(store.cancel_booking(b.id).await.unwrap(), rid);
        assert!(store.list_bookings(rid).await.unwrap().is_empty());
        store
            .insert_booking_if_no_conflict(rid, DAY + 9 * H, 30, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_unknown_is_not_found() {
        let store = InMemoryStore::new();
        let id = Ulid::new();
        assert!(matches!(
            store.cancel_booking(id).await,
            Err(EngineError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn rejected_insert_creates_no_table() {
        let store = InMemoryStore::new();
        for _ in 0..10 {
            let _ = store
                .insert_booking_if_no_conflict(Ulid::new(), i64::MAX - 10, 30, None)
                .await;
            let _ = store.insert_booking_if_no_conflict(Ulid::new(), DAY, 0, None).await;
        }
        assert_eq!(store.resource_count(), 0);
    }

    #[tokio::test]
    async fn resource_cap_applies_to_new_resources_only() {
        let store = InMemoryStore::new();
        let existing = Ulid::new();
        store
            .insert_booking_if_no_conflict(existing, DAY + 9 * H, 30, None)
            .await
            .unwrap();
        for _ in 1..MAX_RESOURCES_PER_TENANT {
            store.table_for(Ulid::new());
        }
        assert!(matches!(
            store
                .insert_booking_if_no_conflict(Ulid::new(), DAY + 9 * H, 30, None)
                .await,
            Err(EngineError::LimitExceeded("too many resources"))
        ));
        store
            .insert_booking_if_no_conflict(existing, DAY + 10 * H, 30, None)
            .await
            .unwrap();
        assert_eq!(store.resource_count(), MAX_RESOURCES_PER_TENANT);
    }
}
