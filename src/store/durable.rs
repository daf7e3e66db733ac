use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;
use crate::wal::Wal;

use super::memory::InMemoryStore;
use super::Store;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// take the first append, drain whatever else is already queued, then one
/// fsync for the whole batch and answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;

        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-buffered bytes don't leak into
    // the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        // Runs on the writer task between batches, so no append can slip in
        // between reading the log and renaming the compacted file over it.
        WalCommand::Compact { response } => {
            let _ = response.send(wal.compact());
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// `InMemoryStore` made durable: every committed change is appended to the
/// WAL (and fsynced) before it becomes visible. The resource's write lock is
/// held across check, append and apply, so the exclusion constraint holds
/// across restarts as well.
pub struct WalStore {
    mem: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
}

impl WalStore {
    /// Replay the log at `path` and start its writer task. Must run inside a
    /// tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mem = InMemoryStore::new();
        // Sole owner of every table here, so try_write never contends. Never
        // block_write: this can run on a runtime thread.
        for event in &events {
            let table = mem.table_for(event.resource_id());
            let mut guard = table
                .try_write()
                .map_err(|_| io::Error::other("replay: table lock contended"))?;
            mem.apply_event(&mut guard, event);
        }
        debug!("replayed {} events from {}", events.len(), path.display());

        Ok(Self {
            mem,
            wal_tx,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resource_count(&self) -> usize {
        self.mem.resource_count()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Rewrite the WAL as one `BookingConfirmed` per live booking.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Store for WalStore {
    async fn load_bookings(&self, resource_id: Ulid, day: Ms) -> Result<Vec<Booking>, EngineError> {
        self.mem.load_bookings(resource_id, day).await
    }

    async fn insert_booking_if_no_conflict(
        &self,
        resource_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    ) -> Result<Booking, EngineError> {
        let table = self
            .mem
            .table_for_insert(resource_id, start, duration_minutes, label.as_deref())?;
        let mut guard = table.write().await;
        let booking = InMemoryStore::prepare_insert(&guard, start, duration_minutes, label)?;
        let event = Event::confirmed(&booking);
        self.wal_append(&event).await?;
        self.mem.apply_event(&mut guard, &event);
        Ok(booking)
    }

    async fn cancel_booking(&self, booking_id: Ulid) -> Result<Ulid, EngineError> {
        let (resource_id, mut guard) = self.mem.resolve_booking_write(&booking_id).await?;
        let event = Event::BookingCancelled {
            id: booking_id,
            resource_id,
        };
        self.wal_append(&event).await?;
        self.mem.apply_event(&mut guard, &event);
        Ok(resource_id)
    }

    async fn list_bookings(&self, resource_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        self.mem.list_bookings(resource_id).await
    }
}
