use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;
use ulid::Ulid;

use crate::config::Config;
use crate::engine::{self, validate_booking, validate_query_window, EngineError};
use crate::gate::BookingGate;
use crate::limits::{MAX_LINE_LEN, MAX_SUGGESTIONS};
use crate::model::*;
use crate::observability::{command_label, COMMANDS_TOTAL, COMMAND_DURATION_SECONDS};
use crate::protocol::{self, Command};
use crate::store::{Store, WalStore};
use crate::tenant::TenantManager;

const DEFAULT_TENANT: &str = "default";

/// What every connection needs to know about the deployment.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub policy: WorkingHoursPolicy,
    pub utc_offset_minutes: i32,
}

impl From<&Config> for ServiceSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            policy: cfg.policy,
            utc_offset_minutes: cfg.utc_offset_minutes,
        }
    }
}

/// Serve one client: one command per line in, one JSON object per line out.
pub async fn process_connection<S>(
    socket: S,
    tenants: Arc<TenantManager>,
    settings: ServiceSettings,
) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut session = Session::new(tenants, settings);

    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                framed
                    .send(error_reply("syntax", "line too long").to_string())
                    .await?;
                continue;
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        let (reply, quit) = match protocol::parse_line(&line) {
            Ok(Command::Quit) => (json!({ "ok": "bye" }), true),
            Ok(cmd) => (session.execute(cmd).await, false),
            Err(e) => (error_reply("syntax", &e.to_string()), false),
        };
        framed.send(reply.to_string()).await?;
        if quit {
            break;
        }
    }
    Ok(())
}

/// Per-connection state: the selected tenant.
pub struct Session {
    tenants: Arc<TenantManager>,
    settings: ServiceSettings,
    tenant: String,
}

impl Session {
    pub fn new(tenants: Arc<TenantManager>, settings: ServiceSettings) -> Self {
        Self {
            tenants,
            settings,
            tenant: DEFAULT_TENANT.to_string(),
        }
    }

    pub async fn execute(&mut self, cmd: Command) -> Value {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.dispatch(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        match result {
            Ok(value) => json!({ "ok": value }),
            Err(reply) => reply,
        }
    }

    fn store(&self) -> Result<Arc<WalStore>, Value> {
        self.tenants
            .get_or_create(&self.tenant)
            .map_err(|e| error_reply("tenant", &e.to_string()))
    }

    fn day_of(&self, date: chrono::NaiveDate) -> Result<Ms, Value> {
        protocol::day_start(date, self.settings.utc_offset_minutes)
            .ok_or_else(|| error_reply("syntax", "date out of range"))
    }

    async fn dispatch(&mut self, cmd: Command) -> Result<Value, Value> {
        let policy = self.settings.policy;
        match cmd {
            Command::Tenant { name } => {
                self.tenants
                    .get_or_create(&name)
                    .map_err(|e| error_reply("tenant", &e.to_string()))?;
                debug!("session switched to tenant {name}");
                self.tenant = name;
                Ok(json!({ "tenant": self.tenant }))
            }
            Command::Slots { resource_id, date } => {
                let day = self.day_of(date)?;
                let bookings = self.load_day(resource_id, day).await?;
                Ok(json!(engine::compute_day_slots(day, &bookings, &policy)))
            }
            Command::Available { resource_id, date } => {
                let day = self.day_of(date)?;
                let bookings = self.load_day(resource_id, day).await?;
                Ok(json!(engine::available_slots(day, &bookings, &policy)))
            }
            Command::Check {
                resource_id,
                start,
                end,
            } => {
                validate_query_window(start, end).map_err(|e| engine_error(&e))?;
                // The range may cross midnight: gather every local day it touches.
                let mut bookings = Vec::new();
                let mut day = local_midnight(start, self.settings.utc_offset_minutes);
                while day < end {
                    bookings.extend(self.load_day(resource_id, day).await?);
                    day += DAY_MS;
                }
                Ok(json!({ "available": engine::is_range_available(start, end, &bookings) }))
            }
            Command::Book {
                resource_id,
                start,
                duration_minutes,
                label,
            } => {
                validate_booking(start, duration_minutes, label.as_deref())
                    .map_err(|e| engine_error(&e))?;
                let store = self.store()?;
                let day = local_midnight(start, self.settings.utc_offset_minutes);
                let gate = BookingGate::new(store.clone());
                match gate
                    .try_book(resource_id, day, start, duration_minutes, label)
                    .await
                {
                    Ok(booking) => Ok(booking_json(&booking)),
                    Err(EngineError::Conflict { booking_id, span }) => {
                        let existing = store
                            .load_bookings(resource_id, day)
                            .await
                            .map_err(|e| engine_error(&e))?;
                        let alternatives = engine::suggest_alternatives(
                            day,
                            &existing,
                            &policy,
                            duration_minutes,
                            MAX_SUGGESTIONS,
                        );
                        Err(conflict_reply(booking_id, span, &alternatives))
                    }
                    Err(e) => Err(engine_error(&e)),
                }
            }
            Command::Cancel { booking_id } => {
                let resource_id = self
                    .store()?
                    .cancel_booking(booking_id)
                    .await
                    .map_err(|e| engine_error(&e))?;
                Ok(json!({ "cancelled": booking_id.to_string(), "resourceId": resource_id.to_string() }))
            }
            Command::Bookings { resource_id } => {
                let bookings = self
                    .store()?
                    .list_bookings(resource_id)
                    .await
                    .map_err(|e| engine_error(&e))?;
                Ok(Value::Array(bookings.iter().map(booking_json).collect()))
            }
            Command::Quit => Ok(json!("bye")),
        }
    }

    async fn load_day(&self, resource_id: Ulid, day: Ms) -> Result<Vec<Booking>, Value> {
        self.store()?
            .load_bookings(resource_id, day)
            .await
            .map_err(|e| engine_error(&e))
    }
}

fn booking_json(b: &Booking) -> Value {
    json!({
        "id": b.id.to_string(),
        "resourceId": b.resource_id.to_string(),
        "startTime": b.start,
        "endTime": b.end(),
        "durationMinutes": b.duration_minutes,
        "label": b.label,
    })
}

fn error_reply(code: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

fn conflict_reply(booking_id: Ulid, span: Span, alternatives: &[Span]) -> Value {
    let alternatives: Vec<Value> = alternatives
        .iter()
        .map(|s| json!({ "startTime": s.start, "endTime": s.end }))
        .collect();
    json!({
        "error": {
            "code": "conflict",
            "message": format!("overlaps booking {booking_id}"),
            "booking": {
                "id": booking_id.to_string(),
                "startTime": span.start,
                "endTime": span.end,
            },
            "alternatives": alternatives,
        }
    })
}

/// Map an engine error to its reply. Store I/O failures are reported as
/// `internal` without detail beyond the message.
fn engine_error(e: &EngineError) -> Value {
    let code = match e {
        EngineError::Conflict { booking_id, span } => return conflict_reply(*booking_id, *span, &[]),
        EngineError::InvalidPolicy(_) => "invalid_policy",
        EngineError::InvalidBooking(_) => "invalid_booking",
        EngineError::NotFound(_) => "not_found",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::WalError(_) => "internal",
    };
    error_reply(code, &e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Midnight of 2030-01-07 UTC.
    const DAY: Ms = 1_893_974_400_000;
    const H: Ms = 3_600_000;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotgate_test_wire").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn session(name: &str) -> Session {
        let tenants = Arc::new(TenantManager::new(test_data_dir(name), 1000));
        Session::new(
            tenants,
            ServiceSettings {
                policy: WorkingHoursPolicy::default(),
                utc_offset_minutes: 0,
            },
        )
    }

    #[tokio::test]
    async fn book_then_slots_reflect_booking() {
        let mut s = session("book_slots");
        let rid = Ulid::new();
        let booked = s
            .execute(Command::Book {
                resource_id: rid,
                start: DAY + 9 * H + 30 * 60_000,
                duration_minutes: 30,
                label: None,
            })
            .await;
        assert!(booked["ok"]["id"].is_string());

        let slots = s
            .execute(Command::Slots {
                resource_id: rid,
                date: chrono::NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            })
            .await;
        let slots = slots["ok"].as_array().unwrap();
        assert_eq!(slots.len(), 16);
        assert_eq!(slots[1]["isAvailable"], json!(false));
        assert_eq!(slots.iter().filter(|s| s["isAvailable"] == json!(true)).count(), 15);
    }

    #[tokio::test]
    async fn conflict_reply_carries_bounds_and_alternatives() {
        let mut s = session("conflict");
        let rid = Ulid::new();
        s.execute(Command::Book {
            resource_id: rid,
            start: DAY + 9 * H,
            duration_minutes: 60,
            label: None,
        })
        .await;
        let reply = s
            .execute(Command::Book {
                resource_id: rid,
                start: DAY + 9 * H + 30 * 60_000,
                duration_minutes: 30,
                label: None,
            })
            .await;
        let err = &reply["error"];
        assert_eq!(err["code"], json!("conflict"));
        assert_eq!(err["booking"]["startTime"], json!(DAY + 9 * H));
        assert_eq!(err["booking"]["endTime"], json!(DAY + 10 * H));
        let alternatives = err["alternatives"].as_array().unwrap();
        assert_eq!(alternatives.len(), MAX_SUGGESTIONS);
        assert_eq!(alternatives[0]["startTime"], json!(DAY + 10 * H));
    }

    #[tokio::test]
    async fn check_spans_midnight() {
        let mut s = session("check_midnight");
        let rid = Ulid::new();
        s.execute(Command::Book {
            resource_id: rid,
            start: DAY + DAY_MS + H,
            duration_minutes: 30,
            label: None,
        })
        .await;
        let reply = s
            .execute(Command::Check {
                resource_id: rid,
                start: DAY + 23 * H,
                end: DAY + DAY_MS + 2 * H,
            })
            .await;
        assert_eq!(reply["ok"]["available"], json!(false));
    }

    #[tokio::test]
    async fn extreme_timestamps_are_refused_not_panicking() {
        let mut s = session("extreme_timestamps");
        let rid = Ulid::new();
        let reply = s
            .execute(Command::Book {
                resource_id: rid,
                start: i64::MAX - 10,
                duration_minutes: 30,
                label: None,
            })
            .await;
        assert_eq!(reply["error"]["code"], json!("limit_exceeded"));

        let reply = s
            .execute(Command::Check {
                resource_id: rid,
                start: i64::MAX - 10,
                end: i64::MAX,
            })
            .await;
        assert_eq!(reply["error"]["code"], json!("limit_exceeded"));

        let reply = s
            .execute(Command::Check {
                resource_id: rid,
                start: DAY,
                end: 4_000_000_000_000_000_000,
            })
            .await;
        assert_eq!(reply["error"]["code"], json!("limit_exceeded"));

        let reply = s
            .execute(Command::Check {
                resource_id: rid,
                start: DAY,
                end: DAY + 30 * DAY_MS,
            })
            .await;
        assert_eq!(reply["ok"]["available"], json!(true));
    }

    #[tokio::test]
    async fn cancel_unknown_is_not_found() {
        let mut s = session("cancel_unknown");
        let reply = s
            .execute(Command::Cancel {
                booking_id: Ulid::new(),
            })
            .await;
        assert_eq!(reply["error"]["code"], json!("not_found"));
    }

    #[tokio::test]
    async fn connection_round_trip_over_duplex() {
        let tenants = Arc::new(TenantManager::new(test_data_dir("duplex"), 1000));
        let settings = ServiceSettings {
            policy: WorkingHoursPolicy::default(),
            utc_offset_minutes: 0,
        };
        let (client, server) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(process_connection(server, tenants, settings));

        let (read, mut write) = tokio::io::split(client);
        let mut lines = BufReader::new(read).lines();
        let rid = Ulid::new();

        write.write_all(b"NONSENSE\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], json!("syntax"));

        write
            .write_all(format!("AVAILABLE {rid} 2030-01-07\n").as_bytes())
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"].as_array().unwrap().len(), 16);

        write.write_all(b"QUIT\n").await.unwrap();
        let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["ok"], json!("bye"));

        handle.await.unwrap().unwrap();
    }
}
