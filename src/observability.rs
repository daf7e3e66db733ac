use std::net::SocketAddr;

use crate::protocol::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total protocol commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "slotgate_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "slotgate_command_duration_seconds";

/// Counter: bookings committed through the gate.
pub const BOOKINGS_COMMITTED_TOTAL: &str = "slotgate_bookings_committed_total";

/// Counter: bookings refused for overlap. Labels: stage (precheck, commit).
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotgate_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotgate_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotgate_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotgate_connections_rejected_total";

/// Gauge: number of loaded tenant stores.
pub const TENANTS_ACTIVE: &str = "slotgate_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotgate_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotgate_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command, for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Tenant { .. } => "tenant",
        Command::Slots { .. } => "slots",
        Command::Available { .. } => "available",
        Command::Check { .. } => "check",
        Command::Book { .. } => "book",
        Command::Cancel { .. } => "cancel",
        Command::Bookings { .. } => "bookings",
        Command::Quit => "quit",
    }
}
