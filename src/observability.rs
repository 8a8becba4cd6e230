use std::net::SocketAddr;

use crate::sql::{AppointmentFilter, Command};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "slotwise_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "slotwise_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "slotwise_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotwise_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotwise_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Counter: day locks not acquired within the lock timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "slotwise_lock_timeouts_total";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: successful lifecycle operations. Labels: op.
pub const BOOKINGS_TOTAL: &str = "slotwise_bookings_total";

/// Counter: bookings or moves rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotwise_booking_conflicts_total";

/// Counter: rows moved to `archived` by retention sweeps.
pub const ARCHIVED_TOTAL: &str = "slotwise_archived_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertAppointment { .. } => "insert_appointment",
        Command::Reschedule { .. } => "reschedule",
        Command::UpdateField { .. } => "update_field",
        Command::Cancel { .. } => "cancel",
        Command::DeleteAppointment { .. } => "delete_appointment",
        Command::ArchiveStale { .. } => "archive_stale",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectAppointments(filter) => match filter {
            AppointmentFilter::ById(_) => "select_appointment",
            AppointmentFilter::ByDate(_) => "select_appointments_by_date",
            AppointmentFilter::ByClient { .. } => "select_appointments_by_client",
            AppointmentFilter::Search(_) => "search_appointments",
        },
        Command::SelectClient { .. } => "select_client",
        Command::SelectStats => "select_stats",
        Command::SelectServices => "select_services",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_split_appointment_reads() {
        assert_eq!(
            command_label(&Command::SelectAppointments(AppointmentFilter::Search("a".into()))),
            "search_appointments"
        );
        assert_eq!(command_label(&Command::ArchiveStale { age_days: 1 }), "archive_stale");
    }
}
