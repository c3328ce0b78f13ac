use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "atrium_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "atrium_query_duration_seconds";

/// Counter: auto-assignments committed.
pub const ASSIGNMENTS_TOTAL: &str = "atrium_assignments_total";

/// Counter: assignments lost to contention or empty inventory.
pub const ASSIGNMENT_CONFLICTS_TOTAL: &str = "atrium_assignment_conflicts_total";

/// Counter: front-desk holds placed.
pub const HOLDS_PLACED_TOTAL: &str = "atrium_holds_placed_total";

/// Counter: hold attempts rejected on contention.
pub const HOLD_CONFLICTS_TOTAL: &str = "atrium_hold_conflicts_total";

/// Counter: pending holds expired by the sweep.
pub const HOLDS_SWEPT_TOTAL: &str = "atrium_holds_swept_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "atrium_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "atrium_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "atrium_connections_rejected_total";

/// Gauge: number of active organizations (loaded engines).
pub const ORGS_ACTIVE: &str = "atrium_orgs_active";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "atrium_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "atrium_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "atrium_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertRateType { .. } => "insert_rate_type",
        Command::InsertFacilityType { .. } => "insert_facility_type",
        Command::InsertFacility { .. } => "insert_facility",
        Command::RetireFacility { .. } => "retire_facility",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::UpdateReservationStatus { .. } => "update_reservation_status",
        Command::UpdateReservationWindow { .. } => "update_reservation_window",
        Command::RecordStay { .. } => "record_stay",
        Command::InsertMaintenance { .. } => "insert_maintenance",
        Command::UpdateMaintenanceStatus { .. } => "update_maintenance_status",
        Command::InsertHold { .. } => "insert_hold",
        Command::CancelHold { .. } => "cancel_hold",
        Command::Assign { .. } => "assign",
        Command::AssignBatch { .. } => "assign_batch",
        Command::ConfirmHold { .. } => "confirm_hold",
        Command::SweepHolds => "sweep_holds",
        Command::Quote { .. } => "quote",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectFacilityTypes => "select_facility_types",
        Command::SelectFacilities { .. } => "select_facilities",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectHolds { .. } => "select_holds",
        Command::SelectMaintenance { .. } => "select_maintenance",
        Command::Listen { .. } => "listen",
    }
}
