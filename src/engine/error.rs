use ulid::Ulid;

use crate::model::{DateRange, HoldStatus, Ms, ReservationStatus};
use crate::pricing::PricingError;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Bad input shape or range. Rejected before any state is touched.
    Validation(String),
    NotFound(Ulid),
    UnknownFacilityType(String),
    AlreadyExists(Ulid),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// An active front-desk hold contends for the same unit and dates.
    /// Carries who holds it and until when for human resolution.
    HoldConflict {
        hold_id: Ulid,
        held_by: String,
        until: Ms,
    },
    /// A confirmed reservation contends for the same unit and dates.
    ReservationConflict {
        reservation_id: Ulid,
    },
    /// The uniqueness backstop fired at bind time: another writer took
    /// the facility for the identical window. Retry against fresh state.
    AssignmentRace {
        facility_id: Ulid,
    },
    NoAvailability {
        facility_type: String,
    },
    /// Duplicate (facility, window) among non-terminal reservations.
    DuplicateReservation {
        facility_id: Ulid,
        window: DateRange,
    },
    HoldNotPending {
        hold_id: Ulid,
        status: HoldStatus,
    },
    HoldExpired {
        hold_id: Ulid,
        expired_at: Ms,
    },
    LimitExceeded(&'static str),
    Timeout(&'static str),
    WalError(String),
}

impl EngineError {
    /// Conflict-class errors: the caller may retry or surface the
    /// contention to an operator. Everything else is fatal for the call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::HoldConflict { .. }
                | EngineError::ReservationConflict { .. }
                | EngineError::AssignmentRace { .. }
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::UnknownFacilityType(name) => {
                write!(f, "unknown facility type: {name}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(
                    f,
                    "invalid status transition: {} -> {}",
                    from.as_str(),
                    to.as_str()
                )
            }
            EngineError::HoldConflict {
                hold_id,
                held_by,
                until,
            } => {
                write!(
                    f,
                    "held by front desk {held_by} until {until} (hold {hold_id})"
                )
            }
            EngineError::ReservationConflict { reservation_id } => {
                write!(f, "conflicts with reservation {reservation_id}")
            }
            EngineError::AssignmentRace { facility_id } => {
                write!(
                    f,
                    "facility {facility_id} was assigned concurrently, retry"
                )
            }
            EngineError::NoAvailability { facility_type } => {
                write!(f, "no available facility of type {facility_type}")
            }
            EngineError::DuplicateReservation {
                facility_id,
                window,
            } => {
                write!(
                    f,
                    "duplicate reservation on facility {facility_id} for [{}, {}]",
                    window.start, window.end
                )
            }
            EngineError::HoldNotPending { hold_id, status } => {
                write!(
                    f,
                    "hold {hold_id} already resolved: {}",
                    status.as_str()
                )
            }
            EngineError::HoldExpired {
                hold_id,
                expired_at,
            } => {
                write!(f, "hold {hold_id} expired at {expired_at}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Timeout(op) => write!(f, "{op} timed out"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<PricingError> for EngineError {
    fn from(e: PricingError) -> Self {
        EngineError::Validation(e.to_string())
    }
}
