use std::collections::HashSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, TypeState};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_instant(t: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.start > range.end {
        return Err(EngineError::Validation(
            "range must not end before it starts".into(),
        ));
    }
    if range.start < MIN_VALID_TIMESTAMP_MS || range.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if range.duration_ms() > MAX_RANGE_DURATION_MS {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    Ok(())
}

/// Facilities excluded for a query window. Built in a single pass over
/// each record list — set exclusion, never a per-facility query loop.
#[derive(Debug, Default)]
pub struct BlockedSets {
    /// Facilities held by a RESERVED / CHECKED_IN reservation.
    pub reserved: HashSet<Ulid>,
    /// Facilities under PENDING / IN_PROGRESS maintenance.
    pub maintenance: HashSet<Ulid>,
    /// Blocking reservations against the whole type: they exclude no
    /// specific unit but still consume the type's capacity.
    pub type_level_reservations: usize,
}

impl BlockedSets {
    pub fn blocks(&self, facility_id: &Ulid) -> bool {
        self.reserved.contains(facility_id) || self.maintenance.contains(facility_id)
    }
}

pub fn blocked_sets(ts: &TypeState, query: &DateRange) -> BlockedSets {
    let mut sets = BlockedSets::default();

    for r in &ts.reservations {
        if !r.blocks(query) {
            continue;
        }
        match r.facility_id {
            Some(fid) => {
                sets.reserved.insert(fid);
            }
            None => sets.type_level_reservations += 1,
        }
    }

    for m in &ts.maintenance {
        if m.blocks(query) {
            sets.maintenance.insert(m.facility_id);
        }
    }

    sets
}

/// The uniqueness backstop: some other non-terminal reservation already
/// binds `facility_id` with the identical window. Mirrors the compound
/// constraint over (facility, window start, window end, live status).
pub(super) fn duplicate_binding_exists(
    ts: &TypeState,
    facility_id: Ulid,
    window: &DateRange,
    exclude: Ulid,
) -> bool {
    ts.reservations.iter().any(|r| {
        r.id != exclude
            && r.facility_id == Some(facility_id)
            && !r.status.is_terminal()
            && r.window == *window
    })
}
