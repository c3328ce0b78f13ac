use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::OwnedRwLockWriteGuard;
use tokio::time::timeout;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::overlap::{blocked_sets, duplicate_binding_exists, validate_range};
use super::{Engine, EngineError, TypeState};

/// Per-item result of a batch assignment. Failures never mask siblings.
#[derive(Debug)]
pub struct BatchAssignOutcome {
    pub reservation_id: Ulid,
    pub outcome: Result<Assignment, EngineError>,
}

impl Engine {
    /// Bind a specific facility to a type-request reservation.
    ///
    /// The find-first-available query and the bind run under one shard
    /// write lock, so two callers racing for the same type serialize;
    /// the duplicate-binding backstop turns anything that slips through
    /// into a recoverable `AssignmentRace`. Idempotent on an already
    /// assigned reservation.
    pub async fn assign_facility(
        &self,
        reservation_id: Ulid,
        window_override: Option<DateRange>,
    ) -> Result<Assignment, EngineError> {
        timeout(
            Duration::from_millis(ASSIGN_TIMEOUT_MS),
            self.assign_one(reservation_id, window_override),
        )
        .await
        .map_err(|_| EngineError::Timeout("assignment"))?
    }

    async fn assign_one(
        &self,
        reservation_id: Ulid,
        window_override: Option<DateRange>,
    ) -> Result<Assignment, EngineError> {
        if let Some(w) = &window_override {
            validate_range(w)?;
        }
        let (type_id, mut guard) = self.resolve_entity_write(&reservation_id).await?;
        self.assign_under_lock(type_id, &mut guard, reservation_id, window_override)
            .await
    }

    async fn assign_under_lock(
        &self,
        type_id: Ulid,
        ts: &mut TypeState,
        reservation_id: Ulid,
        window_override: Option<DateRange>,
    ) -> Result<Assignment, EngineError> {
        let (bound, requested_type, status, window) = {
            let r = ts
                .reservation(&reservation_id)
                .ok_or(EngineError::NotFound(reservation_id))?;
            (r.facility_id, r.requested_type.clone(), r.status, r.window)
        };

        // Idempotent short-circuit: a bound reservation stays bound.
        if let Some(facility_id) = bound {
            if let Some(w) = window_override
                && w != window {
                    let event = Event::ReservationWindowChanged {
                        id: reservation_id,
                        type_id,
                        window: w,
                    };
                    self.persist_and_apply(type_id, ts, &event).await?;
                }
            return Ok(Assignment {
                reservation_id,
                facility_id,
                already_assigned: true,
            });
        }

        let Some(type_name) = requested_type else {
            return Err(EngineError::Validation(
                "reservation does not request a facility type".into(),
            ));
        };
        if status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "cannot assign a {} reservation",
                status.as_str()
            )));
        }

        // Overrides apply before the search: the effective window drives it.
        let effective = match window_override {
            Some(w) if w != window => {
                let event = Event::ReservationWindowChanged {
                    id: reservation_id,
                    type_id,
                    window: w,
                };
                self.persist_and_apply(type_id, ts, &event).await?;
                w
            }
            _ => window,
        };

        // First free unit in (name, id) order — the stable tie-break that
        // makes concurrent callers converge.
        let sets = blocked_sets(ts, &effective);
        let candidate = ts
            .facilities
            .iter()
            .find(|f| !f.retired && !sets.blocks(&f.id))
            .map(|f| f.id);

        let Some(facility_id) = candidate else {
            metrics::counter!(observability::ASSIGNMENT_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::NoAvailability {
                facility_type: type_name,
            });
        };

        if duplicate_binding_exists(ts, facility_id, &effective, reservation_id) {
            metrics::counter!(observability::ASSIGNMENT_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::AssignmentRace { facility_id });
        }

        let event = Event::FacilityAssigned {
            reservation_id,
            type_id,
            facility_id,
        };
        self.persist_and_apply(type_id, ts, &event).await?;
        metrics::counter!(observability::ASSIGNMENTS_TOTAL).increment(1);

        Ok(Assignment {
            reservation_id,
            facility_id,
            already_assigned: false,
        })
    }

    /// Assign a list of reservations sequentially under one set of shard
    /// locks, acquired in sorted order to prevent deadlocks. Sequential
    /// on purpose: it keeps the atomicity story simple at the cost of
    /// throughput. Every item's outcome is reported.
    pub async fn batch_assign(
        &self,
        reservation_ids: &[Ulid],
    ) -> Result<Vec<BatchAssignOutcome>, EngineError> {
        timeout(
            Duration::from_millis(BATCH_ASSIGN_TIMEOUT_MS),
            self.batch_assign_all(reservation_ids),
        )
        .await
        .map_err(|_| EngineError::Timeout("batch assignment"))?
    }

    async fn batch_assign_all(
        &self,
        reservation_ids: &[Ulid],
    ) -> Result<Vec<BatchAssignOutcome>, EngineError> {
        if reservation_ids.is_empty() {
            return Ok(Vec::new());
        }
        if reservation_ids.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }

        let mut type_ids: Vec<Ulid> = reservation_ids
            .iter()
            .filter_map(|id| self.shard_for_entity(id))
            .collect();
        type_ids.sort();
        type_ids.dedup();

        let mut guards: HashMap<Ulid, OwnedRwLockWriteGuard<TypeState>> = HashMap::new();
        for tid in &type_ids {
            if let Some(shard) = self.shard(tid) {
                guards.insert(*tid, shard.write_owned().await);
            }
        }

        let mut outcomes = Vec::with_capacity(reservation_ids.len());
        for &rid in reservation_ids {
            let outcome = match self.shard_for_entity(&rid) {
                None => Err(EngineError::NotFound(rid)),
                Some(tid) => match guards.get_mut(&tid) {
                    None => Err(EngineError::NotFound(tid)),
                    Some(guard) => self.assign_under_lock(tid, guard, rid, None).await,
                },
            };
            outcomes.push(BatchAssignOutcome {
                reservation_id: rid,
                outcome,
            });
        }
        Ok(outcomes)
    }
}
