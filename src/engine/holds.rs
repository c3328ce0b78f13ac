use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::overlap::{now_ms, validate_range};
use super::{Engine, EngineError, SharedTypeState};

/// Inputs for a new front-desk hold. Exactly one of `facility_id` /
/// `type_name` must be present.
#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub id: Ulid,
    pub facility_id: Option<Ulid>,
    pub type_name: Option<String>,
    pub window: DateRange,
    pub guest_id: String,
    pub frontdesk_id: String,
    pub session_id: String,
    pub guests: u32,
    /// Lifetime override; defaults to 10 minutes.
    pub ttl_ms: Option<Ms>,
}

fn reservation_same_target(r: &Reservation, facility_id: Option<Ulid>) -> bool {
    match (r.facility_id, facility_id) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

impl Engine {
    /// Place a soft lock for an interactive booking flow.
    ///
    /// Checks run under the shard write lock, holds before reservations —
    /// holds are the cheaper contention to surface. Nothing is inserted
    /// unless both checks pass.
    pub async fn place_hold(&self, req: HoldRequest) -> Result<HoldReceipt, EngineError> {
        validate_range(&req.window)?;
        if req.guests == 0 {
            return Err(EngineError::Validation("guests must be at least 1".into()));
        }
        if req.frontdesk_id.is_empty() || req.guest_id.is_empty() || req.session_id.is_empty() {
            return Err(EngineError::Validation(
                "guest, front desk and session identifiers are required".into(),
            ));
        }
        if [&req.frontdesk_id, &req.guest_id, &req.session_id]
            .iter()
            .any(|s| s.len() > MAX_NAME_LEN)
        {
            return Err(EngineError::LimitExceeded("identifier too long"));
        }
        if let Some(ttl) = req.ttl_ms
            && ttl <= 0 {
                return Err(EngineError::Validation("hold lifetime must be positive".into()));
            }
        if self.entity_index.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }

        let (type_id, facility_id, requested_type) = match (req.facility_id, &req.type_name) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(EngineError::Validation(
                    "exactly one of facility or facility type must be given".into(),
                ));
            }
            (Some(fid), None) => {
                let type_id = self
                    .shard_for_entity(&fid)
                    .ok_or(EngineError::NotFound(fid))?;
                (type_id, Some(fid), None)
            }
            (None, Some(name)) => {
                let type_id = self
                    .type_id_by_name(name)
                    .ok_or_else(|| EngineError::UnknownFacilityType(name.clone()))?;
                (type_id, None, Some(name.clone()))
            }
        };

        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let mut guard = shard.write().await;
        if guard.record_count() >= MAX_RECORDS_PER_TYPE {
            return Err(EngineError::LimitExceeded("too many records on type"));
        }
        if let Some(fid) = facility_id {
            match guard.facility(&fid) {
                None => return Err(EngineError::NotFound(fid)),
                Some(f) if f.retired => {
                    return Err(EngineError::Validation(
                        "cannot hold a retired facility".into(),
                    ));
                }
                Some(_) => {}
            }
        }

        let now = now_ms();

        for h in &guard.holds {
            if h.is_active(now) && h.same_target(facility_id) && h.window.overlaps(&req.window) {
                metrics::counter!(observability::HOLD_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::HoldConflict {
                    hold_id: h.id,
                    held_by: h.frontdesk_id.clone(),
                    until: h.expires_at,
                });
            }
        }

        for r in &guard.reservations {
            if r.blocks(&req.window) && reservation_same_target(r, facility_id) {
                metrics::counter!(observability::HOLD_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::ReservationConflict {
                    reservation_id: r.id,
                });
            }
        }

        let expires_at = now + req.ttl_ms.unwrap_or(DEFAULT_HOLD_DURATION_MS);
        let event = Event::HoldPlaced {
            hold: TemporaryReservation {
                id: req.id,
                type_id,
                facility_id,
                requested_type,
                window: req.window,
                guest_id: req.guest_id,
                frontdesk_id: req.frontdesk_id,
                session_id: req.session_id,
                guests: req.guests,
                status: HoldStatus::Pending,
                expires_at,
            },
        };
        self.persist_and_apply(type_id, &mut guard, &event).await?;
        metrics::counter!(observability::HOLDS_PLACED_TOTAL).increment(1);

        Ok(HoldReceipt {
            hold_id: req.id,
            expires_at,
        })
    }

    /// Convert a pending, unexpired hold into a RESERVED reservation and
    /// settle the hold, atomically. Assumes the target was already
    /// resolvable; no auto-assignment happens here.
    pub async fn confirm_hold(
        &self,
        hold_id: Ulid,
        reservation_id: Ulid,
    ) -> Result<Ulid, EngineError> {
        if self.entity_index.contains_key(&reservation_id) {
            return Err(EngineError::AlreadyExists(reservation_id));
        }
        let (type_id, mut guard) = self.resolve_entity_write(&hold_id).await?;
        let hold = guard.hold(&hold_id).ok_or(EngineError::NotFound(hold_id))?;
        if hold.status != HoldStatus::Pending {
            return Err(EngineError::HoldNotPending {
                hold_id,
                status: hold.status,
            });
        }
        if hold.expires_at <= now_ms() {
            return Err(EngineError::HoldExpired {
                hold_id,
                expired_at: hold.expires_at,
            });
        }

        let reservation = Reservation {
            id: reservation_id,
            type_id,
            facility_id: hold.facility_id,
            requested_type: hold.requested_type.clone(),
            window: hold.window,
            check_in: None,
            check_out: None,
            guests: hold.guests,
            status: ReservationStatus::Reserved,
            payment_status: PaymentStatus::Pending,
            quote: None,
        };
        let event = Event::HoldConfirmed {
            id: hold_id,
            type_id,
            reservation,
        };
        self.persist_and_apply(type_id, &mut guard, &event).await?;
        Ok(reservation_id)
    }

    /// Release a pending hold. Settled holds are immutable.
    pub async fn cancel_hold(&self, hold_id: Ulid) -> Result<Ulid, EngineError> {
        let (type_id, mut guard) = self.resolve_entity_write(&hold_id).await?;
        let hold = guard.hold(&hold_id).ok_or(EngineError::NotFound(hold_id))?;
        if hold.status != HoldStatus::Pending {
            return Err(EngineError::HoldNotPending {
                hold_id,
                status: hold.status,
            });
        }
        let event = Event::HoldCancelled {
            id: hold_id,
            type_id,
        };
        self.persist_and_apply(type_id, &mut guard, &event).await?;
        Ok(type_id)
    }

    /// Bulk-expire every pending hold whose lifetime has passed. One
    /// event per shard; settled holds are never touched. Returns the
    /// number of holds transitioned, for observability.
    pub async fn sweep_expired_holds(&self, now: Ms) -> Result<usize, EngineError> {
        let shard_arcs: Vec<(Ulid, SharedTypeState)> = self
            .shards
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let mut total = 0usize;
        for (type_id, shard) in shard_arcs {
            let mut guard = shard.write().await;
            let expired: Vec<Ulid> = guard
                .holds
                .iter()
                .filter(|h| h.status == HoldStatus::Pending && h.expires_at < now)
                .map(|h| h.id)
                .collect();
            if expired.is_empty() {
                continue;
            }
            total += expired.len();
            let event = Event::HoldsSwept {
                type_id,
                hold_ids: expired,
            };
            self.persist_and_apply(type_id, &mut guard, &event).await?;
        }

        if total > 0 {
            metrics::counter!(observability::HOLDS_SWEPT_TOTAL).increment(total as u64);
        }
        Ok(total)
    }
}
