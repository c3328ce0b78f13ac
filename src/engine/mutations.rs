use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::pricing::Quote;

use super::overlap::{duplicate_binding_exists, validate_instant, validate_range};
use super::{Engine, EngineError, TypeState};

/// Inputs for a new reservation. Exactly one of `facility_id` /
/// `type_name` must be present.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub id: Ulid,
    pub facility_id: Option<Ulid>,
    pub type_name: Option<String>,
    pub window: DateRange,
    pub guests: u32,
    pub status: ReservationStatus,
    pub quote: Option<Quote>,
}

impl Engine {
    pub async fn create_rate_type(
        &self,
        id: Ulid,
        name: String,
        default_tax: Decimal,
        default_discount: Decimal,
    ) -> Result<(), EngineError> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("rate type name too long"));
        }
        if !(dec!(0)..=dec!(100)).contains(&default_tax)
            || !(dec!(0)..=dec!(100)).contains(&default_discount)
        {
            return Err(EngineError::Validation(
                "tax and discount must be percentages between 0 and 100".into(),
            ));
        }
        if self.rate_types.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let rate = RateType {
            id,
            name,
            default_tax,
            default_discount,
        };
        let event = Event::RateTypeCreated { rate: rate.clone() };
        self.wal_append(&event).await?;
        self.rate_types.insert(id, rate);
        Ok(())
    }

    pub async fn create_facility_type(
        &self,
        id: Ulid,
        name: String,
        category: FacilityCategory,
        price: Decimal,
        rate_type_id: Option<Ulid>,
        metadata: CategoryMetadata,
    ) -> Result<(), EngineError> {
        if self.shards.len() >= MAX_FACILITY_TYPES_PER_ORG {
            return Err(EngineError::LimitExceeded("too many facility types"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("facility type name length"));
        }
        if self.shards.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.type_names.contains_key(&name) {
            return Err(EngineError::Validation(format!(
                "facility type name already in use: {name}"
            )));
        }
        if let Some(rid) = rate_type_id
            && !self.rate_types.contains_key(&rid) {
                return Err(EngineError::NotFound(rid));
            }

        let facility_type = FacilityType::new(id, name, category, price, rate_type_id, metadata)
            .map_err(|msg| EngineError::Validation(msg.into()))?;

        let event = Event::FacilityTypeCreated {
            facility_type: facility_type.clone(),
        };
        self.wal_append(&event).await?;
        self.type_names.insert(facility_type.name.clone(), id);
        self.shards
            .insert(id, Arc::new(RwLock::new(TypeState::new(facility_type))));
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn create_facility(
        &self,
        id: Ulid,
        type_id: Ulid,
        name: String,
        location: Option<String>,
        details: Option<String>,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("facility name length"));
        }
        if self.entity_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let mut guard = shard.write().await;
        if guard.facilities.len() >= MAX_FACILITIES_PER_TYPE {
            return Err(EngineError::LimitExceeded("too many facilities on type"));
        }

        let event = Event::FacilityCreated {
            facility: Facility {
                id,
                type_id,
                name,
                location,
                details,
                retired: false,
            },
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }

    /// Soft delete. The unit stops counting toward availability but its
    /// history stays.
    pub async fn retire_facility(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (type_id, mut guard) = self.resolve_entity_write(&id).await?;
        match guard.facility(&id) {
            None => return Err(EngineError::NotFound(id)),
            Some(f) if f.retired => {
                return Err(EngineError::Validation("facility already retired".into()));
            }
            Some(_) => {}
        }
        let event = Event::FacilityRetired { id, type_id };
        self.persist_and_apply(type_id, &mut guard, &event).await?;
        Ok(type_id)
    }

    pub async fn create_reservation(&self, req: ReservationRequest) -> Result<(), EngineError> {
        validate_range(&req.window)?;
        if req.guests == 0 {
            return Err(EngineError::Validation("guests must be at least 1".into()));
        }
        if !matches!(
            req.status,
            ReservationStatus::Processing | ReservationStatus::Reserved
        ) {
            return Err(EngineError::Validation(format!(
                "a reservation cannot be created as {}",
                req.status.as_str()
            )));
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
                        "cannot reserve a retired facility".into(),
                    ));
                }
                Some(_) => {}
            }
            if duplicate_binding_exists(&guard, fid, &req.window, req.id) {
                return Err(EngineError::DuplicateReservation {
                    facility_id: fid,
                    window: req.window,
                });
            }
        }

        let event = Event::ReservationCreated {
            reservation: Reservation {
                id: req.id,
                type_id,
                facility_id,
                requested_type,
                window: req.window,
                check_in: None,
                check_out: None,
                guests: req.guests,
                status: req.status,
                payment_status: PaymentStatus::Pending,
                quote: req.quote,
            },
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }

    pub async fn set_reservation_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<(), EngineError> {
        let (type_id, mut guard) = self.resolve_entity_write(&id).await?;
        let current = guard
            .reservation(&id)
            .ok_or(EngineError::NotFound(id))?
            .status;
        if !current.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current,
                to: status,
            });
        }
        let event = Event::ReservationStatusChanged {
            id,
            type_id,
            status,
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }

    pub async fn set_reservation_window(
        &self,
        id: Ulid,
        window: DateRange,
    ) -> Result<(), EngineError> {
        validate_range(&window)?;
        let (type_id, mut guard) = self.resolve_entity_write(&id).await?;
        let reservation = guard.reservation(&id).ok_or(EngineError::NotFound(id))?;
        if reservation.status.is_terminal() {
            return Err(EngineError::Validation(
                "cannot move a settled reservation".into(),
            ));
        }
        let event = Event::ReservationWindowChanged {
            id,
            type_id,
            window,
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }

    /// Record actual stay instants. The blocking window stays authoritative
    /// for overlap detection regardless.
    pub async fn record_stay(
        &self,
        id: Ulid,
        check_in: Option<Ms>,
        check_out: Option<Ms>,
    ) -> Result<(), EngineError> {
        if check_in.is_none() && check_out.is_none() {
            return Err(EngineError::Validation(
                "nothing to record: no check-in or check-out instant".into(),
            ));
        }
        for t in [check_in, check_out].into_iter().flatten() {
            validate_instant(t)?;
        }
        let (type_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.reservation(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::StayRecorded {
            id,
            type_id,
            check_in,
            check_out,
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }

    pub async fn schedule_maintenance(
        &self,
        id: Ulid,
        facility_id: Ulid,
        status: MaintenanceStatus,
        window: MaintenanceWindow,
    ) -> Result<(), EngineError> {
        match window {
            MaintenanceWindow::Range(r) => validate_range(&r)?,
            MaintenanceWindow::OpenEnded { start } => validate_instant(start)?,
            MaintenanceWindow::Day { date } => validate_instant(date)?,
        }
        if self.entity_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let type_id = self
            .shard_for_entity(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let mut guard = shard.write().await;
        if guard.facility(&facility_id).is_none() {
            return Err(EngineError::NotFound(facility_id));
        }
        if guard.record_count() >= MAX_RECORDS_PER_TYPE {
            return Err(EngineError::LimitExceeded("too many records on type"));
        }

        let event = Event::MaintenanceScheduled {
            record: MaintenanceRecord {
                id,
                facility_id,
                type_id,
                status,
                window,
            },
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }

    pub async fn set_maintenance_status(
        &self,
        id: Ulid,
        status: MaintenanceStatus,
    ) -> Result<(), EngineError> {
        let (type_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.maintenance_mut(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::MaintenanceStatusChanged {
            id,
            type_id,
            status,
        };
        self.persist_and_apply(type_id, &mut guard, &event).await
    }
}
