use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;
use crate::pricing::{self, PriceUnit, Quote};

use super::overlap::{now_ms, validate_range};
use super::{Engine, EngineError, SharedTypeState};

impl Engine {
    fn shard_arcs(&self, type_id: Option<Ulid>) -> Vec<SharedTypeState> {
        match type_id {
            Some(id) => self.shard(&id).into_iter().collect(),
            None => self.shards.iter().map(|e| e.value().clone()).collect(),
        }
    }

    pub fn list_rate_types(&self) -> Vec<RateType> {
        let mut rates: Vec<RateType> = self.rate_types.iter().map(|e| e.value().clone()).collect();
        rates.sort_by_key(|r| r.id);
        rates
    }

    pub async fn list_facility_types(&self) -> Vec<FacilityType> {
        let mut types = Vec::new();
        for shard in self.shard_arcs(None) {
            types.push(shard.read().await.info.clone());
        }
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    pub async fn list_facilities(&self, type_id: Option<Ulid>) -> Vec<Facility> {
        let mut out = Vec::new();
        for shard in self.shard_arcs(type_id) {
            out.extend(shard.read().await.facilities.iter().cloned());
        }
        out
    }

    pub async fn list_reservations(&self, type_id: Option<Ulid>) -> Vec<Reservation> {
        let mut out = Vec::new();
        for shard in self.shard_arcs(type_id) {
            out.extend(shard.read().await.reservations.iter().cloned());
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn list_maintenance(&self, type_id: Option<Ulid>) -> Vec<MaintenanceRecord> {
        let mut out = Vec::new();
        for shard in self.shard_arcs(type_id) {
            out.extend(shard.read().await.maintenance.iter().cloned());
        }
        out.sort_by_key(|m| m.id);
        out
    }

    pub async fn list_holds(&self, type_id: Option<Ulid>) -> Vec<TemporaryReservation> {
        let mut out = Vec::new();
        for shard in self.shard_arcs(type_id) {
            out.extend(shard.read().await.holds.iter().cloned());
        }
        out.sort_by_key(|h| h.id);
        out
    }

    /// Pending, unexpired holds only. A swept or settled hold never
    /// appears here even before the reaper has run.
    pub async fn active_holds(&self, type_id: Option<Ulid>, now: Ms) -> Vec<TemporaryReservation> {
        let mut holds = self.list_holds(type_id).await;
        holds.retain(|h| h.is_active(now));
        holds
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let type_id = self
            .shard_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let guard = shard.read().await;
        guard
            .reservation(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn get_hold(&self, id: Ulid) -> Result<TemporaryReservation, EngineError> {
        let type_id = self
            .shard_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let guard = shard.read().await;
        guard.hold(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Quote a stay against a facility type's stored price and linked
    /// rate policy. An override price wins over the stored price.
    pub async fn quote(
        &self,
        type_name: &str,
        range: DateRange,
        unit: PriceUnit,
        override_price: Option<Decimal>,
    ) -> Result<Quote, EngineError> {
        validate_range(&range)?;
        let type_id = self
            .type_id_by_name(type_name)
            .ok_or_else(|| EngineError::UnknownFacilityType(type_name.into()))?;
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let guard = shard.read().await;

        let rate_type = guard.info.rate_type_id.and_then(|rid| self.rate_type(&rid));
        let inputs = pricing::resolve_rates(override_price, Some(&guard.info), rate_type.as_ref())?;
        Ok(pricing::calculate(
            inputs.base_price,
            &range,
            unit,
            inputs.tax_rate,
            inputs.discount_rate,
        )?)
    }

    /// Count of pending, unexpired holds right now. For the reaper log line.
    pub async fn pending_hold_count(&self) -> usize {
        self.active_holds(None, now_ms()).await.len()
    }
}
