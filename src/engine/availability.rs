use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::{blocked_sets, validate_range};
use super::{Engine, EngineError, SharedTypeState, TypeState};

// ── Availability Algorithm ────────────────────────────────────────

/// Which facility types an availability query examines.
#[derive(Debug, Clone)]
pub enum TypeSelector {
    All,
    ById(Ulid),
    ByName(String),
}

/// Availability for one shard. One pass over the facility list against
/// the precomputed blocked sets.
///
/// Type-level reservations consume the type's capacity without marking
/// any specific unit unavailable, so `available_count` can be smaller
/// than the summary list.
pub fn type_availability(ts: &TypeState, query: &DateRange) -> FacilityTypeAvailability {
    let sets = blocked_sets(ts, query);

    let mut total = 0usize;
    let mut reserved_units = 0usize;
    let mut maintenance_units = 0usize;
    let mut available = Vec::new();

    for f in &ts.facilities {
        if f.retired {
            continue;
        }
        total += 1;
        if sets.reserved.contains(&f.id) {
            reserved_units += 1;
        }
        if sets.maintenance.contains(&f.id) {
            maintenance_units += 1;
        }
        if !sets.blocks(&f.id) {
            available.push(FacilitySummary {
                id: f.id,
                name: f.name.clone(),
                location: f.location.clone(),
            });
        }
    }

    let available_count = available.len().saturating_sub(sets.type_level_reservations);

    FacilityTypeAvailability {
        type_id: ts.info.id,
        type_name: ts.info.name.clone(),
        category: ts.info.category,
        price: ts.info.price,
        total_count: total,
        available_count,
        reserved_count: reserved_units + sets.type_level_reservations,
        maintenance_count: maintenance_units,
        is_available: available_count > 0,
        available_facilities: available,
    }
}

/// OR across groups, AND within a group. No groups means no filtering.
pub fn matches_filters(metadata: &CategoryMetadata, groups: &[FilterGroup]) -> bool {
    groups.is_empty() || groups.iter().any(|g| g.matches(metadata))
}

impl Engine {
    /// Availability across facility types for a date window.
    ///
    /// Read path only: each shard is visited once under a read lock, and
    /// all blocking records are folded into sets up front rather than
    /// re-queried per facility.
    pub async fn check_availability(
        &self,
        query: DateRange,
        selector: TypeSelector,
        price_band: Option<(Decimal, Decimal)>,
        filters: &[FilterGroup],
    ) -> Result<Vec<FacilityTypeAvailability>, EngineError> {
        validate_range(&query)?;
        if query.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        if filters.len() > MAX_FILTER_GROUPS {
            return Err(EngineError::LimitExceeded("too many filter groups"));
        }

        let shard_arcs: Vec<SharedTypeState> = match selector {
            TypeSelector::All => self.shards.iter().map(|e| e.value().clone()).collect(),
            TypeSelector::ById(id) => self.shard(&id).into_iter().collect(),
            TypeSelector::ByName(name) => self
                .type_id_by_name(&name)
                .and_then(|id| self.shard(&id))
                .into_iter()
                .collect(),
        };

        let mut results = Vec::with_capacity(shard_arcs.len());
        for shard in shard_arcs {
            let guard = shard.read().await;
            if let Some((min, max)) = price_band
                && (guard.info.price < min || guard.info.price > max) {
                    continue;
                }
            if !matches_filters(&guard.info.metadata, filters) {
                continue;
            }
            results.push(type_availability(&guard, &query));
        }

        results.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        Ok(results)
    }

    /// Availability of one specific unit.
    pub async fn facility_is_available(
        &self,
        facility_id: Ulid,
        query: DateRange,
    ) -> Result<bool, EngineError> {
        validate_range(&query)?;
        let type_id = self
            .shard_for_entity(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let guard = shard.read().await;
        let facility = guard
            .facility(&facility_id)
            .ok_or(EngineError::NotFound(facility_id))?;
        if facility.retired {
            return Ok(false);
        }
        let sets = blocked_sets(&guard, &query);
        Ok(!sets.blocks(&facility_id))
    }
}
