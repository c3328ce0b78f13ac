mod assign;
mod availability;
mod error;
mod holds;
mod mutations;
mod overlap;
mod queries;
#[cfg(test)]
mod tests;

pub use assign::BatchAssignOutcome;
pub use availability::TypeSelector;
pub use error::EngineError;
pub use holds::HoldRequest;
pub use mutations::ReservationRequest;
pub use overlap::{blocked_sets, BlockedSets};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedTypeState = Arc<RwLock<TypeState>>;

/// All state for one facility type: the shard. The shard write lock is
/// the transaction boundary for every multi-step operation.
pub struct TypeState {
    pub info: FacilityType,
    /// Sorted by `(name, id)` — the deterministic assignment order.
    pub facilities: Vec<Facility>,
    pub reservations: Vec<Reservation>,
    pub maintenance: Vec<MaintenanceRecord>,
    pub holds: Vec<TemporaryReservation>,
}

impl TypeState {
    pub fn new(info: FacilityType) -> Self {
        Self {
            info,
            facilities: Vec::new(),
            reservations: Vec::new(),
            maintenance: Vec::new(),
            holds: Vec::new(),
        }
    }

    /// Insert a facility keeping `(name, id)` order.
    pub fn insert_facility(&mut self, facility: Facility) {
        let pos = self
            .facilities
            .partition_point(|f| (f.name.as_str(), f.id) < (facility.name.as_str(), facility.id));
        self.facilities.insert(pos, facility);
    }

    pub fn facility(&self, id: &Ulid) -> Option<&Facility> {
        self.facilities.iter().find(|f| f.id == *id)
    }

    pub fn facility_mut(&mut self, id: &Ulid) -> Option<&mut Facility> {
        self.facilities.iter_mut().find(|f| f.id == *id)
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    pub fn maintenance_mut(&mut self, id: &Ulid) -> Option<&mut MaintenanceRecord> {
        self.maintenance.iter_mut().find(|m| m.id == *id)
    }

    pub fn hold(&self, id: &Ulid) -> Option<&TemporaryReservation> {
        self.holds.iter().find(|h| h.id == *id)
    }

    pub fn hold_mut(&mut self, id: &Ulid) -> Option<&mut TemporaryReservation> {
        self.holds.iter_mut().find(|h| h.id == *id)
    }

    pub fn record_count(&self) -> usize {
        self.reservations.len() + self.maintenance.len() + self.holds.len()
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One organization's booking engine. State is sharded by facility type;
/// all mutation goes through the WAL before touching memory.
pub struct Engine {
    pub shards: DashMap<Ulid, SharedTypeState>,
    /// Facility type name → type id.
    pub(super) type_names: DashMap<String, Ulid>,
    pub(super) rate_types: DashMap<Ulid, RateType>,
    /// Reverse lookup: facility/reservation/maintenance/hold id → type id.
    pub(super) entity_index: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event directly to a shard (no locking — caller holds the lock).
fn apply_to_shard(ts: &mut TypeState, event: &Event, entity_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::FacilityCreated { facility } => {
            entity_index.insert(facility.id, facility.type_id);
            ts.insert_facility(facility.clone());
        }
        Event::FacilityRetired { id, .. } => {
            if let Some(f) = ts.facility_mut(id) {
                f.retired = true;
            }
        }
        Event::ReservationCreated { reservation } => {
            entity_index.insert(reservation.id, reservation.type_id);
            ts.reservations.push(reservation.clone());
        }
        Event::ReservationWindowChanged { id, window, .. } => {
            if let Some(r) = ts.reservation_mut(id) {
                r.window = *window;
            }
        }
        Event::ReservationStatusChanged { id, status, .. } => {
            if let Some(r) = ts.reservation_mut(id) {
                r.status = *status;
            }
        }
        Event::StayRecorded {
            id,
            check_in,
            check_out,
            ..
        } => {
            // The blocking window is untouched: actual stay instants never
            // narrow or replace it.
            if let Some(r) = ts.reservation_mut(id) {
                if check_in.is_some() {
                    r.check_in = *check_in;
                }
                if check_out.is_some() {
                    r.check_out = *check_out;
                }
            }
        }
        Event::FacilityAssigned {
            reservation_id,
            facility_id,
            ..
        } => {
            if let Some(r) = ts.reservation_mut(reservation_id) {
                r.facility_id = Some(*facility_id);
            }
        }
        Event::MaintenanceScheduled { record } => {
            entity_index.insert(record.id, record.type_id);
            ts.maintenance.push(record.clone());
        }
        Event::MaintenanceStatusChanged { id, status, .. } => {
            if let Some(m) = ts.maintenance_mut(id) {
                m.status = *status;
            }
        }
        Event::HoldPlaced { hold } => {
            entity_index.insert(hold.id, hold.type_id);
            ts.holds.push(hold.clone());
        }
        Event::HoldConfirmed {
            id, reservation, ..
        } => {
            if let Some(h) = ts.hold_mut(id) {
                h.status = HoldStatus::Confirmed;
            }
            entity_index.insert(reservation.id, reservation.type_id);
            ts.reservations.push(reservation.clone());
        }
        Event::HoldCancelled { id, .. } => {
            if let Some(h) = ts.hold_mut(id) {
                h.status = HoldStatus::Cancelled;
            }
        }
        Event::HoldsSwept { hold_ids, .. } => {
            for h in &mut ts.holds {
                if hold_ids.contains(&h.id) && h.status == HoldStatus::Pending {
                    h.status = HoldStatus::Expired;
                }
            }
        }
        // Engine-global events are handled at the registry level, not here
        Event::RateTypeCreated { .. } | Event::FacilityTypeCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            shards: DashMap::new(),
            type_names: DashMap::new(),
            rate_types: DashMap::new(),
            entity_index: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy org
        // creation).
        for event in &events {
            match event {
                Event::RateTypeCreated { rate } => {
                    engine.rate_types.insert(rate.id, rate.clone());
                }
                Event::FacilityTypeCreated { facility_type } => {
                    engine
                        .type_names
                        .insert(facility_type.name.clone(), facility_type.id);
                    engine.shards.insert(
                        facility_type.id,
                        Arc::new(RwLock::new(TypeState::new(facility_type.clone()))),
                    );
                }
                other => {
                    if let Some(type_id) = other.type_id()
                        && let Some(entry) = engine.shards.get(&type_id) {
                            let shard = entry.clone();
                            let mut guard = shard.try_write().expect("replay: uncontended write");
                            apply_to_shard(&mut guard, other, &engine.entity_index);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn shard(&self, type_id: &Ulid) -> Option<SharedTypeState> {
        self.shards.get(type_id).map(|e| e.value().clone())
    }

    pub fn type_id_by_name(&self, name: &str) -> Option<Ulid> {
        self.type_names.get(name).map(|e| *e.value())
    }

    pub fn rate_type(&self, id: &Ulid) -> Option<RateType> {
        self.rate_types.get(id).map(|e| e.value().clone())
    }

    pub fn shard_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_index.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        type_id: Ulid,
        ts: &mut TypeState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_shard(ts, event, &self.entity_index);
        self.notify.send(type_id, event);
        Ok(())
    }

    /// Lookup entity → type, get shard, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<TypeState>), EngineError> {
        let type_id = self
            .shard_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let shard = self
            .shard(&type_id)
            .ok_or(EngineError::NotFound(type_id))?;
        let guard = shard.write_owned().await;
        Ok((type_id, guard))
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.rate_types.iter() {
            events.push(Event::RateTypeCreated {
                rate: entry.value().clone(),
            });
        }

        let shard_arcs: Vec<SharedTypeState> =
            self.shards.iter().map(|e| e.value().clone()).collect();
        for shard in shard_arcs {
            let guard = shard.read().await;
            events.push(Event::FacilityTypeCreated {
                facility_type: guard.info.clone(),
            });
            for f in &guard.facilities {
                events.push(Event::FacilityCreated {
                    facility: f.clone(),
                });
            }
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    reservation: r.clone(),
                });
            }
            for m in &guard.maintenance {
                events.push(Event::MaintenanceScheduled { record: m.clone() });
            }
            for h in &guard.holds {
                events.push(Event::HoldPlaced { hold: h.clone() });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
