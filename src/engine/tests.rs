use std::path::PathBuf;
use std::sync::Arc;

use rust_decimal_macros::dec;
use ulid::Ulid;

use super::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::pricing::PriceUnit;

const DAY: Ms = 86_400_000;
/// Anchor inside the valid timestamp window.
const BASE: Ms = 1_750_000_000_000;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("atrium_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    let notify = Arc::new(NotifyHub::new());
    Engine::new(test_wal_path(name), notify).unwrap()
}

fn days(from: i64, to: i64) -> DateRange {
    DateRange::new(BASE + from * DAY, BASE + to * DAY)
}

fn hotel_meta(bed_type: &str, max_occupancy: u32) -> CategoryMetadata {
    CategoryMetadata::Hotel {
        bed_type: bed_type.into(),
        bed_count: 1,
        max_occupancy,
        amenities: vec!["WIFI".into()],
        features: vec![],
    }
}

/// Create a hotel type plus named rooms; returns (type_id, room ids in
/// the order given).
async fn seed_hotel(engine: &Engine, type_name: &str, rooms: &[&str]) -> (Ulid, Vec<Ulid>) {
    let type_id = Ulid::new();
    engine
        .create_facility_type(
            type_id,
            type_name.into(),
            FacilityCategory::Hotel,
            dec!(120),
            None,
            hotel_meta("KING_BED", 2),
        )
        .await
        .unwrap();

    let mut ids = Vec::new();
    for room in rooms {
        let id = Ulid::new();
        engine
            .create_facility(id, type_id, (*room).into(), None, None)
            .await
            .unwrap();
        ids.push(id);
    }
    (type_id, ids)
}

async fn type_reservation(
    engine: &Engine,
    type_name: &str,
    window: DateRange,
    status: ReservationStatus,
) -> Ulid {
    let id = Ulid::new();
    engine
        .create_reservation(ReservationRequest {
            id,
            facility_id: None,
            type_name: Some(type_name.into()),
            window,
            guests: 2,
            status,
            quote: None,
        })
        .await
        .unwrap();
    id
}

fn hold_request(type_name: Option<&str>, facility_id: Option<Ulid>, window: DateRange) -> HoldRequest {
    HoldRequest {
        id: Ulid::new(),
        facility_id,
        type_name: type_name.map(Into::into),
        window,
        guest_id: "guest-1".into(),
        frontdesk_id: "agent-1".into(),
        session_id: "sess-1".into(),
        guests: 2,
        ttl_ms: None,
    }
}

// ── Facility type & reservation creation ─────────────────

#[tokio::test]
async fn facility_type_name_must_be_unique() {
    let engine = new_engine("type_unique_name.wal");
    seed_hotel(&engine, "Deluxe", &[]).await;

    let err = engine
        .create_facility_type(
            Ulid::new(),
            "Deluxe".into(),
            FacilityCategory::Hotel,
            dec!(99),
            None,
            hotel_meta("QUEEN_BED", 2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn facility_type_rejects_mismatched_payload() {
    let engine = new_engine("type_mismatch.wal");
    let err = engine
        .create_facility_type(
            Ulid::new(),
            "Gym Floor".into(),
            FacilityCategory::Gym,
            dec!(20),
            None,
            hotel_meta("KING_BED", 2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn facility_type_rejects_out_of_band_price() {
    let engine = new_engine("type_price_band.wal");
    let err = engine
        .create_facility_type(
            Ulid::new(),
            "Too Cheap".into(),
            FacilityCategory::Hotel,
            dec!(1),
            None,
            hotel_meta("KING_BED", 2),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn reservation_requires_exactly_one_target() {
    let engine = new_engine("res_xor.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101"]).await;

    let both = engine
        .create_reservation(ReservationRequest {
            id: Ulid::new(),
            facility_id: Some(rooms[0]),
            type_name: Some("Deluxe".into()),
            window: days(0, 2),
            guests: 1,
            status: ReservationStatus::Processing,
            quote: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(both, EngineError::Validation(_)));

    let neither = engine
        .create_reservation(ReservationRequest {
            id: Ulid::new(),
            facility_id: None,
            type_name: None,
            window: days(0, 2),
            guests: 1,
            status: ReservationStatus::Processing,
            quote: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(neither, EngineError::Validation(_)));
}

#[tokio::test]
async fn reservation_unknown_type_name() {
    let engine = new_engine("res_unknown_type.wal");
    let err = engine
        .create_reservation(ReservationRequest {
            id: Ulid::new(),
            facility_id: None,
            type_name: Some("Nonexistent".into()),
            window: days(0, 1),
            guests: 1,
            status: ReservationStatus::Processing,
            quote: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownFacilityType(_)));
}

#[tokio::test]
async fn reservation_cannot_start_in_terminal_status() {
    let engine = new_engine("res_terminal_create.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let err = engine
        .create_reservation(ReservationRequest {
            id: Ulid::new(),
            facility_id: None,
            type_name: Some("Deluxe".into()),
            window: days(0, 1),
            guests: 1,
            status: ReservationStatus::Cancelled,
            quote: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn duplicate_facility_binding_rejected_at_create() {
    let engine = new_engine("res_duplicate.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101"]).await;

    let make = |id| ReservationRequest {
        id,
        facility_id: Some(rooms[0]),
        type_name: None,
        window: days(0, 2),
        guests: 1,
        status: ReservationStatus::Reserved,
        quote: None,
    };
    engine.create_reservation(make(Ulid::new())).await.unwrap();

    // Identical (facility, window) among live reservations trips the backstop.
    let err = engine
        .create_reservation(make(Ulid::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateReservation { .. }));
}

#[tokio::test]
async fn reservation_carries_its_quote_snapshot() {
    let engine = new_engine("res_quote_snapshot.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let quote = crate::pricing::calculate(
        dec!(120),
        &days(0, 2),
        PriceUnit::Night,
        dec!(10),
        dec!(0),
    )
    .unwrap();

    let rid = Ulid::new();
    engine
        .create_reservation(ReservationRequest {
            id: rid,
            facility_id: None,
            type_name: Some("Deluxe".into()),
            window: days(0, 2),
            guests: 2,
            status: ReservationStatus::Reserved,
            quote: Some(quote.clone()),
        })
        .await
        .unwrap();

    let r = engine.get_reservation(rid).await.unwrap();
    assert_eq!(r.quote, Some(quote));
    assert_eq!(r.payment_status, PaymentStatus::Pending);
}

// ── Status machine ───────────────────────────────────────

#[tokio::test]
async fn reservation_lifecycle_transitions() {
    let engine = new_engine("res_lifecycle.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Processing).await;

    engine
        .set_reservation_status(rid, ReservationStatus::Reserved)
        .await
        .unwrap();
    engine
        .set_reservation_status(rid, ReservationStatus::CheckedIn)
        .await
        .unwrap();
    engine
        .set_reservation_status(rid, ReservationStatus::CheckedOut)
        .await
        .unwrap();

    // Terminal: nothing more is allowed.
    let err = engine
        .set_reservation_status(rid, ReservationStatus::Reserved)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn skipping_reserved_is_rejected() {
    let engine = new_engine("res_skip.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Processing).await;

    let err = engine
        .set_reservation_status(rid, ReservationStatus::CheckedIn)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: ReservationStatus::Processing,
            to: ReservationStatus::CheckedIn,
        }
    ));
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn availability_counts_and_selector() {
    let engine = new_engine("avail_counts.wal");
    let (type_id, rooms) = seed_hotel(&engine, "Deluxe", &["101", "102", "103"]).await;
    seed_hotel(&engine, "Suite", &["201"]).await;

    // Room 101 reserved, 103 under open-ended maintenance.
    engine
        .create_reservation(ReservationRequest {
            id: Ulid::new(),
            facility_id: Some(rooms[0]),
            type_name: None,
            window: days(0, 2),
            guests: 2,
            status: ReservationStatus::Reserved,
            quote: None,
        })
        .await
        .unwrap();
    engine
        .schedule_maintenance(
            Ulid::new(),
            rooms[2],
            MaintenanceStatus::Pending,
            MaintenanceWindow::OpenEnded {
                start: BASE - 10 * DAY,
            },
        )
        .await
        .unwrap();

    let all = engine
        .check_availability(days(0, 2), TypeSelector::All, None, &[])
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    // Sorted by type name.
    assert_eq!(all[0].type_name, "Deluxe");
    assert_eq!(all[1].type_name, "Suite");

    let deluxe = &all[0];
    assert_eq!(deluxe.total_count, 3);
    assert_eq!(deluxe.reserved_count, 1);
    assert_eq!(deluxe.maintenance_count, 1);
    assert_eq!(deluxe.available_count, 1);
    assert_eq!(deluxe.available_facilities[0].name, "102");

    let by_id = engine
        .check_availability(days(0, 2), TypeSelector::ById(type_id), None, &[])
        .await
        .unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].type_id, type_id);

    let by_unknown_name = engine
        .check_availability(
            days(0, 2),
            TypeSelector::ByName("Penthouse".into()),
            None,
            &[],
        )
        .await
        .unwrap();
    assert!(by_unknown_name.is_empty());
}

#[tokio::test]
async fn availability_filter_groups_are_or_combined() {
    let engine = new_engine("avail_filters.wal");

    let king_id = Ulid::new();
    engine
        .create_facility_type(
            king_id,
            "King Room".into(),
            FacilityCategory::Hotel,
            dec!(150),
            None,
            hotel_meta("KING_BED", 2),
        )
        .await
        .unwrap();
    engine
        .create_facility(Ulid::new(), king_id, "K1".into(), None, None)
        .await
        .unwrap();

    let family_id = Ulid::new();
    engine
        .create_facility_type(
            family_id,
            "Family Room".into(),
            FacilityCategory::Hotel,
            dec!(180),
            None,
            hotel_meta("TWIN_BED", 4),
        )
        .await
        .unwrap();
    engine
        .create_facility(Ulid::new(), family_id, "F1".into(), None, None)
        .await
        .unwrap();

    let groups = vec![
        FilterGroup {
            bed_type: Some("KING_BED".into()),
            ..Default::default()
        },
        FilterGroup {
            max_occupancy: Some(4),
            ..Default::default()
        },
    ];

    // King matches group 1, Family matches group 2: both survive (OR).
    let results = engine
        .check_availability(days(0, 1), TypeSelector::All, None, &groups)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);

    // A single group ANDs its constraints: nothing has KING_BED and occupancy 4.
    let strict = vec![FilterGroup {
        bed_type: Some("KING_BED".into()),
        max_occupancy: Some(4),
        ..Default::default()
    }];
    let results = engine
        .check_availability(days(0, 1), TypeSelector::All, None, &strict)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn availability_price_band_filter() {
    let engine = new_engine("avail_price.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await; // price 120

    let results = engine
        .check_availability(
            days(0, 1),
            TypeSelector::All,
            Some((dec!(100), dec!(130))),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);

    let results = engine
        .check_availability(
            days(0, 1),
            TypeSelector::All,
            Some((dec!(200), dec!(300))),
            &[],
        )
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn blocking_window_outlives_recorded_stay() {
    let engine = new_engine("avail_blocking_window.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101"]).await;

    let rid = Ulid::new();
    engine
        .create_reservation(ReservationRequest {
            id: rid,
            facility_id: Some(rooms[0]),
            type_name: None,
            window: days(0, 4),
            guests: 1,
            status: ReservationStatus::Reserved,
            quote: None,
        })
        .await
        .unwrap();
    engine
        .set_reservation_status(rid, ReservationStatus::CheckedIn)
        .await
        .unwrap();

    // Guest actually left on day 1, but the blocking window still spans day 3.
    engine
        .record_stay(rid, Some(BASE), Some(BASE + DAY))
        .await
        .unwrap();

    let avail = engine
        .check_availability(days(2, 3), TypeSelector::All, None, &[])
        .await
        .unwrap();
    assert!(!avail[0].is_available);

    let r = engine.get_reservation(rid).await.unwrap();
    assert_eq!(r.window, days(0, 4));
    assert_eq!(r.check_out, Some(BASE + DAY));
}

#[tokio::test]
async fn cancelled_reservation_frees_availability() {
    let engine = new_engine("avail_cancel.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;

    let before = engine
        .check_availability(days(0, 2), TypeSelector::All, None, &[])
        .await
        .unwrap();
    assert_eq!(before[0].available_count, 0);

    engine
        .set_reservation_status(rid, ReservationStatus::Cancelled)
        .await
        .unwrap();

    let after = engine
        .check_availability(days(0, 2), TypeSelector::All, None, &[])
        .await
        .unwrap();
    assert_eq!(after[0].available_count, 1);
}

#[tokio::test]
async fn retired_facility_leaves_the_pool() {
    let engine = new_engine("avail_retired.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101", "102"]).await;

    engine.retire_facility(rooms[0]).await.unwrap();

    let avail = engine
        .check_availability(days(0, 1), TypeSelector::All, None, &[])
        .await
        .unwrap();
    assert_eq!(avail[0].total_count, 1);
    assert_eq!(avail[0].available_facilities[0].name, "102");

    // Retiring twice is an error.
    let err = engine.retire_facility(rooms[0]).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

// ── Auto-assignment ──────────────────────────────────────

#[tokio::test]
async fn assignment_picks_first_by_name() {
    let engine = new_engine("assign_order.wal");
    // Inserted out of order on purpose.
    seed_hotel(&engine, "Deluxe", &["103", "101", "102"]).await;
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;

    let a = engine.assign_facility(rid, None).await.unwrap();
    assert!(!a.already_assigned);

    let r = engine.get_reservation(rid).await.unwrap();
    assert_eq!(r.facility_id, Some(a.facility_id));
    let facilities = engine.list_facilities(Some(r.type_id)).await;
    let assigned = facilities.iter().find(|f| f.id == a.facility_id).unwrap();
    assert_eq!(assigned.name, "101");
}

#[tokio::test]
async fn assignment_is_idempotent() {
    let engine = new_engine("assign_idempotent.wal");
    seed_hotel(&engine, "Deluxe", &["101", "102"]).await;
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;

    let first = engine.assign_facility(rid, None).await.unwrap();
    assert!(!first.already_assigned);

    let second = engine.assign_facility(rid, None).await.unwrap();
    assert!(second.already_assigned);
    assert_eq!(second.facility_id, first.facility_id);

    let third = engine.assign_facility(rid, None).await.unwrap();
    assert!(third.already_assigned);
    assert_eq!(third.facility_id, first.facility_id);
}

#[tokio::test]
async fn assignment_exhausts_inventory() {
    let engine = new_engine("assign_exhaust.wal");
    seed_hotel(&engine, "Deluxe", &["101", "102"]).await;

    let r1 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let r2 = type_reservation(&engine, "Deluxe", days(1, 3), ReservationStatus::Reserved).await;
    let r3 = type_reservation(&engine, "Deluxe", days(0, 3), ReservationStatus::Reserved).await;

    let a1 = engine.assign_facility(r1, None).await.unwrap();
    let a2 = engine.assign_facility(r2, None).await.unwrap();
    assert_ne!(a1.facility_id, a2.facility_id);

    let err = engine.assign_facility(r3, None).await.unwrap_err();
    assert!(matches!(err, EngineError::NoAvailability { .. }));
}

#[tokio::test]
async fn assignment_skips_maintenance_and_disjoint_windows() {
    let engine = new_engine("assign_maintenance.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101", "102"]).await;

    engine
        .schedule_maintenance(
            Ulid::new(),
            rooms[0],
            MaintenanceStatus::InProgress,
            MaintenanceWindow::Range(days(0, 5)),
        )
        .await
        .unwrap();

    let rid = type_reservation(&engine, "Deluxe", days(1, 2), ReservationStatus::Reserved).await;
    let a = engine.assign_facility(rid, None).await.unwrap();
    assert_eq!(a.facility_id, rooms[1]);

    // A week later the maintenance window no longer applies.
    let later =
        type_reservation(&engine, "Deluxe", days(10, 11), ReservationStatus::Reserved).await;
    let b = engine.assign_facility(later, None).await.unwrap();
    assert_eq!(b.facility_id, rooms[0]);
}

#[tokio::test]
async fn assignment_applies_override_before_search() {
    let engine = new_engine("assign_override.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    // The only room is taken on days 0-2.
    let blocker = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    engine.assign_facility(blocker, None).await.unwrap();

    // This reservation's stored window collides, but the override moves it.
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let a = engine
        .assign_facility(rid, Some(days(5, 7)))
        .await
        .unwrap();
    assert!(!a.already_assigned);

    let r = engine.get_reservation(rid).await.unwrap();
    assert_eq!(r.window, days(5, 7));
}

#[tokio::test]
async fn assignment_rejects_terminal_reservation() {
    let engine = new_engine("assign_terminal.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    engine
        .set_reservation_status(rid, ReservationStatus::Cancelled)
        .await
        .unwrap();

    let err = engine.assign_facility(rid, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn concurrent_assignment_never_double_books() {
    let engine = Arc::new(new_engine("assign_concurrent.wal"));
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let r1 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let r2 = type_reservation(&engine, "Deluxe", days(1, 3), ReservationStatus::Reserved).await;

    let e1 = engine.clone();
    let e2 = engine.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { e1.assign_facility(r1, None).await }),
        tokio::spawn(async move { e2.assign_facility(r2, None).await }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    // Exactly one side wins the single room.
    match (&a, &b) {
        (Ok(win), Err(EngineError::NoAvailability { .. })) => {
            assert!(!win.already_assigned);
        }
        (Err(EngineError::NoAvailability { .. }), Ok(win)) => {
            assert!(!win.already_assigned);
        }
        other => panic!("expected one winner and one no-availability, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_assignment_with_room_for_both() {
    let engine = Arc::new(new_engine("assign_concurrent_two.wal"));
    seed_hotel(&engine, "Deluxe", &["101", "102"]).await;

    let r1 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let r2 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;

    let e1 = engine.clone();
    let e2 = engine.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { e1.assign_facility(r1, None).await }),
        tokio::spawn(async move { e2.assign_facility(r2, None).await }),
    );
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    // Both bound, and never to the same unit.
    assert_ne!(a.facility_id, b.facility_id);
}

#[tokio::test]
async fn batch_assignment_reports_every_item() {
    let engine = new_engine("assign_batch.wal");
    seed_hotel(&engine, "Deluxe", &["101", "102"]).await;

    let r1 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let r2 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let r3 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
    let missing = Ulid::new();

    let outcomes = engine
        .batch_assign(&[r1, r2, r3, missing])
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 4);

    assert!(outcomes[0].outcome.is_ok());
    assert!(outcomes[1].outcome.is_ok());
    // Third item fails without masking its siblings.
    assert!(matches!(
        outcomes[2].outcome,
        Err(EngineError::NoAvailability { .. })
    ));
    assert!(matches!(outcomes[3].outcome, Err(EngineError::NotFound(_))));

    let f1 = outcomes[0].outcome.as_ref().unwrap().facility_id;
    let f2 = outcomes[1].outcome.as_ref().unwrap().facility_id;
    assert_ne!(f1, f2);
}

#[tokio::test]
async fn batch_assignment_spans_types_and_stays_in_order() {
    let engine = new_engine("assign_batch_types.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;
    seed_hotel(&engine, "Suite", &["201"]).await;

    let r1 = type_reservation(&engine, "Suite", days(0, 2), ReservationStatus::Reserved).await;
    let r2 = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;

    let outcomes = engine.batch_assign(&[r1, r2]).await.unwrap();
    assert_eq!(outcomes[0].reservation_id, r1);
    assert_eq!(outcomes[1].reservation_id, r2);
    assert!(outcomes.iter().all(|o| o.outcome.is_ok()));
}

#[tokio::test]
async fn batch_assignment_size_limit() {
    let engine = new_engine("assign_batch_limit.wal");
    let ids: Vec<Ulid> = (0..crate::limits::MAX_BATCH_SIZE + 1)
        .map(|_| Ulid::new())
        .collect();
    let err = engine.batch_assign(&ids).await.unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

// ── Temporary holds ──────────────────────────────────────

#[tokio::test]
async fn hold_conflict_names_the_holder() {
    let engine = new_engine("hold_conflict.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let receipt = engine
        .place_hold(hold_request(Some("Deluxe"), None, days(0, 2)))
        .await
        .unwrap();

    let mut second = hold_request(Some("Deluxe"), None, days(1, 3));
    second.frontdesk_id = "agent-2".into();
    let err = engine.place_hold(second).await.unwrap_err();
    assert!(err.is_recoverable());
    match err {
        EngineError::HoldConflict {
            hold_id,
            held_by,
            until,
        } => {
            assert_eq!(hold_id, receipt.hold_id);
            assert_eq!(held_by, "agent-1");
            assert_eq!(until, receipt.expires_at);
        }
        other => panic!("expected HoldConflict, got {other:?}"),
    }

    // The losing attempt inserted nothing.
    let holds = engine.list_holds(None).await;
    assert_eq!(holds.len(), 1);
}

#[tokio::test]
async fn hold_checked_before_reservations() {
    let engine = new_engine("hold_ordering.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    // Both an active hold and a blocking reservation cover the window.
    type_reservation(&engine, "Deluxe", days(0, 4), ReservationStatus::Reserved).await;
    engine
        .place_hold(hold_request(Some("Deluxe"), None, days(0, 4)))
        .await
        .unwrap();

    // The hold is reported, not the reservation: holds are contested first.
    let err = engine
        .place_hold(hold_request(Some("Deluxe"), None, days(1, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::HoldConflict { .. }));
}

#[tokio::test]
async fn hold_blocked_by_confirmed_reservation() {
    let engine = new_engine("hold_vs_reservation.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101"]).await;

    let rid = Ulid::new();
    engine
        .create_reservation(ReservationRequest {
            id: rid,
            facility_id: Some(rooms[0]),
            type_name: None,
            window: days(0, 2),
            guests: 1,
            status: ReservationStatus::Reserved,
            quote: None,
        })
        .await
        .unwrap();

    let err = engine
        .place_hold(hold_request(None, Some(rooms[0]), days(1, 3)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::ReservationConflict { reservation_id } if reservation_id == rid
    ));
}

#[tokio::test]
async fn expired_hold_does_not_contest() {
    let engine = new_engine("hold_expired_free.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let mut short = hold_request(Some("Deluxe"), None, days(0, 2));
    short.ttl_ms = Some(1);
    engine.place_hold(short).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    // The stale hold no longer blocks, even before any sweep ran.
    engine
        .place_hold(hold_request(Some("Deluxe"), None, days(0, 2)))
        .await
        .unwrap();
}

#[tokio::test]
async fn holds_with_different_targets_coexist() {
    let engine = new_engine("hold_targets.wal");
    let (_, rooms) = seed_hotel(&engine, "Deluxe", &["101", "102"]).await;

    engine
        .place_hold(hold_request(None, Some(rooms[0]), days(0, 2)))
        .await
        .unwrap();
    // Same dates, different unit: no contention.
    engine
        .place_hold(hold_request(None, Some(rooms[1]), days(0, 2)))
        .await
        .unwrap();
    // Disjoint dates on the held unit: fine too.
    engine
        .place_hold(hold_request(None, Some(rooms[0]), days(3, 4)))
        .await
        .unwrap();
}

#[tokio::test]
async fn confirm_hold_creates_reserved_reservation() {
    let engine = new_engine("hold_confirm.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let receipt = engine
        .place_hold(hold_request(Some("Deluxe"), None, days(0, 2)))
        .await
        .unwrap();
    let rid = Ulid::new();
    engine.confirm_hold(receipt.hold_id, rid).await.unwrap();

    let r = engine.get_reservation(rid).await.unwrap();
    assert_eq!(r.status, ReservationStatus::Reserved);
    assert_eq!(r.window, days(0, 2));
    assert_eq!(r.requested_type.as_deref(), Some("Deluxe"));
    assert_eq!(r.guests, 2);

    let hold = engine.get_hold(receipt.hold_id).await.unwrap();
    assert_eq!(hold.status, HoldStatus::Confirmed);

    // Confirming again is fatal, with the settled status in the error.
    let err = engine
        .confirm_hold(receipt.hold_id, Ulid::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::HoldNotPending {
            status: HoldStatus::Confirmed,
            ..
        }
    ));
}

#[tokio::test]
async fn confirm_expired_hold_is_fatal() {
    let engine = new_engine("hold_confirm_expired.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let mut short = hold_request(Some("Deluxe"), None, days(0, 2));
    short.ttl_ms = Some(1);
    let receipt = engine.place_hold(short).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let err = engine
        .confirm_hold(receipt.hold_id, Ulid::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::HoldExpired { .. }));
}

#[tokio::test]
async fn cancelled_hold_is_terminal() {
    let engine = new_engine("hold_cancel.wal");
    seed_hotel(&engine, "Deluxe", &["101"]).await;

    let receipt = engine
        .place_hold(hold_request(Some("Deluxe"), None, days(0, 2)))
        .await
        .unwrap();
    engine.cancel_hold(receipt.hold_id).await.unwrap();

    let hold = engine.get_hold(receipt.hold_id).await.unwrap();
    assert_eq!(hold.status, HoldStatus::Cancelled);

    let err = engine.cancel_hold(receipt.hold_id).await.unwrap_err();
    assert!(matches!(err, EngineError::HoldNotPending { .. }));
    let err = engine
        .confirm_hold(receipt.hold_id, Ulid::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::HoldNotPending { .. }));

    // The slot is free again.
    engine
        .place_hold(hold_request(Some("Deluxe"), None, days(0, 2)))
        .await
        .unwrap();
}

#[tokio::test]
async fn active_holds_view_hides_expired() {
    let engine = new_engine("hold_active_view.wal");
    let (type_id, _) = seed_hotel(&engine, "Deluxe", &["101"]).await;

    let mut short = hold_request(Some("Deluxe"), None, days(0, 2));
    short.ttl_ms = Some(1);
    let stale = engine.place_hold(short).await.unwrap();
    let live = engine
        .place_hold(hold_request(Some("Deluxe"), None, days(5, 6)))
        .await
        .unwrap();

    let now = stale.expires_at + 10;
    let active = engine.active_holds(Some(type_id), now).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, live.hold_id);
}

// ── Pricing through the engine ───────────────────────────

#[tokio::test]
async fn quote_uses_linked_rate_type() {
    let engine = new_engine("quote_rate_type.wal");

    let rate_id = Ulid::new();
    engine
        .create_rate_type(rate_id, "standard".into(), dec!(10), dec!(5))
        .await
        .unwrap();

    let type_id = Ulid::new();
    engine
        .create_facility_type(
            type_id,
            "Deluxe".into(),
            FacilityCategory::Hotel,
            dec!(100),
            Some(rate_id),
            hotel_meta("KING_BED", 2),
        )
        .await
        .unwrap();

    let quote = engine
        .quote("Deluxe", days(0, 2), PriceUnit::Night, None)
        .await
        .unwrap();
    assert_eq!(quote.units, 2);
    assert_eq!(quote.subtotal, dec!(200));
    assert_eq!(quote.discount_amount, dec!(10));
    assert_eq!(quote.tax_amount, dec!(19));
    assert_eq!(quote.total, dec!(209.00));

    // Override price beats the stored one; rates still apply.
    let quote = engine
        .quote("Deluxe", days(0, 2), PriceUnit::Night, Some(dec!(50)))
        .await
        .unwrap();
    assert_eq!(quote.subtotal, dec!(100));
    assert_eq!(quote.total, dec!(104.50));
}

#[tokio::test]
async fn quote_unknown_type_fails() {
    let engine = new_engine("quote_unknown.wal");
    let err = engine
        .quote("Nowhere", days(0, 1), PriceUnit::Night, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownFacilityType(_)));
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn restart_replays_full_state() {
    let path = test_wal_path("replay_state.wal");

    let rid;
    let hold_id;
    let assigned_facility;
    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        seed_hotel(&engine, "Deluxe", &["101", "102"]).await;
        rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
        assigned_facility = engine.assign_facility(rid, None).await.unwrap().facility_id;
        let receipt = engine
            .place_hold(hold_request(Some("Deluxe"), None, days(5, 6)))
            .await
            .unwrap();
        hold_id = receipt.hold_id;
        engine.cancel_hold(hold_id).await.unwrap();
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();

    let r = engine.get_reservation(rid).await.unwrap();
    assert_eq!(r.facility_id, Some(assigned_facility));
    assert_eq!(r.status, ReservationStatus::Reserved);

    let hold = engine.get_hold(hold_id).await.unwrap();
    assert_eq!(hold.status, HoldStatus::Cancelled);

    // Assignment stays idempotent across restarts.
    let again = engine.assign_facility(rid, None).await.unwrap();
    assert!(again.already_assigned);
    assert_eq!(again.facility_id, assigned_facility);

    let avail = engine
        .check_availability(days(0, 2), TypeSelector::All, None, &[])
        .await
        .unwrap();
    assert_eq!(avail[0].total_count, 2);
    assert_eq!(avail[0].available_count, 1);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_state.wal");

    let rid;
    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        seed_hotel(&engine, "Deluxe", &["101"]).await;
        rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;
        engine.assign_facility(rid, None).await.unwrap();

        assert!(engine.wal_appends_since_compact().await > 0);
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let r = engine.get_reservation(rid).await.unwrap();
    assert!(r.facility_id.is_some());
    assert_eq!(engine.list_facility_types().await.len(), 1);
}

// ── Notifications ────────────────────────────────────────

#[tokio::test]
async fn mutations_publish_events() {
    let engine = new_engine("notify_events.wal");
    let (type_id, _) = seed_hotel(&engine, "Deluxe", &["101"]).await;

    let mut rx = engine.notify.subscribe(type_id);
    let rid = type_reservation(&engine, "Deluxe", days(0, 2), ReservationStatus::Reserved).await;

    match rx.recv().await.unwrap() {
        Event::ReservationCreated { reservation } => {
            assert_eq!(reservation.id, rid);
        }
        other => panic!("expected ReservationCreated, got {other:?}"),
    }

    engine.assign_facility(rid, None).await.unwrap();
    match rx.recv().await.unwrap() {
        Event::FacilityAssigned { reservation_id, .. } => {
            assert_eq!(reservation_id, rid);
        }
        other => panic!("expected FacilityAssigned, got {other:?}"),
    }
}
