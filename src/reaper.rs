use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Background task that periodically expires stale front-desk holds.
/// The engine never schedules itself; this timer is the external trigger.
pub async fn run_reaper(engine: Arc<Engine>, sweep_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
    loop {
        interval.tick().await;
        match engine.sweep_expired_holds(now_ms()).await {
            Ok(0) => {}
            Ok(n) => info!("expired {n} stale holds"),
            Err(e) => tracing::warn!("hold sweep failed: {e}"),
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("WAL compacted"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use rust_decimal_macros::dec;
    use ulid::Ulid;

    use crate::engine::HoldRequest;
    use crate::model::*;
    use crate::notify::NotifyHub;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("atrium_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn engine_with_court(path: PathBuf) -> (Arc<Engine>, Ulid) {
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let type_id = Ulid::new();
        engine
            .create_facility_type(
                type_id,
                "Padel Court".into(),
                FacilityCategory::SportsCourt,
                dec!(35),
                None,
                CategoryMetadata::SportsCourt {
                    sport: "padel".into(),
                    surface: None,
                    indoor: true,
                    amenities: vec![],
                },
            )
            .await
            .unwrap();
        (engine, type_id)
    }

    fn hold_request(type_name: &str, ttl_ms: Ms) -> HoldRequest {
        HoldRequest {
            id: Ulid::new(),
            facility_id: None,
            type_name: Some(type_name.into()),
            window: DateRange::new(1_700_000_000_000, 1_700_000_060_000),
            guest_id: "guest-1".into(),
            frontdesk_id: "agent-1".into(),
            session_id: "sess-1".into(),
            guests: 2,
            ttl_ms: Some(ttl_ms),
        }
    }

    #[tokio::test]
    async fn sweep_expires_stale_pending_holds() {
        let path = test_wal_path("sweep_expires.wal");
        let (engine, type_id) = engine_with_court(path).await;

        let receipt = engine
            .place_hold(hold_request("Padel Court", 1))
            .await
            .unwrap();

        let swept = engine
            .sweep_expired_holds(receipt.expires_at + 1)
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let hold = engine.get_hold(receipt.hold_id).await.unwrap();
        assert_eq!(hold.status, HoldStatus::Expired);

        // Gone from the active view.
        let active = engine
            .active_holds(Some(type_id), receipt.expires_at + 1)
            .await;
        assert!(active.is_empty());

        // A second sweep finds nothing.
        let swept_again = engine
            .sweep_expired_holds(receipt.expires_at + 1)
            .await
            .unwrap();
        assert_eq!(swept_again, 0);
    }

    #[tokio::test]
    async fn sweep_leaves_settled_holds_alone() {
        let path = test_wal_path("sweep_settled.wal");
        let (engine, _type_id) = engine_with_court(path).await;

        let receipt = engine
            .place_hold(hold_request("Padel Court", 60_000))
            .await
            .unwrap();
        engine
            .confirm_hold(receipt.hold_id, Ulid::new())
            .await
            .unwrap();

        // Long past expiry, a confirmed hold is untouched.
        let swept = engine
            .sweep_expired_holds(receipt.expires_at + 3_600_000)
            .await
            .unwrap();
        assert_eq!(swept, 0);

        let hold = engine.get_hold(receipt.hold_id).await.unwrap();
        assert_eq!(hold.status, HoldStatus::Confirmed);
    }
}
