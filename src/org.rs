use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::reaper;

/// Manages per-organization engines. Each organization gets its own
/// Engine + WAL + reaper + compactor.
/// Organization = database name from the pgwire connection.
pub struct OrgManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    sweep_secs: u64,
}

impl OrgManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, sweep_secs: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            sweep_secs,
        }
    }

    /// Get or lazily create an engine for the given organization.
    pub fn get_or_create(&self, org: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(org) {
            return Ok(engine.value().clone());
        }
        if org.len() > MAX_ORG_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "organization name too long",
            ));
        }
        if self.engines.len() >= MAX_ORGS {
            return Err(std::io::Error::other("too many organizations"));
        }

        // Sanitize the name to prevent path traversal
        let safe_name: String = org
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty organization name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify)?);

        // Spawn reaper + compactor for this organization
        let reaper_engine = engine.clone();
        let sweep_secs = self.sweep_secs;
        tokio::spawn(async move {
            reaper::run_reaper(reaper_engine, sweep_secs).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(org.to_string(), engine.clone());
        metrics::gauge!(crate::observability::ORGS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use rust_decimal_macros::dec;
    use ulid::Ulid;

    use crate::engine::TypeSelector;
    use crate::model::*;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("atrium_test_org").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn seed_court(engine: &Engine, type_id: Ulid) {
        engine
            .create_facility_type(
                type_id,
                "Court".into(),
                FacilityCategory::SportsCourt,
                dec!(35),
                None,
                CategoryMetadata::SportsCourt {
                    sport: "tennis".into(),
                    surface: Some("clay".into()),
                    indoor: false,
                    amenities: vec![],
                },
            )
            .await
            .unwrap();
        engine
            .create_facility(Ulid::new(), type_id, "Court 1".into(), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn org_isolation() {
        let dir = test_data_dir("isolation");
        let om = OrgManager::new(dir, 1000, 60);

        let eng_a = om.get_or_create("org_a").unwrap();
        let eng_b = om.get_or_create("org_b").unwrap();

        let type_id = Ulid::new();

        // Create the same type ID in both organizations, facilities only in A
        seed_court(&eng_a, type_id).await;
        eng_b
            .create_facility_type(
                type_id,
                "Court".into(),
                FacilityCategory::SportsCourt,
                dec!(35),
                None,
                CategoryMetadata::SportsCourt {
                    sport: "tennis".into(),
                    surface: None,
                    indoor: false,
                    amenities: vec![],
                },
            )
            .await
            .unwrap();

        let q = DateRange::new(1_700_000_000_000, 1_700_000_060_000);
        let avail_a = eng_a
            .check_availability(q, TypeSelector::ById(type_id), None, &[])
            .await
            .unwrap();
        assert_eq!(avail_a[0].total_count, 1);
        assert!(avail_a[0].is_available);

        // Org B's type has no facilities
        let avail_b = eng_b
            .check_availability(q, TypeSelector::ById(type_id), None, &[])
            .await
            .unwrap();
        assert_eq!(avail_b[0].total_count, 0);
        assert!(!avail_b[0].is_available);
    }

    #[tokio::test]
    async fn org_lazy_creation() {
        let dir = test_data_dir("lazy");
        let om = OrgManager::new(dir.clone(), 1000, 60);

        // No WAL files should exist yet
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert!(entries.is_empty());

        // Create an organization
        let _eng = om.get_or_create("seaside_resort").unwrap();

        // WAL file should now exist
        assert!(dir.join("seaside_resort.wal").exists());
    }

    #[tokio::test]
    async fn org_same_engine_returned() {
        let dir = test_data_dir("same_eng");
        let om = OrgManager::new(dir, 1000, 60);

        let eng1 = om.get_or_create("foo").unwrap();
        let eng2 = om.get_or_create("foo").unwrap();

        // Should be the same Arc
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn org_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let om = OrgManager::new(dir.clone(), 1000, 60);

        // Path traversal attempt
        let _eng = om.get_or_create("../evil").unwrap();
        // Should create "evil.wal", not "../evil.wal"
        assert!(dir.join("evil.wal").exists());

        // Empty after sanitization
        let result = om.get_or_create("../..");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn org_name_too_long() {
        let dir = test_data_dir("name_too_long");
        let om = OrgManager::new(dir, 1000, 60);

        let long_name = "x".repeat(MAX_ORG_NAME_LEN + 1);
        let result = om.get_or_create(&long_name);
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("organization name too long"));
    }

    #[tokio::test]
    async fn org_count_limit() {
        let dir = test_data_dir("count_limit");
        let om = OrgManager::new(dir, 1000, 60);

        for i in 0..MAX_ORGS {
            om.get_or_create(&format!("o{i}")).unwrap();
        }
        let result = om.get_or_create("one_more");
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("too many organizations"));
    }
}
