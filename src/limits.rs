use crate::model::Ms;

// Entity bounds per organization.
pub const MAX_FACILITY_TYPES_PER_ORG: usize = 10_000;
pub const MAX_FACILITIES_PER_TYPE: usize = 50_000;
pub const MAX_RECORDS_PER_TYPE: usize = 500_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_BATCH_SIZE: usize = 256;
pub const MAX_FILTER_GROUPS: usize = 32;

// Timestamp sanity window: 2000-01-01 .. 2100-01-01 UTC, in ms.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest allowed booking window (2 years).
pub const MAX_RANGE_DURATION_MS: Ms = 2 * 365 * 86_400_000;

/// Widest allowed availability query window (2 years).
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * 365 * 86_400_000;

// Organization registry bounds.
pub const MAX_ORG_NAME_LEN: usize = 256;
pub const MAX_ORGS: usize = 256;

/// Transaction budget for a single auto-assignment.
pub const ASSIGN_TIMEOUT_MS: u64 = 10_000;

/// Transaction budget for a batch assignment.
pub const BATCH_ASSIGN_TIMEOUT_MS: u64 = 30_000;

/// Default front-desk hold lifetime (10 minutes).
pub const DEFAULT_HOLD_DURATION_MS: Ms = 10 * 60_000;
