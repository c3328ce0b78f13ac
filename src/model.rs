use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::pricing::Quote;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Inclusive date range `[start, end]`.
///
/// Booking windows are inclusive on both ends: a reservation ending at `t`
/// conflicts with one starting at `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Ms,
    pub end: Ms,
}

impl DateRange {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t <= self.end
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Processing,
    Reserved,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    /// Only confirmed, occupying reservations exclude a facility.
    pub fn blocks_availability(self) -> bool {
        matches!(self, Self::Reserved | Self::CheckedIn)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CheckedOut | Self::Cancelled | Self::NoShow)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Processing, Reserved)
                | (Processing, Cancelled)
                | (Reserved, CheckedIn)
                | (Reserved, Cancelled)
                | (Reserved, NoShow)
                | (CheckedIn, CheckedOut)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Reserved => "RESERVED",
            Self::CheckedIn => "CHECKED_IN",
            Self::CheckedOut => "CHECKED_OUT",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" => Some(Self::Processing),
            "RESERVED" => Some(Self::Reserved),
            "CHECKED_IN" => Some(Self::CheckedIn),
            "CHECKED_OUT" => Some(Self::CheckedOut),
            "CANCELLED" => Some(Self::Cancelled),
            "NO_SHOW" => Some(Self::NoShow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Refunded => "REFUNDED",
        }
    }
}

/// A booking. `window` is the blocking window used for all conflict
/// detection; `check_in`/`check_out` record the actual stay and never
/// narrow or replace the blocking window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub type_id: Ulid,
    /// Bound facility. `None` until auto-assignment on a type request.
    pub facility_id: Option<Ulid>,
    /// Facility type name as requested ("any room of this type").
    pub requested_type: Option<String>,
    pub window: DateRange,
    pub check_in: Option<Ms>,
    pub check_out: Option<Ms>,
    pub guests: u32,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub quote: Option<Quote>,
}

impl Reservation {
    pub fn blocks(&self, query: &DateRange) -> bool {
        self.status.blocks_availability() && self.window.overlaps(query)
    }
}

// ── Facility categories & metadata ───────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacilityCategory {
    Hotel,
    Gym,
    Restaurant,
    SportsCourt,
    ConferenceRoom,
    Parking,
    AmenitySpace,
    Other,
}

impl FacilityCategory {
    /// Allowed base-price band `[min, max]` for the category.
    pub fn price_band(self) -> (Decimal, Decimal) {
        match self {
            Self::Hotel => (dec!(10), dec!(100_000)),
            Self::Gym => (dec!(1), dec!(10_000)),
            Self::Restaurant => (dec!(1), dec!(50_000)),
            Self::SportsCourt => (dec!(1), dec!(20_000)),
            Self::ConferenceRoom => (dec!(5), dec!(100_000)),
            Self::Parking => (dec!(0), dec!(5_000)),
            Self::AmenitySpace => (dec!(0), dec!(10_000)),
            Self::Other => (dec!(0), dec!(1_000_000)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hotel => "HOTEL",
            Self::Gym => "GYM",
            Self::Restaurant => "RESTAURANT",
            Self::SportsCourt => "SPORTS_COURT",
            Self::ConferenceRoom => "CONFERENCE_ROOM",
            Self::Parking => "PARKING",
            Self::AmenitySpace => "AMENITY_SPACE",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOTEL" => Some(Self::Hotel),
            "GYM" => Some(Self::Gym),
            "RESTAURANT" => Some(Self::Restaurant),
            "SPORTS_COURT" => Some(Self::SportsCourt),
            "CONFERENCE_ROOM" => Some(Self::ConferenceRoom),
            "PARKING" => Some(Self::Parking),
            "AMENITY_SPACE" => Some(Self::AmenitySpace),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Category-specific payload. The variant tag is the category: a
/// `FacilityType` cannot be constructed with a payload that disagrees
/// with its declared category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryMetadata {
    Hotel {
        bed_type: String,
        bed_count: u32,
        max_occupancy: u32,
        #[serde(default)]
        amenities: Vec<String>,
        #[serde(default)]
        features: Vec<String>,
    },
    Gym {
        max_occupancy: u32,
        #[serde(default)]
        equipment: Vec<String>,
        #[serde(default)]
        amenities: Vec<String>,
    },
    Restaurant {
        seating_capacity: u32,
        #[serde(default)]
        cuisine: Option<String>,
        #[serde(default)]
        amenities: Vec<String>,
    },
    SportsCourt {
        sport: String,
        #[serde(default)]
        surface: Option<String>,
        #[serde(default)]
        indoor: bool,
        #[serde(default)]
        amenities: Vec<String>,
    },
    ConferenceRoom {
        max_occupancy: u32,
        #[serde(default)]
        av_equipment: Vec<String>,
        #[serde(default)]
        amenities: Vec<String>,
        #[serde(default)]
        features: Vec<String>,
    },
    Parking {
        #[serde(default)]
        vehicle_type: Option<String>,
        #[serde(default)]
        covered: bool,
    },
    AmenitySpace {
        max_occupancy: u32,
        #[serde(default)]
        amenities: Vec<String>,
    },
    Other {
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        amenities: Vec<String>,
    },
}

impl CategoryMetadata {
    pub fn category(&self) -> FacilityCategory {
        match self {
            Self::Hotel { .. } => FacilityCategory::Hotel,
            Self::Gym { .. } => FacilityCategory::Gym,
            Self::Restaurant { .. } => FacilityCategory::Restaurant,
            Self::SportsCourt { .. } => FacilityCategory::SportsCourt,
            Self::ConferenceRoom { .. } => FacilityCategory::ConferenceRoom,
            Self::Parking { .. } => FacilityCategory::Parking,
            Self::AmenitySpace { .. } => FacilityCategory::AmenitySpace,
            Self::Other { .. } => FacilityCategory::Other,
        }
    }

    pub fn amenities(&self) -> &[String] {
        match self {
            Self::Hotel { amenities, .. }
            | Self::Gym { amenities, .. }
            | Self::Restaurant { amenities, .. }
            | Self::SportsCourt { amenities, .. }
            | Self::ConferenceRoom { amenities, .. }
            | Self::AmenitySpace { amenities, .. }
            | Self::Other { amenities, .. } => amenities,
            Self::Parking { .. } => &[],
        }
    }

    pub fn features(&self) -> &[String] {
        match self {
            Self::Hotel { features, .. } | Self::ConferenceRoom { features, .. } => features,
            _ => &[],
        }
    }

    pub fn bed_type(&self) -> Option<&str> {
        match self {
            Self::Hotel { bed_type, .. } => Some(bed_type),
            _ => None,
        }
    }

    pub fn max_occupancy(&self) -> Option<u32> {
        match self {
            Self::Hotel { max_occupancy, .. }
            | Self::Gym { max_occupancy, .. }
            | Self::ConferenceRoom { max_occupancy, .. }
            | Self::AmenitySpace { max_occupancy, .. } => Some(*max_occupancy),
            Self::Restaurant { seating_capacity, .. } => Some(*seating_capacity),
            _ => None,
        }
    }
}

/// Named tax/discount policy, optionally linked from a facility type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateType {
    pub id: Ulid,
    pub name: String,
    pub default_tax: Decimal,
    pub default_discount: Decimal,
}

/// A category of bookable units sharing a price and metadata shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityType {
    pub id: Ulid,
    pub name: String,
    pub category: FacilityCategory,
    pub price: Decimal,
    pub rate_type_id: Option<Ulid>,
    pub metadata: CategoryMetadata,
}

impl FacilityType {
    /// Construction is the validation boundary: the metadata variant must
    /// match the declared category and the price must sit inside the
    /// category band.
    pub fn new(
        id: Ulid,
        name: String,
        category: FacilityCategory,
        price: Decimal,
        rate_type_id: Option<Ulid>,
        metadata: CategoryMetadata,
    ) -> Result<Self, &'static str> {
        if metadata.category() != category {
            return Err("metadata payload does not match declared category");
        }
        let (min, max) = category.price_band();
        if price < min || price > max {
            return Err("price outside category band");
        }
        Ok(Self {
            id,
            name,
            category,
            price,
            rate_type_id,
            metadata,
        })
    }
}

/// A single bookable unit (a room, court, table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Ulid,
    pub type_id: Ulid,
    pub name: String,
    pub location: Option<String>,
    /// Free-form unit detail (room number, floor, ...).
    pub details: Option<String>,
    /// Soft delete. Retired units never count toward availability.
    pub retired: bool,
}

// ── Maintenance ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaintenanceStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl MaintenanceStatus {
    pub fn blocks_availability(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// The three source shapes of a maintenance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaintenanceWindow {
    /// Closed range `[start, end]`.
    Range(DateRange),
    /// Started, no scheduled end: blocks everything from `start` on.
    OpenEnded { start: Ms },
    /// Single-day marker.
    Day { date: Ms },
}

impl MaintenanceWindow {
    pub fn blocks(&self, query: &DateRange) -> bool {
        match *self {
            Self::Range(r) => r.overlaps(query),
            Self::OpenEnded { start } => start <= query.end,
            Self::Day { date } => query.contains_instant(date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub type_id: Ulid,
    pub status: MaintenanceStatus,
    pub window: MaintenanceWindow,
}

impl MaintenanceRecord {
    pub fn blocks(&self, query: &DateRange) -> bool {
        self.status.blocks_availability() && self.window.blocks(query)
    }
}

// ── Temporary holds ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl HoldStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

/// Short-lived front-desk soft lock on a facility (or a whole type) for
/// a date range. Never mutated after reaching a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryReservation {
    pub id: Ulid,
    pub type_id: Ulid,
    pub facility_id: Option<Ulid>,
    pub requested_type: Option<String>,
    pub window: DateRange,
    pub guest_id: String,
    pub frontdesk_id: String,
    pub session_id: String,
    pub guests: u32,
    pub status: HoldStatus,
    pub expires_at: Ms,
}

impl TemporaryReservation {
    pub fn is_active(&self, now: Ms) -> bool {
        self.status == HoldStatus::Pending && self.expires_at > now
    }

    /// True when both holds contend for the same unit: the same facility,
    /// or the same whole type for type-level holds.
    pub fn same_target(&self, facility_id: Option<Ulid>) -> bool {
        match (self.facility_id, facility_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

// ── Availability filters ─────────────────────────────────────────

/// One conjunctive filter group. Groups combine with OR at query level.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub bed_type: Option<String>,
    #[serde(default)]
    pub max_occupancy: Option<u32>,
}

impl FilterGroup {
    /// AND within the group: every present constraint must hold.
    pub fn matches(&self, metadata: &CategoryMetadata) -> bool {
        let amenities = metadata.amenities();
        if !self.amenities.iter().all(|a| amenities.contains(a)) {
            return false;
        }
        let features = metadata.features();
        if !self.features.iter().all(|f| features.contains(f)) {
            return false;
        }
        if let Some(ref bed) = self.bed_type
            && metadata.bed_type() != Some(bed.as_str()) {
                return false;
            }
        if let Some(min) = self.max_occupancy
            && !metadata.max_occupancy().is_some_and(|m| m >= min) {
                return false;
            }
        true
    }
}

// ── The event types — flat, no nesting. This is the WAL record format. ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RateTypeCreated {
        rate: RateType,
    },
    FacilityTypeCreated {
        facility_type: FacilityType,
    },
    FacilityCreated {
        facility: Facility,
    },
    FacilityRetired {
        id: Ulid,
        type_id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationWindowChanged {
        id: Ulid,
        type_id: Ulid,
        window: DateRange,
    },
    ReservationStatusChanged {
        id: Ulid,
        type_id: Ulid,
        status: ReservationStatus,
    },
    StayRecorded {
        id: Ulid,
        type_id: Ulid,
        check_in: Option<Ms>,
        check_out: Option<Ms>,
    },
    FacilityAssigned {
        reservation_id: Ulid,
        type_id: Ulid,
        facility_id: Ulid,
    },
    MaintenanceScheduled {
        record: MaintenanceRecord,
    },
    MaintenanceStatusChanged {
        id: Ulid,
        type_id: Ulid,
        status: MaintenanceStatus,
    },
    HoldPlaced {
        hold: TemporaryReservation,
    },
    HoldConfirmed {
        id: Ulid,
        type_id: Ulid,
        reservation: Reservation,
    },
    HoldCancelled {
        id: Ulid,
        type_id: Ulid,
    },
    HoldsSwept {
        type_id: Ulid,
        hold_ids: Vec<Ulid>,
    },
}

impl Event {
    /// Shard the event belongs to. `None` for engine-global events.
    pub fn type_id(&self) -> Option<Ulid> {
        match self {
            Event::RateTypeCreated { .. } | Event::FacilityTypeCreated { .. } => None,
            Event::FacilityCreated { facility } => Some(facility.type_id),
            Event::FacilityRetired { type_id, .. }
            | Event::ReservationWindowChanged { type_id, .. }
            | Event::ReservationStatusChanged { type_id, .. }
            | Event::StayRecorded { type_id, .. }
            | Event::FacilityAssigned { type_id, .. }
            | Event::MaintenanceStatusChanged { type_id, .. }
            | Event::HoldConfirmed { type_id, .. }
            | Event::HoldCancelled { type_id, .. }
            | Event::HoldsSwept { type_id, .. } => Some(*type_id),
            Event::ReservationCreated { reservation } => Some(reservation.type_id),
            Event::MaintenanceScheduled { record } => Some(record.type_id),
            Event::HoldPlaced { hold } => Some(hold.type_id),
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilitySummary {
    pub id: Ulid,
    pub name: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacilityTypeAvailability {
    pub type_id: Ulid,
    pub type_name: String,
    pub category: FacilityCategory,
    pub price: Decimal,
    pub total_count: usize,
    pub available_count: usize,
    pub reserved_count: usize,
    pub maintenance_count: usize,
    pub is_available: bool,
    pub available_facilities: Vec<FacilitySummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub reservation_id: Ulid,
    pub facility_id: Ulid,
    pub already_assigned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldReceipt {
    pub hold_id: Ulid,
    pub expires_at: Ms,
}
