use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::model::{DateRange, FacilityType, Ms, RateType};

// ── Pricing Calculator ───────────────────────────────────────────

const HOUR_MS: Ms = 3_600_000;
const NIGHT_MS: Ms = 86_400_000;
const WEEK_MS: Ms = 7 * 86_400_000;
const MONTH_MS: Ms = 30 * 86_400_000;

/// Billing unit. A partial unit always counts as a full unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceUnit {
    Hour,
    Night,
    Week,
    Month,
}

impl Default for PriceUnit {
    fn default() -> Self {
        Self::Night
    }
}

impl PriceUnit {
    pub fn length_ms(self) -> Ms {
        match self {
            Self::Hour => HOUR_MS,
            Self::Night => NIGHT_MS,
            Self::Week => WEEK_MS,
            Self::Month => MONTH_MS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Night => "night",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Self::Hour),
            "night" | "day" => Some(Self::Night),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingError {
    EndNotAfterStart,
    RateOutOfRange(&'static str),
    MissingBasePrice,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::EndNotAfterStart => {
                write!(f, "quote window must end after it starts")
            }
            PricingError::RateOutOfRange(which) => {
                write!(f, "{which} must be a percentage between 0 and 100")
            }
            PricingError::MissingBasePrice => {
                write!(
                    f,
                    "no base price: supply an override price or a facility type"
                )
            }
        }
    }
}

impl std::error::Error for PricingError {}

/// Priced breakdown. Money fields are rounded to 2 decimal places at
/// output; everything upstream is exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub unit: PriceUnit,
    pub units: i64,
    pub base_price: Decimal,
    pub subtotal: Decimal,
    pub discount_rate: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Number of billable units in the window: `ceil((end - start) / unit)`.
pub fn duration_units(range: &DateRange, unit: PriceUnit) -> Result<i64, PricingError> {
    let span = range.duration_ms();
    if span <= 0 {
        return Err(PricingError::EndNotAfterStart);
    }
    let len = unit.length_ms();
    Ok((span + len - 1) / len)
}

/// Compute a quote. The discount applies to the subtotal; tax applies to
/// the post-discount amount. Rounding happens once, on the outputs.
pub fn calculate(
    base_price: Decimal,
    range: &DateRange,
    unit: PriceUnit,
    tax_rate: Decimal,
    discount_rate: Decimal,
) -> Result<Quote, PricingError> {
    if tax_rate < dec!(0) || tax_rate > dec!(100) {
        return Err(PricingError::RateOutOfRange("tax"));
    }
    if discount_rate < dec!(0) || discount_rate > dec!(100) {
        return Err(PricingError::RateOutOfRange("discount"));
    }

    let units = duration_units(range, unit)?;
    let subtotal = base_price * Decimal::from(units);
    let discount_amount = subtotal * discount_rate / dec!(100);
    let after_discount = subtotal - discount_amount;
    let tax_amount = after_discount * tax_rate / dec!(100);
    let total = after_discount + tax_amount;

    Ok(Quote {
        unit,
        units,
        base_price,
        subtotal: round_money(subtotal),
        discount_rate,
        discount_amount: round_money(discount_amount),
        tax_rate,
        tax_amount: round_money(tax_amount),
        total: round_money(total),
    })
}

/// Resolved pricing inputs after the override/type/rate-type priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateInputs {
    pub base_price: Decimal,
    pub tax_rate: Decimal,
    pub discount_rate: Decimal,
}

/// Resolution priority: explicit override beats the type's stored price;
/// a linked rate type contributes tax/discount only. A bare rate type
/// with neither a type nor an override carries no price at all.
pub fn resolve_rates(
    override_price: Option<Decimal>,
    facility_type: Option<&FacilityType>,
    rate_type: Option<&RateType>,
) -> Result<RateInputs, PricingError> {
    let base_price = override_price
        .or_else(|| facility_type.map(|ft| ft.price))
        .ok_or(PricingError::MissingBasePrice)?;
    let (tax_rate, discount_rate) = match rate_type {
        Some(rt) => (rt.default_tax, rt.default_discount),
        None => (dec!(0), dec!(0)),
    };
    Ok(RateInputs {
        base_price,
        tax_rate,
        discount_rate,
    })
}

/// Round to cents and pin the scale so money always prints as "x.yz".
fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
