//! Splitting collected interest between the funder and the platform.
//!
//! The order of the steps is fixed: surcharge and waivers move the funder
//! figure first, the platform fee is derived from that figure, and only then
//! does the alternate mode add its surcharge. A zero-rate funder ends with
//! nothing, and the spread is whatever remains.

use crate::calculation::classify::FunderType;
use crate::core::money::truncate_2dp;
use crate::core::trade::TradeRecord;
use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform fee rate applied to the funder's interest.
pub const PLATFORM_FEE_RATE: Decimal = dec!(0.01);

/// Which allocation branch runs.
///
/// `Xdj` is the small-merchant programme: waived interest is not charged to
/// the funder and surcharge is added after the platform fee is fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationMode {
    #[default]
    Standard,
    Xdj,
}

impl fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AllocationMode::Standard => "Standard",
            AllocationMode::Xdj => "Xdj",
        })
    }
}

impl FromStr for AllocationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(AllocationMode::Standard),
            "xdj" => Ok(AllocationMode::Xdj),
            other => Err(format!("unknown allocation mode '{other}'")),
        }
    }
}

/// Amounts after allocation. `waived_*` are positive costs here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub waived_interest: Decimal,
    pub waived_bank_charge: Decimal,
    pub funder_interest: Decimal,
    pub platform_fee: Decimal,
    pub spreading: Decimal,
}

/// Waived bank charge is absorbed by a main funder only when their share
/// covers it.
fn absorb_bank_charge(funder_interest: Decimal, waived_bank_charge: Decimal, funder: FunderType) -> Decimal {
    if funder_interest >= waived_bank_charge && funder == FunderType::Main {
        funder_interest - waived_bank_charge
    } else {
        funder_interest
    }
}

/// Allocate accrued interest for one trade.
///
/// `funder_interest` is the funder's accrued share before any surcharge or
/// waiver. A recorded platform fee only flags that a fee applies; its amount
/// is always re-derived as 1% of the funder figure, truncated to cents.
pub fn allocate(
    trade: &TradeRecord,
    funder: FunderType,
    mode: AllocationMode,
    sme_interest: Decimal,
    overdue_interest: Decimal,
    funder_interest: Decimal,
) -> Allocation {
    let waived_interest = -(trade.waived_sme_interest + trade.waived_sme_overdue_interest);
    let waived_bank_charge = -trade.waived_bank_charge;
    let surcharge = trade.surcharge_total;

    let mut funder_interest = funder_interest;
    if mode == AllocationMode::Standard {
        funder_interest += surcharge - waived_interest;
        funder_interest = absorb_bank_charge(funder_interest, waived_bank_charge, funder);
    }

    let platform_fee = if trade.platform_fee.is_zero() {
        Decimal::ZERO
    } else {
        // Booked in cents, as the recorded LMS fee is.
        truncate_2dp(funder_interest * PLATFORM_FEE_RATE)
    };

    if mode == AllocationMode::Xdj {
        funder_interest += surcharge;
        funder_interest = absorb_bank_charge(funder_interest, waived_bank_charge, funder);
    }

    if funder == FunderType::Zero {
        funder_interest = Decimal::ZERO;
    }

    let spreading = sme_interest + overdue_interest + surcharge
        - waived_bank_charge
        - waived_interest
        - funder_interest;

    debug!(
        "allocation ({}): funder {} fee {} spread {}",
        mode, funder_interest, platform_fee, spreading
    );

    Allocation {
        waived_interest,
        waived_bank_charge,
        funder_interest,
        platform_fee,
        spreading,
    }
}
