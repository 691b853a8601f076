//! Platform fee schedule.
//!
//! Amounts are integer minor units (pence, cents). The fee is computed once from the
//! gross amount and the payee share is whatever remains, so the split never leaks a unit.

use serde::{Deserialize, Serialize};

/// A versioned fee function. The version is persisted on every payment so a historic
/// split can be explained after the rate changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub version: u16,
    /// Proportional fee in basis points (1000 = 10%).
    pub rate_bps: u32,
    /// Flat fee added per order, in minor units.
    pub fixed_minor: i64,
}

/// Result of applying a [`FeeSchedule`] to a gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: i64,
    pub platform_fee: i64,
    pub payee_share: i64,
    pub fee_version: u16,
}

impl FeeSchedule {
    pub const CURRENT_VERSION: u16 = 1;

    pub fn v1(rate_bps: u32, fixed_minor: i64) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            rate_bps,
            fixed_minor,
        }
    }

    /// Platform fee for `gross`, rounded half-up and capped at `gross`.
    pub fn platform_fee(&self, gross: i64) -> i64 {
        if gross <= 0 {
            return 0;
        }
        let proportional = (i128::from(gross) * i128::from(self.rate_bps) + 5_000) / 10_000;
        let fee = proportional + i128::from(self.fixed_minor.max(0));
        // capped at gross, so the narrowing cast cannot overflow
        fee.min(i128::from(gross)) as i64
    }

    pub fn split(&self, gross: i64) -> FeeSplit {
        let platform_fee = self.platform_fee(gross);
        FeeSplit {
            gross,
            platform_fee,
            payee_share: gross - platform_fee,
            fee_version: self.version,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::v1(1_000, 0)
    }
}
