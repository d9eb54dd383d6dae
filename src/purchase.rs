//! Buyer purchase eligibility
//!
//! Each buyer trust level carries a daily cap. A purchase is rejected when
//! its price exceeds the cap. Spend-to-date is not tracked, so the check is a
//! single comparison.

use serde::{Deserialize, Serialize};

use crate::market::{Buyer, VerificationFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyerTrustLevel {
    Unverified,
    Basic,
    Verified,
    Trusted,
}

impl BuyerTrustLevel {
    pub fn from_flags(flags: &VerificationFlags) -> Self {
        match (flags.email_verified, flags.phone_verified) {
            (true, true) if flags.student_confirmed => BuyerTrustLevel::Trusted,
            (true, true) => BuyerTrustLevel::Verified,
            (true, false) | (false, true) => BuyerTrustLevel::Basic,
            (false, false) => BuyerTrustLevel::Unverified,
        }
    }

    pub fn for_buyer(buyer: &Buyer) -> Self {
        Self::from_flags(&buyer.flags)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuyerTrustLevel::Unverified => "unverified",
            BuyerTrustLevel::Basic => "basic",
            BuyerTrustLevel::Verified => "verified",
            BuyerTrustLevel::Trusted => "trusted",
        }
    }
}

/// Daily caps per level. `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLimits {
    pub basic: f64,
    pub verified: f64,
    pub trusted: Option<f64>,
}

impl Default for PurchaseLimits {
    fn default() -> Self {
        Self {
            basic: 100.0,
            verified: 500.0,
            trusted: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseDecision {
    pub approved: bool,
    pub level: BuyerTrustLevel,
    /// `None` when the level has no cap
    pub daily_cap: Option<f64>,
    pub amount: f64,
    pub reason: String,
    /// Verification steps that would raise the cap
    pub next_steps: Vec<String>,
}

impl PurchaseLimits {
    pub fn daily_cap(&self, level: BuyerTrustLevel) -> Option<f64> {
        match level {
            BuyerTrustLevel::Unverified => Some(0.0),
            BuyerTrustLevel::Basic => Some(self.basic),
            BuyerTrustLevel::Verified => Some(self.verified),
            BuyerTrustLevel::Trusted => self.trusted,
        }
    }

    pub fn check(&self, flags: &VerificationFlags, amount: f64) -> PurchaseDecision {
        let level = BuyerTrustLevel::from_flags(flags);
        let daily_cap = self.daily_cap(level);

        let approved = match daily_cap {
            Some(cap) => amount <= cap,
            None => true,
        };

        let reason = match daily_cap {
            _ if approved => "Purchase allowed".to_string(),
            Some(cap) if cap > 0.0 => format!(
                "Amount {:.2} exceeds the daily limit of {:.2} for {} buyers",
                amount,
                cap,
                level.as_str()
            ),
            _ => "Verify your email or phone number before purchasing".to_string(),
        };

        PurchaseDecision {
            approved,
            level,
            daily_cap,
            amount,
            reason,
            next_steps: if approved { Vec::new() } else { next_steps(flags) },
        }
    }
}

fn next_steps(flags: &VerificationFlags) -> Vec<String> {
    let mut steps = Vec::new();
    if !flags.email_verified {
        steps.push("Verify your email address".to_string());
    }
    if !flags.phone_verified {
        steps.push("Verify your phone number".to_string());
    }
    if !flags.student_confirmed {
        steps.push("Confirm your student status".to_string());
    }
    steps
}
