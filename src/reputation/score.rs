//! Reputation Score and Trust Tiers
//!
//! The score is built from verification flags plus transaction history and
//! is capped at 100. The tier is derived from the flags and the score only.

use serde::{Deserialize, Serialize};

use crate::market::VerificationFlags;

/// Upper bound of the reputation score
pub const MAX_SCORE: u32 = 100;

/// Aggregated seller history fed into the score
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrustInputs {
    pub flags: VerificationFlags,
    /// Average review rating (0.0 - 5.0), 0 when no reviews exist
    pub avg_rating: f64,
    pub review_count: u32,
    pub completed_orders: u32,
    pub active_products: u32,
}

/// Per-component points, useful for showing sellers where their score comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub email: u32,
    pub phone: u32,
    pub student: u32,
    pub safety: u32,
    pub anti_scam: u32,
    pub rating: u32,
    pub orders: u32,
    pub products: u32,
    /// Sum of the components, capped at 100
    pub total: u32,
}

impl ScoreBreakdown {
    pub fn score(&self) -> u8 {
        self.total as u8
    }
}

fn points(flag: bool, weight: u32) -> u32 {
    if flag { weight } else { 0 }
}

/// Compute the reputation score for a seller
pub fn compute_score(inputs: &TrustInputs) -> ScoreBreakdown {
    let flags = &inputs.flags;

    let avg_rating = if inputs.avg_rating.is_finite() {
        inputs.avg_rating.clamp(0.0, 5.0)
    } else {
        0.0
    };

    let email = points(flags.email_verified, 20);
    let phone = points(flags.phone_verified, 15);
    let student = points(flags.student_confirmed, 25);
    let safety = points(flags.safety_confirmed, 10);
    let anti_scam = points(flags.anti_scam_confirmed, 10);
    let rating = (4.0 * avg_rating).round() as u32;
    let orders = inputs.completed_orders.saturating_mul(2).min(30);
    let products = inputs.active_products.min(10);

    let sum = email + phone + student + safety + anti_scam + rating + orders + products;

    ScoreBreakdown {
        email,
        phone,
        student,
        safety,
        anti_scam,
        rating,
        orders,
        products,
        total: sum.min(MAX_SCORE),
    }
}

/// Seller trust tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Probation,
    Basic,
    Verified,
    Trusted,
}

impl Default for TrustTier {
    fn default() -> Self {
        TrustTier::Probation
    }
}

impl TrustTier {
    /// Minimum score for the tier
    pub fn min_score(&self) -> u8 {
        match self {
            TrustTier::Probation => 0,
            TrustTier::Basic => 40,
            TrustTier::Verified => 60,
            TrustTier::Trusted => 80,
        }
    }

    /// Whether the flags satisfy the tier's verification requirements
    fn flags_satisfied(&self, flags: &VerificationFlags) -> bool {
        match self {
            TrustTier::Probation => true,
            TrustTier::Basic => flags.has_base(),
            TrustTier::Verified => flags.has_base() && flags.student_confirmed,
            TrustTier::Trusted => {
                flags.has_base() && flags.student_confirmed && flags.safety_confirmed
            }
        }
    }

    /// Highest tier whose score and flag requirements are met
    pub fn evaluate(flags: &VerificationFlags, score: u8) -> TrustTier {
        [TrustTier::Trusted, TrustTier::Verified, TrustTier::Basic]
            .into_iter()
            .find(|tier| score >= tier.min_score() && tier.flags_satisfied(flags))
            .unwrap_or(TrustTier::Probation)
    }

    pub fn next(&self) -> Option<TrustTier> {
        match self {
            TrustTier::Probation => Some(TrustTier::Basic),
            TrustTier::Basic => Some(TrustTier::Verified),
            TrustTier::Verified => Some(TrustTier::Trusted),
            TrustTier::Trusted => None,
        }
    }

    /// What is still missing before the given flags and score reach this tier
    pub fn missing_requirements(&self, flags: &VerificationFlags, score: u8) -> Vec<String> {
        let mut missing = Vec::new();

        if *self >= TrustTier::Basic {
            if !flags.email_verified {
                missing.push("Verify your email address".to_string());
            }
            if !flags.phone_verified {
                missing.push("Verify your phone number".to_string());
            }
        }
        if *self >= TrustTier::Verified && !flags.student_confirmed {
            missing.push("Confirm your student status".to_string());
        }
        if *self >= TrustTier::Trusted && !flags.safety_confirmed {
            missing.push("Accept the safety guidelines".to_string());
        }
        if score < self.min_score() {
            missing.push(format!(
                "Reach a reputation score of {} (currently {})",
                self.min_score(),
                score
            ));
        }

        missing
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Probation => "probation",
            TrustTier::Basic => "basic",
            TrustTier::Verified => "verified",
            TrustTier::Trusted => "trusted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "probation" => Some(TrustTier::Probation),
            "basic" => Some(TrustTier::Basic),
            "verified" => Some(TrustTier::Verified),
            "trusted" => Some(TrustTier::Trusted),
            _ => None,
        }
    }
}
