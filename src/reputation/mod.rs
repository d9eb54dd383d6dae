//! Seller Reputation and Trust Tiers
//!
//! Scores sellers from verification flags plus transaction history and maps
//! the result to a trust tier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────────┐     ┌─────────────────┐
//! │ MarketStore     │────►│ ReputationManager │────►│ SellerReport    │
//! │ (reviews,orders,│     │ (aggregates,      │     │ (breakdown,     │
//! │  listings)      │     │  persists)        │     │  tier, next)    │
//! └─────────────────┘     └───────────────────┘     └─────────────────┘
//!                                  │
//!                                  ▼
//!                          ┌──────────────────┐
//!                          │ compute_score    │
//!                          │ TrustTier        │
//!                          │ (pure functions) │
//!                          └──────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - Verification flags: email 20, phone 15, student 25, safety 10, anti-scam 10
//! - Average rating: round(4 × rating), at most 20
//! - Completed orders: 2 each, at most 30
//! - Active listings: 1 each, at most 10
//! - Total capped at 100

mod manager;
mod score;

pub use manager::{ReputationManager, SellerReport};
pub use score::{MAX_SCORE, ScoreBreakdown, TrustInputs, TrustTier, compute_score};
