//! Campus Market Trust Service
//!
//! Seller and buyer accounts, listings, orders and reviews for a campus
//! marketplace, with the verification and trust layer on top: phone and
//! email codes, student confirmation, seller reputation and trust tiers,
//! buyer purchase caps and fraud heuristics.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Server entrypoint
//! ├── config.rs       - Configuration management
//! ├── error.rs        - Error type and HTTP mapping
//! ├── purchase.rs     - Buyer trust levels and daily caps
//! ├── market/         - Accounts, sessions, listings
//! │   ├── models.rs    - Seller, buyer, product, order, review
//! │   ├── accounts.rs  - Registration, passwords, login
//! │   ├── sessions.rs  - Bearer token sessions
//! │   └── listings.rs  - Products, orders, reviews
//! ├── verification/   - Account verification
//! │   ├── code.rs      - One-time codes with TTL and attempt budget
//! │   ├── gateway.rs   - SMS / email delivery
//! │   └── manager.rs   - Verification flows
//! ├── reputation/     - Seller reputation
//! │   ├── score.rs     - Score formula and trust tiers
//! │   └── manager.rs   - Aggregation and persistence
//! ├── security/       - Audit trail and fraud heuristics
//! ├── store/          - Storage trait and in-memory store
//! ├── database/       - PostgreSQL persistence
//! └── api/            - HTTP API endpoints and middleware
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod market;
pub mod purchase;
pub mod reputation;
pub mod security;
pub mod store;
pub mod verification;

// Re-export main types for convenience
pub use config::MarketConfig;
pub use database::DatabasePool;
pub use error::{MarketError, MarketResult};
pub use market::{
    Account, AccountRole, AccountService, Buyer, ListingService, Order, OrderStatus, Principal,
    Product, Review, Seller, SessionStore, VerificationFlag, VerificationFlags,
};
pub use purchase::{BuyerTrustLevel, PurchaseDecision, PurchaseLimits};
pub use store::{MarketStore, MemoryStore};

// Re-export reputation types
pub use reputation::{
    ReputationManager, ScoreBreakdown, SellerReport, TrustInputs, TrustTier, compute_score,
};

// Re-export security types
pub use security::{
    AuditEntry, AuditEventType, AuditLogger, AuditSeverity, FraudDetector, FraudFlag,
    FraudSeverity, FraudThresholds, FraudType,
};

// Re-export verification types
pub use verification::{
    CodeSender, LogSender, VerificationChannel, VerificationManager, VerificationStatus,
    WebhookSender,
};

// Re-export API types
pub use api::{MarketApiState, SecurityMiddlewareConfig, SecurityState, create_app};
