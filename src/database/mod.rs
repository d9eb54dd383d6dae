//! PostgreSQL Database Module
//!
//! Provides database operations for accounts and listings.

pub mod accounts;
pub mod listings;
pub mod pool;

pub use accounts::AccountRepository;
pub use listings::ListingRepository;
pub use pool::DatabasePool;
