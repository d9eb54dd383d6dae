//! Storage seam for marketplace records
//!
//! Handlers and managers only see [`MarketStore`]. The in-memory store backs
//! tests and single-node runs; `database::DatabasePool` backs production.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::market::{
    AccountRole, Buyer, Order, Product, Review, Seller, VerificationFlag, VerificationFlags,
};
use crate::reputation::TrustTier;

/// Unique account attributes used for lookups and duplicate checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountKey {
    Email(String),
    Phone(String),
    StoreName(String),
}

/// Unique account attribute that an insert collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Email,
    Phone,
    StoreName,
}

impl DuplicateField {
    pub fn message(&self) -> &'static str {
        match self {
            DuplicateField::Email => "Email is already registered",
            DuplicateField::Phone => "Phone number is already registered",
            DuplicateField::StoreName => "Store name is already taken",
        }
    }
}

/// Returned (inside `anyhow::Error`) by account inserts that break uniqueness
#[derive(Debug, Error)]
#[error("{}", .0.message())]
pub struct DuplicateAccount(pub DuplicateField);

#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Fails with [`DuplicateAccount`] when email, phone or store name is taken
    async fn insert_seller(&self, seller: &Seller) -> Result<()>;
    /// Writes score and tier only
    async fn update_seller_reputation(&self, id: Uuid, score: u8, tier: TrustTier) -> Result<()>;
    async fn get_seller(&self, id: Uuid) -> Result<Option<Seller>>;
    async fn find_seller(&self, key: &AccountKey) -> Result<Option<Seller>>;
    /// Other sellers with the same business address or payment account
    async fn sellers_sharing_details(&self, seller: &Seller) -> Result<Vec<Seller>>;

    /// Fails with [`DuplicateAccount`] when email or phone is taken
    async fn insert_buyer(&self, buyer: &Buyer) -> Result<()>;
    async fn get_buyer(&self, id: Uuid) -> Result<Option<Buyer>>;
    async fn find_buyer(&self, key: &AccountKey) -> Result<Option<Buyer>>;

    /// Switch one flag on without touching the rest of the record.
    /// Returns the account's flags after the write, `None` if it does not exist.
    async fn set_verification_flag(
        &self,
        role: AccountRole,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<Option<VerificationFlags>>;

    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn products_for_seller(&self, seller_id: Uuid) -> Result<Vec<Product>>;
    async fn active_products_in_category(&self, category: &str) -> Result<Vec<Product>>;

    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn orders_for_seller(&self, seller_id: Uuid) -> Result<Vec<Order>>;

    async fn insert_review(&self, review: &Review) -> Result<()>;
    async fn review_for_order(&self, order_id: Uuid) -> Result<Option<Review>>;
    async fn reviews_for_seller(&self, seller_id: Uuid) -> Result<Vec<Review>>;
}

/// Normalize a business address or payment account for comparison
pub fn normalize_detail(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
