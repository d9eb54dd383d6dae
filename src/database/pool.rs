//! Database Connection Pool using sqlx

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::database::accounts::AccountRepository;
use crate::database::listings::ListingRepository;
use crate::market::{
    AccountRole, Buyer, Order, Product, Review, Seller, VerificationFlag, VerificationFlags,
};
use crate::reputation::TrustTier;
use crate::store::{AccountKey, MarketStore};

pub struct DatabasePool {
    pool: PgPool,
    accounts: AccountRepository,
    listings: ListingRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL");

        let accounts = AccountRepository::new(pool.clone());
        let listings = ListingRepository::new(pool.clone());

        Ok(Self {
            pool,
            accounts,
            listings,
        })
    }

    /// Create schemas and tables; listings reference accounts so order matters
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema...");
        self.accounts.init_schema().await?;
        self.listings.init_schema().await?;
        info!("Database schema initialized");
        Ok(())
    }

    pub fn accounts(&self) -> &AccountRepository {
        &self.accounts
    }

    pub fn listings(&self) -> &ListingRepository {
        &self.listings
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MarketStore for DatabasePool {
    async fn insert_seller(&self, seller: &Seller) -> Result<()> {
        self.accounts.insert_seller(seller).await
    }

    async fn update_seller_reputation(&self, id: Uuid, score: u8, tier: TrustTier) -> Result<()> {
        self.accounts.update_seller_reputation(id, score, tier).await
    }

    async fn get_seller(&self, id: Uuid) -> Result<Option<Seller>> {
        self.accounts.get_seller(id).await
    }

    async fn find_seller(&self, key: &AccountKey) -> Result<Option<Seller>> {
        self.accounts.find_seller(key).await
    }

    async fn sellers_sharing_details(&self, seller: &Seller) -> Result<Vec<Seller>> {
        self.accounts.sellers_sharing_details(seller).await
    }

    async fn insert_buyer(&self, buyer: &Buyer) -> Result<()> {
        self.accounts.insert_buyer(buyer).await
    }

    async fn get_buyer(&self, id: Uuid) -> Result<Option<Buyer>> {
        self.accounts.get_buyer(id).await
    }

    async fn find_buyer(&self, key: &AccountKey) -> Result<Option<Buyer>> {
        self.accounts.find_buyer(key).await
    }

    async fn set_verification_flag(
        &self,
        role: AccountRole,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<Option<VerificationFlags>> {
        if !flag.applies_to(role) {
            anyhow::bail!("{} accounts have no {} flag", role.as_str(), flag.column());
        }
        match role {
            AccountRole::Seller => self.accounts.set_seller_flag(id, flag).await,
            AccountRole::Buyer => self.accounts.set_buyer_flag(id, flag).await,
        }
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.listings.insert_product(product).await
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        self.listings.get_product(id).await
    }

    async fn products_for_seller(&self, seller_id: Uuid) -> Result<Vec<Product>> {
        self.listings.products_for_seller(seller_id).await
    }

    async fn active_products_in_category(&self, category: &str) -> Result<Vec<Product>> {
        self.listings.active_products_in_category(category).await
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.listings.insert_order(order).await
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.listings.update_order(order).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        self.listings.get_order(id).await
    }

    async fn orders_for_seller(&self, seller_id: Uuid) -> Result<Vec<Order>> {
        self.listings.orders_for_seller(seller_id).await
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        self.listings.insert_review(review).await
    }

    async fn review_for_order(&self, order_id: Uuid) -> Result<Option<Review>> {
        self.listings.review_for_order(order_id).await
    }

    async fn reviews_for_seller(&self, seller_id: Uuid) -> Result<Vec<Review>> {
        self.listings.reviews_for_seller(seller_id).await
    }
}
