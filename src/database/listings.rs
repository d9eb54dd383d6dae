//! Listing Repository - products, orders and reviews

use anyhow::{Context, Result, anyhow};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::market::{AccountRole, Order, OrderStatus, Product, Review};

pub struct ListingRepository {
    pool: PgPool,
}

impl ListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing listings schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS listings")
            .execute(&self.pool)
            .await
            .context("Failed to create listings schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS listings.products (
                id UUID PRIMARY KEY,
                seller_id UUID NOT NULL REFERENCES accounts.sellers(id),
                title VARCHAR(200) NOT NULL,
                category VARCHAR(100) NOT NULL,
                price DOUBLE PRECISION NOT NULL CHECK (price > 0),
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create products table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS listings.orders (
                id UUID PRIMARY KEY,
                buyer_id UUID NOT NULL REFERENCES accounts.buyers(id),
                seller_id UUID NOT NULL REFERENCES accounts.sellers(id),
                product_id UUID NOT NULL REFERENCES listings.products(id),
                amount DOUBLE PRECISION NOT NULL,
                status VARCHAR(20) NOT NULL,
                cancelled_by VARCHAR(20),
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create orders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS listings.reviews (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL UNIQUE REFERENCES listings.orders(id),
                seller_id UUID NOT NULL REFERENCES accounts.sellers(id),
                buyer_id UUID NOT NULL REFERENCES accounts.buyers(id),
                rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create reviews table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_seller ON listings.products(seller_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create products index")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_products_category ON listings.products(LOWER(category)) WHERE active",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create category index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_seller ON listings.orders(seller_id, status)")
            .execute(&self.pool)
            .await
            .context("Failed to create orders index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_seller ON listings.reviews(seller_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create reviews index")?;

        info!("Listings schema initialized");
        Ok(())
    }

    pub async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings.products (id, seller_id, title, category, price, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id)
        .bind(product.seller_id)
        .bind(&product.title)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert product")?;

        debug!(product_id = %product.id, seller_id = %product.seller_id, "Product inserted");
        Ok(())
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, seller_id, title, category, price, active, created_at FROM listings.products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get product")?;

        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn products_for_seller(&self, seller_id: Uuid) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, seller_id, title, category, price, active, created_at FROM listings.products WHERE seller_id = $1",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get seller products")?;

        rows.iter().map(product_from_row).collect()
    }

    pub async fn active_products_in_category(&self, category: &str) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, seller_id, title, category, price, active, created_at
            FROM listings.products
            WHERE active AND LOWER(category) = LOWER($1)
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get category products")?;

        rows.iter().map(product_from_row).collect()
    }

    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings.orders
            (id, buyer_id, seller_id, product_id, amount, status, cancelled_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(order.seller_id)
        .bind(order.product_id)
        .bind(order.amount)
        .bind(order.status.as_str())
        .bind(order.cancelled_by.map(|r| r.as_str()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert order")?;

        debug!(order_id = %order.id, "Order inserted");
        Ok(())
    }

    pub async fn update_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "UPDATE listings.orders SET status = $2, cancelled_by = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.cancelled_by.map(|r| r.as_str()))
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update order")?;

        Ok(())
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, buyer_id, seller_id, product_id, amount, status, cancelled_by, created_at, updated_at
            FROM listings.orders WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get order")?;

        row.as_ref().map(order_from_row).transpose()
    }

    pub async fn orders_for_seller(&self, seller_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, seller_id, product_id, amount, status, cancelled_by, created_at, updated_at
            FROM listings.orders WHERE seller_id = $1
            "#,
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get seller orders")?;

        rows.iter().map(order_from_row).collect()
    }

    pub async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings.reviews (id, order_id, seller_id, buyer_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.order_id)
        .bind(review.seller_id)
        .bind(review.buyer_id)
        .bind(review.rating as i16)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert review")?;

        Ok(())
    }

    pub async fn review_for_order(&self, order_id: Uuid) -> Result<Option<Review>> {
        let row = sqlx::query(
            "SELECT id, order_id, seller_id, buyer_id, rating, comment, created_at FROM listings.reviews WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get review")?;

        row.as_ref().map(review_from_row).transpose()
    }

    pub async fn reviews_for_seller(&self, seller_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT id, order_id, seller_id, buyer_id, rating, comment, created_at FROM listings.reviews WHERE seller_id = $1",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get seller reviews")?;

        rows.iter().map(review_from_row).collect()
    }
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        price: row.try_get("price")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let cancelled_by: Option<String> = row.try_get("cancelled_by")?;

    Ok(Order {
        id: row.try_get("id")?,
        buyer_id: row.try_get("buyer_id")?,
        seller_id: row.try_get("seller_id")?,
        product_id: row.try_get("product_id")?,
        amount: row.try_get("amount")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown order status: {}", status))?,
        cancelled_by: cancelled_by.as_deref().and_then(|role| match role {
            "seller" => Some(AccountRole::Seller),
            "buyer" => Some(AccountRole::Buyer),
            _ => None,
        }),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review> {
    let rating: i16 = row.try_get("rating")?;

    Ok(Review {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        seller_id: row.try_get("seller_id")?,
        buyer_id: row.try_get("buyer_id")?,
        rating: rating.clamp(1, 5) as u8,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
    })
}
