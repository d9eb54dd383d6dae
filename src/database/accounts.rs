//! Account Repository - PostgreSQL operations for sellers and buyers using sqlx

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::market::{Buyer, Seller, VerificationFlag, VerificationFlags};
use crate::reputation::TrustTier;
use crate::store::{AccountKey, DuplicateAccount, DuplicateField, normalize_detail};

const SELLER_COLUMNS: &str = r#"
    id, name, email, phone, store_name, campus, business_address, payment_account,
    password_hash, email_verified, phone_verified, student_confirmed, safety_confirmed,
    anti_scam_confirmed, reputation_score, trust_tier, created_at, updated_at
"#;

const BUYER_COLUMNS: &str = r#"
    id, name, email, phone, password_hash, email_verified, phone_verified,
    student_confirmed, created_at, updated_at
"#;

pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing accounts schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS accounts")
            .execute(&self.pool)
            .await
            .context("Failed to create accounts schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts.sellers (
                id UUID PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                phone VARCHAR(20) NOT NULL UNIQUE,
                store_name VARCHAR(60) NOT NULL,
                campus VARCHAR(255),
                business_address TEXT,
                payment_account VARCHAR(255),
                password_hash TEXT NOT NULL,
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                phone_verified BOOLEAN NOT NULL DEFAULT FALSE,
                student_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                safety_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                anti_scam_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                reputation_score SMALLINT NOT NULL DEFAULT 0
                    CHECK (reputation_score BETWEEN 0 AND 100),
                trust_tier VARCHAR(20) NOT NULL DEFAULT 'probation',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create sellers table")?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sellers_store_name ON accounts.sellers (LOWER(store_name))",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create store name index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts.buyers (
                id UUID PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                phone VARCHAR(20) NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                phone_verified BOOLEAN NOT NULL DEFAULT FALSE,
                student_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create buyers table")?;

        info!("Accounts schema initialized");
        Ok(())
    }

    pub async fn insert_seller(&self, seller: &Seller) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts.sellers
            (id, name, email, phone, store_name, campus, business_address, payment_account,
             password_hash, email_verified, phone_verified, student_confirmed, safety_confirmed,
             anti_scam_confirmed, reputation_score, trust_tier, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(seller.id)
        .bind(&seller.name)
        .bind(&seller.email)
        .bind(&seller.phone)
        .bind(&seller.store_name)
        .bind(&seller.campus)
        .bind(&seller.business_address)
        .bind(&seller.payment_account)
        .bind(&seller.password_hash)
        .bind(seller.flags.email_verified)
        .bind(seller.flags.phone_verified)
        .bind(seller.flags.student_confirmed)
        .bind(seller.flags.safety_confirmed)
        .bind(seller.flags.anti_scam_confirmed)
        .bind(seller.reputation_score as i16)
        .bind(seller.trust_tier.as_str())
        .bind(seller.created_at)
        .bind(seller.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "Failed to insert seller"))?;

        debug!(seller_id = %seller.id, "Seller inserted");
        Ok(())
    }

    pub async fn update_seller_reputation(
        &self,
        id: Uuid,
        score: u8,
        tier: TrustTier,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts.sellers
            SET reputation_score = $2, trust_tier = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(score as i16)
        .bind(tier.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update seller reputation")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Seller {} does not exist", id);
        }
        Ok(())
    }

    /// Single-column flag write; returns the seller's flags after it
    pub async fn set_seller_flag(
        &self,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<Option<VerificationFlags>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts.sellers SET {} = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING email_verified, phone_verified, student_confirmed,
                      safety_confirmed, anti_scam_confirmed
            "#,
            flag.column()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to set seller flag")?;

        row.as_ref()
            .map(|row| -> Result<VerificationFlags> {
                Ok(VerificationFlags {
                    email_verified: row.try_get("email_verified")?,
                    phone_verified: row.try_get("phone_verified")?,
                    student_confirmed: row.try_get("student_confirmed")?,
                    safety_confirmed: row.try_get("safety_confirmed")?,
                    anti_scam_confirmed: row.try_get("anti_scam_confirmed")?,
                })
            })
            .transpose()
    }

    pub async fn get_seller(&self, id: Uuid) -> Result<Option<Seller>> {
        let row = sqlx::query(&format!(
            "SELECT {SELLER_COLUMNS} FROM accounts.sellers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get seller")?;

        row.as_ref().map(seller_from_row).transpose()
    }

    pub async fn find_seller(&self, key: &AccountKey) -> Result<Option<Seller>> {
        let (clause, value) = match key {
            AccountKey::Email(email) => ("LOWER(email) = LOWER($1)", email),
            AccountKey::Phone(phone) => ("phone = $1", phone),
            AccountKey::StoreName(name) => ("LOWER(store_name) = LOWER($1)", name),
        };

        let row = sqlx::query(&format!(
            "SELECT {SELLER_COLUMNS} FROM accounts.sellers WHERE {clause} LIMIT 1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up seller")?;

        row.as_ref().map(seller_from_row).transpose()
    }

    pub async fn sellers_sharing_details(&self, seller: &Seller) -> Result<Vec<Seller>> {
        let address = seller.business_address.as_deref().map(normalize_detail);
        let account = seller.payment_account.as_deref().map(normalize_detail);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELLER_COLUMNS} FROM accounts.sellers
            WHERE id <> $1
              AND (
                ($2::TEXT IS NOT NULL AND $2 <> ''
                    AND LOWER(REGEXP_REPLACE(TRIM(business_address), '\s+', ' ', 'g')) = $2)
                OR
                ($3::TEXT IS NOT NULL AND $3 <> ''
                    AND LOWER(REGEXP_REPLACE(TRIM(payment_account), '\s+', ' ', 'g')) = $3)
              )
            "#
        ))
        .bind(seller.id)
        .bind(address)
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .context("Failed to find sellers sharing details")?;

        rows.iter().map(seller_from_row).collect()
    }

    pub async fn insert_buyer(&self, buyer: &Buyer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts.buyers
            (id, name, email, phone, password_hash, email_verified, phone_verified,
             student_confirmed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(buyer.id)
        .bind(&buyer.name)
        .bind(&buyer.email)
        .bind(&buyer.phone)
        .bind(&buyer.password_hash)
        .bind(buyer.flags.email_verified)
        .bind(buyer.flags.phone_verified)
        .bind(buyer.flags.student_confirmed)
        .bind(buyer.created_at)
        .bind(buyer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, "Failed to insert buyer"))?;

        debug!(buyer_id = %buyer.id, "Buyer inserted");
        Ok(())
    }

    /// Single-column flag write; only email, phone and student exist for buyers
    pub async fn set_buyer_flag(
        &self,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<Option<VerificationFlags>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts.buyers SET {} = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING email_verified, phone_verified, student_confirmed
            "#,
            flag.column()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to set buyer flag")?;

        row.as_ref()
            .map(|row| -> Result<VerificationFlags> {
                Ok(VerificationFlags {
                    email_verified: row.try_get("email_verified")?,
                    phone_verified: row.try_get("phone_verified")?,
                    student_confirmed: row.try_get("student_confirmed")?,
                    ..Default::default()
                })
            })
            .transpose()
    }

    pub async fn get_buyer(&self, id: Uuid) -> Result<Option<Buyer>> {
        let row = sqlx::query(&format!(
            "SELECT {BUYER_COLUMNS} FROM accounts.buyers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get buyer")?;

        row.as_ref().map(buyer_from_row).transpose()
    }

    pub async fn find_buyer(&self, key: &AccountKey) -> Result<Option<Buyer>> {
        let (clause, value) = match key {
            AccountKey::Email(email) => ("LOWER(email) = LOWER($1)", email),
            AccountKey::Phone(phone) => ("phone = $1", phone),
            AccountKey::StoreName(_) => return Ok(None),
        };

        let row = sqlx::query(&format!(
            "SELECT {BUYER_COLUMNS} FROM accounts.buyers WHERE {clause} LIMIT 1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up buyer")?;

        row.as_ref().map(buyer_from_row).transpose()
    }
}

/// Map a unique violation to [`DuplicateAccount`] by constraint name
fn insert_error(err: sqlx::Error, context: &'static str) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            if let Some(field) = db.constraint().and_then(duplicate_field) {
                debug!(constraint = ?db.constraint(), "Insert hit a unique constraint");
                return DuplicateAccount(field).into();
            }
        }
    }
    anyhow::Error::new(err).context(context)
}

/// Field behind a unique constraint such as `sellers_email_key` or `idx_sellers_store_name`
fn duplicate_field(constraint: &str) -> Option<DuplicateField> {
    if constraint.contains("email") {
        Some(DuplicateField::Email)
    } else if constraint.contains("phone") {
        Some(DuplicateField::Phone)
    } else if constraint.contains("store_name") {
        Some(DuplicateField::StoreName)
    } else {
        None
    }
}

fn seller_from_row(row: &PgRow) -> Result<Seller> {
    let tier: String = row.try_get("trust_tier")?;
    let score: i16 = row.try_get("reputation_score")?;

    Ok(Seller {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        store_name: row.try_get("store_name")?,
        campus: row.try_get("campus")?,
        business_address: row.try_get("business_address")?,
        payment_account: row.try_get("payment_account")?,
        password_hash: row.try_get("password_hash")?,
        flags: VerificationFlags {
            email_verified: row.try_get("email_verified")?,
            phone_verified: row.try_get("phone_verified")?,
            student_confirmed: row.try_get("student_confirmed")?,
            safety_confirmed: row.try_get("safety_confirmed")?,
            anti_scam_confirmed: row.try_get("anti_scam_confirmed")?,
        },
        reputation_score: score.clamp(0, 100) as u8,
        trust_tier: TrustTier::parse(&tier).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn buyer_from_row(row: &PgRow) -> Result<Buyer> {
    Ok(Buyer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        password_hash: row.try_get("password_hash")?,
        flags: VerificationFlags {
            email_verified: row.try_get("email_verified")?,
            phone_verified: row.try_get("phone_verified")?,
            student_confirmed: row.try_get("student_confirmed")?,
            ..Default::default()
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
