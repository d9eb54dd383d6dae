//! Marketplace data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reputation::TrustTier;

/// Which side of the marketplace an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Seller,
    Buyer,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Seller => "seller",
            AccountRole::Buyer => "buyer",
        }
    }
}

/// Verification flags carried by every account.
///
/// Buyers only ever set the first three.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFlags {
    pub email_verified: bool,
    pub phone_verified: bool,
    pub student_confirmed: bool,
    pub safety_confirmed: bool,
    pub anti_scam_confirmed: bool,
}

impl VerificationFlags {
    /// Email and phone both verified
    pub fn has_base(&self) -> bool {
        self.email_verified && self.phone_verified
    }

    pub fn is_set(&self, flag: VerificationFlag) -> bool {
        match flag {
            VerificationFlag::Email => self.email_verified,
            VerificationFlag::Phone => self.phone_verified,
            VerificationFlag::Student => self.student_confirmed,
            VerificationFlag::Safety => self.safety_confirmed,
            VerificationFlag::AntiScam => self.anti_scam_confirmed,
        }
    }

    pub fn set(&mut self, flag: VerificationFlag) {
        match flag {
            VerificationFlag::Email => self.email_verified = true,
            VerificationFlag::Phone => self.phone_verified = true,
            VerificationFlag::Student => self.student_confirmed = true,
            VerificationFlag::Safety => self.safety_confirmed = true,
            VerificationFlag::AntiScam => self.anti_scam_confirmed = true,
        }
    }
}

/// A single verification flag. Flags are only ever switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFlag {
    Email,
    Phone,
    Student,
    Safety,
    AntiScam,
}

impl VerificationFlag {
    /// Column holding the flag in the accounts tables
    pub fn column(&self) -> &'static str {
        match self {
            VerificationFlag::Email => "email_verified",
            VerificationFlag::Phone => "phone_verified",
            VerificationFlag::Student => "student_confirmed",
            VerificationFlag::Safety => "safety_confirmed",
            VerificationFlag::AntiScam => "anti_scam_confirmed",
        }
    }

    /// Buyers carry email, phone and student flags only
    pub fn applies_to(&self, role: AccountRole) -> bool {
        match role {
            AccountRole::Seller => true,
            AccountRole::Buyer => matches!(
                self,
                VerificationFlag::Email | VerificationFlag::Phone | VerificationFlag::Student
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub store_name: String,
    pub campus: Option<String>,
    pub business_address: Option<String>,
    pub payment_account: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub flags: VerificationFlags,
    pub reputation_score: u8,
    pub trust_tier: TrustTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub flags: VerificationFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub category: String,
    pub price: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    pub amount: f64,
    pub status: OrderStatus,
    /// Which side cancelled, when status is `Cancelled`
    pub cancelled_by: Option<AccountRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub buyer_id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}
