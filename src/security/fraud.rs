//! Seller fraud heuristics
//!
//! Three single-pass checks over already loaded records:
//! - pricing: too many listings far from their category's average price
//! - cancellations: a burst of seller-side cancellations within a week
//! - duplicate details: business address or payment account shared with
//!   another seller

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::market::{AccountRole, Order, OrderStatus, Product, Seller};
use crate::security::AuditLogger;
use crate::store::MarketStore;

/// Tunable thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudThresholds {
    /// Price below `low × category average` is an outlier
    pub price_low_ratio: f64,
    /// Price above `high × category average` is an outlier
    pub price_high_ratio: f64,
    /// Flag when outliers exceed this share of active listings
    pub max_outlier_share: f64,
    /// Flag when seller cancellations in the window exceed this
    pub max_cancellations: usize,
    pub cancellation_window_days: i64,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        Self {
            price_low_ratio: 0.2,
            price_high_ratio: 5.0,
            max_outlier_share: 0.3,
            max_cancellations: 5,
            cancellation_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    PricingAnomaly,
    ExcessiveCancellations,
    DuplicateDetails,
}

impl FraudType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudType::PricingAnomaly => "pricing_anomaly",
            FraudType::ExcessiveCancellations => "excessive_cancellations",
            FraudType::DuplicateDetails => "duplicate_details",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudSeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudFlag {
    pub fraud_type: FraudType,
    pub severity: FraudSeverity,
    pub description: String,
    pub evidence: serde_json::Value,
}

/// Records one scan runs over
pub struct ScanInput<'a> {
    pub seller: &'a Seller,
    pub products: &'a [Product],
    /// Active marketplace listings keyed by lowercase category
    pub category_listings: &'a HashMap<String, Vec<Product>>,
    pub orders: &'a [Order],
    pub sharing_details: &'a [Seller],
}

pub struct FraudDetector {
    thresholds: FraudThresholds,
    audit: Arc<AuditLogger>,
}

impl FraudDetector {
    pub fn new(thresholds: FraudThresholds, audit: Arc<AuditLogger>) -> Self {
        Self { thresholds, audit }
    }

    pub fn thresholds(&self) -> &FraudThresholds {
        &self.thresholds
    }

    /// Run every heuristic over loaded records
    pub fn scan(&self, input: &ScanInput<'_>, now: DateTime<Utc>) -> Vec<FraudFlag> {
        let mut flags = Vec::new();
        flags.extend(self.check_pricing(input.products, input.category_listings));
        flags.extend(self.check_cancellations(input.orders, now));
        flags.extend(self.check_duplicates(input.seller, input.sharing_details));
        flags
    }

    fn check_pricing(
        &self,
        products: &[Product],
        category_listings: &HashMap<String, Vec<Product>>,
    ) -> Option<FraudFlag> {
        let active: Vec<&Product> = products.iter().filter(|p| p.active).collect();
        if active.is_empty() {
            return None;
        }

        let mut outliers = Vec::new();
        for product in &active {
            let Some(listings) = category_listings.get(&product.category.to_lowercase()) else {
                continue;
            };
            if listings.is_empty() {
                continue;
            }
            let average = listings.iter().map(|p| p.price).sum::<f64>() / listings.len() as f64;
            if average <= 0.0 {
                continue;
            }

            let ratio = product.price / average;
            if ratio < self.thresholds.price_low_ratio || ratio > self.thresholds.price_high_ratio {
                outliers.push(serde_json::json!({
                    "product_id": product.id,
                    "price": product.price,
                    "category_average": average,
                }));
            }
        }

        let share = outliers.len() as f64 / active.len() as f64;
        if share <= self.thresholds.max_outlier_share {
            return None;
        }

        Some(FraudFlag {
            fraud_type: FraudType::PricingAnomaly,
            severity: FraudSeverity::Medium,
            description: format!(
                "{} of {} active listings are priced far from their category average",
                outliers.len(),
                active.len()
            ),
            evidence: serde_json::json!({ "outliers": outliers, "share": share }),
        })
    }

    fn check_cancellations(&self, orders: &[Order], now: DateTime<Utc>) -> Option<FraudFlag> {
        let window_start = now - Duration::days(self.thresholds.cancellation_window_days);
        let cancelled = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Cancelled)
            .filter(|o| o.cancelled_by == Some(AccountRole::Seller))
            .filter(|o| o.updated_at >= window_start && o.updated_at <= now)
            .count();

        if cancelled <= self.thresholds.max_cancellations {
            return None;
        }

        Some(FraudFlag {
            fraud_type: FraudType::ExcessiveCancellations,
            severity: FraudSeverity::Medium,
            description: format!(
                "{} orders cancelled by the seller in the last {} days",
                cancelled, self.thresholds.cancellation_window_days
            ),
            evidence: serde_json::json!({ "cancellations": cancelled }),
        })
    }

    fn check_duplicates(&self, seller: &Seller, sharing: &[Seller]) -> Option<FraudFlag> {
        let others: Vec<Uuid> = sharing
            .iter()
            .filter(|other| other.id != seller.id)
            .map(|other| other.id)
            .collect();
        if others.is_empty() {
            return None;
        }

        Some(FraudFlag {
            fraud_type: FraudType::DuplicateDetails,
            severity: FraudSeverity::High,
            description: format!(
                "Business address or payment account shared with {} other seller(s)",
                others.len()
            ),
            evidence: serde_json::json!({ "other_sellers": others }),
        })
    }

    /// Load a seller's records from the store, scan them and audit every flag
    pub async fn scan_seller(
        &self,
        store: &dyn MarketStore,
        seller_id: Uuid,
    ) -> MarketResult<Vec<FraudFlag>> {
        let seller = store
            .get_seller(seller_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Seller"))?;

        let products = store.products_for_seller(seller_id).await?;
        let mut category_listings: HashMap<String, Vec<Product>> = HashMap::new();
        for product in products.iter().filter(|p| p.active) {
            let key = product.category.to_lowercase();
            if !category_listings.contains_key(&key) {
                let listings = store.active_products_in_category(&product.category).await?;
                category_listings.insert(key, listings);
            }
        }

        let orders = store.orders_for_seller(seller_id).await?;
        let sharing = store.sellers_sharing_details(&seller).await?;

        let flags = self.scan(
            &ScanInput {
                seller: &seller,
                products: &products,
                category_listings: &category_listings,
                orders: &orders,
                sharing_details: &sharing,
            },
            Utc::now(),
        );

        if flags.is_empty() {
            debug!(seller_id = %seller_id, "Fraud scan clean");
        }
        for flag in &flags {
            warn!(
                seller_id = %seller_id,
                flag = flag.fraud_type.as_str(),
                "Fraud heuristic triggered"
            );
            self.audit
                .log_fraud_flag(
                    seller_id,
                    flag.fraud_type.as_str(),
                    &flag.description,
                    flag.severity == FraudSeverity::High,
                )
                .await;
        }

        Ok(flags)
    }
}
