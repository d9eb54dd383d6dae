//! Reputation Manager - Main Orchestrator
//!
//! Aggregates a seller's reviews, orders and listings from the store,
//! recomputes score and tier, and writes them back onto the seller.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::market::OrderStatus;
use crate::reputation::{ScoreBreakdown, TrustInputs, TrustTier, compute_score};
use crate::security::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};
use crate::store::MarketStore;

/// Everything a seller (or a buyer looking at one) needs to see about trust
#[derive(Debug, Clone, Serialize)]
pub struct SellerReport {
    pub seller_id: Uuid,
    pub store_name: String,
    pub breakdown: ScoreBreakdown,
    pub score: u8,
    pub tier: TrustTier,
    pub next_tier: Option<TrustTier>,
    /// Requirements still missing for `next_tier`
    pub missing: Vec<String>,
    pub avg_rating: f64,
    pub review_count: u32,
    pub completed_orders: u32,
    pub active_products: u32,
    pub computed_at: DateTime<Utc>,
}

/// Main reputation manager
pub struct ReputationManager {
    store: Arc<dyn MarketStore>,
    audit: Arc<AuditLogger>,

    /// Last computed report per seller
    report_cache: Arc<RwLock<HashMap<Uuid, SellerReport>>>,

    /// One refresh at a time per seller, so the last write reflects the latest flags
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ReputationManager {
    pub fn new(store: Arc<dyn MarketStore>, audit: Arc<AuditLogger>) -> Self {
        Self {
            store,
            audit,
            report_cache: Arc::new(RwLock::new(HashMap::new())),
            refresh_locks: DashMap::new(),
        }
    }

    /// Recompute a seller's score and tier from stored history and persist them
    pub async fn refresh_seller(&self, seller_id: Uuid) -> MarketResult<SellerReport> {
        let lock = Arc::clone(self.refresh_locks.entry(seller_id).or_default().value());
        let _guard = lock.lock().await;

        let seller = self
            .store
            .get_seller(seller_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Seller"))?;

        let reviews = self.store.reviews_for_seller(seller_id).await?;
        let orders = self.store.orders_for_seller(seller_id).await?;
        let products = self.store.products_for_seller(seller_id).await?;

        let review_count = reviews.len() as u32;
        let avg_rating = if reviews.is_empty() {
            0.0
        } else {
            reviews.iter().map(|r| r.rating as f64).sum::<f64>() / reviews.len() as f64
        };
        let completed_orders = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .count() as u32;
        let active_products = products.iter().filter(|p| p.active).count() as u32;

        let inputs = TrustInputs {
            flags: seller.flags,
            avg_rating,
            review_count,
            completed_orders,
            active_products,
        };
        let breakdown = compute_score(&inputs);
        let score = breakdown.score();
        let tier = TrustTier::evaluate(&seller.flags, score);

        let previous_tier = seller.trust_tier;
        if seller.reputation_score != score || previous_tier != tier {
            self.store
                .update_seller_reputation(seller_id, score, tier)
                .await?;
        }

        if previous_tier != tier {
            info!(
                seller_id = %seller_id,
                from = previous_tier.as_str(),
                to = tier.as_str(),
                score,
                "Seller trust tier changed"
            );
            self.audit
                .log(AuditEntry::new(
                    AuditEventType::TierChanged {
                        seller_id,
                        from: previous_tier.as_str().to_string(),
                        to: tier.as_str().to_string(),
                    },
                    AuditSeverity::Info,
                ))
                .await;
        } else {
            debug!(seller_id = %seller_id, score, tier = tier.as_str(), "Reputation refreshed");
        }

        let next_tier = tier.next();
        let missing = next_tier
            .map(|next| next.missing_requirements(&seller.flags, score))
            .unwrap_or_default();

        let report = SellerReport {
            seller_id,
            store_name: seller.store_name,
            breakdown,
            score,
            tier,
            next_tier,
            missing,
            avg_rating,
            review_count,
            completed_orders,
            active_products,
            computed_at: Utc::now(),
        };

        {
            let mut cache = self.report_cache.write().await;
            cache.insert(seller_id, report.clone());
        }

        Ok(report)
    }

    /// Cached report, computed on first request
    pub async fn seller_report(&self, seller_id: Uuid) -> MarketResult<SellerReport> {
        {
            let cache = self.report_cache.read().await;
            if let Some(report) = cache.get(&seller_id) {
                return Ok(report.clone());
            }
        }

        self.refresh_seller(seller_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{
        AccountRole, Order, Product, Review, Seller, VerificationFlag, VerificationFlags,
    };
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, ReputationManager, Seller) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let seller = Seller {
            id: Uuid::new_v4(),
            name: "Sam".to_string(),
            email: "sam@uni.edu".to_string(),
            phone: "5551234567".to_string(),
            store_name: "Sam's Books".to_string(),
            campus: None,
            business_address: None,
            payment_account: None,
            password_hash: String::new(),
            flags: VerificationFlags {
                email_verified: true,
                phone_verified: true,
                ..Default::default()
            },
            reputation_score: 0,
            trust_tier: TrustTier::Probation,
            created_at: now,
            updated_at: now,
        };
        store.insert_seller(&seller).await.unwrap();
        let manager = ReputationManager::new(store.clone(), Arc::new(AuditLogger::new()));
        (store, manager, seller)
    }

    #[tokio::test]
    async fn test_refresh_persists_score_and_tier() {
        let (store, manager, seller) = setup().await;
        let now = Utc::now();

        for _ in 0..3 {
            store
                .insert_product(&Product {
                    id: Uuid::new_v4(),
                    seller_id: seller.id,
                    title: "Notes".to_string(),
                    category: "books".to_string(),
                    price: 10.0,
                    active: true,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let order = Order {
            id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: seller.id,
            product_id: Uuid::new_v4(),
            amount: 10.0,
            status: OrderStatus::Completed,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_order(&order).await.unwrap();
        store
            .insert_review(&Review {
                id: Uuid::new_v4(),
                order_id: order.id,
                seller_id: seller.id,
                buyer_id: order.buyer_id,
                rating: 4,
                comment: String::new(),
                created_at: now,
            })
            .await
            .unwrap();

        let report = manager.refresh_seller(seller.id).await.unwrap();
        // 20 + 15 + 16 (rating) + 2 (orders) + 3 (products)
        assert_eq!(report.score, 56);
        assert_eq!(report.tier, TrustTier::Basic);
        assert_eq!(report.next_tier, Some(TrustTier::Verified));
        assert!(!report.missing.is_empty());

        let stored = store.get_seller(seller.id).await.unwrap().unwrap();
        assert_eq!(stored.reputation_score, 56);
        assert_eq!(stored.trust_tier, TrustTier::Basic);
    }

    #[tokio::test]
    async fn test_report_is_cached_until_refreshed() {
        let (store, manager, seller) = setup().await;
        let first = manager.seller_report(seller.id).await.unwrap();
        assert_eq!(first.score, 35);

        store
            .set_verification_flag(AccountRole::Seller, seller.id, VerificationFlag::Student)
            .await
            .unwrap();

        assert_eq!(manager.seller_report(seller.id).await.unwrap().score, 35);
        manager.refresh_seller(seller.id).await.unwrap();
        assert_eq!(manager.seller_report(seller.id).await.unwrap().score, 60);

        let stored = store.get_seller(seller.id).await.unwrap().unwrap();
        assert!(stored.flags.student_confirmed);
        assert_eq!(stored.trust_tier, TrustTier::Verified);
    }

    #[tokio::test]
    async fn test_unknown_seller() {
        let (_, manager, _) = setup().await;
        assert!(matches!(
            manager.refresh_seller(Uuid::new_v4()).await,
            Err(MarketError::NotFound(_))
        ));
    }
}
