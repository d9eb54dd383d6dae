//! Listings, orders and reviews
//!
//! Every change that feeds the reputation score (a new listing, a completed
//! order, a review) refreshes the seller's score before returning.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::market::{AccountRole, Order, OrderStatus, Principal, Product, Review};
use crate::purchase::{PurchaseDecision, PurchaseLimits};
use crate::reputation::{ReputationManager, TrustTier};
use crate::security::{
    AuditEntry, AuditEventType, AuditLogger, AuditSeverity, FraudDetector, FraudSeverity,
};
use crate::store::MarketStore;

const MAX_TITLE_LEN: usize = 120;
const MAX_CATEGORY_LEN: usize = 50;
const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub category: String,
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub product_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub order_id: Uuid,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

pub struct ListingService {
    store: Arc<dyn MarketStore>,
    reputation: Arc<ReputationManager>,
    fraud: Arc<FraudDetector>,
    limits: PurchaseLimits,
    audit: Arc<AuditLogger>,
}

impl ListingService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        reputation: Arc<ReputationManager>,
        fraud: Arc<FraudDetector>,
        limits: PurchaseLimits,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            reputation,
            fraud,
            limits,
            audit,
        }
    }

    pub fn limits(&self) -> &PurchaseLimits {
        &self.limits
    }

    pub async fn create_product(
        &self,
        seller_id: Uuid,
        request: NewProduct,
    ) -> MarketResult<Product> {
        let title = request.title.trim().to_string();
        let category = request.category.trim().to_lowercase();

        let mut errors = Vec::new();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            errors.push(format!(
                "Title must be between 1 and {} characters",
                MAX_TITLE_LEN
            ));
        }
        if category.is_empty() || category.chars().count() > MAX_CATEGORY_LEN {
            errors.push(format!(
                "Category must be between 1 and {} characters",
                MAX_CATEGORY_LEN
            ));
        }
        if !request.price.is_finite() || request.price <= 0.0 {
            errors.push("Price must be a positive amount".to_string());
        }
        if !errors.is_empty() {
            return Err(MarketError::Validation(errors));
        }

        self.store
            .get_seller(seller_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Seller"))?;

        let product = Product {
            id: Uuid::new_v4(),
            seller_id,
            title,
            category,
            price: request.price,
            active: true,
            created_at: Utc::now(),
        };
        self.store.insert_product(&product).await?;
        self.reputation.refresh_seller(seller_id).await?;

        info!(product_id = %product.id, seller_id = %seller_id, "Product listed");
        Ok(product)
    }

    /// Purchase eligibility for a buyer at a given amount
    pub async fn eligibility(&self, buyer_id: Uuid, amount: f64) -> MarketResult<PurchaseDecision> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(MarketError::invalid("Amount must be a positive number"));
        }
        let buyer = self
            .store
            .get_buyer(buyer_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Buyer"))?;
        Ok(self.limits.check(&buyer.flags, amount))
    }

    /// Place an order after the buyer's cap and the seller's standing are checked
    pub async fn create_order(&self, buyer_id: Uuid, request: NewOrder) -> MarketResult<Order> {
        let product = self
            .store
            .get_product(request.product_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Product"))?;
        if !product.active {
            return Err(MarketError::invalid("Product is no longer available"));
        }

        let decision = self.eligibility(buyer_id, product.price).await?;
        if !decision.approved {
            self.audit
                .log(AuditEntry::new(
                    AuditEventType::PurchaseRejected {
                        buyer_id,
                        amount: product.price,
                        level: decision.level.as_str().to_string(),
                    },
                    AuditSeverity::Warning,
                ))
                .await;
            return Err(MarketError::Forbidden(decision.reason));
        }

        let seller = self
            .store
            .get_seller(product.seller_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Seller"))?;
        if seller.trust_tier == TrustTier::Probation {
            let flags = self.fraud.scan_seller(self.store.as_ref(), seller.id).await?;
            if flags.iter().any(|f| f.severity == FraudSeverity::High) {
                warn!(seller_id = %seller.id, "Order blocked: seller on probation with fraud flags");
                return Err(MarketError::Forbidden(
                    "This seller cannot accept orders while their account is under review"
                        .to_string(),
                ));
            }
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            buyer_id,
            seller_id: product.seller_id,
            product_id: product.id,
            amount: product.price,
            status: OrderStatus::Pending,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_order(&order).await?;

        info!(order_id = %order.id, buyer_id = %buyer_id, amount = order.amount, "Order created");
        Ok(order)
    }

    async fn pending_order(&self, order_id: Uuid) -> MarketResult<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Order"))?;
        if order.status != OrderStatus::Pending {
            return Err(MarketError::invalid(format!(
                "Order is already {}",
                order.status.as_str()
            )));
        }
        Ok(order)
    }

    /// Buyer confirms receipt
    pub async fn complete_order(&self, caller: Principal, order_id: Uuid) -> MarketResult<Order> {
        let mut order = self.pending_order(order_id).await?;
        if caller.role != AccountRole::Buyer || caller.account_id != order.buyer_id {
            return Err(MarketError::Forbidden(
                "Only the buyer can complete this order".to_string(),
            ));
        }

        order.status = OrderStatus::Completed;
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;
        self.reputation.refresh_seller(order.seller_id).await?;

        info!(order_id = %order.id, "Order completed");
        Ok(order)
    }

    /// Either party may cancel a pending order
    pub async fn cancel_order(&self, caller: Principal, order_id: Uuid) -> MarketResult<Order> {
        let mut order = self.pending_order(order_id).await?;
        let party = match caller.role {
            AccountRole::Buyer => order.buyer_id,
            AccountRole::Seller => order.seller_id,
        };
        if party != caller.account_id {
            return Err(MarketError::Forbidden(
                "Only the buyer or seller can cancel this order".to_string(),
            ));
        }

        order.status = OrderStatus::Cancelled;
        order.cancelled_by = Some(caller.role);
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;

        info!(order_id = %order.id, by = caller.role.as_str(), "Order cancelled");
        Ok(order)
    }

    /// One review per completed order, written by that order's buyer
    pub async fn submit_review(&self, buyer_id: Uuid, request: NewReview) -> MarketResult<Review> {
        let mut errors = Vec::new();
        if !(1..=5).contains(&request.rating) {
            errors.push("Rating must be between 1 and 5".to_string());
        }
        if request.comment.chars().count() > MAX_COMMENT_LEN {
            errors.push(format!(
                "Comment must be at most {} characters",
                MAX_COMMENT_LEN
            ));
        }
        if !errors.is_empty() {
            return Err(MarketError::Validation(errors));
        }

        let order = self
            .store
            .get_order(request.order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Order"))?;
        if order.buyer_id != buyer_id {
            return Err(MarketError::Forbidden(
                "Only the buyer of this order can review it".to_string(),
            ));
        }
        if order.status != OrderStatus::Completed {
            return Err(MarketError::invalid("Only completed orders can be reviewed"));
        }
        if self.store.review_for_order(order.id).await?.is_some() {
            return Err(MarketError::invalid("This order has already been reviewed"));
        }

        let review = Review {
            id: Uuid::new_v4(),
            order_id: order.id,
            seller_id: order.seller_id,
            buyer_id,
            rating: request.rating,
            comment: request.comment.trim().to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_review(&review).await?;
        self.reputation.refresh_seller(order.seller_id).await?;

        info!(review_id = %review.id, seller_id = %order.seller_id, rating = review.rating, "Review submitted");
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Buyer, Seller, VerificationFlags};
    use crate::security::FraudThresholds;
    use crate::store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        service: ListingService,
        seller: Seller,
        buyer: Buyer,
    }

    async fn harness(buyer_flags: VerificationFlags) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditLogger::new());
        let reputation = Arc::new(ReputationManager::new(store.clone(), audit.clone()));
        let fraud = Arc::new(FraudDetector::new(FraudThresholds::default(), audit.clone()));
        let service = ListingService::new(
            store.clone(),
            reputation,
            fraud,
            PurchaseLimits::default(),
            audit,
        );

        let now = Utc::now();
        let seller = Seller {
            id: Uuid::new_v4(),
            name: "Sam".to_string(),
            email: "sam@uni.edu".to_string(),
            phone: "5551234567".to_string(),
            store_name: "Sam's Books".to_string(),
            campus: None,
            business_address: Some("12 College Rd".to_string()),
            payment_account: None,
            password_hash: String::new(),
            flags: VerificationFlags::default(),
            reputation_score: 0,
            trust_tier: TrustTier::Probation,
            created_at: now,
            updated_at: now,
        };
        store.insert_seller(&seller).await.unwrap();

        let buyer = Buyer {
            id: Uuid::new_v4(),
            name: "Bea".to_string(),
            email: "bea@uni.edu".to_string(),
            phone: "5550001111".to_string(),
            password_hash: String::new(),
            flags: buyer_flags,
            created_at: now,
            updated_at: now,
        };
        store.insert_buyer(&buyer).await.unwrap();

        Harness {
            store,
            service,
            seller,
            buyer,
        }
    }

    fn verified() -> VerificationFlags {
        VerificationFlags {
            email_verified: true,
            phone_verified: true,
            ..Default::default()
        }
    }

    fn product(title: &str, price: f64) -> NewProduct {
        NewProduct {
            title: title.to_string(),
            category: "Books".to_string(),
            price,
        }
    }

    fn buyer_of(h: &Harness) -> Principal {
        Principal {
            role: AccountRole::Buyer,
            account_id: h.buyer.id,
        }
    }

    #[tokio::test]
    async fn test_product_validation() {
        let h = harness(verified()).await;
        let err = h
            .service
            .create_product(h.seller.id, product("  ", -1.0))
            .await
            .unwrap_err();
        match err {
            MarketError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }

        let listed = h
            .service
            .create_product(h.seller.id, product("Calculus", 30.0))
            .await
            .unwrap();
        assert_eq!(listed.category, "books");
        let seller = h.store.get_seller(h.seller.id).await.unwrap().unwrap();
        assert_eq!(seller.reputation_score, 1);
    }

    #[tokio::test]
    async fn test_order_rejected_above_cap() {
        let h = harness(verified()).await;
        let pricey = h
            .service
            .create_product(h.seller.id, product("Laptop", 650.0))
            .await
            .unwrap();
        let ok = h
            .service
            .create_product(h.seller.id, product("Lamp", 500.0))
            .await
            .unwrap();

        assert!(matches!(
            h.service
                .create_order(h.buyer.id, NewOrder { product_id: pricey.id })
                .await,
            Err(MarketError::Forbidden(_))
        ));
        assert!(
            h.service
                .create_order(h.buyer.id, NewOrder { product_id: ok.id })
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_probation_seller_with_duplicate_details_blocked() {
        let h = harness(verified()).await;
        let listed = h
            .service
            .create_product(h.seller.id, product("Desk", 40.0))
            .await
            .unwrap();

        let mut twin = h.seller.clone();
        twin.id = Uuid::new_v4();
        twin.email = "twin@uni.edu".to_string();
        twin.phone = "5559876543".to_string();
        twin.store_name = "Twin Store".to_string();
        twin.business_address = Some("12  college rd".to_string());
        h.store.insert_seller(&twin).await.unwrap();

        assert!(matches!(
            h.service
                .create_order(h.buyer.id, NewOrder { product_id: listed.id })
                .await,
            Err(MarketError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_order_lifecycle_and_review() {
        let h = harness(verified()).await;
        let listed = h
            .service
            .create_product(h.seller.id, product("Desk", 40.0))
            .await
            .unwrap();
        let order = h
            .service
            .create_order(h.buyer.id, NewOrder { product_id: listed.id })
            .await
            .unwrap();

        // Review before completion is refused
        let review = NewReview {
            order_id: order.id,
            rating: 5,
            comment: "Great".to_string(),
        };
        assert!(h.service.submit_review(h.buyer.id, review.clone()).await.is_err());

        let seller_principal = Principal {
            role: AccountRole::Seller,
            account_id: h.seller.id,
        };
        assert!(matches!(
            h.service.complete_order(seller_principal, order.id).await,
            Err(MarketError::Forbidden(_))
        ));

        let completed = h.service.complete_order(buyer_of(&h), order.id).await.unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(h.service.cancel_order(buyer_of(&h), order.id).await.is_err());

        h.service.submit_review(h.buyer.id, review.clone()).await.unwrap();
        assert!(h.service.submit_review(h.buyer.id, review).await.is_err());

        // 1 listing + 1 completed order (2) + rating 5 (20)
        let seller = h.store.get_seller(h.seller.id).await.unwrap().unwrap();
        assert_eq!(seller.reputation_score, 23);
    }

    #[tokio::test]
    async fn test_review_rating_bounds() {
        let h = harness(verified()).await;
        for rating in [0, 6] {
            let result = h
                .service
                .submit_review(
                    h.buyer.id,
                    NewReview {
                        order_id: Uuid::new_v4(),
                        rating,
                        comment: String::new(),
                    },
                )
                .await;
            assert!(matches!(result, Err(MarketError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_seller_cancellation_is_recorded() {
        let h = harness(verified()).await;
        let listed = h
            .service
            .create_product(h.seller.id, product("Chair", 25.0))
            .await
            .unwrap();
        let order = h
            .service
            .create_order(h.buyer.id, NewOrder { product_id: listed.id })
            .await
            .unwrap();

        let seller_principal = Principal {
            role: AccountRole::Seller,
            account_id: h.seller.id,
        };
        let cancelled = h.service.cancel_order(seller_principal, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(AccountRole::Seller));
    }

    #[tokio::test]
    async fn test_unverified_buyer_cannot_order() {
        let h = harness(VerificationFlags::default()).await;
        let listed = h
            .service
            .create_product(h.seller.id, product("Pen", 1.0))
            .await
            .unwrap();
        assert!(matches!(
            h.service
                .create_order(h.buyer.id, NewOrder { product_id: listed.id })
                .await,
            Err(MarketError::Forbidden(_))
        ));
    }
}
