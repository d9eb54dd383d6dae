//! In-memory store backed by tokio `RwLock` maps

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountKey, DuplicateAccount, DuplicateField, MarketStore, normalize_detail};
use crate::market::{
    AccountRole, Buyer, Order, Product, Review, Seller, VerificationFlag, VerificationFlags,
};
use crate::reputation::TrustTier;

#[derive(Default)]
pub struct MemoryStore {
    sellers: RwLock<HashMap<Uuid, Seller>>,
    buyers: RwLock<HashMap<Uuid, Buyer>>,
    products: RwLock<HashMap<Uuid, Product>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    reviews: RwLock<HashMap<Uuid, Review>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn seller_matches(seller: &Seller, key: &AccountKey) -> bool {
    match key {
        AccountKey::Email(email) => seller.email.eq_ignore_ascii_case(email),
        AccountKey::Phone(phone) => &seller.phone == phone,
        AccountKey::StoreName(name) => seller.store_name.to_lowercase() == name.to_lowercase(),
    }
}

fn buyer_matches(buyer: &Buyer, key: &AccountKey) -> bool {
    match key {
        AccountKey::Email(email) => buyer.email.eq_ignore_ascii_case(email),
        AccountKey::Phone(phone) => &buyer.phone == phone,
        AccountKey::StoreName(_) => false,
    }
}

fn seller_clash(existing: &Seller, new: &Seller) -> Option<DuplicateField> {
    if seller_matches(existing, &AccountKey::Email(new.email.clone())) {
        Some(DuplicateField::Email)
    } else if seller_matches(existing, &AccountKey::Phone(new.phone.clone())) {
        Some(DuplicateField::Phone)
    } else if seller_matches(existing, &AccountKey::StoreName(new.store_name.clone())) {
        Some(DuplicateField::StoreName)
    } else {
        None
    }
}

fn buyer_clash(existing: &Buyer, new: &Buyer) -> Option<DuplicateField> {
    if buyer_matches(existing, &AccountKey::Email(new.email.clone())) {
        Some(DuplicateField::Email)
    } else if buyer_matches(existing, &AccountKey::Phone(new.phone.clone())) {
        Some(DuplicateField::Phone)
    } else {
        None
    }
}

fn same_detail(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = normalize_detail(a);
            !a.is_empty() && a == normalize_detail(b)
        }
        _ => false,
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn insert_seller(&self, seller: &Seller) -> Result<()> {
        let mut sellers = self.sellers.write().await;
        if sellers.contains_key(&seller.id) {
            return Err(anyhow!("Seller {} already exists", seller.id));
        }
        if let Some(field) = sellers.values().find_map(|s| seller_clash(s, seller)) {
            return Err(DuplicateAccount(field).into());
        }
        sellers.insert(seller.id, seller.clone());
        Ok(())
    }

    async fn update_seller_reputation(&self, id: Uuid, score: u8, tier: TrustTier) -> Result<()> {
        let mut sellers = self.sellers.write().await;
        let seller = sellers
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Seller {} does not exist", id))?;
        seller.reputation_score = score;
        seller.trust_tier = tier;
        seller.updated_at = Utc::now();
        Ok(())
    }

    async fn get_seller(&self, id: Uuid) -> Result<Option<Seller>> {
        Ok(self.sellers.read().await.get(&id).cloned())
    }

    async fn find_seller(&self, key: &AccountKey) -> Result<Option<Seller>> {
        let sellers = self.sellers.read().await;
        Ok(sellers.values().find(|s| seller_matches(s, key)).cloned())
    }

    async fn sellers_sharing_details(&self, seller: &Seller) -> Result<Vec<Seller>> {
        let sellers = self.sellers.read().await;
        Ok(sellers
            .values()
            .filter(|other| other.id != seller.id)
            .filter(|other| {
                same_detail(&other.business_address, &seller.business_address)
                    || same_detail(&other.payment_account, &seller.payment_account)
            })
            .cloned()
            .collect())
    }

    async fn insert_buyer(&self, buyer: &Buyer) -> Result<()> {
        let mut buyers = self.buyers.write().await;
        if buyers.contains_key(&buyer.id) {
            return Err(anyhow!("Buyer {} already exists", buyer.id));
        }
        if let Some(field) = buyers.values().find_map(|b| buyer_clash(b, buyer)) {
            return Err(DuplicateAccount(field).into());
        }
        buyers.insert(buyer.id, buyer.clone());
        Ok(())
    }

    async fn get_buyer(&self, id: Uuid) -> Result<Option<Buyer>> {
        Ok(self.buyers.read().await.get(&id).cloned())
    }

    async fn find_buyer(&self, key: &AccountKey) -> Result<Option<Buyer>> {
        let buyers = self.buyers.read().await;
        Ok(buyers.values().find(|b| buyer_matches(b, key)).cloned())
    }

    async fn set_verification_flag(
        &self,
        role: AccountRole,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<Option<VerificationFlags>> {
        if !flag.applies_to(role) {
            return Err(anyhow!(
                "{} accounts have no {} flag",
                role.as_str(),
                flag.column()
            ));
        }

        let now = Utc::now();
        let flags = match role {
            AccountRole::Seller => self.sellers.write().await.get_mut(&id).map(|s| {
                s.flags.set(flag);
                s.updated_at = now;
                s.flags
            }),
            AccountRole::Buyer => self.buyers.write().await.get_mut(&id).map(|b| {
                b.flags.set(flag);
                b.updated_at = now;
                b.flags
            }),
        };
        Ok(flags)
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.products
            .write()
            .await
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn products_for_seller(&self, seller_id: Uuid) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        Ok(products
            .values()
            .filter(|p| p.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn active_products_in_category(&self, category: &str) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        Ok(products
            .values()
            .filter(|p| p.active && p.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(anyhow!("Order {} does not exist", order.id)),
        }
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn orders_for_seller(&self, seller_id: Uuid) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        if reviews.values().any(|r| r.order_id == review.order_id) {
            return Err(anyhow!("Order {} already reviewed", review.order_id));
        }
        reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn review_for_order(&self, order_id: Uuid) -> Result<Option<Review>> {
        let reviews = self.reviews.read().await;
        Ok(reviews.values().find(|r| r.order_id == order_id).cloned())
    }

    async fn reviews_for_seller(&self, seller_id: Uuid) -> Result<Vec<Review>> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .values()
            .filter(|r| r.seller_id == seller_id)
            .cloned()
            .collect())
    }
}
