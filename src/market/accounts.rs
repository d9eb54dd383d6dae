//! Account registration, passwords and login
//!
//! Registration collects every validation problem before answering so the
//! client can show them together. Duplicate email, phone or store name
//! blocks registration.

use chrono::Utc;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::market::{AccountRole, Buyer, Seller, VerificationFlag, VerificationFlags};
use crate::reputation::TrustTier;
use crate::security::{AuditLogger, constant_time_eq};
use crate::store::{AccountKey, DuplicateAccount, DuplicateField, MarketStore};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// Lowercase and trim an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keep digits only, preserving a leading `+`
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else {
        digits
    }
}

pub fn validate_email(email: &str, errors: &mut Vec<String>) {
    if email.is_empty() {
        errors.push("Email is required".to_string());
    } else if !email_regex().is_match(email) {
        errors.push("Email address is not valid".to_string());
    }
}

pub fn validate_phone(phone: &str, errors: &mut Vec<String>) {
    let digits = phone.trim_start_matches('+').len();
    if !(10..=15).contains(&digits) {
        errors.push("Phone number must have 10 to 15 digits".to_string());
    }
}

pub fn validate_password(password: &str, errors: &mut Vec<String>) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_alphabetic()) || !password.chars().any(|c| c.is_ascii_digit())
    {
        errors.push("Password must contain a letter and a digit".to_string());
    }
}

fn validate_name(name: &str, errors: &mut Vec<String>) {
    let len = name.trim().chars().count();
    if len == 0 {
        errors.push("Name is required".to_string());
    } else if len > MAX_NAME_LEN {
        errors.push(format!("Name must be at most {} characters", MAX_NAME_LEN));
    }
}

fn validate_store_name(store_name: &str, errors: &mut Vec<String>) {
    let len = store_name.trim().chars().count();
    if !(3..=60).contains(&len) {
        errors.push("Store name must be between 3 and 60 characters".to_string());
    }
}

/// Salted SHA-256, stored as `salt$digest` in hex
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    format!("{}${}", salt, digest_password(&salt, password))
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => {
            constant_time_eq(digest_password(salt, password).as_bytes(), digest.as_bytes())
        }
        None => false,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSeller {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub store_name: String,
    #[serde(default)]
    pub campus: Option<String>,
    #[serde(default)]
    pub business_address: Option<String>,
    #[serde(default)]
    pub payment_account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBuyer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

/// Either kind of account, loaded from the store
#[derive(Debug, Clone)]
pub enum Account {
    Seller(Seller),
    Buyer(Buyer),
}

impl Account {
    pub fn id(&self) -> Uuid {
        match self {
            Account::Seller(s) => s.id,
            Account::Buyer(b) => b.id,
        }
    }

    pub fn role(&self) -> AccountRole {
        match self {
            Account::Seller(_) => AccountRole::Seller,
            Account::Buyer(_) => AccountRole::Buyer,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Account::Seller(s) => &s.email,
            Account::Buyer(b) => &b.email,
        }
    }

    pub fn phone(&self) -> &str {
        match self {
            Account::Seller(s) => &s.phone,
            Account::Buyer(b) => &b.phone,
        }
    }

    pub fn flags(&self) -> &VerificationFlags {
        match self {
            Account::Seller(s) => &s.flags,
            Account::Buyer(b) => &b.flags,
        }
    }

    fn password_hash(&self) -> &str {
        match self {
            Account::Seller(s) => &s.password_hash,
            Account::Buyer(b) => &b.password_hash,
        }
    }

    pub async fn load(
        store: &dyn MarketStore,
        role: AccountRole,
        id: Uuid,
    ) -> MarketResult<Account> {
        let account = match role {
            AccountRole::Seller => store.get_seller(id).await?.map(Account::Seller),
            AccountRole::Buyer => store.get_buyer(id).await?.map(Account::Buyer),
        };
        account.ok_or_else(|| MarketError::not_found("Account"))
    }

    /// Switch one verification flag on, returning the flags as stored afterwards
    pub async fn set_flag(
        store: &dyn MarketStore,
        role: AccountRole,
        id: Uuid,
        flag: VerificationFlag,
    ) -> MarketResult<VerificationFlags> {
        store
            .set_verification_flag(role, id, flag)
            .await?
            .ok_or_else(|| MarketError::not_found("Account"))
    }
}

/// Registration and login
pub struct AccountService {
    store: Arc<dyn MarketStore>,
    sessions: Arc<super::SessionStore>,
    audit: Arc<AuditLogger>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        sessions: Arc<super::SessionStore>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            store,
            sessions,
            audit,
        }
    }

    pub async fn register_seller(&self, request: NewSeller) -> MarketResult<Seller> {
        let email = normalize_email(&request.email);
        let phone = normalize_phone(&request.phone);
        let store_name = request.store_name.trim().to_string();

        let mut errors = Vec::new();
        validate_name(&request.name, &mut errors);
        validate_email(&email, &mut errors);
        validate_phone(&phone, &mut errors);
        validate_password(&request.password, &mut errors);
        validate_store_name(&store_name, &mut errors);
        if !errors.is_empty() {
            return Err(MarketError::Validation(errors));
        }

        if self
            .store
            .find_seller(&AccountKey::Email(email.clone()))
            .await?
            .is_some()
        {
            errors.push(DuplicateField::Email.message().to_string());
        }
        if self
            .store
            .find_seller(&AccountKey::Phone(phone.clone()))
            .await?
            .is_some()
        {
            errors.push(DuplicateField::Phone.message().to_string());
        }
        if self
            .store
            .find_seller(&AccountKey::StoreName(store_name.clone()))
            .await?
            .is_some()
        {
            errors.push(DuplicateField::StoreName.message().to_string());
        }
        if !errors.is_empty() {
            warn!(errors = ?errors, "Seller registration blocked by duplicates");
            return Err(MarketError::Validation(errors));
        }

        let now = Utc::now();
        let seller = Seller {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            email,
            phone,
            store_name,
            campus: clean_optional(request.campus),
            business_address: clean_optional(request.business_address),
            payment_account: clean_optional(request.payment_account),
            password_hash: hash_password(&request.password),
            flags: VerificationFlags::default(),
            reputation_score: 0,
            trust_tier: TrustTier::Probation,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert_seller(&seller)
            .await
            .map_err(duplicate_to_validation)?;
        self.audit
            .log_account_registered(AccountRole::Seller, seller.id)
            .await;
        info!(seller_id = %seller.id, store = %seller.store_name, "Seller registered");

        Ok(seller)
    }

    pub async fn register_buyer(&self, request: NewBuyer) -> MarketResult<Buyer> {
        let email = normalize_email(&request.email);
        let phone = normalize_phone(&request.phone);

        let mut errors = Vec::new();
        validate_name(&request.name, &mut errors);
        validate_email(&email, &mut errors);
        validate_phone(&phone, &mut errors);
        validate_password(&request.password, &mut errors);
        if !errors.is_empty() {
            return Err(MarketError::Validation(errors));
        }

        if self
            .store
            .find_buyer(&AccountKey::Email(email.clone()))
            .await?
            .is_some()
        {
            errors.push(DuplicateField::Email.message().to_string());
        }
        if self
            .store
            .find_buyer(&AccountKey::Phone(phone.clone()))
            .await?
            .is_some()
        {
            errors.push(DuplicateField::Phone.message().to_string());
        }
        if !errors.is_empty() {
            warn!(errors = ?errors, "Buyer registration blocked by duplicates");
            return Err(MarketError::Validation(errors));
        }

        let now = Utc::now();
        let buyer = Buyer {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            email,
            phone,
            password_hash: hash_password(&request.password),
            flags: VerificationFlags::default(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert_buyer(&buyer)
            .await
            .map_err(duplicate_to_validation)?;
        self.audit
            .log_account_registered(AccountRole::Buyer, buyer.id)
            .await;
        info!(buyer_id = %buyer.id, "Buyer registered");

        Ok(buyer)
    }

    /// Check credentials and open a session
    pub async fn login(
        &self,
        role: AccountRole,
        email: &str,
        password: &str,
    ) -> MarketResult<LoginSession> {
        let key = AccountKey::Email(normalize_email(email));
        let account = match role {
            AccountRole::Seller => self.store.find_seller(&key).await?.map(Account::Seller),
            AccountRole::Buyer => self.store.find_buyer(&key).await?.map(Account::Buyer),
        };

        let account = match account {
            Some(account) if verify_password(account.password_hash(), password) => account,
            _ => {
                self.audit
                    .log_login_failed(role, "invalid email or password")
                    .await;
                return Err(MarketError::Unauthorized);
            }
        };

        let session = self.sessions.open(role, account.id());
        self.audit.log_login_succeeded(role, account.id()).await;

        Ok(LoginSession {
            token: session.token,
            expires_at: session.expires_at.to_rfc3339(),
            role,
            account_id: account.id(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginSession {
    pub token: String,
    pub expires_at: String,
    pub role: AccountRole,
    pub account_id: Uuid,
}

/// An insert that lost a registration race reads like the pre-check failure
fn duplicate_to_validation(err: anyhow::Error) -> MarketError {
    match err.downcast_ref::<DuplicateAccount>() {
        Some(duplicate) => {
            warn!(field = ?duplicate.0, "Registration lost a race on a unique field");
            MarketError::invalid(duplicate.to_string())
        }
        None => MarketError::Internal(err),
    }
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
