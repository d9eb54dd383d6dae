//! HTTP API endpoints for the campus market
//!
//! Provides REST APIs for:
//! - Account registration and login
//! - Phone, email, student and guideline verification
//! - Seller trust reports and buyer purchase eligibility
//! - Listings, orders and reviews
//! - Admin fraud review and audit trail
//! - Security middleware (sessions, admin key, rate limiting, headers)

pub mod accounts;
pub mod admin;
pub mod extract;
pub mod middleware;
pub mod orders;
pub mod trust;
pub mod verification;

use axum::{Router, middleware as axum_middleware};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::market::{AccountService, ListingService};
use crate::reputation::ReputationManager;
use crate::security::{AuditLogger, FraudDetector};
use crate::store::MarketStore;
use crate::verification::VerificationManager;

pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use middleware::{
    RateLimiter, SecurityMiddlewareConfig, SecurityState, admin_middleware, auth_middleware,
    body_size_middleware, logging_middleware, rate_limit_middleware, require_role,
    security_headers_middleware,
};

/// Shared state for every market endpoint
#[derive(Clone)]
pub struct MarketApiState {
    pub store: Arc<dyn MarketStore>,
    pub accounts: Arc<AccountService>,
    pub verification: Arc<VerificationManager>,
    pub reputation: Arc<ReputationManager>,
    pub listings: Arc<ListingService>,
    pub fraud: Arc<FraudDetector>,
    pub audit: Arc<AuditLogger>,
}

/// Wrap a serializable payload as `{"success": true, ...fields}`
pub(crate) fn success<T: serde::Serialize>(key: &str, payload: T) -> axum::Json<Value> {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.insert(
        key.to_string(),
        serde_json::to_value(payload).unwrap_or(Value::Null),
    );
    axum::Json(Value::Object(body))
}

/// Build the full application router with its middleware stack
pub fn create_app(state: MarketApiState, security: SecurityState) -> Router {
    let api = Router::new()
        .merge(accounts::create_router(state.clone()))
        .merge(verification::create_router(state.clone()))
        .merge(trust::create_router(state.clone()))
        .merge(orders::create_router(state.clone()))
        .merge(admin::create_router(state, security.clone()));

    Router::new()
        .nest("/api", api)
        // Apply security middleware layers (outermost last)
        .layer(axum_middleware::from_fn_with_state(
            security.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security.clone(),
            body_size_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security,
            logging_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}
