//! Admin endpoints, guarded by the `x-admin-key` header

use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{
    ApiPath, ApiQuery, MarketApiState, SecurityState, admin_middleware, success,
};
use crate::error::MarketResult;
use crate::market::AccountRole;
use crate::security::{AuditEntry, FraudFlag};

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FraudReport {
    pub seller_id: Uuid,
    pub flagged: bool,
    pub flags: Vec<FraudFlag>,
}

#[derive(Debug, Serialize)]
pub struct AuditPage {
    pub total: usize,
    pub entries: Vec<AuditEntry>,
}

/// GET /api/admin/sellers/{id}/fraud - run the fraud heuristics now
pub async fn seller_fraud(
    State(state): State<MarketApiState>,
    ApiPath(seller_id): ApiPath<Uuid>,
) -> MarketResult<Json<Value>> {
    let flags = state
        .fraud
        .scan_seller(state.store.as_ref(), seller_id)
        .await?;
    Ok(success(
        "fraud",
        FraudReport {
            seller_id,
            flagged: !flags.is_empty(),
            flags,
        },
    ))
}

/// POST /api/admin/sellers/{id}/student
pub async fn confirm_seller_student(
    State(state): State<MarketApiState>,
    ApiPath(seller_id): ApiPath<Uuid>,
) -> MarketResult<Json<Value>> {
    let status = state
        .verification
        .admin_confirm_student(AccountRole::Seller, seller_id)
        .await?;
    Ok(success("verification", status))
}

/// POST /api/admin/buyers/{id}/student
pub async fn confirm_buyer_student(
    State(state): State<MarketApiState>,
    ApiPath(buyer_id): ApiPath<Uuid>,
) -> MarketResult<Json<Value>> {
    let status = state
        .verification
        .admin_confirm_student(AccountRole::Buyer, buyer_id)
        .await?;
    Ok(success("verification", status))
}

/// GET /api/admin/audit?limit= - most recent entries first
pub async fn recent_audit(
    State(state): State<MarketApiState>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> Json<Value> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = state.audit.get_recent(limit).await;
    success(
        "audit",
        AuditPage {
            total: entries.len(),
            entries,
        },
    )
}

pub fn create_router(state: MarketApiState, security: SecurityState) -> Router {
    Router::new()
        .route("/admin/sellers/{id}/fraud", get(seller_fraud))
        .route("/admin/sellers/{id}/student", post(confirm_seller_student))
        .route("/admin/buyers/{id}/student", post(confirm_buyer_student))
        .route("/admin/audit", get(recent_audit))
        .route_layer(middleware::from_fn_with_state(security, admin_middleware))
        .with_state(state)
}
