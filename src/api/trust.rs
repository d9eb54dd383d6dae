//! Seller trust reports and buyer purchase eligibility

use axum::{Json, Router, extract::State, routing::get};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{ApiPath, ApiQuery, MarketApiState, require_role, success};
use crate::error::MarketResult;
use crate::market::{AccountRole, Principal};

#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    pub amount: f64,
}

/// GET /api/sellers/{id}/trust - score breakdown, tier and next-tier requirements
pub async fn seller_trust(
    State(state): State<MarketApiState>,
    ApiPath(seller_id): ApiPath<Uuid>,
) -> MarketResult<Json<Value>> {
    let report = state.reputation.seller_report(seller_id).await?;
    Ok(success("trust", report))
}

/// GET /api/purchase/eligibility?amount=
pub async fn purchase_eligibility(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiQuery(query): ApiQuery<EligibilityQuery>,
) -> MarketResult<Json<Value>> {
    require_role(&principal, AccountRole::Buyer)?;
    let decision = state
        .listings
        .eligibility(principal.account_id, query.amount)
        .await?;
    Ok(success("eligibility", decision))
}

pub fn create_router(state: MarketApiState) -> Router {
    Router::new()
        .route("/sellers/{id}/trust", get(seller_trust))
        .route("/purchase/eligibility", get(purchase_eligibility))
        .with_state(state)
}
