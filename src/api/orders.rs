//! Listing, order and review endpoints

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::Value;
use uuid::Uuid;

use super::{ApiJson, ApiPath, MarketApiState, require_role, success};
use crate::error::MarketResult;
use crate::market::{AccountRole, NewOrder, NewProduct, NewReview, Principal};

/// POST /api/products
pub async fn create_product(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<NewProduct>,
) -> MarketResult<(StatusCode, Json<Value>)> {
    require_role(&principal, AccountRole::Seller)?;
    let product = state
        .listings
        .create_product(principal.account_id, request)
        .await?;
    Ok((StatusCode::CREATED, success("product", product)))
}

/// POST /api/orders/create
pub async fn create_order(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<NewOrder>,
) -> MarketResult<(StatusCode, Json<Value>)> {
    require_role(&principal, AccountRole::Buyer)?;
    let order = state
        .listings
        .create_order(principal.account_id, request)
        .await?;
    Ok((StatusCode::CREATED, success("order", order)))
}

/// POST /api/orders/{id}/complete
pub async fn complete_order(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiPath(order_id): ApiPath<Uuid>,
) -> MarketResult<Json<Value>> {
    let order = state.listings.complete_order(principal, order_id).await?;
    Ok(success("order", order))
}

/// POST /api/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiPath(order_id): ApiPath<Uuid>,
) -> MarketResult<Json<Value>> {
    let order = state.listings.cancel_order(principal, order_id).await?;
    Ok(success("order", order))
}

/// POST /api/reviews
pub async fn submit_review(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<NewReview>,
) -> MarketResult<(StatusCode, Json<Value>)> {
    require_role(&principal, AccountRole::Buyer)?;
    let review = state
        .listings
        .submit_review(principal.account_id, request)
        .await?;
    Ok((StatusCode::CREATED, success("review", review)))
}

pub fn create_router(state: MarketApiState) -> Router {
    Router::new()
        .route("/products", post(create_product))
        .route("/orders/create", post(create_order))
        .route("/orders/{id}/complete", post(complete_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/reviews", post(submit_review))
        .with_state(state)
}
