//! Registration and login endpoints

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ApiJson, MarketApiState, success};
use crate::error::MarketResult;
use crate::market::{AccountRole, NewBuyer, NewSeller};
use crate::reputation::TrustTier;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub role: AccountRole,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredAccount {
    pub id: Uuid,
    pub role: AccountRole,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_tier: Option<TrustTier>,
}

/// POST /api/sellers/register
pub async fn register_seller(
    State(state): State<MarketApiState>,
    ApiJson(request): ApiJson<NewSeller>,
) -> MarketResult<(StatusCode, Json<Value>)> {
    let seller = state.accounts.register_seller(request).await?;

    Ok((
        StatusCode::CREATED,
        success(
            "account",
            RegisteredAccount {
                id: seller.id,
                role: AccountRole::Seller,
                name: seller.name,
                email: seller.email,
                store_name: Some(seller.store_name),
                trust_tier: Some(seller.trust_tier),
            },
        ),
    ))
}

/// POST /api/buyers/register
pub async fn register_buyer(
    State(state): State<MarketApiState>,
    ApiJson(request): ApiJson<NewBuyer>,
) -> MarketResult<(StatusCode, Json<Value>)> {
    let buyer = state.accounts.register_buyer(request).await?;

    Ok((
        StatusCode::CREATED,
        success(
            "account",
            RegisteredAccount {
                id: buyer.id,
                role: AccountRole::Buyer,
                name: buyer.name,
                email: buyer.email,
                store_name: None,
                trust_tier: None,
            },
        ),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<MarketApiState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> MarketResult<Json<Value>> {
    let session = state
        .accounts
        .login(request.role, &request.email, &request.password)
        .await?;
    Ok(success("session", session))
}

pub fn create_router(state: MarketApiState) -> Router {
    Router::new()
        .route("/sellers/register", post(register_seller))
        .route("/buyers/register", post(register_buyer))
        .route("/auth/login", post(login))
        .with_state(state)
}
