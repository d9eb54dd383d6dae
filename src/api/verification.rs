//! Verification endpoints
//!
//! All routes act on the authenticated caller's own account.

use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiJson, MarketApiState, require_role, success};
use crate::error::MarketResult;
use crate::market::{AccountRole, Principal};
use crate::verification::VerificationChannel;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgementRequest {
    pub accepted: bool,
}

async fn send(
    state: &MarketApiState,
    principal: Principal,
    channel: VerificationChannel,
) -> MarketResult<Json<Value>> {
    let dispatch = state
        .verification
        .send_code(principal.into(), channel)
        .await?;
    Ok(success("dispatch", dispatch))
}

async fn check(
    state: &MarketApiState,
    principal: Principal,
    channel: VerificationChannel,
    code: &str,
) -> MarketResult<Json<Value>> {
    let status = state
        .verification
        .check_code(principal.into(), channel, code)
        .await?;
    Ok(success("verification", status))
}

/// POST /api/verify/phone/send
pub async fn send_phone_code(
    State(state): State<MarketApiState>,
    principal: Principal,
) -> MarketResult<Json<Value>> {
    send(&state, principal, VerificationChannel::Phone).await
}

/// POST /api/verify/phone
pub async fn verify_phone(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<CodeRequest>,
) -> MarketResult<Json<Value>> {
    check(&state, principal, VerificationChannel::Phone, &request.code).await
}

/// POST /api/verify/email/send
pub async fn send_email_code(
    State(state): State<MarketApiState>,
    principal: Principal,
) -> MarketResult<Json<Value>> {
    send(&state, principal, VerificationChannel::Email).await
}

/// POST /api/verify/email
pub async fn verify_email(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<CodeRequest>,
) -> MarketResult<Json<Value>> {
    check(&state, principal, VerificationChannel::Email, &request.code).await
}

/// POST /api/verify/student
pub async fn confirm_student(
    State(state): State<MarketApiState>,
    principal: Principal,
) -> MarketResult<Json<Value>> {
    let status = state.verification.confirm_student(principal.into()).await?;
    Ok(success("verification", status))
}

/// POST /api/verify/safety
pub async fn acknowledge_safety(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<AcknowledgementRequest>,
) -> MarketResult<Json<Value>> {
    require_role(&principal, AccountRole::Seller)?;
    let status = state
        .verification
        .acknowledge_safety(principal.into(), request.accepted)
        .await?;
    Ok(success("verification", status))
}

/// POST /api/verify/anti-scam
pub async fn acknowledge_anti_scam(
    State(state): State<MarketApiState>,
    principal: Principal,
    ApiJson(request): ApiJson<AcknowledgementRequest>,
) -> MarketResult<Json<Value>> {
    require_role(&principal, AccountRole::Seller)?;
    let status = state
        .verification
        .acknowledge_anti_scam(principal.into(), request.accepted)
        .await?;
    Ok(success("verification", status))
}

pub fn create_router(state: MarketApiState) -> Router {
    Router::new()
        .route("/verify/phone/send", post(send_phone_code))
        .route("/verify/phone", post(verify_phone))
        .route("/verify/email/send", post(send_email_code))
        .route("/verify/email", post(verify_email))
        .route("/verify/student", post(confirm_student))
        .route("/verify/safety", post(acknowledge_safety))
        .route("/verify/anti-scam", post(acknowledge_anti_scam))
        .with_state(state)
}
