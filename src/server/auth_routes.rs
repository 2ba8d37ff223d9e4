use axum::extract::{FromRequest, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppState, OP_AUTH_LOGIN, OP_AUTH_PRIVATE, OP_AUTH_PRIVATE2, OP_AUTH_REGISTER};
use crate::error::{AppError, AppResult};
use crate::identity::{bearer_token, LoginRequest, RegisterRequest, RequestContext};

/// JSON body extractor whose rejections go through `AppError` like every other failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload { email: String, password: String, full_name: String }

#[derive(Debug, Deserialize)]
pub struct LoginPayload { email: String, password: String }

fn authorization_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(bearer_token)
}

async fn admit(state: &AppState, operation: &str, headers: &HeaderMap) -> AppResult<RequestContext> {
    Ok(state.gate.admit_operation(operation, authorization_token(headers)).await?)
}

pub async fn register(State(state): State<AppState>, headers: HeaderMap, AppJson(payload): AppJson<RegisterPayload>) -> AppResult<Json<Value>> {
    admit(&state, OP_AUTH_REGISTER, &headers).await?;
    let req = RegisterRequest { email: payload.email, password: payload.password, full_name: payload.full_name };
    let resp = state.accounts.register(&req).await?;
    Ok(Json(json!({ "user": resp.identity, "token": resp.token })))
}

pub async fn login(State(state): State<AppState>, headers: HeaderMap, AppJson(payload): AppJson<LoginPayload>) -> AppResult<Json<Value>> {
    admit(&state, OP_AUTH_LOGIN, &headers).await?;
    let req = LoginRequest { email: payload.email, password: payload.password };
    let resp = state.accounts.login(&req).await?;
    Ok(Json(json!({ "user": resp.identity, "token": resp.token })))
}

pub async fn private(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let ctx = admit(&state, OP_AUTH_PRIVATE, &headers).await?;
    let user = ctx.identity.ok_or_else(|| AppError::internal("internal", "identity missing after admission"))?;
    Ok(Json(json!({ "ok": true, "message": "private route", "user": user, "requestId": ctx.request_id })))
}

pub async fn private2(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let ctx = admit(&state, OP_AUTH_PRIVATE2, &headers).await?;
    let user = ctx.identity.ok_or_else(|| AppError::internal("internal", "identity missing after admission"))?;
    Ok(Json(json!({ "ok": true, "message": "private route 2", "user": user, "requestId": ctx.request_id })))
}
