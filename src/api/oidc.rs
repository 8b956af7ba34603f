//! OIDC endpoints: challenge redirect, callback, and completion call.

use axum::extract::{Path, Query, State};
use axum::response::{Html, Response};
use axum::Json;

use super::{redirect_found, ApiError, ApiState, AuthRequest};
use crate::authority::SessionGrant;
use crate::flows::oidc::CallbackParams;
use crate::flows::IdentityDecision;

/// GET /sso/oid/challenge/:provider
pub async fn challenge(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let redirect_uri = state.callback_uri("oid", &provider);
    let url = state.oidc.challenge(&provider, &redirect_uri).await?;
    Ok(redirect_found(&url))
}

/// GET /sso/oid/callback/:provider
pub async fn callback(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<String>, ApiError> {
    let token = params.state.clone();
    let decision = state.oidc.callback(&provider, &params).await?;
    if !decision.valid {
        return Err(ApiError::unauthorized());
    }
    Ok(Html(state.handoff.render("oid", &provider, &token)))
}

/// POST /sso/oid/auth/:provider
pub async fn auth(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<SessionGrant>, ApiError> {
    let config = state.registry.oidc(&provider)?;
    let record = state.oidc.consume(&request.data)?;
    let decision = IdentityDecision::from(record);

    let grant = state
        .bridge
        .authenticate(&provider, &config.policy, &decision, &request.device())
        .await?;
    Ok(Json(grant))
}
