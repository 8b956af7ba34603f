//! Administrative endpoints: provider configuration and in-flight
//! diagnostics. Every route here sits behind [`require_admin`].

use std::collections::HashMap;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::{extract_bearer_token, ApiError, ApiState};
use crate::config::{OidcProviderConfig, SamlProviderConfig};
use crate::state::PendingLogin;

/// Bearer guard for the admin surface. With no admin token configured the
/// surface is closed entirely.
pub async fn require_admin(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let authorized = state.admin_token().is_some_and(|expected| {
        extract_bearer_token(request.headers())
            .is_some_and(|presented| presented == expected)
    });

    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

pub async fn list_oidc(
    State(state): State<ApiState>,
) -> Json<HashMap<String, OidcProviderConfig>> {
    Json(state.registry.list_oidc().into_iter().collect())
}

pub async fn get_oidc(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Result<Json<OidcProviderConfig>, ApiError> {
    state
        .registry
        .oidc_config(&provider)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no provider '{provider}'")))
}

pub async fn upsert_oidc(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Json(config): Json<OidcProviderConfig>,
) -> StatusCode {
    state.registry.upsert_oidc(&provider, config);
    StatusCode::NO_CONTENT
}

pub async fn remove_oidc(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.registry.remove_oidc(&provider) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no provider '{provider}'")))
    }
}

pub async fn list_saml(
    State(state): State<ApiState>,
) -> Json<HashMap<String, SamlProviderConfig>> {
    Json(state.registry.list_saml().into_iter().collect())
}

pub async fn get_saml(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Result<Json<SamlProviderConfig>, ApiError> {
    state
        .registry
        .saml_config(&provider)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no provider '{provider}'")))
}

pub async fn upsert_saml(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Json(config): Json<SamlProviderConfig>,
) -> StatusCode {
    state.registry.upsert_saml(&provider, config);
    StatusCode::NO_CONTENT
}

pub async fn remove_saml(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.registry.remove_saml(&provider) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no provider '{provider}'")))
    }
}

/// One in-flight login record, keyed by its state token.
#[derive(Debug, Serialize)]
pub struct PendingLoginView {
    pub token: String,
    #[serde(flatten)]
    pub record: PendingLogin,
}

/// Diagnostic listing of every in-flight OIDC login record.
pub async fn list_states(State(state): State<ApiState>) -> Json<Vec<PendingLoginView>> {
    Json(
        state
            .store
            .snapshot()
            .into_iter()
            .map(|(token, record)| PendingLoginView { token, record })
            .collect(),
    )
}
