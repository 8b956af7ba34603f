//! SAML endpoints: challenge redirect, assertion callback, and completion
//! call. The completion call re-verifies the assertion it carries.

use axum::extract::{Path, State};
use axum::response::{Html, Response};
use axum::{Form, Json};
use serde::Deserialize;

use super::{redirect_found, ApiError, ApiState, AuthRequest};
use crate::authority::SessionGrant;

/// POST body of the assertion callback.
#[derive(Debug, Deserialize)]
pub struct CallbackForm {
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
}

/// GET /sso/saml/challenge/:provider
pub async fn challenge(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let url = state.saml.challenge(&provider)?;
    Ok(redirect_found(&url))
}

/// POST /sso/saml/callback/:provider
pub async fn callback(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Form(form): Form<CallbackForm>,
) -> Result<Html<String>, ApiError> {
    state.saml.callback(&provider, &form.saml_response)?;
    Ok(Html(
        state
            .handoff
            .render("saml", &provider, &form.saml_response),
    ))
}

/// POST /sso/saml/auth/:provider
pub async fn auth(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<SessionGrant>, ApiError> {
    let config = state.registry.saml(&provider)?;
    let decision = state.saml.callback(&provider, &request.data)?;

    let grant = state
        .bridge
        .authenticate(&provider, &config.policy, &decision, &request.device())
        .await?;
    Ok(Json(grant))
}
