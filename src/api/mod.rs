//! HTTP surface for the SSO bridge.
//!
//! Thin axum routing over the flow engine: one challenge/callback/auth
//! triple per protocol, plus an admin surface for provider configuration
//! and in-flight diagnostics.

pub mod admin;
pub mod oidc;
pub mod responses;
pub mod saml;

pub use responses::ApiError;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::authority::DeviceProfile;
use crate::bridge::AuthenticationBridge;
use crate::config::ProviderRegistry;
use crate::flows::oidc::OidcFlow;
use crate::flows::saml::SamlFlow;
use crate::state::StateStore;

/// Shared server state.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<StateStore>,
    pub oidc: Arc<OidcFlow>,
    pub saml: Arc<SamlFlow>,
    pub bridge: Arc<AuthenticationBridge>,
    pub handoff: Arc<dyn HandoffPage>,
    base_url: String,
    admin_token: Option<String>,
}

impl ApiState {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<StateStore>,
        oidc: Arc<OidcFlow>,
        saml: Arc<SamlFlow>,
        bridge: Arc<AuthenticationBridge>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            oidc,
            saml,
            bridge,
            handoff: Arc::new(BasicHandoffPage),
            base_url: base_url.into(),
            admin_token: None,
        }
    }

    /// Bearer token required on the admin surface. Without one, every admin
    /// call is rejected.
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn HandoffPage>) -> Self {
        self.handoff = handoff;
        self
    }

    pub(crate) fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    pub(crate) fn callback_uri(&self, protocol: &str, provider: &str) -> String {
        format!(
            "{}/sso/{protocol}/callback/{provider}",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Completion call body shared by both protocols. `data` carries the state
/// token (OIDC) or the encoded assertion (SAML).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub device_id: String,
    pub device_name: String,
    pub app_name: String,
    pub app_version: String,
    pub data: String,
}

impl AuthRequest {
    pub(crate) fn device(&self) -> DeviceProfile {
        DeviceProfile {
            device_id: self.device_id.clone(),
            device_name: self.device_name.clone(),
            app_name: self.app_name.clone(),
            app_version: self.app_version.clone(),
        }
    }
}

/// Renders the HTML page handed to the client after a decided callback.
/// Page generation stays outside the core; embedders replace this to match
/// their client hand-off convention.
pub trait HandoffPage: Send + Sync {
    fn render(&self, protocol: &str, provider: &str, payload: &str) -> String;
}

/// Minimal hand-off page: embeds the completion payload for the client to
/// pick up and post to the auth endpoint.
pub struct BasicHandoffPage;

impl HandoffPage for BasicHandoffPage {
    fn render(&self, protocol: &str, provider: &str, payload: &str) -> String {
        format!(
            concat!(
                "<!DOCTYPE html><html><head><title>Sign-in complete</title></head><body>",
                "<p>Sign-in complete. You can return to the app.</p>",
                "<input type=\"hidden\" id=\"sso-protocol\" value=\"{protocol}\">",
                "<input type=\"hidden\" id=\"sso-provider\" value=\"{provider}\">",
                "<input type=\"hidden\" id=\"sso-data\" value=\"{payload}\">",
                "</body></html>"
            ),
            protocol = html_escape(protocol),
            provider = html_escape(provider),
            payload = html_escape(payload),
        )
    }
}

fn html_escape(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            other => other.to_string(),
        })
        .collect()
}

/// 302 redirect to the identity provider.
pub(crate) fn redirect_found(url: &url::Url) -> axum::response::Response {
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;

    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

/// Extract a bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Build the full router over the given state.
pub fn router(state: ApiState) -> Router {
    let admin_routes = Router::new()
        .route("/sso/admin/oid", get(admin::list_oidc))
        .route("/sso/admin/oid/states", get(admin::list_states))
        .route(
            "/sso/admin/oid/:provider",
            get(admin::get_oidc)
                .post(admin::upsert_oidc)
                .delete(admin::remove_oidc),
        )
        .route("/sso/admin/saml", get(admin::list_saml))
        .route(
            "/sso/admin/saml/:provider",
            get(admin::get_saml)
                .post(admin::upsert_saml)
                .delete(admin::remove_saml),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    Router::new()
        .route("/sso/oid/challenge/:provider", get(oidc::challenge))
        .route("/sso/oid/callback/:provider", get(oidc::callback))
        .route("/sso/oid/auth/:provider", post(oidc::auth))
        .route("/sso/saml/challenge/:provider", get(saml::challenge))
        .route("/sso/saml/callback/:provider", post(saml::callback))
        .route("/sso/saml/auth/:provider", post(saml::auth))
        .merge(admin_routes)
        .with_state(state)
}
