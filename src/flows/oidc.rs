//! OIDC authorization-code flow adapter.
//!
//! Drives the `Init → Challenged → Returned → Decided → Consumed|Expired`
//! sequence. Code exchange and ID-token verification are delegated to the
//! external protocol library behind the [`CodeExchange`] seam; this module
//! owns only the state handling and the claim evaluation pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{evaluate_claims, Claim, ClaimSet, IdentityDecision};
use crate::claims::ClaimPath;
use crate::config::{OidcProviderConfig, ProviderRegistry};
use crate::errors::{Result, SsoError};
use crate::state::{PendingLogin, StateStore};

/// Query parameters of the callback redirect from the IdP.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    pub state: String,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A freshly built authorization request.
#[derive(Debug)]
pub struct Challenge {
    /// State token correlating the later callback with this challenge.
    pub state_token: String,
    /// Where to send the client.
    pub redirect_url: Url,
    /// Opaque library state to stash until the callback.
    pub protocol_state: String,
}

/// Seam to the external OIDC protocol library.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    /// Build an authorization request against the provider.
    async fn begin(&self, provider: &OidcProviderConfig, redirect_uri: &str) -> Result<Challenge>;

    /// Exchange the callback payload for the verified claim set.
    async fn exchange(
        &self,
        provider: &OidcProviderConfig,
        protocol_state: &str,
        params: &CallbackParams,
    ) -> Result<ClaimSet>;
}

/// Protocol state serialized between challenge and callback.
#[derive(Debug, Serialize, Deserialize)]
struct ExchangeState {
    pkce_verifier: String,
    nonce: String,
    redirect_uri: String,
}

/// Production [`CodeExchange`] backed by the `openidconnect` crate:
/// issuer discovery, PKCE, nonce, code exchange, and ID-token verification.
pub struct OpenIdExchange {
    http: reqwest::Client,
}

impl OpenIdExchange {
    pub fn new() -> Result<Self> {
        // Redirects stay disabled on the exchange client.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SsoError::protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn discover(&self, provider: &OidcProviderConfig) -> Result<CoreProviderMetadata> {
        let issuer = IssuerUrl::new(provider.endpoint.clone())?;
        CoreProviderMetadata::discover_async(issuer, &self.http)
            .await
            .map_err(|e| SsoError::protocol(format!("provider discovery failed: {e}")))
    }

    /// Fetch additional claims from the userinfo endpoint. Failures here
    /// only reduce the claim set, they never fail the callback.
    async fn userinfo_claims(&self, endpoint: &str, access_token: &str) -> Option<ClaimSet> {
        let response = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .ok()?;
        let body: serde_json::Map<String, Value> = response.json().await.ok()?;
        Some(claims_from_object(body))
    }
}

#[async_trait]
impl CodeExchange for OpenIdExchange {
    async fn begin(&self, provider: &OidcProviderConfig, redirect_uri: &str) -> Result<Challenge> {
        let metadata = self.discover(provider).await?;
        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(provider.client_id.clone()),
            Some(ClientSecret::new(provider.client_secret.clone())),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            CsrfToken::new_random,
            Nonce::new_random,
        );
        request = request
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("profile".to_string()));
        for scope in &provider.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        request = request.set_pkce_challenge(pkce_challenge);

        let (redirect_url, csrf, nonce) = request.url();

        let protocol_state = serde_json::to_string(&ExchangeState {
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
            redirect_uri: redirect_uri.to_string(),
        })?;

        Ok(Challenge {
            state_token: csrf.secret().clone(),
            redirect_url,
            protocol_state,
        })
    }

    async fn exchange(
        &self,
        provider: &OidcProviderConfig,
        protocol_state: &str,
        params: &CallbackParams,
    ) -> Result<ClaimSet> {
        if let Some(error) = &params.error {
            let detail = params.error_description.as_deref().unwrap_or("");
            return Err(SsoError::protocol(format!(
                "identity provider returned '{error}': {detail}"
            )));
        }
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| SsoError::protocol("callback carried no authorization code"))?;

        let stored: ExchangeState = serde_json::from_str(protocol_state)?;

        let metadata = self.discover(provider).await?;
        let userinfo_endpoint = metadata
            .userinfo_endpoint()
            .map(|endpoint| endpoint.url().to_string());
        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(provider.client_id.clone()),
            Some(ClientSecret::new(provider.client_secret.clone())),
        )
        .set_redirect_uri(RedirectUrl::new(stored.redirect_uri)?);

        let response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| SsoError::protocol(format!("token request rejected: {e}")))?
            .set_pkce_verifier(PkceCodeVerifier::new(stored.pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| SsoError::protocol(format!("code exchange failed: {e}")))?;

        let id_token = response
            .id_token()
            .ok_or_else(|| SsoError::protocol("token response carried no ID token"))?;

        let nonce = Nonce::new(stored.nonce);
        id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| SsoError::protocol(format!("ID token verification failed: {e}")))?;

        // The signature and nonce are verified above; from here the token
        // payload is read as the full claim document.
        let mut claims = claims_from_id_token(id_token)?;

        if let Some(endpoint) = userinfo_endpoint {
            match self
                .userinfo_claims(&endpoint, response.access_token().secret())
                .await
            {
                Some(extra) => claims.extend(extra),
                None => debug!("userinfo endpoint yielded no claims"),
            }
        }

        Ok(claims)
    }
}

/// Decode the payload of a verified ID token into the full claim set.
fn claims_from_id_token<T: Serialize>(id_token: &T) -> Result<ClaimSet> {
    let compact = serde_json::to_value(id_token)?;
    let compact = compact
        .as_str()
        .ok_or_else(|| SsoError::protocol("ID token did not serialize to a compact JWT"))?;
    let payload = compact
        .split('.')
        .nth(1)
        .ok_or_else(|| SsoError::protocol("ID token is not a compact JWT"))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| SsoError::protocol(format!("ID token payload is not base64url: {e}")))?;
    let map: serde_json::Map<String, Value> = serde_json::from_slice(&bytes)?;
    Ok(claims_from_object(map))
}

/// Flatten a JSON claims object into the normalized claim set. String values
/// pass through verbatim; anything nested keeps its JSON text so the claim
/// path can descend into it later.
fn claims_from_object(map: serde_json::Map<String, Value>) -> ClaimSet {
    map.into_iter()
        .map(|(kind, value)| {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            Claim::new(kind, value)
        })
        .collect()
}

/// The OIDC challenge/callback state machine.
pub struct OidcFlow {
    registry: Arc<ProviderRegistry>,
    store: Arc<StateStore>,
    exchange: Arc<dyn CodeExchange>,
}

impl OidcFlow {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<StateStore>,
        exchange: Arc<dyn CodeExchange>,
    ) -> Self {
        Self {
            registry,
            store,
            exchange,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// `Init → Challenged`: build the authorization redirect and register the
    /// protocol state under a fresh token. Expired records are swept here.
    pub async fn challenge(&self, provider_name: &str, redirect_uri: &str) -> Result<Url> {
        let provider = self.registry.oidc(provider_name)?;
        self.store.sweep();

        let challenge = self.exchange.begin(&provider, redirect_uri).await?;
        self.store
            .create(&challenge.state_token, challenge.protocol_state)?;
        info!(provider = provider_name, "issued login challenge");
        Ok(challenge.redirect_url)
    }

    /// `Challenged → Returned → Decided`: resolve the claim set, fold it into
    /// a decision, and write the decision into the stored record in one
    /// atomic update.
    pub async fn callback(
        &self,
        provider_name: &str,
        params: &CallbackParams,
    ) -> Result<IdentityDecision> {
        let provider = self.registry.oidc(provider_name)?;
        let record = self.store.get(&params.state)?;

        let claims = self
            .exchange
            .exchange(&provider, &record.protocol_state, params)
            .await?;

        let path = ClaimPath::parse(&provider.role_claim);
        let decision = evaluate_claims(&claims, &path, &provider.policy);

        self.store.update(&params.state, |entry| {
            // Validity never reverts; folder accumulation is append-only.
            entry.valid = entry.valid || decision.valid;
            entry.username = decision.username.clone();
            entry.is_admin = decision.is_admin;
            entry.folders.extend(decision.folders.iter().cloned());
        })?;

        info!(
            provider = provider_name,
            valid = decision.valid,
            "callback decided"
        );
        Ok(decision)
    }

    /// `Decided(valid) → Consumed`: hand the record to the completion call
    /// and remove it, so one challenge mints at most one session.
    pub fn consume(&self, token: &str) -> Result<PendingLogin> {
        let record = self.store.get(token)?;
        if !record.valid {
            return Err(SsoError::NoMatchingState);
        }
        self.store.remove(token).ok_or(SsoError::NoMatchingState)
    }
}
