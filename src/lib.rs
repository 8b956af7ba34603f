/*!
# SSO Bridge

Federated single sign-on mediation for a media server.

This crate runs two parallel login protocols — an OIDC authorization-code
flow and a SAML assertion flow — and turns third-party identity claims into
one local authorization decision: may this identity log in, is it an
administrator, and which library folders does it see. The decision is handed
to the local user/session authority, which provisions the user and issues
the session.

## Features

- Challenge/callback state machines for both protocols, normalized onto one
  claim-evaluation pipeline
- Escape-aware claim-path resolution into flat or deeply nested claim values
- Role policy evaluation: allowed roles, admin roles, folder-role mapping
- Concurrent, TTL-evicted store of in-flight login attempts
- Pluggable seams for code exchange, assertion verification, user/session
  authority, and client hand-off pages
- axum HTTP surface with per-protocol endpoints and an admin configuration
  API

## Quick Start

```rust,no_run
use std::sync::Arc;

use sso_bridge::api::{self, ApiState};
use sso_bridge::{
    AuthenticationBridge, MemoryUserAuthority, OidcFlow, OidcProviderConfig, OpenIdExchange,
    ProviderRegistry, SamlFlow, StateStore, XmlAssertionAuthority,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(ProviderRegistry::new());
    registry.upsert_oidc(
        "keycloak",
        OidcProviderConfig {
            endpoint: "https://idp.example.com/realms/media".to_string(),
            client_id: "media-server".to_string(),
            client_secret: "secret".to_string(),
            role_claim: "realm_access.roles".to_string(),
            ..Default::default()
        },
    );

    let store = Arc::new(StateStore::new());
    let oidc = Arc::new(OidcFlow::new(
        registry.clone(),
        store.clone(),
        Arc::new(OpenIdExchange::new()?),
    ));
    let saml = Arc::new(SamlFlow::new(
        registry.clone(),
        Arc::new(XmlAssertionAuthority::new()),
    ));
    let bridge = Arc::new(AuthenticationBridge::new(Arc::new(
        MemoryUserAuthority::new(),
    )));

    let state = ApiState::new(registry, store, oidc, saml, bridge, "https://media.example.com");
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8096").await?;
    axum::serve(listener, app).await?;
    Ok(())
}
```

## Security Considerations

- Always serve the callback endpoints over HTTPS; the redirect URI handed to
  the provider is derived from the configured base URL
- In-flight login attempts live only in process memory and expire after
  60 seconds; clients retry by starting a new challenge
- A state token is consumed by its first successful completion call and
  cannot mint a second session
*/

pub mod api;
pub mod authority;
pub mod bridge;
pub mod claims;
pub mod config;
pub mod errors;
pub mod flows;
pub mod policy;
pub mod state;

pub use authority::{
    DeviceProfile, FolderAccess, LocalUser, MemoryUserAuthority, SessionGrant, UserAuthority,
};
pub use bridge::AuthenticationBridge;
pub use claims::ClaimPath;
pub use config::{AccessPolicy, OidcProviderConfig, ProviderRegistry, SamlProviderConfig};
pub use errors::{Result, SsoError};
pub use flows::oidc::{CallbackParams, CodeExchange, OidcFlow, OpenIdExchange};
pub use flows::saml::{
    Assertion, AssertionAuthority, SamlFlow, SignatureCheck, XmlAssertionAuthority,
};
pub use flows::{Claim, ClaimSet, IdentityDecision};
pub use policy::PolicyGrant;
pub use state::{PendingLogin, StateStore, STATE_TTL};
