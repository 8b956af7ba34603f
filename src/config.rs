//! Provider configuration types and the concurrent provider registry.
//!
//! Configurations are read-only to the flow engine; ownership of persistence
//! stays with the embedding host. The registry only keeps the live view that
//! the admin surface mutates.

use crate::errors::{Result, SsoError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role-derived authorization policy shared by both protocols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    /// Roles permitted to log in. Empty means no role gating.
    pub allowed_roles: Vec<String>,

    /// Roles granted the administrator permission.
    pub admin_roles: Vec<String>,

    /// Role name to granted library-folder identifiers.
    pub folder_role_map: HashMap<String, Vec<String>>,

    /// Derive folder grants from `folder_role_map` instead of `enabled_folders`.
    pub enable_folder_roles: bool,

    /// Static folder grants used while folder-role mapping is disabled.
    pub enabled_folders: Vec<String>,

    /// Grant access to every library folder, ignoring per-folder grants.
    pub enable_all_folders: bool,

    /// Whether the bridge writes admin/folder permissions at all.
    /// When false, pre-existing local authorization is left untouched.
    pub enable_authorization: bool,

    /// Rebind the provisioned user's login identity to this provider id.
    pub default_provider: Option<String>,
}

/// Configuration for one OIDC authorization-code provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcProviderConfig {
    /// Issuer URL, used for provider discovery.
    pub endpoint: String,

    /// OAuth client id registered at the provider.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// Scopes requested in addition to `openid` and `profile`.
    pub scopes: Vec<String>,

    /// Whether this provider accepts logins.
    pub enabled: bool,

    /// Dotted, escape-aware path selecting the role list within a claim.
    pub role_claim: String,

    /// Role-derived authorization policy.
    pub policy: AccessPolicy,
}

impl Default for OidcProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            enabled: true,
            role_claim: "roles".to_string(),
            policy: AccessPolicy::default(),
        }
    }
}

/// Configuration for one SAML assertion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlProviderConfig {
    /// IdP single-sign-on endpoint the challenge redirects to.
    pub endpoint: String,

    /// Service-provider entity id presented in the authentication request.
    pub entity_id: String,

    /// Base64-encoded DER certificate used to verify assertion signatures.
    pub certificate: String,

    /// Whether this provider accepts logins.
    pub enabled: bool,

    /// Name of the assertion attribute carrying role values.
    pub role_attribute: String,

    /// Role-derived authorization policy.
    pub policy: AccessPolicy,
}

impl Default for SamlProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            entity_id: String::new(),
            certificate: String::new(),
            enabled: true,
            role_attribute: "Role".to_string(),
            policy: AccessPolicy::default(),
        }
    }
}

/// Concurrent, name-keyed store of provider configurations.
///
/// Provider names are case-insensitive. Constructed once per process and
/// injected into the flows and the admin surface.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    oidc: DashMap<String, OidcProviderConfig>,
    saml: DashMap<String, SamlProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.trim().to_ascii_lowercase()
    }

    /// Resolve an enabled OIDC provider. Disabled and unknown providers are
    /// indistinguishable to callers.
    pub fn oidc(&self, name: &str) -> Result<OidcProviderConfig> {
        self.oidc
            .get(&Self::key(name))
            .filter(|entry| entry.enabled)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SsoError::unknown_provider(name))
    }

    /// Raw configuration lookup for the admin surface; unlike [`Self::oidc`]
    /// this also returns disabled providers.
    pub fn oidc_config(&self, name: &str) -> Option<OidcProviderConfig> {
        self.oidc
            .get(&Self::key(name))
            .map(|entry| entry.value().clone())
    }

    pub fn upsert_oidc(&self, name: &str, config: OidcProviderConfig) {
        self.oidc.insert(Self::key(name), config);
    }

    pub fn remove_oidc(&self, name: &str) -> bool {
        self.oidc.remove(&Self::key(name)).is_some()
    }

    pub fn list_oidc(&self) -> Vec<(String, OidcProviderConfig)> {
        self.oidc
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Resolve an enabled SAML provider.
    pub fn saml(&self, name: &str) -> Result<SamlProviderConfig> {
        self.saml
            .get(&Self::key(name))
            .filter(|entry| entry.enabled)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SsoError::unknown_provider(name))
    }

    /// Raw configuration lookup for the admin surface; unlike [`Self::saml`]
    /// this also returns disabled providers.
    pub fn saml_config(&self, name: &str) -> Option<SamlProviderConfig> {
        self.saml
            .get(&Self::key(name))
            .map(|entry| entry.value().clone())
    }

    pub fn upsert_saml(&self, name: &str, config: SamlProviderConfig) {
        self.saml.insert(Self::key(name), config);
    }

    pub fn remove_saml(&self, name: &str) -> bool {
        self.saml.remove(&Self::key(name)).is_some()
    }

    pub fn list_saml(&self) -> Vec<(String, SamlProviderConfig)> {
        self.saml
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_case_insensitive() {
        let registry = ProviderRegistry::new();
        registry.upsert_oidc(
            "Keycloak",
            OidcProviderConfig {
                endpoint: "https://idp.example.com/realms/media".to_string(),
                ..Default::default()
            },
        );

        assert!(registry.oidc("keycloak").is_ok());
        assert!(registry.oidc("KEYCLOAK").is_ok());
        assert!(registry.remove_oidc("keyCloak"));
        assert!(registry.oidc("keycloak").is_err());
    }

    #[test]
    fn disabled_provider_resolves_as_unknown() {
        let registry = ProviderRegistry::new();
        registry.upsert_saml(
            "adfs",
            SamlProviderConfig {
                enabled: false,
                ..Default::default()
            },
        );

        match registry.saml("adfs") {
            Err(SsoError::UnknownProvider { provider }) => assert_eq!(provider, "adfs"),
            other => panic!("expected UnknownProvider, got {other:?}"),
        }
        assert_eq!(registry.list_saml().len(), 1);
    }
}
