//! Error types for the SSO bridge.

use thiserror::Error;

/// Result type alias for the SSO bridge.
pub type Result<T, E = SsoError> = std::result::Result<T, E>;

/// Main error type for the SSO bridge.
#[derive(Error, Debug)]
pub enum SsoError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Provider is unknown or disabled
    #[error("Unknown provider '{provider}'")]
    UnknownProvider { provider: String },

    /// Wire-protocol level failure reported by the external protocol library
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// None of the presented roles is allowed to log in
    #[error("Role mismatch: observed {observed:?}, expected one of {expected:?}")]
    RoleMismatch {
        observed: Vec<String>,
        expected: Vec<String>,
    },

    /// No in-flight login record matches the presented state token.
    /// Expiry and forgery are indistinguishable through this variant.
    #[error("No matching login state")]
    NoMatchingState,

    /// A login record already exists under the state token
    #[error("Duplicate login state")]
    DuplicateState,

    /// Claim value does not have the shape the claim path describes.
    /// Soft failure: contributes zero roles, never aborts a callback.
    #[error("Malformed claim: {reason}")]
    MalformedClaim { reason: String },

    /// User provisioning failed at the external user authority
    #[error("Provisioning error: {message}")]
    Provisioning { message: String },

    /// Session issuance failed at the external session authority
    #[error("Session issuance error: {message}")]
    SessionIssuance { message: String },

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// XML deserialization errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),
}

impl SsoError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new unknown-provider error
    pub fn unknown_provider(provider: impl Into<String>) -> Self {
        Self::UnknownProvider {
            provider: provider.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Create a new malformed-claim error
    pub fn malformed_claim(reason: impl Into<String>) -> Self {
        Self::MalformedClaim {
            reason: reason.into(),
        }
    }

    /// Create a new provisioning error
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
        }
    }

    /// Create a new session-issuance error
    pub fn session_issuance(message: impl Into<String>) -> Self {
        Self::SessionIssuance {
            message: message.into(),
        }
    }
}
