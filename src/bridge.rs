//! Hands a finished identity decision to the local user/session authority.

use std::sync::Arc;

use tracing::info;

use crate::authority::{DeviceProfile, FolderAccess, SessionGrant, UserAuthority};
use crate::config::AccessPolicy;
use crate::errors::{Result, SsoError};
use crate::flows::IdentityDecision;

/// Provisions or updates the local user for a valid decision and requests a
/// session from the external authority.
pub struct AuthenticationBridge {
    authority: Arc<dyn UserAuthority>,
}

impl AuthenticationBridge {
    pub fn new(authority: Arc<dyn UserAuthority>) -> Self {
        Self { authority }
    }

    /// Consume one decision: look up or provision the user, apply
    /// authorization when enabled, rebind the provider identity when a
    /// default-provider override is configured, and issue a session.
    ///
    /// Provisioning and issuance failures surface unmodified; neither call
    /// is retried.
    pub async fn authenticate(
        &self,
        provider_id: &str,
        policy: &AccessPolicy,
        decision: &IdentityDecision,
        device: &DeviceProfile,
    ) -> Result<SessionGrant> {
        if !decision.valid {
            return Err(SsoError::NoMatchingState);
        }
        let username = decision
            .username
            .as_deref()
            .ok_or_else(|| SsoError::provisioning("decision carried no username"))?;

        let user = match self.authority.user_by_name(username).await? {
            Some(user) => user,
            None => {
                info!(%username, provider = provider_id, "provisioning new user");
                self.authority.create_user(username, provider_id).await?
            }
        };

        if policy.enable_authorization {
            let folder_access = if policy.enable_all_folders {
                FolderAccess::All
            } else {
                FolderAccess::Folders(decision.folders.iter().cloned().collect())
            };
            self.authority
                .apply_authorization(&user.id, decision.is_admin, folder_access)
                .await?;
        }

        if let Some(default_provider) = &policy.default_provider {
            self.authority
                .rebind_provider(&user.id, default_provider)
                .await?;
        }

        self.authority.issue_session(&user.id, device).await
    }
}
