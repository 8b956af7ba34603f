//! Seam to the external user/session authority, plus an in-memory
//! implementation for tests and embedding.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, SsoError};

/// A user known to the local authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,
    pub username: String,
    /// Authentication-provider identity this user is bound to.
    pub provider_id: String,
    pub is_admin: bool,
    pub folder_access: FolderAccess,
}

/// Library-folder access preference written by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FolderAccess {
    All,
    Folders(Vec<String>),
}

impl Default for FolderAccess {
    fn default() -> Self {
        Self::Folders(Vec::new())
    }
}

/// Device descriptor sent by the client completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_id: String,
    pub device_name: String,
    pub app_name: String,
    pub app_version: String,
}

/// Opaque session result from the external session authority, returned to
/// the client verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub access_token: String,
    pub user_id: String,
    pub username: String,
    pub is_admin: bool,
}

/// External user/session authority.
///
/// Every call is a single idempotent external invocation; the bridge never
/// retries and surfaces failures unmodified.
#[async_trait]
pub trait UserAuthority: Send + Sync {
    async fn user_by_name(&self, username: &str) -> Result<Option<LocalUser>>;

    /// Provision a user bound to the given provider identity.
    async fn create_user(&self, username: &str, provider_id: &str) -> Result<LocalUser>;

    /// Write the admin permission and folder-access preference.
    async fn apply_authorization(
        &self,
        user_id: &str,
        is_admin: bool,
        folder_access: FolderAccess,
    ) -> Result<()>;

    /// Rebind the user's authentication-provider identity.
    async fn rebind_provider(&self, user_id: &str, provider_id: &str) -> Result<()>;

    /// Issue a session keyed by user id and device descriptor.
    async fn issue_session(&self, user_id: &str, device: &DeviceProfile) -> Result<SessionGrant>;
}

/// In-memory [`UserAuthority`]. Not meant for production use; backs tests
/// and lightweight embeddings.
#[derive(Debug, Default)]
pub struct MemoryUserAuthority {
    users: DashMap<String, LocalUser>,
    sessions: DashMap<String, SessionGrant>,
}

impl MemoryUserAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn key(username: &str) -> String {
        username.to_ascii_lowercase()
    }

    fn by_id(&self, user_id: &str) -> Result<String> {
        self.users
            .iter()
            .find(|entry| entry.value().id == user_id)
            .map(|entry| entry.key().clone())
            .ok_or_else(|| SsoError::provisioning(format!("no user with id '{user_id}'")))
    }
}

#[async_trait]
impl UserAuthority for MemoryUserAuthority {
    async fn user_by_name(&self, username: &str) -> Result<Option<LocalUser>> {
        Ok(self
            .users
            .get(&Self::key(username))
            .map(|entry| entry.value().clone()))
    }

    async fn create_user(&self, username: &str, provider_id: &str) -> Result<LocalUser> {
        let user = LocalUser {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            provider_id: provider_id.to_string(),
            is_admin: false,
            folder_access: FolderAccess::default(),
        };
        self.users.insert(Self::key(username), user.clone());
        Ok(user)
    }

    async fn apply_authorization(
        &self,
        user_id: &str,
        is_admin: bool,
        folder_access: FolderAccess,
    ) -> Result<()> {
        let key = self.by_id(user_id)?;
        if let Some(mut entry) = self.users.get_mut(&key) {
            entry.is_admin = is_admin;
            entry.folder_access = folder_access;
        }
        Ok(())
    }

    async fn rebind_provider(&self, user_id: &str, provider_id: &str) -> Result<()> {
        let key = self.by_id(user_id)?;
        if let Some(mut entry) = self.users.get_mut(&key) {
            entry.provider_id = provider_id.to_string();
        }
        Ok(())
    }

    async fn issue_session(&self, user_id: &str, device: &DeviceProfile) -> Result<SessionGrant> {
        let key = self.by_id(user_id).map_err(|_| {
            SsoError::session_issuance(format!("no user with id '{user_id}'"))
        })?;
        let user = self
            .users
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SsoError::session_issuance("user vanished during issuance"))?;

        let grant = SessionGrant {
            access_token: Uuid::new_v4().to_string(),
            user_id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        };
        self.sessions
            .insert(format!("{}:{}", grant.user_id, device.device_id), grant.clone());
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceProfile {
        DeviceProfile {
            device_id: "dev-1".to_string(),
            device_name: "Living Room".to_string(),
            app_name: "media-client".to_string(),
            app_version: "1.2.3".to_string(),
        }
    }

    #[tokio::test]
    async fn same_username_maps_to_the_same_user() {
        let authority = MemoryUserAuthority::new();
        let created = authority.create_user("Alice", "oidc:main").await.unwrap();

        let found = authority.user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn authorization_and_rebind_mutate_the_user() {
        let authority = MemoryUserAuthority::new();
        let user = authority.create_user("alice", "oidc:main").await.unwrap();

        authority
            .apply_authorization(&user.id, true, FolderAccess::All)
            .await
            .unwrap();
        authority.rebind_provider(&user.id, "oidc:backup").await.unwrap();

        let updated = authority.user_by_name("alice").await.unwrap().unwrap();
        assert!(updated.is_admin);
        assert_eq!(updated.folder_access, FolderAccess::All);
        assert_eq!(updated.provider_id, "oidc:backup");
    }

    #[tokio::test]
    async fn session_issuance_requires_a_known_user() {
        let authority = MemoryUserAuthority::new();
        let err = authority.issue_session("ghost", &device()).await.unwrap_err();
        assert!(matches!(err, SsoError::SessionIssuance { .. }));
        assert_eq!(authority.session_count(), 0);
    }
}
