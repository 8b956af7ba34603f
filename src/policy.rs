//! Role policy evaluation: validity, admin flag, and folder grants.

use crate::config::AccessPolicy;
use std::collections::BTreeSet;

/// Outcome of evaluating one role list against a provider policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyGrant {
    /// Whether the roles permit logging in at all.
    pub valid: bool,
    /// Whether the roles carry the administrator permission.
    pub is_admin: bool,
    /// Library folders granted by the roles.
    pub folders: BTreeSet<String>,
}

impl AccessPolicy {
    /// Map a role list onto validity, admin, and folder grants.
    ///
    /// Set semantics throughout: the outcome is invariant under permutation
    /// and duplication of `roles`.
    pub fn evaluate(&self, roles: &[String]) -> PolicyGrant {
        let valid = self.allowed_roles.is_empty()
            || roles.iter().any(|role| self.allowed_roles.contains(role));
        let is_admin = roles.iter().any(|role| self.admin_roles.contains(role));

        let folders = if self.enable_all_folders {
            // The all-folders flag wins; per-folder grants are ignored.
            BTreeSet::new()
        } else if self.enable_folder_roles {
            roles
                .iter()
                .filter_map(|role| self.folder_role_map.get(role))
                .flatten()
                .cloned()
                .collect()
        } else {
            self.enabled_folders.iter().cloned().collect()
        };

        PolicyGrant {
            valid,
            is_admin,
            folders,
        }
    }
}
