//! Protocol adapters and the shared claim-evaluation pipeline.
//!
//! Both adapters normalize their wire protocol into a [`ClaimSet`] and feed
//! it through the same claim-path resolution and role policy evaluation,
//! producing one immutable [`IdentityDecision`] per callback.

pub mod oidc;
pub mod saml;

use crate::claims::ClaimPath;
use crate::config::AccessPolicy;
use crate::state::PendingLogin;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Claim kind carrying the preferred username.
pub const PREFERRED_USERNAME_CLAIM: &str = "preferred_username";

/// Claim kind carrying the subject identifier.
pub const SUBJECT_CLAIM: &str = "sub";

/// One typed attribute asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub kind: String,
    pub value: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Ordered claim set as returned by a protocol adapter. Evaluation is
/// sequential in this order; repeated claims of the matching kind accumulate.
pub type ClaimSet = Vec<Claim>;

/// Final authorization decision for one callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityDecision {
    pub valid: bool,
    pub username: Option<String>,
    pub is_admin: bool,
    pub folders: BTreeSet<String>,
}

impl From<PendingLogin> for IdentityDecision {
    fn from(record: PendingLogin) -> Self {
        Self {
            valid: record.valid,
            username: record.username,
            is_admin: record.is_admin,
            folders: record.folders,
        }
    }
}

/// Fold a claim set into a single decision.
///
/// Every claim matching the role path contributes its extracted roles;
/// validity, admin, and folder grants accumulate monotonically. A claim the
/// path matches but cannot parse contributes zero roles. The username comes
/// from the preferred-username claim, falling back to the subject claim; the
/// fallback re-runs only the no-role-gating check.
pub(crate) fn evaluate_claims(
    claims: &ClaimSet,
    path: &ClaimPath,
    policy: &AccessPolicy,
) -> IdentityDecision {
    let mut decision = IdentityDecision::default();
    let mut observed = Vec::new();

    for claim in claims {
        if claim.kind == PREFERRED_USERNAME_CLAIM {
            decision.username = Some(claim.value.clone());
            if policy.allowed_roles.is_empty() {
                decision.valid = true;
            }
        }

        match path.extract_roles(&claim.kind, &claim.value) {
            Ok(Some(roles)) => {
                let grant = policy.evaluate(&roles);
                decision.valid |= grant.valid;
                decision.is_admin |= grant.is_admin;
                decision.folders.extend(grant.folders);
                observed.extend(roles);
            }
            Ok(None) => {}
            Err(err) => {
                debug!(claim = %claim.kind, %err, "claim contributed no roles");
            }
        }
    }

    if decision.username.is_none() {
        if let Some(subject) = claims.iter().find(|c| c.kind == SUBJECT_CLAIM) {
            decision.username = Some(subject.value.clone());
            if policy.allowed_roles.is_empty() {
                decision.valid = true;
            }
        }
    }

    if !decision.valid {
        warn!(
            ?observed,
            expected = ?policy.allowed_roles,
            "login rejected: no allowed role presented"
        );
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gated_policy() -> AccessPolicy {
        AccessPolicy {
            allowed_roles: vec!["viewer".to_string()],
            admin_roles: vec!["operator".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn username_and_roles_accumulate_across_claims() {
        let path = ClaimPath::parse("groups");
        let claims = vec![
            Claim::new("preferred_username", "alice"),
            Claim::new("groups", "viewer"),
            Claim::new("groups", "operator"),
        ];

        let decision = evaluate_claims(&claims, &path, &gated_policy());
        assert!(decision.valid);
        assert!(decision.is_admin);
        assert_eq!(decision.username.as_deref(), Some("alice"));
    }

    #[test]
    fn subject_fallback_applies_no_role_gating_check_only() {
        let path = ClaimPath::parse("groups");
        let claims = vec![Claim::new("sub", "f81d4fae-bob")];

        let open = evaluate_claims(&claims, &path, &AccessPolicy::default());
        assert!(open.valid);
        assert_eq!(open.username.as_deref(), Some("f81d4fae-bob"));

        let gated = evaluate_claims(&claims, &path, &gated_policy());
        assert!(!gated.valid);
        assert_eq!(gated.username.as_deref(), Some("f81d4fae-bob"));
    }

    #[test]
    fn preferred_username_wins_over_subject() {
        let path = ClaimPath::parse("groups");
        let claims = vec![
            Claim::new("sub", "uuid-1"),
            Claim::new("preferred_username", "alice"),
        ];
        let decision = evaluate_claims(&claims, &path, &AccessPolicy::default());
        assert_eq!(decision.username.as_deref(), Some("alice"));
        assert!(decision.valid);
    }

    #[test]
    fn malformed_claim_contributes_zero_roles() {
        let path = ClaimPath::parse("groups.app");
        let claims = vec![
            Claim::new("preferred_username", "alice"),
            Claim::new("groups", "not json at all"),
            Claim::new("groups", r#"{"app":["viewer"]}"#),
        ];

        let decision = evaluate_claims(&claims, &path, &gated_policy());
        assert!(decision.valid);
    }

    #[test]
    fn mismatch_leaves_decision_invalid_but_keeps_username() {
        let path = ClaimPath::parse("groups");
        let claims = vec![
            Claim::new("preferred_username", "mallory"),
            Claim::new("groups", "stranger"),
        ];

        let decision = evaluate_claims(&claims, &path, &gated_policy());
        assert!(!decision.valid);
        assert_eq!(decision.username.as_deref(), Some("mallory"));
    }

    #[test]
    fn folder_grants_union_across_repeated_claims() {
        let path = ClaimPath::parse("groups");
        let policy = AccessPolicy {
            enable_folder_roles: true,
            folder_role_map: std::collections::HashMap::from([
                ("a".to_string(), vec!["movies".to_string()]),
                ("b".to_string(), vec!["shows".to_string()]),
            ]),
            ..Default::default()
        };
        let claims = vec![
            Claim::new("sub", "alice"),
            Claim::new("groups", "a"),
            Claim::new("groups", "b"),
        ];

        let decision = evaluate_claims(&claims, &path, &policy);
        assert_eq!(decision.folders.len(), 2);
    }
}
