//! Claim-path parsing and role extraction from claim values.
//!
//! A claim path is a dotted specification such as `realm_access.roles`.
//! Literal dots in a segment are escaped as `\.`. The first segment names the
//! claim to match; the remaining segments descend into the claim's JSON value
//! down to an array of role names.

use crate::errors::{Result, SsoError};
use serde_json::Value;

/// Parsed claim-path specification. Pure and cacheable per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPath {
    segments: Vec<String>,
}

impl ClaimPath {
    /// Split the specification on every `.` not preceded by `\`, un-escaping
    /// `\.` to `.` within each resulting segment.
    pub fn parse(spec: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = spec.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some('.')) => {
                    chars.next();
                    current.push('.');
                }
                '.' => segments.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        segments.push(current);

        Self { segments }
    }

    /// The claim kind this path applies to.
    pub fn claim_kind(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Extract the role list this path selects from one claim.
    ///
    /// Returns `Ok(None)` when the claim kind does not match the path.
    /// A single-segment path takes the claim value verbatim as the only role.
    /// Any shape violation during JSON descent is a `MalformedClaim`; callers
    /// treat it as zero roles rather than aborting the callback.
    pub fn extract_roles(&self, kind: &str, value: &str) -> Result<Option<Vec<String>>> {
        if kind != self.claim_kind() {
            return Ok(None);
        }
        if self.segments.len() == 1 {
            return Ok(Some(vec![value.to_string()]));
        }

        let root: Value = serde_json::from_str(value)
            .map_err(|e| SsoError::malformed_claim(format!("claim value is not JSON: {e}")))?;

        // Some claim sources serialize the value keyed by its own claim name;
        // unwrap that layer before walking the configured descent path.
        let mut cursor = match &root {
            Value::Object(map) if map.contains_key(self.claim_kind()) => &map[self.claim_kind()],
            other => other,
        };

        let (last, intermediate) = self.segments[1..]
            .split_last()
            .ok_or_else(|| SsoError::malformed_claim("empty descent path"))?;

        for segment in intermediate {
            cursor = match cursor {
                Value::Object(map) => map.get(segment).ok_or_else(|| {
                    SsoError::malformed_claim(format!("missing object key '{segment}'"))
                })?,
                _ => {
                    return Err(SsoError::malformed_claim(format!(
                        "segment '{segment}' does not address a JSON object"
                    )))
                }
            };
        }

        let roles = match cursor {
            Value::Object(map) => map.get(last).ok_or_else(|| {
                SsoError::malformed_claim(format!("missing object key '{last}'"))
            })?,
            _ => {
                return Err(SsoError::malformed_claim(format!(
                    "segment '{last}' does not address a JSON object"
                )))
            }
        };

        match roles {
            Value::Array(entries) => entries
                .iter()
                .map(|entry| match entry {
                    Value::String(role) => Ok(role.clone()),
                    other => Err(SsoError::malformed_claim(format!(
                        "role list entry is not a string: {other}"
                    ))),
                })
                .collect::<Result<Vec<String>>>()
                .map(Some),
            other => Err(SsoError::malformed_claim(format!(
                "'{last}' is not an array of roles: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_escaped_dots_into_logical_segments() {
        let path = ClaimPath::parse("attr.role\\.name.values");
        assert_eq!(path.segments(), ["attr", "role.name", "values"]);
    }

    #[test]
    fn single_segment_takes_claim_value_verbatim() {
        let path = ClaimPath::parse("role");
        let roles = path.extract_roles("role", "admin").unwrap();
        assert_eq!(roles, Some(vec!["admin".to_string()]));
    }

    #[test]
    fn mismatched_claim_kind_is_not_applicable() {
        let path = ClaimPath::parse("groups.app");
        assert_eq!(path.extract_roles("email", "a@b.example").unwrap(), None);
    }

    #[test]
    fn extracts_nested_role_list() {
        let path = ClaimPath::parse("groups.app");
        let roles = path
            .extract_roles("groups", r#"{"groups":{"app":["admin","viewer"]}}"#)
            .unwrap();
        assert_eq!(
            roles,
            Some(vec!["admin".to_string(), "viewer".to_string()])
        );
    }

    #[test]
    fn extracts_without_self_keyed_wrapper() {
        let path = ClaimPath::parse("realm_access.roles");
        let roles = path
            .extract_roles("realm_access", r#"{"roles":["editor"]}"#)
            .unwrap();
        assert_eq!(roles, Some(vec!["editor".to_string()]));
    }

    #[test]
    fn missing_key_is_malformed() {
        let path = ClaimPath::parse("groups.missing");
        let err = path
            .extract_roles("groups", r#"{"groups":{"app":["admin","viewer"]}}"#)
            .unwrap_err();
        assert!(matches!(err, SsoError::MalformedClaim { .. }));
    }

    #[test]
    fn non_object_descent_is_malformed() {
        let path = ClaimPath::parse("groups.deep.list");
        let err = path
            .extract_roles("groups", r#"{"deep": 42}"#)
            .unwrap_err();
        assert!(matches!(err, SsoError::MalformedClaim { .. }));
    }

    #[test]
    fn non_string_role_entry_is_malformed() {
        let path = ClaimPath::parse("groups.app");
        let err = path
            .extract_roles("groups", r#"{"app":["admin",7]}"#)
            .unwrap_err();
        assert!(matches!(err, SsoError::MalformedClaim { .. }));
    }

    #[test]
    fn non_json_value_is_malformed() {
        let path = ClaimPath::parse("groups.app");
        let err = path.extract_roles("groups", "plain text").unwrap_err();
        assert!(matches!(err, SsoError::MalformedClaim { .. }));
    }
}
