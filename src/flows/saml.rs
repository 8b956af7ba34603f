//! SAML assertion flow adapter.
//!
//! Unlike the OIDC flow there is no stored challenge state: the provider
//! returns a complete signed assertion, and the completion call carries the
//! encoded assertion itself, re-verified before any session is issued.
//! Signature checking is delegated behind [`SignatureCheck`]; this module
//! owns the challenge redirect, assertion parsing, and policy evaluation.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use ring::signature;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;
use x509_parser::parse_x509_certificate;

use super::IdentityDecision;
use crate::config::{ProviderRegistry, SamlProviderConfig};
use crate::errors::{Result, SsoError};

/// Verified assertion data: the authenticated subject plus its attributes.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub subject: String,
    pub attributes: HashMap<String, Vec<String>>,
}

/// Seam to the external assertion library: builds authentication requests
/// and turns a raw callback payload into a verified [`Assertion`].
pub trait AssertionAuthority: Send + Sync {
    fn request_url(&self, provider: &SamlProviderConfig) -> Result<Url>;
    fn verify(&self, provider: &SamlProviderConfig, encoded_response: &str) -> Result<Assertion>;
}

/// Seam for signature verification against the configured certificate.
pub trait SignatureCheck: Send + Sync {
    fn verify(&self, document: &str, certificate_der: &[u8]) -> Result<()>;
}

// Wire structures of the response document.

#[derive(Debug, Deserialize)]
struct ResponseXml {
    #[serde(rename = "Assertion")]
    assertions: Option<Vec<AssertionXml>>,
}

#[derive(Debug, Deserialize)]
struct AssertionXml {
    #[serde(rename = "Subject")]
    subject: Option<SubjectXml>,
    #[serde(rename = "AttributeStatement")]
    attribute_statements: Option<Vec<AttributeStatementXml>>,
}

#[derive(Debug, Deserialize)]
struct SubjectXml {
    #[serde(rename = "NameID")]
    name_id: Option<NameIdXml>,
}

#[derive(Debug, Deserialize)]
struct NameIdXml {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AttributeStatementXml {
    #[serde(rename = "Attribute")]
    attributes: Vec<AttributeXml>,
}

#[derive(Debug, Deserialize)]
struct AttributeXml {
    #[serde(rename = "@Name")]
    name: String,
    #[serde(rename = "AttributeValue")]
    values: Vec<AttributeValueXml>,
}

#[derive(Debug, Deserialize)]
struct AttributeValueXml {
    #[serde(rename = "$text")]
    value: String,
}

/// Production [`AssertionAuthority`]: redirect-binding authentication
/// requests and XML assertion parsing, with signature verification delegated
/// to the injected [`SignatureCheck`].
pub struct XmlAssertionAuthority {
    signature: Arc<dyn SignatureCheck>,
}

impl Default for XmlAssertionAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlAssertionAuthority {
    pub fn new() -> Self {
        Self {
            signature: Arc::new(RingSignatureCheck),
        }
    }

    pub fn with_signature_check(signature: Arc<dyn SignatureCheck>) -> Self {
        Self { signature }
    }
}

impl AssertionAuthority for XmlAssertionAuthority {
    fn request_url(&self, provider: &SamlProviderConfig) -> Result<Url> {
        let request_id = format!("_{}", Uuid::new_v4());
        let issue_instant = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let issuer = quick_xml::escape::escape(provider.entity_id.as_str());
        let document = format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{request_id}" Version="2.0" IssueInstant="{issue_instant}"><saml:Issuer>{issuer}</saml:Issuer></samlp:AuthnRequest>"#
        );

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(document.as_bytes())
            .map_err(|e| SsoError::protocol(format!("authentication request encoding: {e}")))?;
        let deflated = encoder
            .finish()
            .map_err(|e| SsoError::protocol(format!("authentication request encoding: {e}")))?;

        let mut url = Url::parse(&provider.endpoint)?;
        url.query_pairs_mut()
            .append_pair("SAMLRequest", &BASE64.encode(deflated));
        Ok(url)
    }

    fn verify(&self, provider: &SamlProviderConfig, encoded_response: &str) -> Result<Assertion> {
        let bytes = BASE64
            .decode(encoded_response.trim())
            .map_err(|e| SsoError::protocol(format!("assertion payload is not base64: {e}")))?;
        let document = String::from_utf8(bytes)
            .map_err(|e| SsoError::protocol(format!("assertion payload is not UTF-8: {e}")))?;

        let certificate = decode_certificate(&provider.certificate)?;
        self.signature.verify(&document, &certificate)?;

        let response: ResponseXml = from_str(&document)?;
        let assertion = response
            .assertions
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| SsoError::protocol("response carried no assertion"))?;

        let subject = assertion
            .subject
            .and_then(|subject| subject.name_id)
            .map(|name_id| name_id.value)
            .ok_or_else(|| SsoError::protocol("assertion carried no subject identifier"))?;

        let mut attributes: HashMap<String, Vec<String>> = HashMap::new();
        for statement in assertion.attribute_statements.into_iter().flatten() {
            for attribute in statement.attributes {
                attributes
                    .entry(attribute.name)
                    .or_default()
                    .extend(attribute.values.into_iter().map(|v| v.value));
            }
        }

        Ok(Assertion {
            subject,
            attributes,
        })
    }
}

/// Certificate material is configured as base64 DER; PEM armor lines are
/// tolerated and stripped.
fn decode_certificate(configured: &str) -> Result<Vec<u8>> {
    let body: String = configured
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect();
    BASE64
        .decode(body)
        .map_err(|e| SsoError::config(format!("provider certificate is not base64: {e}")))
}

/// Signature verification over the document's `SignedInfo` element using
/// `ring`, with the public key taken from the configured certificate.
///
/// The element is expected to arrive already in canonical form, as emitted
/// by common IdPs over the POST binding.
pub struct RingSignatureCheck;

impl SignatureCheck for RingSignatureCheck {
    fn verify(&self, document: &str, certificate_der: &[u8]) -> Result<()> {
        let signed_info = extract_element(document, "SignedInfo")?;
        let signature_value = extract_text(document, "SignatureValue")?;
        let signature_bytes = BASE64
            .decode(
                signature_value
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>(),
            )
            .map_err(|e| SsoError::protocol(format!("signature value is not base64: {e}")))?;

        let (_, certificate) = parse_x509_certificate(certificate_der)
            .map_err(|e| SsoError::config(format!("certificate parsing failed: {e}")))?;
        let key_info = certificate.public_key();
        let key_data = key_info.subject_public_key.data.as_ref();

        let verifier = match key_info.algorithm.algorithm.to_string().as_str() {
            // RSA
            "1.2.840.113549.1.1.1" => signature::UnparsedPublicKey::new(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                key_data,
            ),
            // EC P-256
            "1.2.840.10045.2.1" => {
                signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, key_data)
            }
            oid => {
                return Err(SsoError::protocol(format!(
                    "unsupported signature algorithm: {oid}"
                )))
            }
        };

        verifier
            .verify(signed_info.as_bytes(), &signature_bytes)
            .map_err(|_| SsoError::protocol("assertion signature verification failed"))
    }
}

/// Reconstruct one element (matched by local name) from the document.
fn extract_element(document: &str, local_name: &str) -> Result<String> {
    let mut reader = Reader::from_str(document);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;

    loop {
        match reader
            .read_event()
            .map_err(|e| SsoError::protocol(format!("XML parse error: {e}")))?
        {
            Event::Start(e) => {
                if depth > 0 || e.local_name().as_ref() == local_name.as_bytes() {
                    depth += 1;
                    writer
                        .write_event(Event::Start(e))
                        .map_err(|e| SsoError::protocol(format!("XML write error: {e}")))?;
                }
            }
            Event::End(e) => {
                if depth > 0 {
                    writer
                        .write_event(Event::End(e))
                        .map_err(|e| SsoError::protocol(format!("XML write error: {e}")))?;
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
            Event::Empty(e) if depth > 0 => {
                writer
                    .write_event(Event::Empty(e))
                    .map_err(|e| SsoError::protocol(format!("XML write error: {e}")))?;
            }
            Event::Text(e) if depth > 0 => {
                writer
                    .write_event(Event::Text(e))
                    .map_err(|e| SsoError::protocol(format!("XML write error: {e}")))?;
            }
            Event::Eof => {
                return Err(SsoError::protocol(format!(
                    "document carries no '{local_name}' element"
                )))
            }
            _ => {}
        }
    }

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| SsoError::protocol(format!("XML is not UTF-8: {e}")))
}

/// Collect the text content of one element matched by local name.
fn extract_text(document: &str, local_name: &str) -> Result<String> {
    let mut reader = Reader::from_str(document);
    let mut inside = false;
    let mut text = String::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| SsoError::protocol(format!("XML parse error: {e}")))?
        {
            Event::Start(e) if e.local_name().as_ref() == local_name.as_bytes() => inside = true,
            Event::End(e) if e.local_name().as_ref() == local_name.as_bytes() => break,
            Event::Text(e) if inside => {
                text.push_str(
                    &e.unescape()
                        .map_err(|err| SsoError::protocol(format!("XML text error: {err}")))?,
                );
            }
            Event::Eof => {
                return Err(SsoError::protocol(format!(
                    "document carries no '{local_name}' element"
                )))
            }
            _ => {}
        }
    }

    Ok(text)
}

/// The SAML challenge/callback adapter.
pub struct SamlFlow {
    registry: Arc<ProviderRegistry>,
    authority: Arc<dyn AssertionAuthority>,
}

impl SamlFlow {
    pub fn new(registry: Arc<ProviderRegistry>, authority: Arc<dyn AssertionAuthority>) -> Self {
        Self {
            registry,
            authority,
        }
    }

    /// Build the provider authentication-request redirect.
    pub fn challenge(&self, provider_name: &str) -> Result<Url> {
        let provider = self.registry.saml(provider_name)?;
        let url = self.authority.request_url(&provider)?;
        info!(provider = provider_name, "issued login challenge");
        Ok(url)
    }

    /// Verify the raw assertion payload and evaluate it into a decision.
    ///
    /// A role mismatch aborts here, before any hand-off is produced.
    pub fn callback(&self, provider_name: &str, encoded_response: &str) -> Result<IdentityDecision> {
        let provider = self.registry.saml(provider_name)?;
        let assertion = self.authority.verify(&provider, encoded_response)?;

        let roles: Vec<String> = assertion
            .attributes
            .get(&provider.role_attribute)
            .cloned()
            .unwrap_or_default();

        let grant = provider.policy.evaluate(&roles);
        if !grant.valid {
            warn!(
                provider = provider_name,
                observed = ?roles,
                expected = ?provider.policy.allowed_roles,
                "login rejected: no allowed role presented"
            );
            return Err(SsoError::RoleMismatch {
                observed: roles,
                expected: provider.policy.allowed_roles.clone(),
            });
        }

        info!(provider = provider_name, subject = %assertion.subject, "callback decided");
        Ok(IdentityDecision {
            valid: true,
            username: Some(assertion.subject),
            is_admin: grant.is_admin,
            folders: grant.folders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessPolicy;

    const RESPONSE_XML: &str = r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol">
  <Assertion>
    <Subject><NameID>bob</NameID></Subject>
    <AttributeStatement>
      <Attribute Name="Role">
        <AttributeValue>viewer</AttributeValue>
        <AttributeValue>operator</AttributeValue>
      </Attribute>
      <Attribute Name="mail">
        <AttributeValue>bob@example.com</AttributeValue>
      </Attribute>
    </AttributeStatement>
  </Assertion>
</Response>"#;

    struct NoopSignature;

    impl SignatureCheck for NoopSignature {
        fn verify(&self, _document: &str, _certificate_der: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn provider(policy: AccessPolicy) -> SamlProviderConfig {
        SamlProviderConfig {
            endpoint: "https://idp.example.com/sso".to_string(),
            entity_id: "media-server".to_string(),
            certificate: BASE64.encode(b"unused"),
            role_attribute: "Role".to_string(),
            policy,
            ..Default::default()
        }
    }

    fn registry_with(policy: AccessPolicy) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        registry.upsert_saml("idp", provider(policy));
        registry
    }

    fn flow(policy: AccessPolicy) -> SamlFlow {
        let authority =
            Arc::new(XmlAssertionAuthority::with_signature_check(Arc::new(NoopSignature)));
        SamlFlow::new(registry_with(policy), authority)
    }

    #[test]
    fn challenge_builds_redirect_with_request_payload() {
        let flow = flow(AccessPolicy::default());
        let url = flow.challenge("idp").unwrap();
        assert!(url.as_str().starts_with("https://idp.example.com/sso?"));
        assert!(url
            .query_pairs()
            .any(|(key, value)| key == "SAMLRequest" && !value.is_empty()));
    }

    #[test]
    fn callback_extracts_subject_and_role_attributes() {
        let policy = AccessPolicy {
            admin_roles: vec!["operator".to_string()],
            ..Default::default()
        };
        let flow = flow(policy);

        let decision = flow
            .callback("idp", &BASE64.encode(RESPONSE_XML))
            .unwrap();
        assert!(decision.valid);
        assert!(decision.is_admin);
        assert_eq!(decision.username.as_deref(), Some("bob"));
    }

    #[test]
    fn role_mismatch_aborts_callback() {
        let policy = AccessPolicy {
            allowed_roles: vec!["staff".to_string()],
            ..Default::default()
        };
        let flow = flow(policy);

        let err = flow.callback("idp", &BASE64.encode(RESPONSE_XML)).unwrap_err();
        match err {
            SsoError::RoleMismatch { observed, expected } => {
                assert_eq!(observed, vec!["viewer".to_string(), "operator".to_string()]);
                assert_eq!(expected, vec!["staff".to_string()]);
            }
            other => panic!("expected RoleMismatch, got {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let flow = flow(AccessPolicy::default());
        assert!(matches!(
            flow.callback("absent", &BASE64.encode(RESPONSE_XML)),
            Err(SsoError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn garbage_payload_is_a_protocol_error() {
        let flow = flow(AccessPolicy::default());
        assert!(matches!(
            flow.callback("idp", "%%not-base64%%"),
            Err(SsoError::Protocol { .. })
        ));
    }

    #[test]
    fn extract_text_reads_element_content() {
        let text = extract_text(RESPONSE_XML, "NameID").unwrap();
        assert_eq!(text, "bob");
    }

    #[test]
    fn extract_element_reconstructs_subtree() {
        let subtree = extract_element(RESPONSE_XML, "Subject").unwrap();
        assert!(subtree.contains("<NameID>bob</NameID>"));
    }
}
