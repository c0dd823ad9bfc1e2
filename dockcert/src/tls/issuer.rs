//! Leaf certificate issuance
//!
//! Issuance is pure: it returns PEM text and leaves persistence to the
//! certificate store.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, SanType,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use super::ca::{CA_ORGANIZATION, RootCa};

/// Leaf certificate validity period (1 year)
const LEAF_VALIDITY_DAYS: i64 = 365;

const MAX_DNS_NAME_LEN: usize = 253;
const MAX_DNS_LABEL_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("At least one domain is required")]
    NoDomains,

    #[error("Domain '{0}' is listed more than once")]
    DuplicateDomain(String),

    #[error("Invalid DNS name '{0}': {1}")]
    InvalidDomain(String, String),

    #[error("Failed to load root CA: {0}")]
    CaParse(String),

    #[error("Failed to generate keypair: {0}")]
    KeypairGeneration(String),

    #[error("Failed to sign leaf certificate: {0}")]
    Signing(String),
}

/// A freshly issued leaf certificate with its private key
#[derive(Clone)]
pub struct DomainCertificate {
    /// Names covered by the certificate; the first is the subject common name
    pub domains: Vec<String>,
    /// PEM-encoded certificate
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl std::fmt::Debug for DomainCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainCertificate")
            .field("domains", &self.domains)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Issue a leaf certificate for `domains`, signed by `ca`.
///
/// A new key pair is generated on every call.
pub fn issue(domains: &[String], ca: &RootCa) -> Result<DomainCertificate, IssueError> {
    let primary = domains.first().ok_or(IssueError::NoDomains)?;

    let mut sans = Vec::with_capacity(domains.len());
    for (i, domain) in domains.iter().enumerate() {
        if domains[..i].contains(domain) {
            return Err(IssueError::DuplicateDomain(domain.clone()));
        }
        validate_dns_name(domain)
            .map_err(|reason| IssueError::InvalidDomain(domain.clone(), reason.to_string()))?;
        let dns = domain
            .as_str()
            .try_into()
            .map_err(|e| IssueError::InvalidDomain(domain.clone(), format!("{:?}", e)))?;
        sans.push(SanType::DnsName(dns));
    }

    let ca_key = KeyPair::from_pem(ca.key_pem())
        .map_err(|e| IssueError::CaParse(format!("private key: {}", e)))?;
    let issuer = Issuer::from_ca_cert_pem(ca.cert_pem(), ca_key)
        .map_err(|e| IssueError::CaParse(format!("certificate: {}", e)))?;

    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, primary.as_str());
    dn.push(DnType::OrganizationName, CA_ORGANIZATION);
    params.distinguished_name = dn;

    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.subject_alt_names = sans;
    params.use_authority_key_identifier_extension = true;

    let now = OffsetDateTime::now_utc();
    let not_before = now;
    let not_after = now + Duration::days(LEAF_VALIDITY_DAYS);
    params.not_before = not_before;
    params.not_after = not_after;

    let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| IssueError::KeypairGeneration(e.to_string()))?;
    let leaf_cert = params
        .signed_by(&leaf_key, &issuer)
        .map_err(|e| IssueError::Signing(e.to_string()))?;

    Ok(DomainCertificate {
        domains: domains.to_vec(),
        cert_pem: leaf_cert.pem(),
        key_pem: leaf_key.serialize_pem(),
        not_before,
        not_after,
    })
}

/// Hostname syntax check, allowing a single leading `*.` wildcard label.
fn validate_dns_name(name: &str) -> Result<(), &'static str> {
    if name.len() > MAX_DNS_NAME_LEN {
        return Err("name is longer than 253 bytes");
    }
    let host = name.strip_prefix("*.").unwrap_or(name);
    if host.is_empty() {
        return Err("name is empty");
    }

    for label in host.split('.') {
        if label.is_empty() {
            return Err("empty label");
        }
        if label.len() > MAX_DNS_LABEL_LEN {
            return Err("label is longer than 63 bytes");
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err("labels may only contain letters, digits, and '-'");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("labels may not start or end with '-'");
        }
    }
    Ok(())
}
