//! Key pair and certificate request generation
//!
//! The key pair is created fresh for every invocation and never leaves the
//! process except inside the final TLS Secret. Only the request (public key
//! plus subject names) is submitted to the cluster.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use x509_parser::prelude::*;

use crate::names::ServiceIdentity;
use crate::{Error, Result};

/// PEM label of the encoded certificate request
pub const CERTIFICATE_REQUEST_PEM_TAG: &str = "CERTIFICATE REQUEST";

/// PEM label of the encoded private key (PKCS#1)
pub const RSA_PRIVATE_KEY_PEM_TAG: &str = "RSA PRIVATE KEY";

/// Minimum (and default) RSA modulus size
pub const DEFAULT_RSA_KEY_BITS: usize = 2048;

/// Key generation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    /// RSA modulus size in bits
    pub bits: usize,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            bits: DEFAULT_RSA_KEY_BITS,
        }
    }
}

impl KeySpec {
    /// Reject key sizes weaker than 2048-bit RSA
    pub fn validate(&self) -> Result<()> {
        if self.bits < DEFAULT_RSA_KEY_BITS {
            return Err(Error::invalid_input(format!(
                "RSA key size must be at least {} bits, got {}",
                DEFAULT_RSA_KEY_BITS, self.bits
            )));
        }
        Ok(())
    }
}

/// A freshly generated key pair and the signing request built from it
pub struct CertificateRequest {
    name: String,
    csr_pem: String,
    key_pem: String,
}

impl std::fmt::Debug for CertificateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRequest")
            .field("name", &self.name)
            .field("csr_pem", &self.csr_pem)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

impl CertificateRequest {
    /// Generate a key pair and a request for the identity's subject names
    ///
    /// The request CommonName is the qualified name and the SAN list is the
    /// three expanded names in their fixed order.
    pub fn generate(identity: &ServiceIdentity, spec: KeySpec) -> Result<Self> {
        spec.validate()?;
        let names = identity.subject_names();

        let private_key = RsaPrivateKey::new(&mut OsRng, spec.bits)
            .map_err(|e| Error::key_generation(format!("failed to generate RSA key: {}", e)))?;

        let key_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::key_generation(format!("failed to encode private key: {}", e)))?;

        // rcgen signs with the same key, loaded from its PKCS#8 form
        let pkcs8_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::key_generation(format!("failed to encode private key: {}", e)))?;
        let key_pair = KeyPair::from_pem_and_sign_algo(pkcs8_pem.as_str(), &PKCS_RSA_SHA256)
            .map_err(|e| Error::key_generation(format!("failed to load signing key: {}", e)))?;

        let mut params = CertificateParams::new(names.to_vec())
            .map_err(|e| Error::key_generation(format!("invalid subject names: {}", e)))?;
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(names.common_name().to_string()),
        );
        params.distinguished_name = dn;

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| Error::key_generation(format!("failed to create CSR: {}", e)))?;
        let csr_pem = csr
            .pem()
            .map_err(|e| Error::key_generation(format!("failed to serialize CSR: {}", e)))?;

        Ok(Self {
            name: names.qualified,
            csr_pem,
            key_pem: key_pem.to_string(),
        })
    }

    /// Signing request name (the qualified subject name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The request in PEM form
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// The private key in PEM form
    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }
}

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &[u8]) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data)
        .map_err(|e| Error::invalid_input(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.into_contents())
}

/// Expiry of an issued certificate, if it parses
///
/// Accepts the first PEM block or raw DER, whichever the authority returned.
pub fn certificate_not_after(certificate: &[u8]) -> Option<DateTime<Utc>> {
    let der = match ::pem::parse(certificate) {
        Ok(block) if block.tag() == "CERTIFICATE" => block.into_contents(),
        Ok(_) => return None,
        Err(_) => certificate.to_vec(),
    };
    let (_, cert) = X509Certificate::from_der(&der).ok()?;
    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn webhook_request() -> &'static CertificateRequest {
        static REQUEST: OnceLock<CertificateRequest> = OnceLock::new();
        REQUEST.get_or_init(|| {
            let identity = ServiceIdentity::new("webhook-svc", "webhook").unwrap();
            CertificateRequest::generate(&identity, KeySpec::default()).unwrap()
        })
    }

    fn decode_csr_names(csr_pem: &str) -> (String, Vec<String>) {
        let block = ::pem::parse(csr_pem.as_bytes()).unwrap();
        assert_eq!(block.tag(), CERTIFICATE_REQUEST_PEM_TAG);

        let (_, csr) = X509CertificationRequest::from_der(block.contents()).unwrap();
        let cn = csr
            .certification_request_info
            .subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap()
            .to_string();

        let mut sans = Vec::new();
        for ext in csr.requested_extensions().into_iter().flatten() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        sans.push(dns.to_string());
                    }
                }
            }
        }
        (cn, sans)
    }

    #[test]
    fn request_is_named_after_qualified_name() {
        assert_eq!(webhook_request().name(), "webhook-svc.webhook");
    }

    #[test]
    fn csr_round_trips_common_name_and_sans() {
        let (cn, mut sans) = decode_csr_names(webhook_request().csr_pem());
        assert_eq!(cn, "webhook-svc.webhook");

        let mut expected = vec![
            "webhook-svc".to_string(),
            "webhook-svc.webhook".to_string(),
            "webhook-svc.webhook.svc".to_string(),
        ];
        assert_eq!(sans.len(), expected.len());
        sans.sort();
        expected.sort();
        assert_eq!(sans, expected);
    }

    #[test]
    fn private_key_is_pkcs1_rsa() {
        let key = webhook_request().private_key_pem();
        let block = ::pem::parse(key.as_bytes()).unwrap();
        assert_eq!(block.tag(), RSA_PRIVATE_KEY_PEM_TAG);
        assert!(!block.contents().is_empty());
    }

    #[test]
    fn private_key_never_in_csr() {
        let request = webhook_request();
        assert!(!request.csr_pem().contains("PRIVATE KEY"));
        assert!(!format!("{:?}", request).contains(request.private_key_pem()));
    }

    #[test]
    fn weak_key_spec_rejected() {
        let err = KeySpec { bits: 1024 }.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(KeySpec::default().validate().is_ok());
    }

    #[test]
    fn not_after_read_from_pem_and_der() {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["svc1.ns1".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let from_pem = certificate_not_after(cert.pem().as_bytes());
        let from_der = certificate_not_after(cert.der());
        assert!(from_pem.is_some());
        assert_eq!(from_pem, from_der);
    }

    #[test]
    fn not_after_absent_for_garbage() {
        assert!(certificate_not_after(b"not a certificate").is_none());
        assert!(certificate_not_after(webhook_request().csr_pem().as_bytes()).is_none());
    }

    #[test]
    fn parse_pem_rejects_garbage() {
        let err = parse_pem(b"this is not valid PEM data at all").unwrap_err();
        assert!(err.to_string().contains("parse PEM"));
        assert!(!parse_pem(webhook_request().csr_pem().as_bytes())
            .unwrap()
            .is_empty());
    }
}
