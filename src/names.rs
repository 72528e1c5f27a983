//! Subject name expansion for a webhook service
//!
//! A service reachable as `<service>.<namespace>.svc` inside the cluster is
//! addressed by three DNS names. The qualified form doubles as the request
//! name and the certificate CommonName.

use crate::{Error, Result};

/// Template for the bare service name
pub const SHORT_NAME_TEMPLATE: &str = "${service}";
/// Template for the namespace-qualified name
pub const QUALIFIED_NAME_TEMPLATE: &str = "${service}.${namespace}";
/// Template for the cluster-local service name
pub const FULLY_QUALIFIED_NAME_TEMPLATE: &str = "${service}.${namespace}.svc";

const SERVICE_PLACEHOLDER: &str = "${service}";
const NAMESPACE_PLACEHOLDER: &str = "${namespace}";

/// Longest DNS label allowed for a service or namespace
pub const MAX_LABEL_LEN: usize = 63;

/// Check that a value is a lowercase RFC 1123 DNS label
fn validate_label(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_input(format!("{} must not be empty", kind)));
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(Error::invalid_input(format!(
            "{} '{}' is longer than {} characters",
            kind, value, MAX_LABEL_LEN
        )));
    }
    let valid_chars = value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let alnum_ends = !value.starts_with('-') && !value.ends_with('-');
    if !valid_chars || !alnum_ends {
        return Err(Error::invalid_input(format!(
            "{} '{}' must consist of lowercase alphanumerics or '-', starting and ending with an alphanumeric",
            kind, value
        )));
    }
    Ok(())
}

/// A (service, namespace) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    service: String,
    namespace: String,
}

impl ServiceIdentity {
    /// Create an identity; both components must be DNS labels
    pub fn new(service: impl Into<String>, namespace: impl Into<String>) -> Result<Self> {
        let service = service.into();
        let namespace = namespace.into();
        validate_label("service name", &service)?;
        validate_label("namespace", &namespace)?;
        Ok(Self { service, namespace })
    }

    /// Service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Namespace the service lives in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Expand the three subject alternative names
    pub fn subject_names(&self) -> SubjectNames {
        SubjectNames {
            short: self.render(SHORT_NAME_TEMPLATE),
            qualified: self.render(QUALIFIED_NAME_TEMPLATE),
            fully_qualified: self.render(FULLY_QUALIFIED_NAME_TEMPLATE),
        }
    }

    /// Single-pass placeholder substitution
    fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + self.service.len() * 2);
        let mut rest = template;
        while let Some(pos) = rest.find("${") {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(SERVICE_PLACEHOLDER) {
                out.push_str(&self.service);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(NAMESPACE_PLACEHOLDER) {
                out.push_str(&self.namespace);
                rest = after;
            } else {
                out.push_str("${");
                rest = &tail[2..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// The expanded SAN set, always in short, qualified, fully-qualified order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectNames {
    /// `${service}`
    pub short: String,
    /// `${service}.${namespace}`
    pub qualified: String,
    /// `${service}.${namespace}.svc`
    pub fully_qualified: String,
}

impl SubjectNames {
    /// CommonName and signing request name
    pub fn common_name(&self) -> &str {
        &self.qualified
    }

    /// The names in their fixed order
    pub fn to_vec(&self) -> Vec<String> {
        vec![
            self.short.clone(),
            self.qualified.clone(),
            self.fully_qualified.clone(),
        ]
    }
}

/// Expand a service and namespace into its subject names
pub fn expand(service: &str, namespace: &str) -> Result<SubjectNames> {
    Ok(ServiceIdentity::new(service, namespace)?.subject_names())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_webhook_service() {
        let names = expand("webhook-svc", "webhook").unwrap();
        assert_eq!(
            names.to_vec(),
            vec!["webhook-svc", "webhook-svc.webhook", "webhook-svc.webhook.svc"]
        );
        assert_eq!(names.common_name(), "webhook-svc.webhook");
    }

    #[test]
    fn expands_in_fixed_order() {
        for (service, namespace) in [("svc1", "ns1"), ("webhook-svc-v2", "default"), ("a", "b")] {
            let names = expand(service, namespace).unwrap();
            assert_eq!(names.short, service);
            assert_eq!(names.qualified, format!("{}.{}", service, namespace));
            assert_eq!(names.fully_qualified, format!("{}.{}.svc", service, namespace));
            assert_eq!(names.to_vec().len(), 3);
        }
    }

    #[test]
    fn rejects_empty_service() {
        let err = expand("", "webhook").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("service")));
    }

    #[test]
    fn rejects_empty_namespace() {
        let err = expand("webhook-svc", "").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("namespace")));
    }

    #[test]
    fn rejects_names_that_are_not_dns_labels() {
        for (service, namespace) in [
            ("sérvice", "ns1"),
            ("svc1", "Ns1"),
            ("svc_1", "ns1"),
            ("svc1", "ns.1"),
            ("-svc1", "ns1"),
            ("svc1", "ns1-"),
            ("${namespace}", "ns1"),
        ] {
            let err = ServiceIdentity::new(service, namespace).unwrap_err();
            assert!(
                matches!(err, Error::InvalidInput(_)),
                "{}/{} should be rejected",
                service,
                namespace
            );
        }
    }

    #[test]
    fn label_length_is_bounded() {
        let longest = "a".repeat(MAX_LABEL_LEN);
        assert!(ServiceIdentity::new(longest.as_str(), "ns1").is_ok());

        let too_long = "a".repeat(MAX_LABEL_LEN + 1);
        let err = ServiceIdentity::new(too_long, "ns1").unwrap_err();
        assert!(err.to_string().contains("longer than 63"));
    }

    #[test]
    fn identity_exposes_components() {
        let identity = ServiceIdentity::new("svc1", "ns1").unwrap();
        assert_eq!(identity.service(), "svc1");
        assert_eq!(identity.namespace(), "ns1");
    }
}
