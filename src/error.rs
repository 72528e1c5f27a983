//! Error types for certificate issuance

use thiserror::Error;

/// Main error type for issuance operations
///
/// Every variant except [`Error::SigningTimeout`] is a definite failure. The
/// timeout means the signing authority has not answered within the poll
/// budget, which is not the same as a rejection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bad identity or configuration input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Key pair or certificate request could not be produced
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing request could not be created
    #[error("failed to create certificate signing request: {0}")]
    RequestCreate(String),

    /// Stale signing request could not be deleted
    #[error("failed to delete certificate signing request: {0}")]
    RequestDelete(String),

    /// Approval update was rejected
    #[error("failed to approve certificate signing request: {0}")]
    Approval(String),

    /// Transport failure while polling for the signed certificate
    #[error("failed to fetch certificate signing request: {0}")]
    RequestPoll(String),

    /// The authority did not sign the request within the poll budget
    #[error("no certificate issued for signing request '{name}' after {attempts} attempts")]
    SigningTimeout {
        /// Signing request name
        name: String,
        /// Number of fetches performed
        attempts: u32,
    },

    /// TLS Secret could not be created or updated
    #[error("failed to write TLS secret: {0}")]
    CredentialWrite(String),

    /// Cluster client could not be configured
    #[error("client configuration error: {0}")]
    ClientConfig(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Create an invalid input error with the given message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a key generation error with the given message
    pub fn key_generation(msg: impl Into<String>) -> Self {
        Self::KeyGeneration(msg.into())
    }

    /// Create a request create error with the given message
    pub fn request_create(msg: impl Into<String>) -> Self {
        Self::RequestCreate(msg.into())
    }

    /// Create a request delete error with the given message
    pub fn request_delete(msg: impl Into<String>) -> Self {
        Self::RequestDelete(msg.into())
    }

    /// Create an approval error with the given message
    pub fn approval(msg: impl Into<String>) -> Self {
        Self::Approval(msg.into())
    }

    /// Create a poll transport error with the given message
    pub fn request_poll(msg: impl Into<String>) -> Self {
        Self::RequestPoll(msg.into())
    }

    /// Create a credential write error with the given message
    pub fn credential_write(msg: impl Into<String>) -> Self {
        Self::CredentialWrite(msg.into())
    }

    /// Create a client configuration error with the given message
    pub fn client_config(msg: impl Into<String>) -> Self {
        Self::ClientConfig(msg.into())
    }

    /// Workflow stage this error belongs to, for the fatal log line
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "input",
            Self::KeyGeneration(_) => "key-generation",
            Self::RequestCreate(_) => "request-create",
            Self::RequestDelete(_) => "request-delete",
            Self::Approval(_) => "approval",
            Self::RequestPoll(_) => "request-poll",
            Self::SigningTimeout { .. } => "signing",
            Self::CredentialWrite(_) => "credential-write",
            Self::ClientConfig(_) => "client-config",
            Self::Kube(_) => "kubernetes",
        }
    }

    /// True when the authority simply has not signed yet
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SigningTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_accept_str_and_string() {
        let err = Error::invalid_input("service name must not be empty");
        assert!(err.to_string().contains("invalid input"));

        let name = "svc1.ns1";
        let err = Error::request_create(format!("'{}' already exists", name));
        assert!(err.to_string().contains("svc1.ns1"));
    }

    #[test]
    fn timeout_message_names_request_and_attempts() {
        let err = Error::SigningTimeout {
            name: "webhook-svc.webhook".to_string(),
            attempts: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("webhook-svc.webhook"));
        assert!(msg.contains("5 attempts"));
        assert!(err.is_timeout());
    }

    #[test]
    fn only_signing_timeout_is_a_timeout() {
        let definite = [
            Error::invalid_input("x"),
            Error::key_generation("x"),
            Error::request_create("x"),
            Error::request_delete("x"),
            Error::approval("x"),
            Error::request_poll("x"),
            Error::credential_write("x"),
            Error::client_config("x"),
        ];
        for err in &definite {
            assert!(!err.is_timeout(), "{} should not be a timeout", err);
        }
    }

    #[test]
    fn every_stage_is_distinct() {
        let errors = [
            Error::invalid_input("x"),
            Error::key_generation("x"),
            Error::request_create("x"),
            Error::request_delete("x"),
            Error::approval("x"),
            Error::request_poll("x"),
            Error::SigningTimeout {
                name: "x".to_string(),
                attempts: 1,
            },
            Error::credential_write("x"),
            Error::client_config("x"),
        ];
        let mut stages: Vec<_> = errors.iter().map(Error::stage).collect();
        stages.sort_unstable();
        stages.dedup();
        assert_eq!(stages.len(), errors.len());
    }
}
