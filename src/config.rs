//! Issuance settings

use std::path::PathBuf;

use crate::names::ServiceIdentity;
use crate::pki::KeySpec;
use crate::retry::PollConfig;
use crate::{Error, Result};

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "webhook";

/// TLS Secret name used when none is given
pub const DEFAULT_SECRET_NAME: &str = "webhook-certs";

/// Everything one issuance run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueConfig {
    /// Service the certificate is for
    pub service: String,
    /// Namespace of the service and of the TLS Secret
    pub namespace: String,
    /// TLS Secret to write
    pub secret_name: String,
    /// Explicit kubeconfig; `None` means in-cluster or inferred
    pub kubeconfig: Option<PathBuf>,
    /// Signing poll policy
    pub poll: PollConfig,
    /// Key generation parameters
    pub key: KeySpec,
}

impl IssueConfig {
    /// Config for a service with every other setting at its default
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            kubeconfig: None,
            poll: PollConfig::default(),
            key: KeySpec::default(),
        }
    }

    /// Set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the TLS Secret name
    pub fn with_secret_name(mut self, secret_name: impl Into<String>) -> Self {
        self.secret_name = secret_name.into();
        self
    }

    /// Set the poll policy
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Check the config before any remote call is made
    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(Error::invalid_input("service name must not be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(Error::invalid_input("namespace must not be empty"));
        }
        if self.secret_name.trim().is_empty() {
            return Err(Error::invalid_input("secret name must not be empty"));
        }
        if self.poll.max_attempts == 0 {
            return Err(Error::invalid_input("poll attempts must be at least 1"));
        }
        self.identity()?;
        self.key.validate()
    }

    /// The (service, namespace) pair the certificate names derive from
    pub fn identity(&self) -> Result<ServiceIdentity> {
        ServiceIdentity::new(self.service.as_str(), self.namespace.as_str())
    }
}
