//! TLS Secret creation and replacement
//!
//! The Secret is the only output consumers read. It is written with a full
//! replace, never a merge, so stale keys from a previous issuance cannot
//! survive next to a fresh certificate.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use crate::client::ClusterClient;
use crate::observer::{IssuanceEvent, IssuanceObserver, ResourceKind};
use crate::{Error, Result};

/// Secret type understood by ingress and webhook servers
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
/// Data key holding the PEM private key
pub const TLS_KEY_FIELD: &str = "tls.key";
/// Data key holding the PEM certificate
pub const TLS_CERT_FIELD: &str = "tls.crt";
/// Label marking Secrets this tool owns
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "certificator";

/// How the Secret was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretAction {
    /// No Secret existed, one was created
    Created,
    /// An existing Secret was replaced
    Updated,
}

impl std::fmt::Display for SecretAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Updated => write!(f, "Updated"),
        }
    }
}

/// Build a TLS Secret holding exactly the given key and certificate
pub fn build_tls_secret(namespace: &str, name: &str, certificate: &[u8], key: &[u8]) -> Secret {
    let data = BTreeMap::from([
        (TLS_KEY_FIELD.to_string(), ByteString(key.to_vec())),
        (TLS_CERT_FIELD.to_string(), ByteString(certificate.to_vec())),
    ]);

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some(TLS_SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// Writes the TLS Secret, creating it or replacing it whole
pub struct CredentialReconciler {
    client: Arc<dyn ClusterClient>,
    observer: Arc<dyn IssuanceObserver>,
}

impl CredentialReconciler {
    /// Create a reconciler
    pub fn new(client: Arc<dyn ClusterClient>, observer: Arc<dyn IssuanceObserver>) -> Self {
        Self { client, observer }
    }

    /// Create the Secret when absent, replace it when present
    ///
    /// A failed lookup is treated as absent. If the Secret does exist the
    /// create then fails with a conflict and the run reports a write error.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
        certificate: &[u8],
        key: &[u8],
    ) -> Result<SecretAction> {
        self.observer.notify(&IssuanceEvent::SecretLookup {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });

        let existing = match self.client.get_secret(namespace, name).await {
            Ok(found) => found,
            Err(e) => {
                self.observer.notify(&IssuanceEvent::LookupFailed {
                    resource: ResourceKind::Secret,
                    name: format!("{}/{}", namespace, name),
                    error: e.to_string(),
                });
                None
            }
        };

        let mut secret = build_tls_secret(namespace, name, certificate, key);
        let action = match existing {
            Some(current) => {
                // Carry the version so a concurrent writer makes this conflict
                secret.metadata.resource_version = current.metadata.resource_version;
                self.client
                    .replace_secret(namespace, &secret)
                    .await
                    .map_err(|e| {
                        Error::credential_write(format!(
                            "failed to replace {}/{}: {}",
                            namespace, name, e
                        ))
                    })?;
                SecretAction::Updated
            }
            None => {
                self.client
                    .create_secret(namespace, &secret)
                    .await
                    .map_err(|e| {
                        Error::credential_write(format!(
                            "failed to create {}/{}: {}",
                            namespace, name, e
                        ))
                    })?;
                SecretAction::Created
            }
        };

        self.observer.notify(&IssuanceEvent::SecretWritten {
            namespace: namespace.to_string(),
            name: name.to_string(),
            action,
        });
        Ok(action)
    }
}

/// Create or replace the TLS Secret without progress reporting
pub async fn reconcile_tls_secret(
    client: Arc<dyn ClusterClient>,
    namespace: &str,
    name: &str,
    certificate: &[u8],
    key: &[u8],
) -> Result<SecretAction> {
    CredentialReconciler::new(client, Arc::new(crate::observer::NoopObserver))
        .reconcile(namespace, name, certificate, key)
        .await
}
