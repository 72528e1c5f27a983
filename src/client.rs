//! Cluster access for signing requests and TLS Secrets
//!
//! [`ClusterClient`] is the only seam between the workflow and the API
//! server. Every call goes to the server; nothing is cached between calls.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Subresource used to record approval conditions
pub const APPROVAL_SUBRESOURCE: &str = "approval";

/// Default connection timeout for the kube client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for the kube client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the issuance workflow needs from the cluster
///
/// Lookups return `Ok(None)` for not-found; any other failure is an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch a signing request by name
    async fn get_signing_request(
        &self,
        name: &str,
    ) -> Result<Option<CertificateSigningRequest>, Error>;

    /// Create a signing request, returning the stored object
    async fn create_signing_request(
        &self,
        request: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error>;

    /// Delete a signing request by name
    async fn delete_signing_request(&self, name: &str) -> Result<(), Error>;

    /// Submit the request's condition list through the approval subresource
    async fn update_approval(
        &self,
        request: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error>;

    /// Fetch a Secret by namespace and name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a Secret
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, Error>;

    /// Fully replace an existing Secret
    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, Error>;
}

/// [`ClusterClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn signing_requests(&self) -> Api<CertificateSigningRequest> {
        Api::all(self.client.clone())
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name<'a>(meta: &'a kube::api::ObjectMeta, kind: &str) -> Result<&'a str, Error> {
    meta.name
        .as_deref()
        .ok_or_else(|| Error::invalid_input(format!("{} has no name", kind)))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_signing_request(
        &self,
        name: &str,
    ) -> Result<Option<CertificateSigningRequest>, Error> {
        match self.signing_requests().get(name).await {
            Ok(csr) => Ok(Some(csr)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_signing_request(
        &self,
        request: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error> {
        Ok(self
            .signing_requests()
            .create(&PostParams::default(), request)
            .await?)
    }

    async fn delete_signing_request(&self, name: &str) -> Result<(), Error> {
        self.signing_requests()
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn update_approval(
        &self,
        request: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, Error> {
        let name = object_name(&request.metadata, "CertificateSigningRequest")?;
        let body = serde_json::to_vec(request).map_err(|e| {
            Error::approval(format!("failed to serialize signing request: {}", e))
        })?;
        Ok(self
            .signing_requests()
            .replace_subresource(APPROVAL_SUBRESOURCE, name, &PostParams::default(), body)
            .await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        match self.secrets(namespace).get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, Error> {
        Ok(self
            .secrets(namespace)
            .create(&PostParams::default(), secret)
            .await?)
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, Error> {
        let name = object_name(&secret.metadata, "Secret")?;
        Ok(self
            .secrets(namespace)
            .replace(name, &PostParams::default(), secret)
            .await?)
    }
}

/// Create a kube client from optional kubeconfig path with default timeouts
///
/// Without a path the configuration is inferred: in-cluster service account
/// first, then the local kubeconfig.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::client_config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::client_config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::client_config(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config)
        .map_err(|e| Error::client_config(format!("failed to create client: {}", e)))
}
