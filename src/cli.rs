//! Command-line surface

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::error;

use crate::client::{create_client, KubeClusterClient};
use crate::config::{IssueConfig, DEFAULT_NAMESPACE, DEFAULT_SECRET_NAME};
use crate::issuance::{CertificateIssuer, IssuanceReport};
use crate::observer::TracingObserver;
use crate::retry::{PollConfig, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};
use crate::Result;

/// Certificator - cluster-signed TLS certificates for admission webhooks
#[derive(Parser, Debug)]
#[command(name = "certificator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Issue a certificate for a service and store it in a TLS Secret
    Certify(CertifyArgs),
}

/// Arguments of `certify`
#[derive(Args, Debug, Clone)]
pub struct CertifyArgs {
    /// Service name the certificate is issued for
    #[arg(short = 's', long, env = "CERTIFICATOR_SERVICE")]
    pub service: String,

    /// Namespace of the service and of the TLS Secret
    #[arg(short = 'n', long, env = "CERTIFICATOR_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Name of the TLS Secret to create or replace
    #[arg(short = 't', long = "secret", env = "CERTIFICATOR_SECRET", default_value = DEFAULT_SECRET_NAME)]
    pub secret_name: String,

    /// Kubeconfig path; leave empty to use in-cluster configuration
    #[arg(short = 'k', long, env = "CERTIFICATOR_KUBECONFIG", default_value = "")]
    pub kubeconfig: String,

    /// Number of times to look for the issued certificate
    #[arg(long, env = "CERTIFICATOR_POLL_ATTEMPTS", default_value_t = DEFAULT_POLL_ATTEMPTS)]
    pub poll_attempts: u32,

    /// Pause between lookups, in milliseconds
    #[arg(long, env = "CERTIFICATOR_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
}

impl CertifyArgs {
    /// Convert the arguments into an issuance config
    pub fn into_config(self) -> IssueConfig {
        let kubeconfig = (!self.kubeconfig.is_empty()).then(|| PathBuf::from(self.kubeconfig));
        IssueConfig {
            kubeconfig,
            ..IssueConfig::new(self.service)
                .with_namespace(self.namespace)
                .with_secret_name(self.secret_name)
                .with_poll(PollConfig {
                    max_attempts: self.poll_attempts,
                    interval: Duration::from_millis(self.poll_interval_ms),
                })
        }
    }
}

impl Cli {
    /// Run the selected subcommand
    pub async fn run(self) -> Result<IssuanceReport> {
        match self.command {
            Commands::Certify(args) => certify(args.into_config()).await,
        }
    }
}

// Failures inside the issuer are reported by the observer; only client
// bootstrap failures are logged here.
async fn certify(config: IssueConfig) -> Result<IssuanceReport> {
    let client = match create_client(config.kubeconfig.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            error!(stage = e.stage(), error = %e, "Issuance failed");
            return Err(e);
        }
    };
    CertificateIssuer::new(
        Arc::new(KubeClusterClient::new(client)),
        Arc::new(TracingObserver),
    )
    .issue(&config)
    .await
}
