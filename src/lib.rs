//! Certificator - cluster-signed TLS certificates for admission webhooks
//!
//! A webhook server needs a serving certificate its API server trusts. Certificator
//! obtains one from the cluster's own certificate authority: it generates a key pair,
//! submits a CertificateSigningRequest, approves it, waits for the signer, and stores
//! key and certificate in a `kubernetes.io/tls` Secret.
//!
//! # Flow
//!
//! ```text
//! names -> pki -> csr (create, approve, poll) -> secret
//! ```
//!
//! Each stage halts the run on failure. The private key exists only in memory until it
//! is written to the Secret.
//!
//! # Modules
//!
//! - [`names`] - DNS name expansion for a service
//! - [`pki`] - Key pair and certificate request generation
//! - [`csr`] - Signing request lifecycle
//! - [`retry`] - Bounded fixed-interval polling
//! - [`secret`] - TLS Secret construction and create-or-replace
//! - [`client`] - Cluster access seam and kube client bootstrap
//! - [`observer`] - Progress events and their tracing rendering
//! - [`issuance`] - End-to-end workflow
//! - [`config`] - Run settings
//! - [`cli`] - Command-line surface
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod cli;
pub mod client;
pub mod config;
pub mod csr;
pub mod error;
pub mod issuance;
pub mod names;
pub mod observer;
pub mod pki;
pub mod retry;
pub mod secret;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
