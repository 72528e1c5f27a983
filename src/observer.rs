//! Progress reporting for the issuance workflow
//!
//! Stages never log directly. They report [`IssuanceEvent`]s to an injected
//! [`IssuanceObserver`], so the binary can render them through `tracing`
//! while tests record and assert on them.
//!
//! Observers are fire-and-forget: `notify()` cannot fail and must never
//! affect the workflow.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::csr::RequestPhase;
use crate::secret::SecretAction;

/// Remote resource kinds the workflow touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// certificates.k8s.io/v1 CertificateSigningRequest
    SigningRequest,
    /// core/v1 Secret
    Secret,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigningRequest => write!(f, "CertificateSigningRequest"),
            Self::Secret => write!(f, "Secret"),
        }
    }
}

/// Something that happened during issuance
#[derive(Debug, Clone, PartialEq)]
pub enum IssuanceEvent {
    /// Workflow started
    Started {
        /// Service name
        service: String,
        /// Target namespace
        namespace: String,
        /// TLS Secret name
        secret: String,
    },
    /// Key pair and request generated
    KeyGenerated {
        /// Signing request name
        name: String,
        /// RSA modulus size
        bits: usize,
    },
    /// Looking for a signing request left by an earlier run
    RequestLookup {
        /// Signing request name
        name: String,
    },
    /// A lookup failed and the resource is treated as absent
    LookupFailed {
        /// Kind of the resource looked up
        resource: ResourceKind,
        /// Resource name
        name: String,
        /// Error returned by the lookup
        error: String,
    },
    /// A leftover signing request was deleted before re-creation
    StaleRequestDeleted {
        /// Signing request name
        name: String,
        /// Whether the leftover already carried a certificate
        signed: bool,
    },
    /// The signing request moved to a new phase
    RequestPhase {
        /// Signing request name
        name: String,
        /// Phase entered
        phase: RequestPhase,
    },
    /// A poll found no certificate yet
    PollAttempt {
        /// Signing request name
        name: String,
        /// 1-based attempt number
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
    },
    /// The authority issued a certificate
    CertificateIssued {
        /// Signing request name
        name: String,
        /// Fetches it took
        attempts: u32,
        /// Certificate expiry, when it parses
        not_after: Option<DateTime<Utc>>,
    },
    /// Looking up the target TLS Secret
    SecretLookup {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
    },
    /// The TLS Secret was written
    SecretWritten {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
        /// Whether it was created or replaced
        action: SecretAction,
    },
    /// A stage failed and the workflow halted
    StageFailed {
        /// Stage name, see [`crate::Error::stage`]
        stage: &'static str,
        /// Rendered error
        error: String,
    },
    /// Workflow finished successfully
    Completed {
        /// Total wall-clock duration
        elapsed: Duration,
    },
}

/// Receiver of issuance progress
pub trait IssuanceObserver: Send + Sync {
    /// Handle one event
    fn notify(&self, event: &IssuanceEvent);
}

/// Renders events as structured `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IssuanceObserver for TracingObserver {
    fn notify(&self, event: &IssuanceEvent) {
        match event {
            IssuanceEvent::Started {
                service,
                namespace,
                secret,
            } => info!(%service, %namespace, %secret, "Issuing webhook certificate"),
            IssuanceEvent::KeyGenerated { name, bits } => {
                info!(%name, bits, "Private key and certificate request generated")
            }
            IssuanceEvent::RequestLookup { name } => {
                info!(%name, "Certificate signing request, status: Check if already exists")
            }
            IssuanceEvent::LookupFailed {
                resource,
                name,
                error,
            } => warn!(
                %resource,
                %name,
                %error,
                "Lookup failed, treating as not existing"
            ),
            IssuanceEvent::StaleRequestDeleted { name, signed } => info!(
                %name,
                signed,
                "Certificate signing request, status: Already exists, deleted"
            ),
            IssuanceEvent::RequestPhase { name, phase } => {
                info!(%name, %phase, "Certificate signing request, status: {}", phase)
            }
            IssuanceEvent::PollAttempt {
                name,
                attempt,
                max_attempts,
            } => info!(
                %name,
                attempt,
                max_attempts,
                "Certificate signing request, status: No certificate found yet"
            ),
            IssuanceEvent::CertificateIssued {
                name,
                attempts,
                not_after,
            } => match not_after {
                Some(expiry) => info!(
                    %name,
                    attempts,
                    not_after = %expiry.to_rfc3339(),
                    "Certificate signing request, status: Certificate found"
                ),
                None => info!(
                    %name,
                    attempts,
                    "Certificate signing request, status: Certificate found"
                ),
            },
            IssuanceEvent::SecretLookup { namespace, name } => {
                info!(%namespace, %name, "Secret, status: Check if already exists")
            }
            IssuanceEvent::SecretWritten {
                namespace,
                name,
                action,
            } => info!(%namespace, %name, %action, "Secret, status: {}", action),
            IssuanceEvent::StageFailed { stage, error } => {
                error!(stage, %error, "Issuance failed")
            }
            IssuanceEvent::Completed { elapsed } => {
                info!("Done in {} milliseconds", elapsed.as_millis())
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IssuanceObserver for NoopObserver {
    fn notify(&self, _event: &IssuanceEvent) {}
}

/// Keeps every event in memory, for assertions
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<IssuanceEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<IssuanceEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Phases the named signing request went through, in order
    pub fn phases(&self, name: &str) -> Vec<RequestPhase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                IssuanceEvent::RequestPhase { name: n, phase } if n == name => Some(phase),
                _ => None,
            })
            .collect()
    }
}

impl IssuanceObserver for RecordingObserver {
    fn notify(&self, event: &IssuanceEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
