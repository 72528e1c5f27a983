//! CertificateSigningRequest lifecycle
//!
//! A request moves through `Absent -> Created -> Approved -> Signed`, or ends
//! in `TimedOut` when the signer does not answer within the poll budget.
//! Each live phase is a distinct handle type, so approval cannot be skipped
//! and polling cannot start before approval:
//!
//! ```ignore
//! let submitted = lifecycle.submit(request.name(), request.csr_pem().as_bytes()).await?;
//! let approved = submitted.approve().await?;
//! let signed = approved.await_certificate().await?;
//! ```
//!
//! A request left behind by an earlier run is deleted and recreated. The
//! request is not deleted after success; the authority keeps it for audit.

use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
    CertificateSigningRequestStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;

use crate::client::ClusterClient;
use crate::observer::{IssuanceEvent, IssuanceObserver, ResourceKind};
use crate::pki::certificate_not_after;
use crate::retry::{poll_until_ready, PollConfig, PollOutcome};
use crate::{Error, Result};

/// Signer that issues the certificate
pub const SIGNER_NAME: &str = "kubernetes.io/kube-apiserver-client";

/// Group recorded as the requester
pub const REQUESTING_GROUP: &str = "system:authenticated";

/// Key usages requested for the certificate
pub const KEY_USAGES: [&str; 3] = ["digital signature", "key encipherment", "server auth"];

/// Condition type marking a request approved
pub const APPROVED_CONDITION: &str = "Approved";

/// Reason recorded on the self-approval condition
pub const APPROVAL_REASON: &str = "Self-generated and auto-approved by certificator";

/// Message recorded on the self-approval condition
pub const APPROVAL_MESSAGE: &str = "This CSR was approved by certificator cli";

/// Where a signing request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Not present in the cluster
    Absent,
    /// Submitted, not yet approved
    Created,
    /// Approval condition recorded
    Approved,
    /// Certificate issued (terminal)
    Signed,
    /// Poll budget exhausted without a certificate (terminal)
    TimedOut,
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Created => write!(f, "Created"),
            Self::Approved => write!(f, "Approved"),
            Self::Signed => write!(f, "Signed"),
            Self::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// Build the signing request object for an encoded request
pub fn build_signing_request(name: &str, request_pem: &[u8]) -> CertificateSigningRequest {
    CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(request_pem.to_vec()),
            usages: Some(KEY_USAGES.iter().map(|u| u.to_string()).collect()),
            groups: Some(vec![REQUESTING_GROUP.to_string()]),
            signer_name: SIGNER_NAME.to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// The self-approval condition, stamped with the current time
pub fn approval_condition() -> CertificateSigningRequestCondition {
    CertificateSigningRequestCondition {
        type_: APPROVED_CONDITION.to_string(),
        status: "True".to_string(),
        reason: Some(APPROVAL_REASON.to_string()),
        message: Some(APPROVAL_MESSAGE.to_string()),
        last_update_time: Some(Time(Utc::now())),
        ..Default::default()
    }
}

/// Issued certificate bytes; an empty field counts as not signed
pub fn issued_certificate(request: &CertificateSigningRequest) -> Option<&[u8]> {
    request
        .status
        .as_ref()
        .and_then(|status| status.certificate.as_ref())
        .map(|cert| cert.0.as_slice())
        .filter(|bytes| !bytes.is_empty())
}

/// Whether the request carries an approval condition
pub fn is_approved(request: &CertificateSigningRequest) -> bool {
    request
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == APPROVED_CONDITION && c.status == "True")
        })
}

/// Drives one signing request through the authority
pub struct SigningRequestLifecycle {
    client: Arc<dyn ClusterClient>,
    observer: Arc<dyn IssuanceObserver>,
    poll: PollConfig,
}

impl SigningRequestLifecycle {
    /// Create a lifecycle driver
    pub fn new(
        client: Arc<dyn ClusterClient>,
        observer: Arc<dyn IssuanceObserver>,
        poll: PollConfig,
    ) -> Self {
        Self {
            client,
            observer,
            poll,
        }
    }

    fn enter(&self, name: &str, phase: RequestPhase) {
        self.observer.notify(&IssuanceEvent::RequestPhase {
            name: name.to_string(),
            phase,
        });
    }

    /// Create the request, replacing any leftover with the same name
    ///
    /// A leftover that already carries a certificate is stale from a
    /// previous run. One without a certificate is just as unusable: the key
    /// behind it was never persisted. Both are deleted before re-creation.
    /// A lookup failure is treated as "absent" and left to the create call.
    pub async fn submit(&self, name: &str, request_pem: &[u8]) -> Result<SubmittedRequest<'_>> {
        self.observer.notify(&IssuanceEvent::RequestLookup {
            name: name.to_string(),
        });

        match self.client.get_signing_request(name).await {
            Ok(Some(existing)) => {
                let signed = issued_certificate(&existing).is_some();
                self.client
                    .delete_signing_request(name)
                    .await
                    .map_err(|e| Error::request_delete(format!("'{}': {}", name, e)))?;
                self.observer.notify(&IssuanceEvent::StaleRequestDeleted {
                    name: name.to_string(),
                    signed,
                });
            }
            Ok(None) => {}
            Err(e) => self.observer.notify(&IssuanceEvent::LookupFailed {
                resource: ResourceKind::SigningRequest,
                name: name.to_string(),
                error: e.to_string(),
            }),
        }
        self.enter(name, RequestPhase::Absent);

        let created = self
            .client
            .create_signing_request(&build_signing_request(name, request_pem))
            .await
            .map_err(|e| Error::request_create(format!("'{}': {}", name, e)))?;
        self.enter(name, RequestPhase::Created);

        Ok(SubmittedRequest {
            lifecycle: self,
            name: name.to_string(),
            request: created,
        })
    }
}

/// A request that exists in the cluster but is not yet approved
pub struct SubmittedRequest<'a> {
    lifecycle: &'a SigningRequestLifecycle,
    name: String,
    request: CertificateSigningRequest,
}

impl<'a> SubmittedRequest<'a> {
    /// Signing request name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always [`RequestPhase::Created`]
    pub fn phase(&self) -> RequestPhase {
        RequestPhase::Created
    }

    /// Append the self-approval condition and submit it
    ///
    /// The update carries the object as returned by create, so a concurrent
    /// run that replaced the request in between makes this call conflict.
    pub async fn approve(self) -> Result<ApprovedRequest<'a>> {
        let mut request = self.request;
        request
            .status
            .get_or_insert_with(CertificateSigningRequestStatus::default)
            .conditions
            .get_or_insert_with(Vec::new)
            .push(approval_condition());

        self.lifecycle
            .client
            .update_approval(&request)
            .await
            .map_err(|e| Error::approval(format!("'{}': {}", self.name, e)))?;
        self.lifecycle.enter(&self.name, RequestPhase::Approved);

        Ok(ApprovedRequest {
            lifecycle: self.lifecycle,
            name: self.name,
        })
    }
}

/// An approved request waiting for the signer
pub struct ApprovedRequest<'a> {
    lifecycle: &'a SigningRequestLifecycle,
    name: String,
}

impl ApprovedRequest<'_> {
    /// Signing request name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always [`RequestPhase::Approved`]
    pub fn phase(&self) -> RequestPhase {
        RequestPhase::Approved
    }

    /// Poll until the certificate is issued or the budget runs out
    ///
    /// "Not signed yet" is the only retryable answer; a failed fetch ends
    /// the wait immediately.
    pub async fn await_certificate(self) -> Result<SignedCertificate> {
        let lifecycle = self.lifecycle;
        let name = self.name.as_str();
        let max_attempts = lifecycle.poll.max_attempts;

        let outcome = poll_until_ready(&lifecycle.poll, |attempt| async move {
            let request = lifecycle
                .client
                .get_signing_request(name)
                .await
                .map_err(|e| Error::request_poll(format!("'{}': {}", name, e)))?
                .ok_or_else(|| {
                    Error::request_poll(format!("'{}' disappeared while waiting", name))
                })?;

            match issued_certificate(&request) {
                Some(cert) => Ok::<_, Error>(Some(cert.to_vec())),
                None => {
                    lifecycle.observer.notify(&IssuanceEvent::PollAttempt {
                        name: name.to_string(),
                        attempt,
                        max_attempts,
                    });
                    Ok(None)
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                lifecycle.observer.notify(&IssuanceEvent::CertificateIssued {
                    name: self.name.clone(),
                    attempts,
                    not_after: certificate_not_after(&value),
                });
                lifecycle.enter(&self.name, RequestPhase::Signed);
                Ok(SignedCertificate {
                    name: self.name,
                    certificate: value,
                    attempts,
                })
            }
            PollOutcome::Exhausted { attempts } => {
                lifecycle.enter(&self.name, RequestPhase::TimedOut);
                Err(Error::SigningTimeout {
                    name: self.name,
                    attempts,
                })
            }
        }
    }
}

/// Certificate issued for a signing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    /// Signing request name
    pub name: String,
    /// Certificate bytes exactly as returned by the authority
    pub certificate: Vec<u8>,
    /// Fetches it took
    pub attempts: u32,
}

impl SignedCertificate {
    /// Always [`RequestPhase::Signed`]
    pub fn phase(&self) -> RequestPhase {
        RequestPhase::Signed
    }
}
