// ABOUTME: Control-plane abstraction the migration runs against
// ABOUTME: Defines the ControlPlane trait and the provider error taxonomy

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::arn::AccountIdentity;

/// Broad class of a control-plane failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad keys, expired tokens or missing permissions
    Authentication,
    /// The referenced instance or snapshot does not exist
    NotFound,
    /// An instance or snapshot with that identifier already exists
    Conflict,
    /// Request rate exceeded
    Throttled,
    Other,
}

impl ErrorKind {
    /// Classify an AWS error code
    pub fn from_code(code: Option<&str>) -> Self {
        let Some(code) = code else {
            return ErrorKind::Other;
        };
        match code {
            "InvalidClientTokenId"
            | "SignatureDoesNotMatch"
            | "AccessDenied"
            | "AccessDeniedException"
            | "UnrecognizedClientException"
            | "AuthFailure"
            | "ExpiredToken"
            | "ExpiredTokenException"
            | "UnauthorizedOperation"
            | "MissingAuthenticationToken" => ErrorKind::Authentication,
            "DBInstanceNotFound" | "DBInstanceNotFoundFault" | "DBSnapshotNotFound"
            | "DBSnapshotNotFoundFault" => ErrorKind::NotFound,
            "DBSnapshotAlreadyExists"
            | "DBSnapshotAlreadyExistsFault"
            | "DBInstanceAlreadyExists"
            | "DBInstanceAlreadyExistsFault" => ErrorKind::Conflict,
            "Throttling" | "ThrottlingException" | "RequestLimitExceeded" => ErrorKind::Throttled,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Authentication => "authentication/authorization failure",
            ErrorKind::NotFound => "resource not found",
            ErrorKind::Conflict => "identifier already in use",
            ErrorKind::Throttled => "request throttled",
            ErrorKind::Other => "provider error",
        };
        f.write_str(label)
    }
}

/// Failure reported by a control-plane call
#[derive(Debug, Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct ProviderError {
    pub operation: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(operation: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// The managed-database and identity calls a migration needs from one account
///
/// Each implementation is bound to a single set of credentials and a single
/// region. Status queries return `Ok(None)` when the resource does not exist.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Region every call of this session is scoped to
    fn region(&self) -> &str;

    async fn caller_identity(&self) -> ProviderResult<AccountIdentity>;

    async fn create_db_snapshot(&self, instance: &str, snapshot: &str) -> ProviderResult<()>;

    async fn db_snapshot_status(&self, snapshot: &str) -> ProviderResult<Option<String>>;

    /// Grant `account_id` permission to restore from `snapshot`
    async fn share_db_snapshot(&self, snapshot: &str, account_id: &str) -> ProviderResult<()>;

    /// Revoke a grant made by [`ControlPlane::share_db_snapshot`]
    async fn unshare_db_snapshot(&self, snapshot: &str, account_id: &str) -> ProviderResult<()>;

    async fn restore_db_instance_from_snapshot(
        &self,
        instance: &str,
        snapshot_arn: &str,
    ) -> ProviderResult<()>;

    async fn db_instance_status(&self, instance: &str) -> ProviderResult<Option<String>>;

    async fn delete_db_snapshot(&self, snapshot: &str) -> ProviderResult<()>;

    /// Delete an instance without taking a final snapshot
    async fn delete_db_instance(&self, instance: &str) -> ProviderResult<()>;
}
