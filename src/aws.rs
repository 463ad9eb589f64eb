// ABOUTME: AWS-backed control plane built on aws-sdk-rds and aws-sdk-sts
// ABOUTME: One AwsSession per credential set, scoped to that set's region

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::arn::AccountIdentity;
use crate::credentials::CredentialSet;
use crate::provider::{ControlPlane, ErrorKind, ProviderError, ProviderResult};

/// Name reported to the SDK for the static credentials we hand it
const CREDENTIALS_PROVIDER_NAME: &str = "rds-copy-cli";

/// Snapshot attribute that controls which accounts may restore from it
const RESTORE_ATTRIBUTE: &str = "restore";

/// Region-scoped RDS and STS clients sharing one credential set
pub struct AwsSession {
    region: String,
    rds: aws_sdk_rds::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsSession {
    /// Build SDK clients for the given credentials
    ///
    /// No request is made here; bad credentials surface on the first call,
    /// which is always [`ControlPlane::caller_identity`].
    pub async fn connect(credentials: &CredentialSet) -> Self {
        let static_credentials = Credentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            None,
            None,
            CREDENTIALS_PROVIDER_NAME,
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(credentials.region().to_string()))
            .credentials_provider(static_credentials)
            .load()
            .await;

        tracing::debug!(
            "Created AWS session for access key {} in {}",
            credentials.access_key_id(),
            credentials.region()
        );

        Self {
            region: credentials.region().to_string(),
            rds: aws_sdk_rds::Client::new(&config),
            sts: aws_sdk_sts::Client::new(&config),
        }
    }
}

fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let kind = ErrorKind::from_code(err.code());
    ProviderError::new(operation, kind, DisplayErrorContext(&err).to_string())
}

/// Treat a not-found answer from a describe call as "no such resource"
fn absent_if_not_found(result: ProviderResult<Option<String>>) -> ProviderResult<Option<String>> {
    match result {
        Err(e) if e.is_not_found() => Ok(None),
        other => other,
    }
}

#[async_trait]
impl ControlPlane for AwsSession {
    fn region(&self) -> &str {
        &self.region
    }

    async fn caller_identity(&self) -> ProviderResult<AccountIdentity> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| sdk_error("GetCallerIdentity", e))?;

        let arn = output.arn().ok_or_else(|| {
            ProviderError::new(
                "GetCallerIdentity",
                ErrorKind::Other,
                "response did not include the caller ARN",
            )
        })?;

        AccountIdentity::from_arn(arn)
            .map_err(|e| ProviderError::new("GetCallerIdentity", ErrorKind::Other, e.to_string()))
    }

    async fn create_db_snapshot(&self, instance: &str, snapshot: &str) -> ProviderResult<()> {
        self.rds
            .create_db_snapshot()
            .db_instance_identifier(instance)
            .db_snapshot_identifier(snapshot)
            .send()
            .await
            .map_err(|e| sdk_error("CreateDBSnapshot", e))?;
        Ok(())
    }

    async fn db_snapshot_status(&self, snapshot: &str) -> ProviderResult<Option<String>> {
        let result = self
            .rds
            .describe_db_snapshots()
            .db_snapshot_identifier(snapshot)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeDBSnapshots", e))
            .map(|output| {
                output
                    .db_snapshots()
                    .first()
                    .and_then(|s| s.status())
                    .map(str::to_string)
            });
        absent_if_not_found(result)
    }

    async fn share_db_snapshot(&self, snapshot: &str, account_id: &str) -> ProviderResult<()> {
        self.rds
            .modify_db_snapshot_attribute()
            .db_snapshot_identifier(snapshot)
            .attribute_name(RESTORE_ATTRIBUTE)
            .values_to_add(account_id)
            .send()
            .await
            .map_err(|e| sdk_error("ModifyDBSnapshotAttribute", e))?;
        Ok(())
    }

    async fn unshare_db_snapshot(&self, snapshot: &str, account_id: &str) -> ProviderResult<()> {
        self.rds
            .modify_db_snapshot_attribute()
            .db_snapshot_identifier(snapshot)
            .attribute_name(RESTORE_ATTRIBUTE)
            .values_to_remove(account_id)
            .send()
            .await
            .map_err(|e| sdk_error("ModifyDBSnapshotAttribute", e))?;
        Ok(())
    }

    async fn restore_db_instance_from_snapshot(
        &self,
        instance: &str,
        snapshot_arn: &str,
    ) -> ProviderResult<()> {
        self.rds
            .restore_db_instance_from_db_snapshot()
            .db_instance_identifier(instance)
            .db_snapshot_identifier(snapshot_arn)
            .send()
            .await
            .map_err(|e| sdk_error("RestoreDBInstanceFromDBSnapshot", e))?;
        Ok(())
    }

    async fn db_instance_status(&self, instance: &str) -> ProviderResult<Option<String>> {
        let result = self
            .rds
            .describe_db_instances()
            .db_instance_identifier(instance)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeDBInstances", e))
            .map(|output| {
                output
                    .db_instances()
                    .first()
                    .and_then(|i| i.db_instance_status())
                    .map(str::to_string)
            });
        absent_if_not_found(result)
    }

    async fn delete_db_snapshot(&self, snapshot: &str) -> ProviderResult<()> {
        self.rds
            .delete_db_snapshot()
            .db_snapshot_identifier(snapshot)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteDBSnapshot", e))?;
        Ok(())
    }

    async fn delete_db_instance(&self, instance: &str) -> ProviderResult<()> {
        self.rds
            .delete_db_instance()
            .db_instance_identifier(instance)
            .skip_final_snapshot(true)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteDBInstance", e))?;
        Ok(())
    }
}
