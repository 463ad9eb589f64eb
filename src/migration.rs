// ABOUTME: Cross-account RDS instance migration via a shared snapshot
// ABOUTME: Runs identity, snapshot, share, restore and cleanup strictly in order

use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::arn::{db_snapshot_arn, AccountIdentity};
use crate::journal::{Journal, Resource};
use crate::provider::ControlPlane;
use crate::waiter::{wait_for_status, WaitConfig, AVAILABLE};

/// Identifier of the temporary snapshot taken of `instance`
pub fn snapshot_name(instance: &str) -> String {
    format!("{}-snapshot", instance)
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Wait for the source snapshot to complete
    pub snapshot_wait: WaitConfig,
    /// Wait for the restored instance to become available
    pub restore_wait: WaitConfig,
    /// Delete whatever the run created when a step fails
    pub rollback_on_failure: bool,
}

impl MigrationOptions {
    pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_RESTORE_TIMEOUT: Duration = Duration::from_secs(90 * 60);
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            snapshot_wait: WaitConfig::with_timeout(Self::DEFAULT_SNAPSHOT_TIMEOUT),
            restore_wait: WaitConfig::with_timeout(Self::DEFAULT_RESTORE_TIMEOUT),
            rollback_on_failure: false,
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub instance: String,
    pub source: AccountIdentity,
    pub destination: AccountIdentity,
    pub snapshot: String,
    pub snapshot_arn: String,
}

/// One migration of a single instance between two accounts
///
/// Steps run strictly one after another and each waits for the previous to
/// finish. Nothing is retried: the first failure ends the run. Resources
/// created before the failure are recorded in the journal and reported, and
/// are only removed when `rollback_on_failure` is set.
pub struct Migration<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    destination: &'a D,
    instance: String,
    options: MigrationOptions,
    journal: Journal,
}

impl<'a, S, D> Migration<'a, S, D>
where
    S: ControlPlane + ?Sized,
    D: ControlPlane + ?Sized,
{
    pub fn new(
        source: &'a S,
        destination: &'a D,
        instance: impl Into<String>,
        options: MigrationOptions,
    ) -> Result<Self> {
        let instance = instance.into();
        if instance.trim().is_empty() {
            bail!("DB instance identifier cannot be empty");
        }
        Ok(Self {
            source,
            destination,
            journal: Journal::new(instance.clone()),
            instance,
            options,
        })
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Run every step, then report (and optionally roll back) leftovers on failure
    pub async fn run(&mut self) -> Result<MigrationOutcome> {
        let result = self.execute().await;

        if let Err(e) = &result {
            self.journal.set_error(e);
            if self.options.rollback_on_failure && self.journal.has_outstanding() {
                tracing::warn!("Migration failed, rolling back created resources...");
                let summary = self.journal.rollback(self.source, self.destination).await;
                tracing::info!(
                    "Rollback finished: {} removed, {} failed",
                    summary.released,
                    summary.failed
                );
            }
            self.journal.report_outstanding();
        }

        result
    }

    async fn execute(&mut self) -> Result<MigrationOutcome> {
        let source = self.source;
        let destination = self.destination;
        let instance = self.instance.clone();
        let snapshot = snapshot_name(&instance);

        tracing::info!(
            "Migrating DB instance '{}' from {} to {}",
            instance,
            source.region(),
            destination.region()
        );

        // Step 1: account identities
        tracing::info!("Step 1/5: Resolving account identities...");
        let source_identity = source
            .caller_identity()
            .await
            .context("Failed to resolve the source account identity")?;
        let destination_identity = destination
            .caller_identity()
            .await
            .context("Failed to resolve the destination account identity")?;
        tracing::info!(
            "Source account {} ({}), destination account {} ({})",
            source_identity.account_id,
            source.region(),
            destination_identity.account_id,
            destination.region()
        );

        // Step 2: snapshot
        tracing::info!(
            "Step 2/5: Creating snapshot '{}' of '{}'...",
            snapshot,
            instance
        );
        source
            .create_db_snapshot(&instance, &snapshot)
            .await
            .with_context(|| {
                format!(
                    "Failed to create snapshot '{}' of DB instance '{}'",
                    snapshot, instance
                )
            })?;
        self.journal.record(
            Resource::SourceSnapshot {
                snapshot: snapshot.clone(),
            },
            source.region(),
        );

        tracing::info!("Waiting for snapshot '{}' to complete...", snapshot);
        let snapshot_id: &str = &snapshot;
        wait_for_status(
            &format!("snapshot '{}'", snapshot),
            AVAILABLE,
            &self.options.snapshot_wait,
            move || source.db_snapshot_status(snapshot_id),
        )
        .await
        .with_context(|| format!("Snapshot '{}' did not complete", snapshot))?;

        // Step 3: share with the destination account
        tracing::info!(
            "Step 3/5: Sharing snapshot '{}' with account {}...",
            snapshot,
            destination_identity.account_id
        );
        source
            .share_db_snapshot(&snapshot, &destination_identity.account_id)
            .await
            .with_context(|| {
                format!(
                    "Failed to share snapshot '{}' with account {}",
                    snapshot, destination_identity.account_id
                )
            })?;
        self.journal.record(
            Resource::SnapshotShare {
                snapshot: snapshot.clone(),
                account_id: destination_identity.account_id.clone(),
            },
            source.region(),
        );

        // Step 4: restore in the destination account
        let snapshot_arn = db_snapshot_arn(
            &source_identity.partition,
            source.region(),
            &source_identity.account_id,
            &snapshot,
        );
        tracing::info!(
            "Step 4/5: Restoring '{}' in {} from {}...",
            instance,
            destination.region(),
            snapshot_arn
        );
        destination
            .restore_db_instance_from_snapshot(&instance, &snapshot_arn)
            .await
            .with_context(|| {
                format!(
                    "Failed to restore DB instance '{}' from {}",
                    instance, snapshot_arn
                )
            })?;
        self.journal.record(
            Resource::DestinationInstance {
                instance: instance.clone(),
            },
            destination.region(),
        );

        tracing::info!("Waiting for DB instance '{}' to become available...", instance);
        let instance_id: &str = &instance;
        wait_for_status(
            &format!("DB instance '{}'", instance),
            AVAILABLE,
            &self.options.restore_wait,
            move || destination.db_instance_status(instance_id),
        )
        .await
        .with_context(|| format!("Restored DB instance '{}' did not become available", instance))?;
        self.journal.deliver(&Resource::DestinationInstance {
            instance: instance.clone(),
        });

        // Step 5: remove the temporary snapshot
        tracing::info!("Step 5/5: Deleting snapshot '{}'...", snapshot);
        source
            .delete_db_snapshot(&snapshot)
            .await
            .with_context(|| format!("Failed to delete snapshot '{}'", snapshot))?;
        self.journal.release(&Resource::SourceSnapshot {
            snapshot: snapshot.clone(),
        });

        tracing::info!("✓ Migration of '{}' completed", instance);

        Ok(MigrationOutcome {
            instance,
            source: source_identity,
            destination: destination_identity,
            snapshot,
            snapshot_arn,
        })
    }
}
