// ABOUTME: Record of every remote resource a migration run creates
// ABOUTME: Reports leftovers after a failure, optionally rolls them back, persists as JSON

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::ControlPlane;

/// A resource the run created, and where it lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// Manual snapshot in the source account
    SourceSnapshot { snapshot: String },
    /// Restore permission on the source snapshot granted to the destination account
    SnapshotShare {
        snapshot: String,
        account_id: String,
    },
    /// Instance restored in the destination account
    DestinationInstance { instance: String },
}

impl Resource {
    pub fn describe(&self) -> String {
        match self {
            Resource::SourceSnapshot { snapshot } => format!("source snapshot '{}'", snapshot),
            Resource::SnapshotShare {
                snapshot,
                account_id,
            } => format!(
                "restore permission on '{}' for account {}",
                snapshot, account_id
            ),
            Resource::DestinationInstance { instance } => {
                format!("destination instance '{}'", instance)
            }
        }
    }

    /// AWS CLI invocation that removes this resource by hand
    pub fn cleanup_command(&self, region: &str) -> String {
        match self {
            Resource::SourceSnapshot { snapshot } => format!(
                "aws rds delete-db-snapshot --region {} --db-snapshot-identifier {}",
                region, snapshot
            ),
            Resource::SnapshotShare {
                snapshot,
                account_id,
            } => format!(
                "aws rds modify-db-snapshot-attribute --region {} --db-snapshot-identifier {} --attribute-name restore --values-to-remove {}",
                region, snapshot, account_id
            ),
            Resource::DestinationInstance { instance } => format!(
                "aws rds delete-db-instance --region {} --db-instance-identifier {} --skip-final-snapshot",
                region, instance
            ),
        }
    }

    fn in_destination(&self) -> bool {
        matches!(self, Resource::DestinationInstance { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(flatten)]
    pub resource: Resource,
    pub region: String,
    pub created_at: DateTime<Utc>,
    /// Set once the resource has been removed, either by the final cleanup step or by rollback
    pub released: bool,
    /// Set once the resource is part of the migration result and must be kept
    #[serde(default)]
    pub delivered: bool,
}

/// Outcome of a best-effort rollback
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollbackSummary {
    pub released: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub instance: String,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<JournalEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Journal {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            started_at: Utc::now(),
            entries: Vec::new(),
            error: None,
        }
    }

    pub fn record(&mut self, resource: Resource, region: impl Into<String>) {
        tracing::debug!("Journal: created {}", resource.describe());
        self.entries.push(JournalEntry {
            resource,
            region: region.into(),
            created_at: Utc::now(),
            released: false,
            delivered: false,
        });
    }

    /// Mark a resource as the run's deliverable, taking it out of cleanup and rollback
    pub fn deliver(&mut self, resource: &Resource) {
        tracing::debug!("Journal: delivered {}", resource.describe());
        for entry in &mut self.entries {
            if &entry.resource == resource {
                entry.delivered = true;
            }
        }
    }

    /// Mark a resource as removed
    ///
    /// Releasing a snapshot also releases any share recorded on it, since the
    /// grant disappears with the snapshot.
    pub fn release(&mut self, resource: &Resource) {
        let snapshot_gone = match resource {
            Resource::SourceSnapshot { snapshot } => Some(snapshot.clone()),
            _ => None,
        };
        for entry in &mut self.entries {
            let shares_released_snapshot = matches!(
                (&entry.resource, &snapshot_gone),
                (Resource::SnapshotShare { snapshot, .. }, Some(gone)) if snapshot == gone
            );
            if &entry.resource == resource || shares_released_snapshot {
                entry.released = true;
            }
        }
    }

    pub fn set_error(&mut self, error: &anyhow::Error) {
        self.error = Some(format!("{:#}", error));
    }

    /// Resources still present and not delivered, oldest first
    pub fn outstanding(&self) -> impl DoubleEndedIterator<Item = &JournalEntry> {
        self.entries.iter().filter(|e| !e.released && !e.delivered)
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding().next().is_some()
    }

    /// Log every resource left behind, with the command that removes it
    pub fn report_outstanding(&self) {
        if !self.has_outstanding() {
            return;
        }
        tracing::warn!("The migration of '{}' left these resources behind:", self.instance);
        for entry in self.outstanding() {
            tracing::warn!("  - {} in {}", entry.resource.describe(), entry.region);
            tracing::warn!("      {}", entry.resource.cleanup_command(&entry.region));
        }
        tracing::warn!(
            "Snapshots and instances keep accruing charges until they are deleted."
        );
    }

    /// Remove outstanding resources in reverse creation order
    ///
    /// Every step is attempted even if an earlier one fails; failures are
    /// logged and counted, never returned.
    pub async fn rollback<S, D>(&mut self, source: &S, destination: &D) -> RollbackSummary
    where
        S: ControlPlane + ?Sized,
        D: ControlPlane + ?Sized,
    {
        let mut summary = RollbackSummary::default();
        let pending: Vec<Resource> = self
            .outstanding()
            .map(|e| e.resource.clone())
            .rev()
            .collect();

        for resource in pending {
            tracing::info!("Rolling back {}...", resource.describe());
            let result = match &resource {
                Resource::DestinationInstance { instance } => {
                    destination.delete_db_instance(instance).await
                }
                Resource::SnapshotShare {
                    snapshot,
                    account_id,
                } => source.unshare_db_snapshot(snapshot, account_id).await,
                Resource::SourceSnapshot { snapshot } => source.delete_db_snapshot(snapshot).await,
            };

            match result {
                Ok(()) => {
                    summary.released += 1;
                    self.release(&resource);
                }
                Err(e) => {
                    summary.failed += 1;
                    let side = if resource.in_destination() {
                        "destination"
                    } else {
                        "source"
                    };
                    tracing::warn!(
                        "Failed to roll back {} in the {} account: {}",
                        resource.describe(),
                        side,
                        e
                    );
                }
            }
        }

        summary
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create journal file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write journal file {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open journal file {}", path.display()))?;
        let journal = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse journal file {}", path.display()))?;
        Ok(journal)
    }
}
