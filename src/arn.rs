// ABOUTME: Amazon Resource Name helpers
// ABOUTME: Extracts account identity from caller ARNs and builds snapshot ARNs

use anyhow::{bail, Result};

/// Account a session is authenticated as, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub partition: String,
    pub account_id: String,
    pub arn: String,
}

impl AccountIdentity {
    /// Parse the partition and account id out of a caller ARN
    ///
    /// Accepts any ARN of the form `arn:<partition>:<service>:<region>:<account>:<resource>`,
    /// e.g. `arn:aws:iam::123456789012:user/ops` or
    /// `arn:aws:sts::123456789012:assumed-role/admin/session`.
    pub fn from_arn(arn: &str) -> Result<Self> {
        let fields: Vec<&str> = arn.splitn(6, ':').collect();
        if fields.len() != 6 || fields[0] != "arn" {
            bail!("'{}' is not a valid ARN", arn);
        }

        let partition = fields[1];
        let account_id = fields[4];
        if partition.is_empty() {
            bail!("ARN '{}' has no partition", arn);
        }
        if account_id.is_empty() || !account_id.chars().all(|c| c.is_ascii_digit()) {
            bail!("ARN '{}' does not carry a numeric account id", arn);
        }

        Ok(Self {
            partition: partition.to_string(),
            account_id: account_id.to_string(),
            arn: arn.to_string(),
        })
    }
}

/// ARN other accounts use to reference a manual DB snapshot
pub fn db_snapshot_arn(partition: &str, region: &str, account_id: &str, snapshot: &str) -> String {
    format!(
        "arn:{}:rds:{}:{}:snapshot:{}",
        partition, region, account_id, snapshot
    )
}
