// ABOUTME: CLI entry point for rds-copy
// ABOUTME: Parses credentials, builds AWS sessions and runs the migration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rds_copy::credentials::CREDENTIALS_FORMAT;
use rds_copy::{AwsSession, CredentialSet, Migration, MigrationOptions, WaitConfig};

#[derive(Parser)]
#[command(name = "rds-copy")]
#[command(
    about = "Copy an RDS DB instance to another AWS account/region via a shared snapshot",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Source account credentials: "<AWS_ACCESS_KEY_ID>:<AWS_SECRET_ACCESS_KEY>:<REGION_NAME>"
    source_credentials: String,
    /// Destination account credentials: "<AWS_ACCESS_KEY_ID>:<AWS_SECRET_ACCESS_KEY>:<REGION_NAME>"
    destination_credentials: String,
    /// DB instance name on the source account (reused on the destination)
    instance_name: String,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Seconds to wait for the snapshot to complete
    #[arg(long, env = "RDS_COPY_SNAPSHOT_TIMEOUT", default_value_t = 3600)]
    snapshot_timeout: u64,
    /// Seconds to wait for the restored instance to become available
    #[arg(long, env = "RDS_COPY_RESTORE_TIMEOUT", default_value_t = 5400)]
    restore_timeout: u64,
    /// Initial delay in seconds between status polls (doubles after each poll)
    #[arg(long, env = "RDS_COPY_POLL_INTERVAL", default_value_t = 15)]
    poll_interval: u64,
    /// Upper bound in seconds for the delay between status polls
    #[arg(long, env = "RDS_COPY_MAX_POLL_INTERVAL", default_value_t = 60)]
    max_poll_interval: u64,
    /// Delete the snapshot, share and restored instance if any step fails
    #[arg(long)]
    rollback_on_failure: bool,
    /// Only run read-only pre-flight checks, create nothing
    #[arg(long)]
    dry_run: bool,
    /// Write a JSON record of created resources to this file when the run ends
    #[arg(long)]
    journal_file: Option<PathBuf>,
}

impl Cli {
    fn migration_options(&self) -> anyhow::Result<MigrationOptions> {
        let poll = Duration::from_secs(self.poll_interval);
        let max_poll = Duration::from_secs(self.max_poll_interval);
        Ok(MigrationOptions {
            snapshot_wait: WaitConfig::new(
                Duration::from_secs(self.snapshot_timeout),
                poll,
                max_poll,
            )
            .context("Invalid snapshot wait settings")?,
            restore_wait: WaitConfig::new(
                Duration::from_secs(self.restore_timeout),
                poll,
                max_poll,
            )
            .context("Invalid restore wait settings")?,
            rollback_on_failure: self.rollback_on_failure,
        })
    }
}

fn parse_credentials(value: &str, which: &str) -> anyhow::Result<CredentialSet> {
    value.parse().with_context(|| {
        format!(
            "Invalid {} credentials, expected \"{}\"",
            which, CREDENTIALS_FORMAT
        )
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let source_credentials = parse_credentials(&cli.source_credentials, "source")?;
    let destination_credentials = parse_credentials(&cli.destination_credentials, "destination")?;
    let options = cli.migration_options()?;

    tracing::debug!("Source: {:?}", source_credentials);
    tracing::debug!("Destination: {:?}", destination_credentials);

    let source = AwsSession::connect(&source_credentials).await;
    let destination = AwsSession::connect(&destination_credentials).await;

    if cli.dry_run {
        let result =
            rds_copy::preflight::run_preflight(&source, &destination, &cli.instance_name).await;
        result.print();
        if !result.all_passed() {
            anyhow::bail!("Pre-flight checks failed");
        }
        return Ok(());
    }

    let mut migration = Migration::new(&source, &destination, cli.instance_name.clone(), options)?;
    let result = migration.run().await;

    if let Some(path) = &cli.journal_file {
        match migration.journal().save(path) {
            Ok(()) => tracing::info!("Journal written to {}", path.display()),
            Err(e) => tracing::warn!("Failed to write journal: {:#}", e),
        }
    }

    let outcome = result?;
    println!(
        "Completed! '{}' restored in account {} ({}) from {}",
        outcome.instance,
        outcome.destination.account_id,
        destination_credentials.region(),
        outcome.snapshot_arn
    );
    Ok(())
}
