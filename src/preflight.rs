// ABOUTME: Read-only checks run before a migration (--dry-run)
// ABOUTME: Verifies identities, the source instance and that target names are free

use crate::migration::snapshot_name;
use crate::provider::ControlPlane;
use crate::waiter::{AVAILABLE, TERMINAL_STATUSES};

/// Individual check result
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Issue with suggested fixes
#[derive(Debug, Clone)]
pub struct PreflightIssue {
    pub title: String,
    pub explanation: String,
    pub fixes: Vec<String>,
}

/// Complete pre-flight results
#[derive(Debug, Default)]
pub struct PreflightResult {
    pub identities: Vec<CheckResult>,
    pub source: Vec<CheckResult>,
    pub destination: Vec<CheckResult>,
    pub issues: Vec<PreflightIssue>,
}

impl PreflightResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.issues.len()
    }

    fn print_section(title: &str, checks: &[CheckResult]) {
        if checks.is_empty() {
            return;
        }
        println!("{}:", title);
        for check in checks {
            let icon = if check.passed { "✓" } else { "✗" };
            println!("  {} {}", icon, check.message);
            if let Some(ref details) = check.details {
                println!("      {}", details);
            }
        }
        println!();
    }

    /// Print formatted output
    pub fn print(&self) {
        println!();
        println!("Pre-flight Checks");
        println!("{}", "═".repeat(61));
        println!();

        Self::print_section("Account Identities", &self.identities);
        Self::print_section("Source Account", &self.source);
        Self::print_section("Destination Account", &self.destination);

        if self.issues.is_empty() {
            println!("{}", "═".repeat(61));
            println!("PASSED: Ready to migrate");
            return;
        }

        println!("{}", "═".repeat(61));
        println!("FAILED: {} issue(s) found", self.failed_count());
        println!();
        for (i, issue) in self.issues.iter().enumerate() {
            println!("Issue {}: {}", i + 1, issue.title);
            println!("  {}", issue.explanation);
            if !issue.fixes.is_empty() {
                println!();
                println!("  Fixes:");
                for fix in &issue.fixes {
                    println!("  • {}", fix);
                }
            }
            println!();
        }
    }
}

/// Run every check without creating or modifying anything
///
/// Provider failures are recorded as failed checks rather than returned, so
/// one unreachable account does not hide problems on the other side.
pub async fn run_preflight<S, D>(source: &S, destination: &D, instance: &str) -> PreflightResult
where
    S: ControlPlane,
    D: ControlPlane,
{
    let mut result = PreflightResult::new();
    let snapshot = snapshot_name(instance);

    for (side, plane) in [
        ("source", source as &dyn ControlPlane),
        ("destination", destination as &dyn ControlPlane),
    ] {
        match plane.caller_identity().await {
            Ok(identity) => result.identities.push(
                CheckResult::pass(
                    format!("{}_identity", side),
                    format!("{} credentials resolve to account {}", capitalize(side), identity.account_id),
                )
                .with_details(identity.arn),
            ),
            Err(e) => {
                result.identities.push(
                    CheckResult::fail(
                        format!("{}_identity", side),
                        format!("{} credentials could not be verified", capitalize(side)),
                    )
                    .with_details(e.to_string()),
                );
                result.issues.push(PreflightIssue {
                    title: format!("{} credentials rejected", capitalize(side)),
                    explanation: e.to_string(),
                    fixes: vec![
                        "Check the access key id and secret access key".to_string(),
                        format!("Confirm the keys are active in region {}", plane.region()),
                    ],
                });
            }
        }
    }

    match source.db_instance_status(instance).await {
        Ok(Some(status)) if status == AVAILABLE => result.source.push(CheckResult::pass(
            "source_instance",
            format!("DB instance '{}' is available in {}", instance, source.region()),
        )),
        Ok(Some(status)) if TERMINAL_STATUSES.contains(&status.as_str()) => {
            result.source.push(
                CheckResult::fail(
                    "source_instance",
                    format!("DB instance '{}' cannot be snapshotted", instance),
                )
                .with_details(format!("current status: {}", status)),
            );
            result.issues.push(PreflightIssue {
                title: "Source instance unusable".to_string(),
                explanation: format!(
                    "'{}' is in status '{}', from which no snapshot can be taken.",
                    instance, status
                ),
                fixes: vec!["Check the instance in the RDS console or pick another instance".to_string()],
            });
        }
        Ok(Some(status)) => {
            tracing::warn!(
                "Source instance '{}' is '{}', snapshot creation may be rejected until it is available",
                instance,
                status
            );
            result.source.push(
                CheckResult::pass(
                    "source_instance",
                    format!("DB instance '{}' exists in {}", instance, source.region()),
                )
                .with_details(format!(
                    "warning: status is '{}', not '{}'",
                    status, AVAILABLE
                )),
            );
        }
        Ok(None) => {
            result.source.push(CheckResult::fail(
                "source_instance",
                format!("DB instance '{}' not found in {}", instance, source.region()),
            ));
            result.issues.push(PreflightIssue {
                title: "Source instance missing".to_string(),
                explanation: format!(
                    "No DB instance named '{}' exists in the source account in {}.",
                    instance,
                    source.region()
                ),
                fixes: vec!["Check the instance identifier and the source region".to_string()],
            });
        }
        Err(e) => push_query_failure(&mut result, "source_instance", true, e.to_string()),
    }

    match source.db_snapshot_status(&snapshot).await {
        Ok(None) => result.source.push(CheckResult::pass(
            "snapshot_name",
            format!("Snapshot name '{}' is free", snapshot),
        )),
        Ok(Some(status)) => {
            result.source.push(
                CheckResult::fail(
                    "snapshot_name",
                    format!("Snapshot '{}' already exists", snapshot),
                )
                .with_details(format!("status: {}", status)),
            );
            result.issues.push(PreflightIssue {
                title: "Snapshot name in use".to_string(),
                explanation: format!(
                    "The migration creates '{}', which already exists (possibly left by an earlier failed run).",
                    snapshot
                ),
                fixes: vec![format!(
                    "aws rds delete-db-snapshot --region {} --db-snapshot-identifier {}",
                    source.region(),
                    snapshot
                )],
            });
        }
        Err(e) => push_query_failure(&mut result, "snapshot_name", true, e.to_string()),
    }

    match destination.db_instance_status(instance).await {
        Ok(None) => result.destination.push(CheckResult::pass(
            "destination_instance",
            format!(
                "DB instance name '{}' is free in {}",
                instance,
                destination.region()
            ),
        )),
        Ok(Some(status)) => {
            result.destination.push(
                CheckResult::fail(
                    "destination_instance",
                    format!("DB instance '{}' already exists in the destination", instance),
                )
                .with_details(format!("status: {}", status)),
            );
            result.issues.push(PreflightIssue {
                title: "Destination instance name in use".to_string(),
                explanation: format!(
                    "The restore reuses the name '{}', which is already taken in {}.",
                    instance,
                    destination.region()
                ),
                fixes: vec!["Rename or delete the existing destination instance".to_string()],
            });
        }
        Err(e) => push_query_failure(&mut result, "destination_instance", false, e.to_string()),
    }

    result
}

fn push_query_failure(result: &mut PreflightResult, name: &str, source_side: bool, error: String) {
    let check = CheckResult::fail(name, format!("Could not run check '{}'", name)).with_details(error.clone());
    if source_side {
        result.source.push(check);
    } else {
        result.destination.push(check);
    }
    result.issues.push(PreflightIssue {
        title: format!("Check '{}' failed", name),
        explanation: error,
        fixes: vec!["Grant rds:Describe* permissions to the credentials in use".to_string()],
    });
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
