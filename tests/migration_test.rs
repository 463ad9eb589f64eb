// ABOUTME: Orchestration tests for the cross-account migration
// ABOUTME: Drives Migration against in-memory control planes that record every call

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rds_copy::{
    AccountIdentity, ControlPlane, ErrorKind, Migration, MigrationOptions, ProviderError,
    ProviderResult, WaitConfig,
};
use tempfile::tempdir;

const SOURCE_ACCOUNT: &str = "111122223333";
const DESTINATION_ACCOUNT: &str = "444455556666";

type CallLog = Arc<Mutex<Vec<String>>>;

/// Control plane for one account that keeps its resources in memory
struct FakePlane {
    side: &'static str,
    region: String,
    account_id: &'static str,
    log: CallLog,
    failures: HashMap<&'static str, ErrorKind>,
    snapshot_status: String,
    instance_status: String,
    snapshots: Mutex<HashSet<String>>,
    instances: Mutex<HashSet<String>>,
    shares: Mutex<HashSet<(String, String)>>,
}

impl FakePlane {
    fn new(side: &'static str, region: &str, account_id: &'static str, log: CallLog) -> Self {
        Self {
            side,
            region: region.to_string(),
            account_id,
            log,
            failures: HashMap::new(),
            snapshot_status: "available".to_string(),
            instance_status: "available".to_string(),
            snapshots: Mutex::new(HashSet::new()),
            instances: Mutex::new(HashSet::new()),
            shares: Mutex::new(HashSet::new()),
        }
    }

    fn with_instance(self, name: &str) -> Self {
        self.instances.lock().unwrap().insert(name.to_string());
        self
    }

    fn failing(mut self, operation: &'static str, kind: ErrorKind) -> Self {
        self.failures.insert(operation, kind);
        self
    }

    fn with_snapshot_status(mut self, status: &str) -> Self {
        self.snapshot_status = status.to_string();
        self
    }

    fn with_instance_status(mut self, status: &str) -> Self {
        self.instance_status = status.to_string();
        self
    }

    fn call(&self, operation: &'static str, args: &[&str]) -> ProviderResult<()> {
        let mut entry = format!("{}:{}", self.side, operation);
        if !args.is_empty() {
            entry.push(' ');
            entry.push_str(&args.join(" "));
        }
        self.log.lock().unwrap().push(entry);

        match self.failures.get(operation) {
            Some(kind) => Err(ProviderError::new(operation, *kind, "injected failure")),
            None => Ok(()),
        }
    }

    fn has_snapshot(&self, name: &str) -> bool {
        self.snapshots.lock().unwrap().contains(name)
    }

    fn has_instance(&self, name: &str) -> bool {
        self.instances.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl ControlPlane for FakePlane {
    fn region(&self) -> &str {
        &self.region
    }

    async fn caller_identity(&self) -> ProviderResult<AccountIdentity> {
        self.call("caller_identity", &[])?;
        Ok(AccountIdentity::from_arn(&format!("arn:aws:iam::{}:user/ops", self.account_id)).unwrap())
    }

    async fn create_db_snapshot(&self, instance: &str, snapshot: &str) -> ProviderResult<()> {
        self.call("create_db_snapshot", &[instance, snapshot])?;
        if !self.has_instance(instance) {
            return Err(ProviderError::new(
                "create_db_snapshot",
                ErrorKind::NotFound,
                format!("DBInstance {} not found", instance),
            ));
        }
        if !self.snapshots.lock().unwrap().insert(snapshot.to_string()) {
            return Err(ProviderError::new(
                "create_db_snapshot",
                ErrorKind::Conflict,
                format!("snapshot {} already exists", snapshot),
            ));
        }
        Ok(())
    }

    async fn db_snapshot_status(&self, snapshot: &str) -> ProviderResult<Option<String>> {
        self.call("db_snapshot_status", &[snapshot])?;
        Ok(self
            .has_snapshot(snapshot)
            .then(|| self.snapshot_status.clone()))
    }

    async fn share_db_snapshot(&self, snapshot: &str, account_id: &str) -> ProviderResult<()> {
        self.call("share_db_snapshot", &[snapshot, account_id])?;
        self.shares
            .lock()
            .unwrap()
            .insert((snapshot.to_string(), account_id.to_string()));
        Ok(())
    }

    async fn unshare_db_snapshot(&self, snapshot: &str, account_id: &str) -> ProviderResult<()> {
        self.call("unshare_db_snapshot", &[snapshot, account_id])?;
        self.shares
            .lock()
            .unwrap()
            .remove(&(snapshot.to_string(), account_id.to_string()));
        Ok(())
    }

    async fn restore_db_instance_from_snapshot(
        &self,
        instance: &str,
        snapshot_arn: &str,
    ) -> ProviderResult<()> {
        self.call("restore_db_instance_from_snapshot", &[instance, snapshot_arn])?;
        if !self.instances.lock().unwrap().insert(instance.to_string()) {
            return Err(ProviderError::new(
                "restore_db_instance_from_snapshot",
                ErrorKind::Conflict,
                format!("DBInstance {} already exists", instance),
            ));
        }
        Ok(())
    }

    async fn db_instance_status(&self, instance: &str) -> ProviderResult<Option<String>> {
        self.call("db_instance_status", &[instance])?;
        Ok(self
            .has_instance(instance)
            .then(|| self.instance_status.clone()))
    }

    async fn delete_db_snapshot(&self, snapshot: &str) -> ProviderResult<()> {
        self.call("delete_db_snapshot", &[snapshot])?;
        self.snapshots.lock().unwrap().remove(snapshot);
        Ok(())
    }

    async fn delete_db_instance(&self, instance: &str) -> ProviderResult<()> {
        self.call("delete_db_instance", &[instance])?;
        self.instances.lock().unwrap().remove(instance);
        Ok(())
    }
}

fn planes() -> (FakePlane, FakePlane, CallLog) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let source =
        FakePlane::new("source", "us-east-1", SOURCE_ACCOUNT, log.clone()).with_instance("orders-db");
    let destination = FakePlane::new("destination", "us-west-2", DESTINATION_ACCOUNT, log.clone());
    (source, destination, log)
}

fn options() -> MigrationOptions {
    let wait = WaitConfig::new(
        Duration::from_secs(300),
        Duration::from_secs(10),
        Duration::from_secs(60),
    )
    .unwrap();
    MigrationOptions {
        snapshot_wait: wait,
        restore_wait: wait,
        rollback_on_failure: false,
    }
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn called(log: &CallLog, prefix: &str) -> bool {
    log.lock().unwrap().iter().any(|c| c.starts_with(prefix))
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_migration_order() {
    let (source, destination, log) = planes();

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    let outcome = migration.run().await.unwrap();

    let expected_arn = format!(
        "arn:aws:rds:us-east-1:{}:snapshot:orders-db-snapshot",
        SOURCE_ACCOUNT
    );
    assert_eq!(outcome.snapshot, "orders-db-snapshot");
    assert_eq!(outcome.snapshot_arn, expected_arn);
    assert_eq!(outcome.source.account_id, SOURCE_ACCOUNT);
    assert_eq!(outcome.destination.account_id, DESTINATION_ACCOUNT);

    assert_eq!(
        calls(&log),
        vec![
            "source:caller_identity".to_string(),
            "destination:caller_identity".to_string(),
            "source:create_db_snapshot orders-db orders-db-snapshot".to_string(),
            "source:db_snapshot_status orders-db-snapshot".to_string(),
            format!("source:share_db_snapshot orders-db-snapshot {}", DESTINATION_ACCOUNT),
            format!(
                "destination:restore_db_instance_from_snapshot orders-db {}",
                expected_arn
            ),
            "destination:db_instance_status orders-db".to_string(),
            "source:delete_db_snapshot orders-db-snapshot".to_string(),
        ]
    );

    assert!(destination.has_instance("orders-db"));
    assert!(!source.has_snapshot("orders-db-snapshot"));
    assert!(!migration.journal().has_outstanding());
}

#[tokio::test(start_paused = true)]
async fn test_source_identity_failure_creates_nothing() {
    let (source, destination, log) = planes();
    let source = source.failing("caller_identity", ErrorKind::Authentication);

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    let err = migration.run().await.unwrap_err();

    assert!(format!("{:#}", err).contains("source account identity"));
    assert_eq!(calls(&log), vec!["source:caller_identity".to_string()]);
    assert!(migration.journal().entries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_destination_identity_failure_creates_nothing() {
    let (source, destination, log) = planes();
    let destination = destination.failing("caller_identity", ErrorKind::Authentication);

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    let err = migration.run().await.unwrap_err();

    assert!(format!("{:#}", err).contains("destination account identity"));
    assert!(!called(&log, "source:create_db_snapshot"));
    assert!(!called(&log, "destination:restore_db_instance_from_snapshot"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_source_instance_stops_before_restore() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let source = FakePlane::new("source", "us-east-1", SOURCE_ACCOUNT, log.clone());
    let destination = FakePlane::new("destination", "us-west-2", DESTINATION_ACCOUNT, log.clone());

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    let err = migration.run().await.unwrap_err();

    let provider = err.downcast_ref::<ProviderError>().unwrap();
    assert_eq!(provider.kind, ErrorKind::NotFound);
    assert!(!called(&log, "destination:restore_db_instance_from_snapshot"));
    assert!(!migration.journal().has_outstanding());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_name_conflict_is_reported_and_not_recorded() {
    let (source, destination, log) = planes();
    source
        .snapshots
        .lock()
        .unwrap()
        .insert("orders-db-snapshot".to_string());

    let options = MigrationOptions {
        rollback_on_failure: true,
        ..options()
    };
    let mut migration = Migration::new(&source, &destination, "orders-db", options).unwrap();
    let err = migration.run().await.unwrap_err();

    let provider = err.downcast_ref::<ProviderError>().unwrap();
    assert_eq!(provider.kind, ErrorKind::Conflict);
    // the pre-existing snapshot is not ours and must survive rollback
    assert!(source.has_snapshot("orders-db-snapshot"));
    assert!(!called(&log, "source:delete_db_snapshot"));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_timeout_never_contacts_destination_restore() {
    let (source, destination, log) = planes();
    let source = source.with_snapshot_status("creating");

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    let err = migration.run().await.unwrap_err();

    assert!(format!("{:#}", err).contains("timed out"));
    assert!(!called(&log, "source:share_db_snapshot"));
    assert!(!called(&log, "destination:restore_db_instance_from_snapshot"));
    assert!(source.has_snapshot("orders-db-snapshot"));
}

#[tokio::test(start_paused = true)]
async fn test_share_failure_leaves_snapshot_and_skips_restore() {
    let (source, destination, log) = planes();
    let source = source.failing("share_db_snapshot", ErrorKind::Authentication);

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    assert!(migration.run().await.is_err());

    assert!(source.has_snapshot("orders-db-snapshot"));
    assert!(!called(&log, "destination:restore_db_instance_from_snapshot"));
    assert!(!called(&log, "source:delete_db_snapshot"));

    let outstanding: Vec<_> = migration.journal().outstanding().collect();
    assert_eq!(outstanding.len(), 1);
    assert_eq!(outstanding[0].region, "us-east-1");
}

#[tokio::test(start_paused = true)]
async fn test_restore_failure_keeps_snapshot() {
    let (source, destination, log) = planes();
    let destination =
        destination.failing("restore_db_instance_from_snapshot", ErrorKind::Other);

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    assert!(migration.run().await.is_err());

    assert!(source.has_snapshot("orders-db-snapshot"));
    assert!(!called(&log, "source:delete_db_snapshot"));
}

#[tokio::test(start_paused = true)]
async fn test_restore_timeout_keeps_snapshot() {
    let (source, destination, log) = planes();
    let destination = destination.with_instance_status("creating");

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    let err = migration.run().await.unwrap_err();

    assert!(format!("{:#}", err).contains("did not become available"));
    assert!(source.has_snapshot("orders-db-snapshot"));
    assert!(!called(&log, "source:delete_db_snapshot"));
    assert_eq!(migration.journal().outstanding().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_on_failure_removes_resources_in_reverse_order() {
    let (source, destination, log) = planes();
    let destination = destination.with_instance_status("incompatible-parameters");

    let options = MigrationOptions {
        rollback_on_failure: true,
        ..options()
    };
    let mut migration = Migration::new(&source, &destination, "orders-db", options).unwrap();
    assert!(migration.run().await.is_err());

    let log = calls(&log);
    let tail: Vec<&str> = log.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            "destination:delete_db_instance orders-db",
            "source:unshare_db_snapshot orders-db-snapshot 444455556666",
            "source:delete_db_snapshot orders-db-snapshot",
        ]
    );
    assert!(!destination.has_instance("orders-db"));
    assert!(!source.has_snapshot("orders-db-snapshot"));
    assert!(!migration.journal().has_outstanding());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_cleanup_failure_keeps_restored_instance() {
    let (source, destination, log) = planes();
    let source = source.failing("delete_db_snapshot", ErrorKind::Throttled);

    let options = MigrationOptions {
        rollback_on_failure: true,
        ..options()
    };
    let mut migration = Migration::new(&source, &destination, "orders-db", options).unwrap();
    let err = migration.run().await.unwrap_err();

    assert!(format!("{:#}", err).contains("Failed to delete snapshot"));
    // the restored instance is the result of the run and survives rollback
    assert!(destination.has_instance("orders-db"));
    assert!(!called(&log, "destination:delete_db_instance"));

    let journal = migration.journal();
    let instance = journal
        .entries
        .iter()
        .find(|e| matches!(e.resource, rds_copy::Resource::DestinationInstance { .. }))
        .unwrap();
    assert!(instance.delivered);
    assert!(journal
        .outstanding()
        .all(|e| !matches!(e.resource, rds_copy::Resource::DestinationInstance { .. })));
    // snapshot deletion is still failing, so it stays reported
    assert!(source.has_snapshot("orders-db-snapshot"));
    assert!(journal.has_outstanding());
}

#[tokio::test(start_paused = true)]
async fn test_rollback_continues_past_failures() {
    let (source, destination, log) = planes();
    let destination = destination
        .with_instance_status("failed")
        .failing("delete_db_instance", ErrorKind::Other);

    let options = MigrationOptions {
        rollback_on_failure: true,
        ..options()
    };
    let mut migration = Migration::new(&source, &destination, "orders-db", options).unwrap();
    let err = migration.run().await.unwrap_err();

    // the step failure surfaces, not the rollback failure
    assert!(format!("{:#}", err).contains("did not become available"));
    assert!(called(&log, "source:unshare_db_snapshot"));
    assert!(!source.has_snapshot("orders-db-snapshot"));

    let outstanding: Vec<_> = migration.journal().outstanding().collect();
    assert_eq!(outstanding.len(), 1);
    assert_eq!(outstanding[0].region, "us-west-2");
}

#[tokio::test(start_paused = true)]
async fn test_journal_file_records_failure() {
    let (source, destination, _log) = planes();
    let source = source.failing("share_db_snapshot", ErrorKind::Authentication);

    let mut migration = Migration::new(&source, &destination, "orders-db", options()).unwrap();
    assert!(migration.run().await.is_err());

    let dir = tempdir().unwrap();
    let path = dir.path().join("journal.json");
    migration.journal().save(&path).unwrap();

    let loaded = rds_copy::Journal::load(&path).unwrap();
    assert_eq!(loaded.instance, "orders-db");
    assert_eq!(loaded.entries.len(), 1);
    assert!(!loaded.entries[0].released);
    assert!(loaded.error.unwrap().contains("Failed to share snapshot"));
}

#[test]
fn test_empty_instance_name_rejected() {
    let (source, destination, _log) = planes();
    assert!(Migration::new(&source, &destination, "  ", options()).is_err());
}

#[tokio::test]
async fn test_preflight_passes_for_fresh_destination() {
    let (source, destination, log) = planes();

    let result = rds_copy::preflight::run_preflight(&source, &destination, "orders-db").await;

    assert!(result.all_passed());
    assert_eq!(result.identities.len(), 2);
    assert!(!called(&log, "source:create_db_snapshot"));
}

#[tokio::test]
async fn test_preflight_flags_taken_names() {
    let (source, destination, _log) = planes();
    source
        .snapshots
        .lock()
        .unwrap()
        .insert("orders-db-snapshot".to_string());
    let destination = destination
        .with_instance("orders-db")
        .failing("caller_identity", ErrorKind::Authentication);

    let result = rds_copy::preflight::run_preflight(&source, &destination, "orders-db").await;

    assert!(!result.all_passed());
    assert_eq!(result.failed_count(), 3);
    assert!(result.identities[0].passed);
    assert!(!result.identities[1].passed);
    assert!(result.destination.iter().all(|c| !c.passed));
}

#[tokio::test]
async fn test_preflight_warns_on_transitional_source_status() {
    let (source, destination, _log) = planes();
    let source = source.with_instance_status("storage-optimization");

    let result = rds_copy::preflight::run_preflight(&source, &destination, "orders-db").await;

    assert!(result.all_passed());
    let check = &result.source[0];
    assert!(check.passed);
    assert!(check.details.as_deref().unwrap().contains("storage-optimization"));
}

#[tokio::test]
async fn test_preflight_fails_on_terminal_source_status() {
    let (source, destination, _log) = planes();
    let source = source.with_instance_status("failed");

    let result = rds_copy::preflight::run_preflight(&source, &destination, "orders-db").await;

    assert!(!result.all_passed());
    assert_eq!(result.failed_count(), 1);
    assert!(!result.source[0].passed);
}
