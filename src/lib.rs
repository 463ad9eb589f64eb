// ABOUTME: Library root for rds-copy
// ABOUTME: Copies an RDS instance across accounts through a shared snapshot

pub mod arn;
pub mod aws;
pub mod credentials;
pub mod journal;
pub mod migration;
pub mod preflight;
pub mod provider;
pub mod waiter;

pub use arn::AccountIdentity;
pub use aws::AwsSession;
pub use credentials::CredentialSet;
pub use journal::{Journal, Resource};
pub use migration::{snapshot_name, Migration, MigrationOptions, MigrationOutcome};
pub use provider::{ControlPlane, ErrorKind, ProviderError, ProviderResult};
pub use waiter::WaitConfig;
