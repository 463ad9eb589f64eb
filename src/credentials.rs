// ABOUTME: Static AWS credential sets passed on the command line
// ABOUTME: Parses ACCESS_KEY_ID:SECRET_ACCESS_KEY:REGION_NAME triples

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Expected shape of a credential argument, used in help and error text.
pub const CREDENTIALS_FORMAT: &str = "<AWS_ACCESS_KEY_ID>:<AWS_SECRET_ACCESS_KEY>:<REGION_NAME>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("expected 3 colon-separated fields ({CREDENTIALS_FORMAT}), got {0}")]
    FieldCount(usize),
    #[error("the {0} field is empty")]
    EmptyField(&'static str),
}

/// Access key, secret key and region for one AWS account.
///
/// The secret key is never printed: `Debug` redacts it so credential sets can
/// be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl CredentialSet {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let set = Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        };
        if set.access_key_id.is_empty() {
            return Err(CredentialsError::EmptyField("access key id"));
        }
        if set.secret_access_key.is_empty() {
            return Err(CredentialsError::EmptyField("secret access key"));
        }
        if set.region.is_empty() {
            return Err(CredentialsError::EmptyField("region"));
        }
        Ok(set)
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl FromStr for CredentialSet {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(':').collect();
        match fields.as_slice() {
            [access_key_id, secret_access_key, region] => {
                Self::new(*access_key_id, *secret_access_key, *region)
            }
            other => Err(CredentialsError::FieldCount(other.len())),
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}
