use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Arbitrary key/value pairs stored alongside a lock.
pub type Metadata = BTreeMap<String, String>;

/// Snapshot of a resource as seen by one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceLockInfo {
    /// Nonce of the current owner.
    pub nonce: String,
    /// Metadata written at acquisition time.
    #[serde(default)]
    pub metadata: Metadata,
    /// Remaining time to live, if the backend reports one.
    #[serde(default)]
    pub ttl: Option<Duration>,
}

impl InstanceLockInfo {
    pub fn new(nonce: impl Into<String>, metadata: Metadata, ttl: Option<Duration>) -> Self {
        Self {
            nonce: nonce.into(),
            metadata,
            ttl,
        }
    }

    pub fn is_owned_by(&self, nonce: &str) -> bool {
        self.nonce == nonce
    }
}
