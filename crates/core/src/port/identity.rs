// Instance Identity
// Distinguishes this process from the rest of the fleet in lock ownership.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdentity {
    pub host: String,
    pub addr: String,
}

impl InstanceIdentity {
    pub fn new(host: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            addr: addr.into(),
        }
    }

    /// Value written into cycle locks, e.g. "node-a@10.0.0.7:9527"
    pub fn owner_id(&self) -> String {
        format!("{}@{}", self.host, self.addr)
    }
}

impl std::fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.owner_id())
    }
}
