// Mutex Record - shared-store snapshot of a cluster-exclusive task

use serde::{Deserialize, Serialize};

/// Key under which a task's mutex record is stored
pub fn record_key(task_id: &str) -> String {
    format!("cadence:mutex:{}", task_id)
}

/// Key that claims one cycle of a task
pub fn cycle_lock_key(task_id: &str, next_start: i64) -> String {
    format!("cadence:lock:{}:{}", task_id, next_start)
}

/// Persisted once per cluster-exclusive task, written only by the instance
/// holding the current cycle's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutexRecord {
    pub owner_host: String,
    pub owner_addr: String,
    pub task_id: String,
    pub schedule_expr: String,
    pub last_start: i64,
    pub running: bool,
    pub last_cost_ms: Option<i64>,
    pub next_start: i64,
}

impl MutexRecord {
    /// Owner identity in the same format as `InstanceIdentity::owner_id`
    pub fn owner_id(&self) -> String {
        format!("{}@{}", self.owner_host, self.owner_addr)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MutexRecord {
        MutexRecord {
            owner_host: "node-a".to_string(),
            owner_addr: "10.0.0.7".to_string(),
            task_id: "billing.settle".to_string(),
            schedule_expr: "0 */5 * * * *".to_string(),
            last_start: 1_700_000_000_000,
            running: true,
            last_cost_ms: None,
            next_start: 1_700_000_300_000,
        }
    }

    #[test]
    fn test_owner_id_format() {
        assert_eq!(record().owner_id(), "node-a@10.0.0.7");
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = record().to_json().unwrap();
        assert!(json.contains("\"ownerHost\":\"node-a\""));
        assert!(json.contains("\"scheduleExpr\""));
        assert_eq!(MutexRecord::from_json(&json).unwrap(), record());
    }

    #[test]
    fn test_keys() {
        assert_eq!(record_key("a.b"), "cadence:mutex:a.b");
        assert_eq!(cycle_lock_key("a.b", 42), "cadence:lock:a.b:42");
    }
}
