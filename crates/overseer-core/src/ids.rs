use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a submitted task.
///
/// Callers may supply their own id; otherwise [`TaskId::generate`] produces
/// `task_<32 hex>` from a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a fresh, process-unique task id.
    pub fn generate() -> Self {
        Self(format!("task_{}", Uuid::new_v4().simple()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a registered agent: `<name>_<8 hex>` unless chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Derive a new id from the agent's human-readable name.
    pub fn for_name(name: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{name}_{}", &suffix[..8]))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_task_ids_are_unique() {
        let ids: HashSet<TaskId> = (0..1000).map(|_| TaskId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with("task_")));
    }

    #[test]
    fn test_agent_id_uses_name_prefix() {
        let id = AgentId::for_name("coder");
        assert!(id.as_str().starts_with("coder_"));
        assert_eq!(id.as_str().len(), "coder_".len() + 8);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = TaskId::from("task_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"task_1\"");
        let parsed: AgentId = serde_json::from_str("\"tester_0001\"").unwrap();
        assert_eq!(parsed.to_string(), "tester_0001");
    }
}
