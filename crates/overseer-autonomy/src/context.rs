use serde::{Deserialize, Serialize};

/// Path fragments that always need a human when written or deleted.
pub const PROTECTED_PATH_PATTERNS: [&str; 5] = [".git/", "config/", ".env", "secrets", "credentials"];

/// Facts about one concrete operation that can tighten an approval decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Target path for file operations.
    #[serde(default)]
    pub path: Option<String>,
    /// Demand approval regardless of policy.
    #[serde(default)]
    pub force_approval: bool,
}

impl OperationContext {
    /// An empty context: no path, no forced approval.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Demand approval regardless of policy.
    pub fn forced(mut self) -> Self {
        self.force_approval = true;
        self
    }

    /// True when the path matches a protected pattern.
    pub fn touches_protected_path(&self) -> bool {
        self.path.as_deref().is_some_and(is_protected_path)
    }
}

/// Case-insensitive substring match against [`PROTECTED_PATH_PATTERNS`].
pub fn is_protected_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    PROTECTED_PATH_PATTERNS.iter().any(|p| lower.contains(p))
}
