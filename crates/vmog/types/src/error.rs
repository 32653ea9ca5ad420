/// Malformed hex content hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentHashError {
    #[error("invalid hex length: {0} (expected 64)")]
    InvalidLength(usize),
    #[error("invalid hex character")]
    InvalidHex,
}

/// Malformed module identity string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("empty module identifier")]
    Empty,
    #[error("invalid module key '{0}': expected namespace/name")]
    InvalidKey(String),
    #[error("invalid module reference '{0}': expected namespace/name@version")]
    InvalidRef(String),
    #[error("invalid version in '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },
}

/// Structural validation failure of an incoming record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {}", issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

impl ValidationError {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}
