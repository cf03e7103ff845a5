#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// A configuration value that is present but unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name} must be {expected}, got '{value}'")]
pub struct ConfigError {
    /// Environment variable the value came from.
    pub name: &'static str,
    pub value: String,
    /// What a valid value looks like, e.g. "a valid u64".
    pub expected: &'static str,
}
