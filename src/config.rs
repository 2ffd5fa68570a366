use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::LedgerPolicy;

pub const DEFAULT_DATABASE: &str = "coffer.db";

/// Everything needed to stand up a `LedgerService`.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database: PathBuf,
    /// Where daily activity files go; `None` disables the activity log
    pub activity_log_dir: Option<PathBuf>,
    pub policy: LedgerPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE)
    }
}

impl LedgerConfig {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            activity_log_dir: None,
            policy: LedgerPolicy::default(),
        }
    }

    pub fn with_activity_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.activity_log_dir = Some(dir.into());
        self
    }

    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database.display())
    }

    /// Read a policy from a JSON file. Missing fields keep their defaults.
    pub fn load_policy(path: &Path) -> Result<LedgerPolicy> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse policy file: {}", path.display()))
    }
}
