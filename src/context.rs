use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AdmissionError, Result};

/// Hard ceiling most browsers put on live WebGL contexts.
pub const PLATFORM_CONTEXT_LIMIT: usize = 16;

/// Default number of concurrently live owners, with headroom below the platform limit.
pub const MAX_CONTEXTS: usize = 12;

/// How close to capacity counts as "near the limit".
pub const NEAR_LIMIT_MARGIN: usize = 2;

/// Admission controller options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum number of owners alive at once.
    pub max_contexts: usize,
    /// `is_near_limit` turns true once this many slots or fewer remain.
    pub near_limit_margin: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_contexts: MAX_CONTEXTS,
            near_limit_margin: NEAR_LIMIT_MARGIN,
        }
    }
}

impl AdmissionConfig {
    pub fn with_capacity(max_contexts: usize) -> Self {
        Self { max_contexts, ..Self::default() }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configs the registry cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_contexts == 0 {
            return Err(AdmissionError::InvalidConfig(
                "max_contexts must be at least 1".into(),
            ));
        }
        if self.max_contexts >= PLATFORM_CONTEXT_LIMIT {
            warn!(
                max_contexts = self.max_contexts,
                platform_limit = PLATFORM_CONTEXT_LIMIT,
                "capacity leaves no headroom below the platform context limit"
            );
        }
        Ok(())
    }

    /// Size at which callers should start throttling new viewers.
    pub fn near_limit_threshold(&self) -> usize {
        self.max_contexts.saturating_sub(self.near_limit_margin)
    }
}
