use crate::error::{OpenApiOpsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for an OpenAPI-backed operation source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    /// `OpenAPI` spec location (URL or file path).
    pub spec: String,

    /// Optional spec hash (`sha256:<hex>`) for version detection.
    #[serde(default)]
    pub spec_hash: Option<String>,

    /// Hash policy: warn, fail, or ignore.
    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    /// Override base URL from spec.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-request timeout in seconds (`0` disables the timeout).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail startup if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

impl ApiServerConfig {
    /// Minimal config pointing at a spec location, everything else defaulted.
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            base_url: None,
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Effective request timeout; `None` means no timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

/// Load an [`ApiServerConfig`] from a YAML or JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not describe a valid config.
pub fn load_config(path: &Path) -> Result<ApiServerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        OpenApiOpsError::Config(format!("failed to read config {}: {e}", path.display()))
    })?;
    // JSON is a valid subset of YAML, so serde_yaml alone is enough.
    serde_yaml::from_str(&content).map_err(|e| {
        OpenApiOpsError::Config(format!("failed to parse config {}: {e}", path.display()))
    })
}
