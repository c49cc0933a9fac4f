//! Pipeline configuration.

use crate::error::ConfigError;

/// Tunable knobs for one pipeline run.
///
/// Batch size and worker count are throughput/latency trade-offs, not
/// correctness parameters: any `batch_size >= 1` produces the same message
/// set, and `spam_workers` only bounds how many classification calls are in
/// flight at once.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum users per message-listing call (`B`).
    pub batch_size: usize,
    /// Number of persistent classifier workers (`W`). This is the
    /// pipeline's admission-control bound on outstanding classification
    /// requests.
    pub spam_workers: usize,
    /// Optional cap on concurrent user lookups. `None` keeps the
    /// fire-and-forget fan-out, which is fine as long as the input volume
    /// is bounded.
    pub max_concurrent_lookups: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            spam_workers: 5,
            max_concurrent_lookups: None,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from `MAILSIFT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let batch_size = parse_env("MAILSIFT_BATCH_SIZE")?.unwrap_or(defaults.batch_size);
        let spam_workers = parse_env("MAILSIFT_SPAM_WORKERS")?.unwrap_or(defaults.spam_workers);
        let max_concurrent_lookups = parse_env("MAILSIFT_MAX_LOOKUPS")?;

        let config = Self {
            batch_size,
            spam_workers,
            max_concurrent_lookups,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a pipeline at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.spam_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "spam_workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_lookups == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent_lookups".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env(key: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.parse().map(Some).map_err(|_| ConfigError::ParseError {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(None),
    }
}
