use serde::{Deserialize, Serialize};

use crate::runtime_error::{RuntimeError, RuntimeResult};

pub const DEFAULT_LOOKBACK_DELTA_MS: i64 = 5 * 60 * 1000;

/// Engine-wide settings applied to every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on the bytes a single query may hold in pooled buffers.
    /// Zero disables the limit.
    pub max_memory_bytes: u64,
    /// How far back an instant vector selector looks for the latest sample.
    pub lookback_delta_ms: i64,
    pub query_timeout_ms: Option<u64>,
    /// Emit a tracing span per query.
    pub trace_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 0,
            lookback_delta_ms: DEFAULT_LOOKBACK_DELTA_MS,
            query_timeout_ms: None,
            trace_enabled: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.lookback_delta_ms <= 0 {
            return Err(RuntimeError::InvalidConfig(format!(
                "lookback_delta_ms must be positive, got {}",
                self.lookback_delta_ms
            )));
        }
        if self.query_timeout_ms == Some(0) {
            return Err(RuntimeError::InvalidConfig(
                "query_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
