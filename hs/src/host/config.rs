//! Host configuration

use serde::{Deserialize, Serialize};

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Max task polls while draining microtasks in one turn
    #[serde(default = "default_max_microtasks")]
    pub max_microtasks_per_turn: usize,

    /// Max turns `run_until_idle` / `block_on` may take
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,
}

fn default_max_microtasks() -> usize {
    10_000
}

fn default_max_turns() -> u64 {
    100_000
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_microtasks_per_turn: 10_000,
            max_turns: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.max_microtasks_per_turn, 10_000);
        assert_eq!(config.max_turns, 100_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HostConfig = serde_json::from_str(r#"{"max_turns": 5}"#).unwrap();
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.max_microtasks_per_turn, 10_000);
    }
}
