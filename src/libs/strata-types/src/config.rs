// Copyright (c) 2024 The Strata Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Engine capacity configuration.

use serde::{Deserialize, Serialize};

fn default_queue_depth() -> usize {
    128
}

fn default_pool_size() -> usize {
    1024
}

/// Capacities for an engine instance.
///
/// Both limits are fixed for the lifetime of the engine: the queue depth
/// bounds how many requests may be in flight before producers block, and the
/// pool size bounds how many work items may be live (queued, processing, or
/// completed-but-unreleased) at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of requests the submission queue holds before `push` blocks.
    #[serde(default = "default_queue_depth")]
    pub max_queued_work_items: usize,

    /// Number of work item slots in the pool.
    #[serde(default = "default_pool_size")]
    pub work_item_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_queued_work_items: default_queue_depth(),
            work_item_pool_size: default_pool_size(),
        }
    }
}

impl EngineConfig {
    /// Replace zero capacities with the defaults.
    pub fn adjust(&mut self) {
        if self.max_queued_work_items == 0 {
            self.max_queued_work_items = default_queue_depth();
        }
        if self.work_item_pool_size == 0 {
            self.work_item_pool_size = default_pool_size();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_queued_work_items, 128);
        assert_eq!(config.work_item_pool_size, 1024);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("max_queued_work_items = 4").unwrap();
        assert_eq!(config.max_queued_work_items, 4);
        assert_eq!(config.work_item_pool_size, 1024);

        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_adjust_replaces_zeros() {
        let mut config = EngineConfig {
            max_queued_work_items: 0,
            work_item_pool_size: 16,
        };
        config.adjust();
        assert_eq!(config.max_queued_work_items, 128);
        assert_eq!(config.work_item_pool_size, 16);
    }
}
