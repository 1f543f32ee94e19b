//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Limits and defaults for the protocol engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScimEngineOptions {
    /// Maximum results per list-query page.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Maximum operations accepted in one bulk batch.
    #[serde(default = "default_bulk_max_operations")]
    pub bulk_max_operations: usize,
    /// Fail-fast threshold applied to bulk batches that carry no
    /// `failOnErrors` of their own.
    #[serde(default)]
    pub default_fail_on_errors: Option<usize>,
}

fn default_max_results() -> usize { 200 }
fn default_bulk_max_operations() -> usize { 1000 }

impl Default for ScimEngineOptions {
    fn default() -> Self {
        Self {
            max_results: 200,
            bulk_max_operations: 1000,
            default_fail_on_errors: None,
        }
    }
}
