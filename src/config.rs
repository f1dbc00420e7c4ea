//! Engine configuration.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings applied when an [`crate::Engine`] is created.
///
/// Can be built in code with the `with_*` methods or loaded from JSON:
///
/// ```ignore
/// let config = EngineConfig::from_json_str(r#"{ "base_dir": "scripts", "memory_limit": 67108864 }"#)?;
/// let engine = Engine::with_config(config);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for resolving file-backed module imports
    pub base_dir: PathBuf,
    /// Heap limit in bytes passed to the runtime
    pub memory_limit: Option<usize>,
    /// Native stack limit in bytes for script recursion
    pub max_stack_size: Option<usize>,
    /// Allocation volume that triggers an automatic GC cycle
    pub gc_threshold: Option<usize>,
    /// Install `console`, `print` and `sleep` on the global object
    pub install_builtins: bool,
    /// Maximum nesting depth for deep clones
    pub clone_depth_limit: usize,
    /// Extensions tried, in order, when an import has none
    pub module_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: None,
            install_builtins: true,
            clone_depth_limit: 64,
            module_extensions: vec!["js".to_string(), "mjs".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }

    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    pub fn with_builtins(mut self, install: bool) -> Self {
        self.install_builtins = install;
        self
    }

    pub fn with_clone_depth_limit(mut self, depth: usize) -> Self {
        self.clone_depth_limit = depth;
        self
    }
}
