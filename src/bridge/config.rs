//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Options for constructing a [`Bridge`](super::Bridge)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Upper bound on guest linear memory, in bytes
    pub memory_limit: Option<usize>,
    /// Guest argv; empty means `[name]`
    pub args: Vec<String>,
    /// Guest environment, in order
    pub env: Vec<(String, String)>,
    /// Buffer guest stdout/stderr instead of forwarding them
    pub capture_output: bool,
    /// Make failed `valueGet`/`valueIndex` lookups yield `undefined`
    pub lenient_lookups: bool,
}

impl BridgeConfig {
    /// Parse a configuration from JSON
    pub fn load(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("failed to parse bridge config: {}", e)))
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::load(&json)
    }

    /// The argv the guest sees for a module called `name`
    pub fn args_for(&self, name: &str) -> Vec<String> {
        if self.args.is_empty() {
            vec![name.to_string()]
        } else {
            self.args.clone()
        }
    }
}
