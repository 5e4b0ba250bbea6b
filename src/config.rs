use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest runtime binary the network accepts (EIP-170).
pub const DEFAULT_MAX_CODE_SIZE: usize = 24_576;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unknown EVM version `{0}` (expected `shanghai` or `paris`)")]
    UnknownEvmVersion(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmVersion {
    /// No `PUSH0`.
    Paris,
    #[default]
    Shanghai,
}

impl EvmVersion {
    pub fn has_push0(self) -> bool {
        matches!(self, EvmVersion::Shanghai)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvmVersion::Paris => "paris",
            EvmVersion::Shanghai => "shanghai",
        }
    }
}

impl FromStr for EvmVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paris" => Ok(EvmVersion::Paris),
            "shanghai" => Ok(EvmVersion::Shanghai),
            _ => Err(ConfigError::UnknownEvmVersion(s.to_string())),
        }
    }
}

impl std::fmt::Display for EvmVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub evm_version: EvmVersion,
    pub output_dir: PathBuf,
    pub emit_abi_file: bool,
    pub emit_bytecode_file: bool,
    /// Runtime binaries above this size are reported with a warning.
    pub max_code_size: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            evm_version: EvmVersion::default(),
            output_dir: PathBuf::from("build"),
            emit_abi_file: true,
            emit_bytecode_file: true,
            max_code_size: DEFAULT_MAX_CODE_SIZE,
        }
    }
}

impl CompilerConfig {
    /// Loads a JSON config file. Missing keys take their default values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
