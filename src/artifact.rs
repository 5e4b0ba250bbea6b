//! Build artifacts written next to each other under `<output_dir>/<Name>/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use alloy_primitives::hex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::abi::AbiItem;
use crate::config::CompilerConfig;
use crate::CompiledContract;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize artifact: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: Vec<AbiItem>,
    pub bytecode: String,
    pub deployed_bytecode: String,
    pub storage_layout: Vec<StorageEntry>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageEntry {
    pub label: String,
    /// Decimal slot number.
    pub slot: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub compiler: String,
    pub version: String,
    pub evm_version: String,
    pub gas_estimate: u64,
    pub method_identifiers: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(contract: &CompiledContract, source_name: &str, config: &CompilerConfig) -> Self {
        Self {
            contract_name: contract.name.clone(),
            source_name: source_name.to_string(),
            abi: contract.interface.clone(),
            bytecode: hex::encode_prefixed(&contract.deployment),
            deployed_bytecode: hex::encode_prefixed(&contract.runtime),
            storage_layout: contract
                .layout
                .fields()
                .iter()
                .map(|field| StorageEntry {
                    label: field.name.clone(),
                    slot: field.slot.to_string(),
                    ty: field.ty.to_string(),
                })
                .collect(),
            metadata: Metadata {
                compiler: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                evm_version: config.evm_version.to_string(),
                gas_estimate: contract.gas_estimate,
                method_identifiers: contract.dispatch.method_identifiers(),
            },
        }
    }
}

/// Writes the artifact files for one contract and returns their paths.
pub fn write_artifacts(
    contract: &CompiledContract,
    source_name: &str,
    config: &CompilerConfig,
) -> Result<Vec<PathBuf>, ArtifactError> {
    let dir = config.output_dir.join(&contract.name);
    fs::create_dir_all(&dir).map_err(|source| ArtifactError::Io {
        path: dir.clone(),
        source,
    })?;

    let artifact = Artifact::new(contract, source_name, config);
    let mut written = Vec::new();

    let path = dir.join(format!("{}.json", contract.name));
    write_file(&path, serde_json::to_string_pretty(&artifact)?)?;
    written.push(path);

    if config.emit_abi_file {
        let path = dir.join(format!("{}_abi.json", contract.name));
        write_file(&path, serde_json::to_string_pretty(&artifact.abi)?)?;
        written.push(path);
    }

    if config.emit_bytecode_file {
        let path = dir.join(format!("{}_bytecode.txt", contract.name));
        write_file(&path, artifact.bytecode.clone())?;
        written.push(path);
    }

    info!(
        contract = %contract.name,
        dir = %dir.display(),
        files = written.len(),
        "wrote artifacts"
    );
    Ok(written)
}

fn write_file(path: &Path, content: String) -> Result<(), ArtifactError> {
    fs::write(path, content).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}
