//! Compiles structural contract descriptions to EVM bytecode.
//!
//! The pipeline runs strictly forward: [`parser`] and [`extractor`] build a
//! [`ContractModel`], [`layout`] assigns storage slots, [`codegen`] compiles
//! method bodies, [`abi`] builds the dispatch table and interface, and
//! [`generator`] assembles the deployment and runtime binaries.

pub mod abi;
pub mod artifact;
pub mod asm;
pub mod codegen;
pub mod config;
pub mod error;
pub mod extractor;
pub mod gas;
pub mod generator;
pub mod layout;
pub mod parser;

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::info;

pub use config::{CompilerConfig, EvmVersion};
pub use error::CompileError;
pub use extractor::ContractModel;

use abi::{AbiItem, DispatchTable};
use codegen::CodeUnit;
use layout::StorageLayout;

/// Everything produced for one contract.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub name: String,
    pub model: ContractModel,
    pub layout: StorageLayout,
    pub dispatch: DispatchTable,
    pub interface: Vec<AbiItem>,
    pub deployment: Vec<u8>,
    pub runtime: Vec<u8>,
    pub gas_estimate: u64,
}

/// Compiles every contract in `source`, in source order.
///
/// Contracts are compiled in parallel. The first failure fails the whole call.
pub fn compile(
    source: &str,
    config: &CompilerConfig,
) -> Result<Vec<CompiledContract>, CompileError> {
    let contracts = parser::parse_all(source)?;

    let mut names = HashSet::new();
    for contract in &contracts {
        if !names.insert(contract.name.as_str()) {
            return Err(CompileError::structural(
                contract.name.clone(),
                "contract is defined more than once",
            ));
        }
    }

    contracts
        .into_par_iter()
        .map(|contract| compile_contract(contract, config))
        .collect()
}

/// Compiles a source that holds exactly one contract.
pub fn compile_single(
    source: &str,
    config: &CompilerConfig,
) -> Result<CompiledContract, CompileError> {
    compile_contract(parser::parse(source)?, config)
}

pub fn compile_contract(
    contract: extractor::ast::Contract,
    config: &CompilerConfig,
) -> Result<CompiledContract, CompileError> {
    info!(contract = %contract.name, "compiling contract");

    let model = extractor::extract(contract)?;
    let layout = StorageLayout::plan(&model);

    let mut unit = CodeUnit::default();
    let methods = model
        .external_methods()
        .map(|(id, _)| codegen::compile_method(&model, &layout, &mut unit, id))
        .collect::<Result<Vec<_>, _>>()?;

    let dispatch = DispatchTable::build(&model, &mut unit)?;
    let interface = abi::interface(&model);

    let binaries = generator::generate(&model, &layout, &dispatch, methods, unit, config)?;

    let initialized = model.fields.iter().filter(|f| f.initial_value.is_some()).count();
    let gas_estimate =
        gas::estimate_deployment(&binaries.deployment, binaries.runtime.len(), initialized);

    info!(
        contract = %model.name,
        runtime = binaries.runtime.len(),
        deployment = binaries.deployment.len(),
        gas_estimate,
        "compiled contract"
    );

    Ok(CompiledContract {
        name: model.name.clone(),
        model,
        layout,
        dispatch,
        interface,
        deployment: binaries.deployment,
        runtime: binaries.runtime,
        gas_estimate,
    })
}
