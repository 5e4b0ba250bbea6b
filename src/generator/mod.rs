//! Final binary layout.
//!
//! Runtime: dispatcher, then per method `entry stub ++ body ++ exit stub`,
//! then the trap blocks. Deployment: constructor argument copy, field
//! initializers, constructor body, runtime copy and `RETURN`, trap blocks,
//! and finally the runtime itself as data.

use tracing::{debug, warn};

use crate::abi::{self, DispatchTable};
use crate::asm::{self, opcodes, AsmError, CodeBuffer};
use crate::codegen::{self, CodeUnit, MethodCode};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::extractor::ContractModel;
use crate::layout::StorageLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    /// Contract-creation payload. Constructor arguments are appended by the deployer.
    pub deployment: Vec<u8>,
    /// Code left behind by the deployment binary.
    pub runtime: Vec<u8>,
}

pub fn generate(
    model: &ContractModel,
    layout: &StorageLayout,
    dispatch: &DispatchTable,
    methods: Vec<MethodCode>,
    unit: CodeUnit,
    config: &CompilerConfig,
) -> Result<Binaries, CompileError> {
    let runtime = runtime(model, dispatch, methods, unit, config)?;
    if runtime.len() > config.max_code_size {
        warn!(
            contract = %model.name,
            size = runtime.len(),
            limit = config.max_code_size,
            "runtime binary exceeds the deployable code size limit"
        );
    }

    let deployment = deployment(model, layout, &runtime, config)?;
    debug!(
        contract = %model.name,
        runtime = runtime.len(),
        deployment = deployment.len(),
        "assembled binaries"
    );

    Ok(Binaries {
        deployment,
        runtime,
    })
}

fn runtime(
    model: &ContractModel,
    dispatch: &DispatchTable,
    methods: Vec<MethodCode>,
    mut unit: CodeUnit,
    config: &CompilerConfig,
) -> Result<Vec<u8>, CompileError> {
    let mut code = CodeBuffer::new();
    dispatch.emit_dispatcher(&mut unit, &mut code);

    for compiled in methods {
        let method = model.method(compiled.method);
        let entry = dispatch.entry(compiled.method).ok_or_else(|| {
            CompileError::Internal(format!(
                "method `{}::{}` has no dispatch entry",
                model.name, method.name
            ))
        })?;

        abi::emit_decoder(method, entry.entry, &mut unit, &mut code);
        code.append(compiled.body);
        abi::emit_encoder(method, compiled.exit, &mut code);
    }

    unit.emit_traps(&mut code);

    let assembled = asm::assemble(code.instructions(), config.evm_version)
        .map_err(|err| asm_error(&model.name, "runtime", err))?;
    Ok(assembled.bytecode)
}

fn deployment(
    model: &ContractModel,
    layout: &StorageLayout,
    runtime: &[u8],
    config: &CompilerConfig,
) -> Result<Vec<u8>, CompileError> {
    let mut unit = CodeUnit::default();
    let runtime_start = unit.fresh();
    let code_end = unit.fresh();
    let mut code = CodeBuffer::new();

    let constructor = model.constructor();
    if let Some(id) = constructor {
        abi::emit_constructor_decoder(model.method(id), code_end, &mut unit, &mut code);
    }

    let initializers = codegen::compile_initializers(model, layout, &mut unit);
    code.append(initializers);

    if let Some(id) = constructor {
        let compiled = codegen::compile_method(model, layout, &mut unit, id)?;
        code.append(compiled.body);
        code.jumpdest(compiled.exit);
    }

    code.push_int(runtime.len())
        .push_label(runtime_start)
        .push_int(0)
        .op(opcodes::CODECOPY)
        .push_int(runtime.len())
        .push_int(0)
        .op(opcodes::RETURN);

    unit.emit_traps(&mut code);
    code.mark(runtime_start).data(runtime.to_vec()).mark(code_end);

    let assembled = asm::assemble(code.instructions(), config.evm_version)
        .map_err(|err| asm_error(&model.name, "deployment", err))?;
    Ok(assembled.bytecode)
}

fn asm_error(contract: &str, binary: &'static str, err: AsmError) -> CompileError {
    match err {
        AsmError::OffsetTooLarge { offset, .. } => CompileError::CodeTooLarge {
            contract: contract.to_string(),
            binary,
            size: offset,
        },
        other => CompileError::Internal(format!("{} binary of `{}`: {}", binary, contract, other)),
    }
}
