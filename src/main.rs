use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{App, Arg};
use tracing::info;
use tracing_subscriber::EnvFilter;

use structc::{artifact, CompilerConfig, EvmVersion};

fn init_logging(verbosity: u64) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let matches = App::new("structc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compiles structural contract descriptions to EVM bytecode")
        .arg(
            Arg::with_name("INPUT")
                .help("Contract source file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("DIR")
                .help("Output directory for build artifacts")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON compiler configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("evm-version")
                .long("evm-version")
                .value_name("VERSION")
                .possible_values(&["shanghai", "paris"])
                .help("Target EVM version")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Raise log verbosity (-v info, -vv debug)"),
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    let mut config = match matches.value_of("config") {
        Some(path) => CompilerConfig::load(Path::new(path))?,
        None => CompilerConfig::default(),
    };
    if let Some(dir) = matches.value_of("output") {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(version) = matches.value_of("evm-version") {
        config.evm_version = version.parse::<EvmVersion>()?;
    }

    let input_file = matches
        .value_of("INPUT")
        .ok_or_else(|| anyhow!("missing input file"))?;

    let source = fs::read_to_string(input_file)
        .with_context(|| format!("Failed to read input file: {}", input_file))?;

    let contracts = structc::compile(&source, &config).map_err(|err| {
        if err.is_internal() {
            anyhow!("{} (this is a compiler bug, not a problem in the contract)", err)
        } else {
            anyhow!(err)
        }
    })?;

    let source_name = Path::new(input_file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input_file.to_string());

    for contract in &contracts {
        let written = artifact::write_artifacts(contract, &source_name, &config)
            .with_context(|| format!("Failed to write artifacts for {}", contract.name))?;
        info!(contract = %contract.name, files = written.len(), "done");
        println!(
            "Compiled {} ({} bytes runtime) into {}",
            contract.name,
            contract.runtime.len(),
            config.output_dir.join(&contract.name).display()
        );
    }

    Ok(())
}
