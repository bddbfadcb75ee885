//! agora - assemble, inspect and run bytecode modules
//!
//! `.asm` files go through the text assembler, `.agb` files are binary
//! modules written by `--emit`.

use agora::bytecode::asm::{self, AsmError};
use agora::bytecode::disasm::{disassemble, module_stats};
use agora::bytecode::verify::{VerifyError, verify_module};
use agora::{Context, Func, Module, ModuleError, RuntimeError, Value, VmConfig};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(about = "Run an agora bytecode module")]
struct Cli {
    /// Path to a .asm source or .agb binary module
    file: PathBuf,

    /// Arguments passed to the top-level function (numbers when they parse)
    args: Vec<String>,

    /// Enable DUMP output and debug logging
    #[arg(long)]
    debug: bool,

    /// Print the disassembly and instruction statistics instead of running
    #[arg(long)]
    disasm: bool,

    /// Write the module in binary form to this path instead of running
    #[arg(long, value_name = "OUT.agb")]
    emit: Option<PathBuf>,

    /// Maximum nesting of script function calls
    #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
    max_call_depth: usize,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("assembly failed: {0}")]
    Asm(#[from] AsmError),

    #[error("invalid module: {0}")]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "agora=debug" } else { "agora=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let module = load(&cli.file)?;
    verify_module(&module)?;

    if cli.disasm {
        print!("{}", disassemble(&module));
        print!("{}", module_stats(&module));
        return Ok(());
    }

    if let Some(out) = &cli.emit {
        let bytes = module.to_bytes()?;
        fs::write(out, &bytes).map_err(|source| CliError::Write {
            path: out.display().to_string(),
            source,
        })?;
        info!("wrote {} bytes to {}", bytes.len(), out.display());
        return Ok(());
    }

    let ctx = Rc::new(Context::with_config(VmConfig {
        debug: cli.debug,
        max_call_depth: cli.max_call_depth,
    }));
    install_natives(&ctx);

    let args: Vec<Value> = cli.args.iter().map(|a| parse_arg(a)).collect();
    let results = ctx.run_module(module, &args)?;
    for v in results {
        println!("{}", v);
    }
    Ok(())
}

fn load(path: &Path) -> Result<Module, CliError> {
    let read_err = |source| CliError::Read {
        path: path.display().to_string(),
        source,
    };
    if path.extension().and_then(|e| e.to_str()) == Some("agb") {
        let bytes = fs::read(path).map_err(read_err)?;
        return Ok(Module::from_bytes(&bytes)?);
    }
    let source = fs::read_to_string(path).map_err(read_err)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main");
    Ok(asm::assemble(name, &source)?)
}

/// Host functions available to every module, both as globals and as
/// native prototypes.
fn install_natives(ctx: &Rc<Context>) {
    let print = |_: &Value, args: &[Value]| -> agora::runtime::Result<Vec<Value>> {
        let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
        println!("{}", line.join(" "));
        Ok(Vec::new())
    };
    ctx.register_native("print", print);
    ctx.define_global("print", Func::native("print", print));
}

fn parse_arg(arg: &str) -> Value {
    match arg.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::from(arg),
    }
}
