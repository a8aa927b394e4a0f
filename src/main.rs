use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lambdac::diagnostics::render_error;
use lambdac::{CodegenConfig, CompileError, Program};

#[derive(Parser)]
#[command(name = "lambdac", version, about = "Compile typed lambda calculus programs to native objects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JSON program to a relocatable object file
    Compile {
        /// Program file (JSON)
        file: PathBuf,
        /// Output object path
        #[arg(short, long, default_value = "a.o")]
        output: PathBuf,
        /// Code generation settings (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Target triple; defaults to the host
        #[arg(long)]
        target: Option<String>,
        /// Emit calls to the runtime trace primitive
        #[arg(long)]
        trace: bool,
    },
    /// Type check and lower a program without writing output
    Check {
        /// Program file (JSON)
        file: PathBuf,
        /// Code generation settings (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Pretty print a program
    Print {
        /// Program file (JSON)
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Compile { file, output, config, target, trace } => {
            let program = read_program(&file)?;
            let mut config = load_config(config.as_deref(), &file);
            if target.is_some() {
                config.target = target;
            }
            config.trace |= trace;

            let bytes = lambdac::compile_to_object(&program, &config).unwrap_or_else(|err| fail(&file, &err));
            std::fs::write(&output, &bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            eprintln!("compiled {} \u{2192} {}", file.display(), output.display());
        }
        Commands::Check { file, config } => {
            let program = read_program(&file)?;
            let config = load_config(config.as_deref(), &file);
            let lowered = lambdac::check_program(&program, &config).unwrap_or_else(|err| fail(&file, &err));
            println!(
                "ok: result type {}, {} code units, {} byte stack",
                lowered.result_type, lowered.units, lowered.stack_bytes
            );
        }
        Commands::Print { file } => {
            let program = read_program(&file)?;
            println!("{program}");
        }
    }
    Ok(())
}

fn read_program(path: &Path) -> anyhow::Result<Program> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    lambdac::parse_program(&text).with_context(|| format!("invalid program {}", path.display()))
}

fn load_config(path: Option<&Path>, file: &Path) -> CodegenConfig {
    match path {
        Some(path) => CodegenConfig::load(path).unwrap_or_else(|err| fail(file, &err)),
        None => CodegenConfig::default(),
    }
}

fn fail(file: &Path, err: &CompileError) -> ! {
    eprint!("{}", render_error(&file.to_string_lossy(), err));
    std::process::exit(1);
}
