//! Plume CLI - command-line harness for the Plume policy language

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plume_core::bytecode::disassemble_module;
use plume_core::{compile_module_named, Evaluator, Module, Val};

mod host;
mod repl;
mod settings;

use host::{render, CliHost};
use settings::{parse_assignment, Settings};

#[derive(Parser)]
#[command(name = "plume")]
#[command(version = plume_core::VERSION)]
#[command(about = "The Plume policy language", long_about = None)]
struct Cli {
    /// Log evaluator phases to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source files and report errors
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the bytecode of every program in a source file
    Disasm {
        /// Path to the source file
        file: PathBuf,
    },

    /// Run the lifecycle phases of a source file and dispatch one event
    Run {
        /// Path to the source file
        file: PathBuf,

        /// Event to dispatch
        #[arg(short, long, default_value = "main")]
        event: String,

        /// Event context as JSON, available to rules as `$`
        #[arg(short = 'x', long)]
        context: Option<String>,

        /// Settings file with [limits] and [vars] tables
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host variable as NAME=VALUE (JSON or plain text); repeatable
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Also run the config block and print what it reports
        #[arg(long)]
        emit_config: bool,

        /// Override the maximum call depth
        #[arg(long)]
        max_frames: Option<usize>,
    },

    /// Evaluate a single expression
    Eval {
        /// Expression to evaluate
        expression: String,
    },

    /// Start the interactive REPL
    Repl {
        /// Module to load before the first prompt
        file: Option<PathBuf>,
    },
}

/// Options of the `run` subcommand
struct RunOptions {
    file: PathBuf,
    event: String,
    context: Option<String>,
    config: Option<PathBuf>,
    vars: Vec<String>,
    emit_config: bool,
    max_frames: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Check { files }) => check_files(&files)?,

        Some(Commands::Disasm { file }) => {
            let module = compile_file(&file)?;
            print!("{}", disassemble_module(&module));
        }

        Some(Commands::Run {
            file,
            event,
            context,
            config,
            vars,
            emit_config,
            max_frames,
        }) => {
            let options = RunOptions {
                file,
                event,
                context,
                config,
                vars,
                emit_config,
                max_frames,
            };
            run_file(options)?;
        }

        Some(Commands::Eval { expression }) => eval_expression(&expression)?,

        Some(Commands::Repl { file }) => start_repl(file.as_deref())?,

        None => start_repl(None)?,
    }

    Ok(())
}

/// Install the tracing subscriber; `--verbose` turns on core debug events
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "plume_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Read and compile a source file; errors carry the path and a snippet
fn compile_file(path: &Path) -> Result<Arc<Module>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file '{}'", path.display()))?;
    let module = compile_module_named(&path.display().to_string(), &source)
        .map_err(|e| anyhow::anyhow!("{}:{e}", path.display()))?;
    Ok(Arc::new(module))
}

/// Compile every file, reporting each one; fails if any file fails
fn check_files(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for file in files {
        match compile_file(file) {
            Ok(module) => println!(
                "ok: {} ({} rules, {} functions, {} iterators)",
                file.display(),
                module.rules.len(),
                module.functions.len(),
                module.iterators.len()
            ),
            Err(err) => {
                eprintln!("error: {err}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed to compile", files.len());
    }
    Ok(())
}

/// Run global, session, optionally config, then dispatch one event
fn run_file(options: RunOptions) -> Result<()> {
    let settings = match &options.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let mut limits = settings.limits;
    if let Some(max_frames) = options.max_frames {
        limits.max_frames = max_frames;
    }

    let host = Arc::new(CliHost::new());
    for (name, value) in settings.host_vars()? {
        host.set_var(name, value);
    }
    for assignment in &options.vars {
        let (name, value) = parse_assignment(assignment)?;
        host.set_var(name, value);
    }

    let context = match &options.context {
        Some(text) => {
            let json: serde_json::Value = serde_json::from_str(text).context("Invalid --context JSON")?;
            Val::from_json(&json)
        }
        None => Val::Null,
    };

    let module = compile_file(&options.file)?;
    let mut eval = Evaluator::new(module).with_host(host).with_limits(limits);

    eval.eval_global()
        .map_err(|e| anyhow::anyhow!("Runtime error in global block: {e}"))?;
    eval.eval_session()
        .map_err(|e| anyhow::anyhow!("Runtime error in session block: {e}"))?;
    if options.emit_config {
        eval.eval_config()
            .map_err(|e| anyhow::anyhow!("Runtime error in config block: {e}"))?;
    }

    let result = eval
        .eval_with_context(&options.event, context)
        .map_err(|e| anyhow::anyhow!("Runtime error: {e}"))?;
    match result {
        Some(Val::Null) => {}
        Some(value) => println!("{}", render(&value)),
        None => eprintln!("no rule matched event '{}'", options.event),
    }

    Ok(())
}

/// Evaluate one expression as the body of a throwaway rule
fn eval_expression(expression: &str) -> Result<()> {
    let source = format!("main {{\n{expression}\n}}");
    let module = compile_module_named("<eval>", &source).map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut eval = Evaluator::new(Arc::new(module)).with_host(Arc::new(CliHost::new()));
    let result = eval
        .eval("main")
        .map_err(|e| anyhow::anyhow!("Runtime error: {e}"))?
        .unwrap_or(Val::Null);
    println!("{}", render(&result));
    Ok(())
}

fn start_repl(file: Option<&Path>) -> Result<()> {
    let mut repl = repl::Repl::new(Arc::new(CliHost::new()))?;
    if let Some(path) = file {
        repl.load(path)?;
    }
    repl.run()
}
