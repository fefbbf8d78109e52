mod config;
mod handlers;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use uoscript_core::{lexer, Engine, Script, ScriptError};

use crate::config::RunnerConfig;

#[derive(Parser)]
#[command(name = "uoscript", about = "Runner for UO Steam automation scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a .uos script to completion
    Run {
        /// Path to the script file (reads stdin if omitted)
        script: Option<PathBuf>,

        /// Milliseconds to sleep between engine ticks
        #[arg(short, long, env = "UOSCRIPT_TICK_MS")]
        tick_ms: Option<u64>,

        /// Abort after this many ticks (safety net for runaway scripts)
        #[arg(long, env = "UOSCRIPT_MAX_TICKS")]
        max_ticks: Option<u64>,
    },
    /// Parse a script and report syntax errors without executing it
    Check {
        /// Path to the script file (reads stdin if omitted)
        script: Option<PathBuf>,
    },
}

fn exit_code(error: &ScriptError) -> i32 {
    match error {
        ScriptError::Syntax { .. } => 2,
        ScriptError::Runtime { .. } => 3,
        ScriptError::Io(_) => 4,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            script,
            tick_ms,
            max_ticks,
        } => run_script(script, tick_ms, max_ticks).await,
        Command::Check { script } => check_script(script),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(exit_code(&e));
    }
}

fn read_source(path: Option<&PathBuf>) -> Result<String, ScriptError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

async fn run_script(
    path: Option<PathBuf>,
    tick_ms: Option<u64>,
    max_ticks: Option<u64>,
) -> Result<(), ScriptError> {
    let defaults = RunnerConfig::load();
    let tick_ms = tick_ms.or(defaults.tick_ms).unwrap_or(10);
    let max_ticks = max_ticks.or(defaults.max_ticks);

    let source = read_source(path.as_ref())?;
    let tree = lexer::lex(source.lines())?;

    let mut engine = Engine::new();
    handlers::register_all(&mut engine);

    debug!(tick_ms, "starting script");
    let mut ticks = 1u64;
    engine.start(Script::new(tree))?;
    while engine.tick()? {
        ticks += 1;
        if let Some(limit) = max_ticks {
            if ticks >= limit {
                engine.stop();
                return Err(ScriptError::runtime(
                    None,
                    format!("script exceeded the tick limit of {limit}"),
                ));
            }
        }
        if tick_ms > 0 {
            tokio::time::sleep(Duration::from_millis(tick_ms)).await;
        }
    }
    debug!(ticks, "script finished");
    Ok(())
}

fn check_script(path: Option<PathBuf>) -> Result<(), ScriptError> {
    let source = read_source(path.as_ref())?;
    let tree = lexer::lex(source.lines())?;
    println!("ok: {} statements", tree.arena().children(tree.root()).len());
    Ok(())
}
