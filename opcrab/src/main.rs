//! OpCrab Interpreter
//!
//! Runs a bytecode instruction listing produced by an external front-end.
//! Program output goes to stdout; logs and diagnostics go to stderr.

use clap::Parser;
use opcrab::{EngineConfig, ExecError, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "opcrab")]
#[command(about = "Execute a bytecode instruction listing")]
#[command(version)]
struct Args {
    /// JSON instruction listing to execute
    listing: PathBuf,

    /// Print the program's final value when it is not None
    #[arg(long)]
    print_result: bool,

    /// Maximum nesting of function calls, from 1 to 1000 [default: 200]
    #[arg(
        long = "max-call-depth",
        env = "OPCRAB_MAX_CALL_DEPTH",
        value_name = "DEPTH",
        value_parser = parse_call_depth
    )]
    config: Option<EngineConfig>,
}

fn parse_call_depth(value: &str) -> Result<EngineConfig, String> {
    let depth = value
        .parse::<usize>()
        .map_err(|e| format!("not a call depth: {e}"))?;
    EngineConfig::new(depth).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let log_level = std::env::var("OPCRAB_LOG").unwrap_or_else(|_| "warn".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = RunOptions {
        config: args.config.unwrap_or_default(),
        print_result: args.print_result,
    };

    match opcrab::run_main(&args.listing, options) {
        Ok(exit_code) => {
            info!("Interpretation completed with exit code: {:?}", exit_code);
            exit_code
        }
        Err(e) => {
            match e.downcast_ref::<ExecError>() {
                Some(exec_error) => eprintln!("error[{}]: {e:#}", exec_error.kind()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
