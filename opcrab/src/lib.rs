//! OpCrab Interpreter Library
//!
//! A minimal interpreter for stack-machine bytecode. The compiler front-end is
//! external: it hands over a JSON listing of decoded instructions, and this
//! crate indexes the instructions by offset and executes them.
//!
//! Only a small, explicitly enumerated subset of the instruction set is
//! executable. Anything outside it fails with a precise error instead of
//! being approximated, which makes the engine suitable for checking the
//! semantics of that subset across host-language versions.
//!
//! # Examples
//! ```
//! use opcrab::interpreter::Interpreter;
//! use opcrab::program::Program;
//!
//! let listing = r#"{"instructions": [
//!     {"offset": 0, "opname": "PUSH_NULL"},
//!     {"offset": 2, "opname": "LOAD_NAME", "argval": "print"},
//!     {"offset": 4, "opname": "LOAD_CONST", "argval": "hello world"},
//!     {"offset": 6, "opname": "CALL", "arg": 1},
//!     {"offset": 14, "opname": "POP_TOP"},
//!     {"offset": 16, "opname": "RETURN_CONST", "argval": null}
//! ]}"#;
//! let program = Program::from_json(listing).unwrap();
//! let mut interpreter = Interpreter::new(Vec::<u8>::new());
//! interpreter.run(&program).unwrap();
//! assert_eq!(interpreter.into_output(), b"hello world\n");
//! ```

pub mod builtins;
pub mod error;
pub mod instruction;
pub mod interpreter;
pub mod program;
pub mod table;
pub mod value;

pub use crate::error::{ExecError, ExecResult};
pub use crate::interpreter::{EngineConfig, Interpreter};
pub use crate::program::Program;
pub use crate::value::Value;

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

/// Options for [`run_main`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub config: EngineConfig,
    /// Print the final value of the program when it is not None.
    pub print_result: bool,
}

/// Load a program from a JSON instruction listing on disk.
pub fn load_program(path: &Path) -> Result<Program> {
    Program::from_path(path)
}

/// Execute a loaded program, writing its output to `out`.
///
/// # Arguments
/// * `program` - The program to execute
/// * `config` - Engine settings
/// * `out` - Sink for everything the program prints
///
/// # Returns
/// * `Ok(Value)` - The value the module-level code returned
/// * `Err(anyhow::Error)` - Wraps the [`ExecError`] that aborted execution
pub fn run_program<W: Write>(program: &Program, config: EngineConfig, out: W) -> Result<Value> {
    let mut interpreter = Interpreter::with_config(config, out);
    Ok(interpreter.run(program)?)
}

/// Load and execute the listing at `path`, printing to stdout.
pub fn run_main(path: &Path, options: RunOptions) -> Result<ExitCode> {
    let program = load_program(path)?;
    info!("Running {}", path.display());

    let stdout = std::io::stdout().lock();
    let mut interpreter = Interpreter::with_config(options.config, stdout);
    let result = interpreter.run(&program)?;

    if options.print_result && result != Value::None {
        let mut stdout = interpreter.into_output();
        writeln!(stdout, "{}", result.repr())?;
        stdout.flush()?;
    }
    Ok(ExitCode::SUCCESS)
}
