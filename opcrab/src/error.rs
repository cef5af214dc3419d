//! Errors raised while loading or executing a program.
//!
//! Every error is fatal: the engine never repairs the stack or retries an
//! instruction, so the first error aborts the whole run.

use crate::instruction::Opcode;
use thiserror::Error;

/// Result type used by the engine, the table builder and the loader.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    /// The instruction sequence violates a structural invariant.
    #[error("malformed program: {0}")]
    MalformedProgram(String),

    #[error("unresolved jump target: {opcode} at offset {offset} jumps to offset {target}")]
    UnresolvedJumpTarget {
        opcode: Opcode,
        offset: u32,
        target: i64,
    },

    #[error("name '{0}' is not defined")]
    NameNotFound(String),

    #[error(
        "stack underflow: {opcode} at offset {offset} needs {needed} value(s), stack holds {depth}"
    )]
    StackUnderflow {
        opcode: Opcode,
        offset: u32,
        needed: usize,
        depth: usize,
    },

    #[error("unsupported opcode: {0}")]
    UnsupportedOpcode(String),

    #[error("unsupported operator '{op}' for operands of type '{lhs}' and '{rhs}'")]
    UnsupportedOperator {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("arithmetic error: {0}")]
    ArithmeticError(String),

    #[error("maximum call depth of {0} exceeded")]
    RecursionLimit(usize),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to write program output: {0}")]
    Output(#[from] std::io::Error),
}

impl ExecError {
    /// Short name of the error kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::MalformedProgram(_) => "MalformedProgram",
            ExecError::UnresolvedJumpTarget { .. } => "UnresolvedJumpTarget",
            ExecError::NameNotFound(_) => "NameNotFound",
            ExecError::StackUnderflow { .. } => "StackUnderflow",
            ExecError::UnsupportedOpcode(_) => "UnsupportedOpcode",
            ExecError::UnsupportedOperator { .. } => "UnsupportedOperator",
            ExecError::UnsupportedFeature(_) => "UnsupportedFeature",
            ExecError::TypeError(_) => "TypeError",
            ExecError::ArithmeticError(_) => "ArithmeticError",
            ExecError::RecursionLimit(_) => "RecursionLimit",
            ExecError::InvalidConfig(_) => "InvalidConfig",
            ExecError::Output(_) => "Output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_message_names_opcode_and_offset() {
        let err = ExecError::StackUnderflow {
            opcode: Opcode::PopTop,
            offset: 12,
            needed: 1,
            depth: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("POP_TOP"));
        assert!(msg.contains("offset 12"));
        assert_eq!(err.kind(), "StackUnderflow");
    }

    #[test]
    fn test_io_error_converts_to_output() {
        let io = std::io::Error::other("closed pipe");
        let err: ExecError = io.into();
        assert_eq!(err.kind(), "Output");
    }
}
