//! Instructions and the opcode set understood by the engine.
//!
//! The front-end emits symbolic opcode names. Different host-language
//! versions spell the same operation differently, so several names parse to
//! one [`Opcode`] family. Names with no family are rejected when the listing
//! is loaded, which keeps the dispatch in the engine exhaustive.

use crate::error::{ExecError, ExecResult};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Fillers and version-specific placeholders with no stack effect.
    Nop,
    /// Push the no-bound-method marker consumed by [`Opcode::Call`].
    PushNull,
    LoadConst,
    LoadName,
    LoadGlobal,
    LoadFast,
    /// Push two locals, named by a two-element tuple operand.
    LoadFastPair,
    StoreName,
    StoreGlobal,
    StoreFast,
    BinaryAdd,
    /// Binary operator selected by the raw operand.
    BinaryOp,
    CompareOp,
    GetIter,
    ForIter,
    /// Loop epilogue. Skipped by an exhausted [`Opcode::ForIter`], so it only
    /// runs when reached by fall-through.
    EndFor,
    Jump,
    PopJumpIfFalse,
    PopJumpIfTrue,
    Call,
    MakeFunction,
    PopTop,
    ReturnValue,
    ReturnConst,
}

impl Opcode {
    /// Canonical symbolic name.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadName => "LOAD_NAME",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::LoadFastPair => "LOAD_FAST_LOAD_FAST",
            Opcode::StoreName => "STORE_NAME",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::BinaryOp => "BINARY_OP",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::GetIter => "GET_ITER",
            Opcode::ForIter => "FOR_ITER",
            Opcode::EndFor => "END_FOR",
            Opcode::Jump => "JUMP",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::Call => "CALL",
            Opcode::MakeFunction => "MAKE_FUNCTION",
            Opcode::PopTop => "POP_TOP",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::ReturnConst => "RETURN_CONST",
        }
    }

    /// Whether the operand of this opcode is a jump target offset.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::ForIter | Opcode::Jump | Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue
        )
    }
}

impl FromStr for Opcode {
    type Err = ExecError;

    fn from_str(name: &str) -> ExecResult<Self> {
        let opcode = match name {
            "NOP" | "RESUME" | "RESUME_QUICK" | "CACHE" | "PRECALL" | "EXTENDED_ARG"
            | "NOT_TAKEN" => Opcode::Nop,
            "PUSH_NULL" => Opcode::PushNull,
            "LOAD_CONST" | "LOAD_SMALL_INT" => Opcode::LoadConst,
            "LOAD_NAME" => Opcode::LoadName,
            "LOAD_GLOBAL" => Opcode::LoadGlobal,
            "LOAD_FAST" | "LOAD_FAST_CHECK" | "LOAD_FAST_BORROW" => Opcode::LoadFast,
            "LOAD_FAST_LOAD_FAST" | "LOAD_FAST_BORROW_LOAD_FAST_BORROW" => Opcode::LoadFastPair,
            "STORE_NAME" => Opcode::StoreName,
            "STORE_GLOBAL" => Opcode::StoreGlobal,
            "STORE_FAST" => Opcode::StoreFast,
            "BINARY_ADD" | "INPLACE_ADD" => Opcode::BinaryAdd,
            "BINARY_OP" => Opcode::BinaryOp,
            "COMPARE_OP" => Opcode::CompareOp,
            "GET_ITER" => Opcode::GetIter,
            "FOR_ITER" => Opcode::ForIter,
            "END_FOR" => Opcode::EndFor,
            "JUMP" | "JUMP_FORWARD" | "JUMP_BACKWARD" | "JUMP_BACKWARD_NO_INTERRUPT"
            | "JUMP_ABSOLUTE" => Opcode::Jump,
            "POP_JUMP_IF_FALSE" | "POP_JUMP_FORWARD_IF_FALSE" | "POP_JUMP_BACKWARD_IF_FALSE" => {
                Opcode::PopJumpIfFalse
            }
            "POP_JUMP_IF_TRUE" | "POP_JUMP_FORWARD_IF_TRUE" | "POP_JUMP_BACKWARD_IF_TRUE" => {
                Opcode::PopJumpIfTrue
            }
            "CALL" | "CALL_FUNCTION" => Opcode::Call,
            "MAKE_FUNCTION" => Opcode::MakeFunction,
            "POP_TOP" => Opcode::PopTop,
            "RETURN_VALUE" => Opcode::ReturnValue,
            "RETURN_CONST" => Opcode::ReturnConst,
            other => return Err(ExecError::UnsupportedOpcode(other.to_string())),
        };
        Ok(opcode)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded instruction. Immutable once produced by the front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset; the unit jump targets are expressed in.
    pub offset: u32,
    pub opcode: Opcode,
    /// Raw integer operand.
    pub arg: Option<u32>,
    /// Decoded operand: a literal, a name, a comparator or a target offset.
    pub argval: Option<Value>,
}

impl Instruction {
    pub fn new(offset: u32, opcode: Opcode) -> Self {
        Self {
            offset,
            opcode,
            arg: None,
            argval: None,
        }
    }

    pub fn with_arg(mut self, arg: u32) -> Self {
        self.arg = Some(arg);
        self
    }

    pub fn with_argval(mut self, argval: impl Into<Value>) -> Self {
        self.argval = Some(argval.into());
        self
    }

    /// The literal carried by the instruction. A missing operand is None.
    pub fn constant(&self) -> Value {
        self.argval.clone().unwrap_or(Value::None)
    }

    /// The raw operand, required by counting and selector opcodes.
    pub fn count(&self) -> ExecResult<usize> {
        self.arg
            .map(|arg| arg as usize)
            .ok_or_else(|| self.malformed("an integer operand"))
    }

    /// The operand interpreted as a name.
    pub fn name(&self) -> ExecResult<&Arc<str>> {
        match &self.argval {
            Some(Value::Str(name)) => Ok(name),
            _ => Err(self.malformed("a name operand")),
        }
    }

    /// The operand interpreted as a pair of names.
    pub fn name_pair(&self) -> ExecResult<(&Arc<str>, &Arc<str>)> {
        match &self.argval {
            Some(Value::Tuple(items)) => match &items[..] {
                [Value::Str(first), Value::Str(second)] => Ok((first, second)),
                _ => Err(self.malformed("a pair of names")),
            },
            _ => Err(self.malformed("a pair of names")),
        }
    }

    /// The operand interpreted as a comparator symbol.
    pub fn symbol(&self) -> ExecResult<&str> {
        match &self.argval {
            Some(Value::Str(symbol)) => Ok(symbol),
            _ => Err(self.malformed("a comparator operand")),
        }
    }

    /// The target offset of a control-transfer instruction.
    pub fn jump_target(&self) -> ExecResult<i64> {
        if !self.opcode.is_jump() {
            return Err(ExecError::MalformedProgram(format!(
                "{} at offset {} has no jump target",
                self.opcode, self.offset
            )));
        }
        match &self.argval {
            Some(Value::Int(target)) => Ok(*target),
            _ => Err(self.malformed("a jump target offset")),
        }
    }

    fn malformed(&self, expected: &str) -> ExecError {
        ExecError::MalformedProgram(format!(
            "{} at offset {} expects {}",
            self.opcode, self.offset, expected
        ))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6} {}", self.offset, self.opcode)?;
        if let Some(arg) = self.arg {
            write!(f, " {arg}")?;
        }
        if let Some(argval) = &self.argval {
            write!(f, " ({})", argval.repr())?;
        }
        Ok(())
    }
}
