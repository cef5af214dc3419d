//! Programs and the instruction listings they are loaded from.
//!
//! Compilation happens outside this crate. A front-end disassembles each code
//! object into a JSON listing of `(offset, opname, arg, argval)` records, and
//! nested code objects (function bodies) appear as `{"code": {...}}` operands.

use crate::error::{ExecError, ExecResult};
use crate::instruction::{Instruction, Opcode};
use crate::table::OffsetIndex;
use crate::value::Value;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// An instruction sequence together with its offset index.
#[derive(Debug, PartialEq)]
pub struct CodeObject {
    name: String,
    argcount: usize,
    varnames: Vec<Arc<str>>,
    instructions: Vec<Instruction>,
    index: OffsetIndex,
}

impl CodeObject {
    /// Creates a code object, building its offset index.
    ///
    /// # Arguments
    /// * `name` - Name used in diagnostics
    /// * `argcount` - Number of positional parameters
    /// * `varnames` - Local names; the first `argcount` are the parameters
    /// * `instructions` - The instruction sequence
    ///
    /// # Returns
    /// * `Err(ExecError::MalformedProgram)` - Offsets are not strictly increasing
    ///   or there are fewer local names than parameters
    pub fn new(
        name: impl Into<String>,
        argcount: usize,
        varnames: Vec<Arc<str>>,
        instructions: Vec<Instruction>,
    ) -> ExecResult<Self> {
        let name = name.into();
        if argcount > varnames.len() {
            return Err(ExecError::MalformedProgram(format!(
                "code object {name} declares {argcount} parameters but only {} local names",
                varnames.len()
            )));
        }
        let index = OffsetIndex::build(&instructions)?;
        Ok(Self {
            name,
            argcount,
            varnames,
            instructions,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argcount(&self) -> usize {
        self.argcount
    }

    /// Names bound to the positional arguments, in order.
    pub fn params(&self) -> &[Arc<str>] {
        &self.varnames[..self.argcount]
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn offset_index(&self) -> &OffsetIndex {
        &self.index
    }

    /// Translates the jump operand of `instr` into a sequence position.
    pub fn resolve_jump(&self, instr: &Instruction) -> ExecResult<usize> {
        let target = instr.jump_target()?;
        u32::try_from(target)
            .ok()
            .and_then(|offset| self.index.resolve(offset))
            .ok_or(ExecError::UnresolvedJumpTarget {
                opcode: instr.opcode,
                offset: instr.offset,
                target,
            })
    }
}

/// A loaded program: the module-level code object.
#[derive(Debug, Clone)]
pub struct Program {
    code: Arc<CodeObject>,
}

impl Program {
    pub fn new(code: CodeObject) -> Self {
        Self {
            code: Arc::new(code),
        }
    }

    pub fn code(&self) -> &CodeObject {
        &self.code
    }

    /// Builds a module-level program from a bare instruction sequence.
    pub fn from_instructions(instructions: Vec<Instruction>) -> ExecResult<Self> {
        Ok(Self::new(CodeObject::new(
            "<module>",
            0,
            Vec::new(),
            instructions,
        )?))
    }

    /// Parses a JSON instruction listing.
    pub fn from_json(listing: &str) -> Result<Self> {
        let raw: CodeListing =
            serde_json::from_str(listing).context("Failed to parse instruction listing")?;
        let code = raw
            .into_code()
            .context("Failed to build program from instruction listing")?;
        Ok(Self::new(code))
    }

    /// Reads and parses a JSON instruction listing from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let listing = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read listing {}", path.display()))?;
        let program = Self::from_json(&listing)
            .with_context(|| format!("Invalid listing {}", path.display()))?;
        debug!(
            "Loaded {} instructions from {}",
            program.code().instructions().len(),
            path.display()
        );
        Ok(program)
    }
}

#[derive(Debug, Deserialize)]
struct CodeListing {
    #[serde(default = "module_name")]
    name: String,
    #[serde(default)]
    argcount: usize,
    #[serde(default)]
    varnames: Vec<String>,
    instructions: Vec<InstructionListing>,
}

#[derive(Debug, Deserialize)]
struct InstructionListing {
    offset: u32,
    opname: String,
    #[serde(default)]
    arg: Option<u32>,
    #[serde(default)]
    argval: Option<ConstantListing>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConstantListing {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<ConstantListing>),
    Code { code: Box<CodeListing> },
}

fn module_name() -> String {
    "<module>".to_string()
}

impl CodeListing {
    fn into_code(self) -> ExecResult<CodeObject> {
        let instructions = self
            .instructions
            .into_iter()
            .map(InstructionListing::into_instruction)
            .collect::<ExecResult<Vec<_>>>()?;
        let varnames = self.varnames.into_iter().map(Arc::from).collect();
        CodeObject::new(self.name, self.argcount, varnames, instructions)
    }
}

impl InstructionListing {
    fn into_instruction(self) -> ExecResult<Instruction> {
        let opcode: Opcode = self.opname.parse()?;
        let argval = self.argval.map(ConstantListing::into_value).transpose()?;
        Ok(Instruction {
            offset: self.offset,
            opcode,
            arg: self.arg,
            argval,
        })
    }
}

impl ConstantListing {
    fn into_value(self) -> ExecResult<Value> {
        Ok(match self {
            ConstantListing::None => Value::None,
            ConstantListing::Bool(b) => Value::Bool(b),
            ConstantListing::Int(i) => Value::Int(i),
            ConstantListing::Float(x) => Value::Float(x),
            ConstantListing::Str(s) => Value::from(s),
            ConstantListing::Tuple(items) => Value::from(
                items
                    .into_iter()
                    .map(ConstantListing::into_value)
                    .collect::<ExecResult<Vec<_>>>()?,
            ),
            ConstantListing::Code { code } => Value::Code(Arc::new(code.into_code()?)),
        })
    }
}
