//! This module provides the execution engine.
//!
//! The engine drives a fetch-decode-execute loop over one code object at a
//! time. Each step fetches the instruction at the program counter, advances
//! the counter, and dispatches on the opcode. Control-transfer opcodes
//! overwrite the counter with a position resolved through the offset index.

mod call;
pub mod frame;
pub mod ops;

use crate::builtins::Builtins;
use crate::error::{ExecError, ExecResult};
use crate::instruction::Opcode;
use crate::program::Program;
use crate::value::{Step, Value};
use frame::Frame;
use ops::{BinaryEval, BinaryOperator, Comparator};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    max_call_depth: usize,
}

impl EngineConfig {
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
    /// Every user call nests the dispatch loop on the native stack, so the
    /// depth must stay well inside the default thread stack size.
    pub const MAX_CALL_DEPTH_LIMIT: usize = 1000;

    /// # Returns
    /// * `Err(ExecError::InvalidConfig)` - `max_call_depth` is zero or above
    ///   [`Self::MAX_CALL_DEPTH_LIMIT`]
    pub fn new(max_call_depth: usize) -> ExecResult<Self> {
        if !(1..=Self::MAX_CALL_DEPTH_LIMIT).contains(&max_call_depth) {
            return Err(ExecError::InvalidConfig(format!(
                "max call depth must be between 1 and {}, got {max_call_depth}",
                Self::MAX_CALL_DEPTH_LIMIT
            )));
        }
        Ok(Self { max_call_depth })
    }

    /// Maximum nesting of user function calls.
    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// One execution engine instance.
///
/// Owns the global environment and the output sink. Instances share nothing,
/// so independent programs may run on separate instances concurrently.
pub struct Interpreter<W: Write> {
    globals: HashMap<Arc<str>, Value>,
    builtins: &'static Builtins,
    config: EngineConfig,
    out: W,
    call_depth: usize,
}

#[derive(Debug, PartialEq)]
pub enum ControlFlow {
    Continue,
    Return(Value),
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Self::with_config(EngineConfig::default(), out)
    }

    pub fn with_config(config: EngineConfig, out: W) -> Self {
        Self {
            globals: HashMap::new(),
            builtins: Builtins::global(),
            config,
            out,
            call_depth: 0,
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs a program to completion and returns its final value.
    ///
    /// Output already written before a failure stays written.
    pub fn run(&mut self, program: &Program) -> ExecResult<Value> {
        let code = program.code();
        info!(
            "Starting interpretation of {} ({} instructions)",
            code.name(),
            code.instructions().len()
        );
        let mut frame = Frame::module(code);
        let result = self.execute(&mut frame);
        let flushed = self.out.flush();
        let value = result?;
        flushed?;
        info!("Program returned: {}", value.repr());
        Ok(value)
    }

    /// Runs the dispatch loop until the frame returns.
    fn execute(&mut self, frame: &mut Frame<'_>) -> ExecResult<Value> {
        loop {
            if let ControlFlow::Return(value) = self.step(frame)? {
                return Ok(value);
            }
        }
    }

    /// Executes a single instruction.
    ///
    /// Running off the end of the sequence is a normal return of None.
    pub fn step(&mut self, frame: &mut Frame<'_>) -> ExecResult<ControlFlow> {
        let Some(instr) = frame.fetch() else {
            debug!("Reached end of {}", frame.code().name());
            return Ok(ControlFlow::Return(Value::None));
        };
        debug!(
            "Executing {} at offset {} (stack depth {})",
            instr.opcode,
            instr.offset,
            frame.depth()
        );

        match instr.opcode {
            Opcode::Nop => {}
            Opcode::PushNull => frame.push(Value::Null),
            Opcode::LoadConst => frame.push(instr.constant()),
            Opcode::LoadName => {
                let name = instr.name()?;
                let value = match frame.local(name) {
                    Some(value) => value.clone(),
                    None => self.load_global(name)?,
                };
                frame.push(value);
            }
            Opcode::LoadGlobal => {
                let name = instr.name()?;
                let value = self.load_global(name)?;
                if instr.arg.is_some_and(|arg| arg & 1 == 1) {
                    frame.push(Value::Null);
                }
                frame.push(value);
            }
            Opcode::LoadFast => {
                let value = load_local(frame, instr.name()?)?;
                frame.push(value);
            }
            Opcode::LoadFastPair => {
                let (first, second) = instr.name_pair()?;
                let first = load_local(frame, first)?;
                let second = load_local(frame, second)?;
                frame.push(first);
                frame.push(second);
            }
            Opcode::StoreName | Opcode::StoreFast => {
                let name = instr.name()?;
                let value = frame.pop()?;
                if let Err(value) = frame.set_local(name.clone(), value) {
                    self.globals.insert(name.clone(), value);
                }
            }
            Opcode::StoreGlobal => {
                let name = instr.name()?;
                let value = frame.pop()?;
                self.globals.insert(name.clone(), value);
            }
            Opcode::BinaryAdd => binary(frame, BinaryOperator::Add)?,
            Opcode::BinaryOp => {
                let selector = instr.count()?;
                match BinaryOperator::from_arg(selector) {
                    Ok(op) => binary(frame, op)?,
                    Err(symbol) => {
                        let (left, right) = pop_pair(frame)?;
                        return Err(ExecError::UnsupportedOperator {
                            op: symbol,
                            lhs: left.type_name(),
                            rhs: right.type_name(),
                        });
                    }
                }
            }
            Opcode::CompareOp => {
                let symbol = instr.symbol()?;
                match symbol.parse::<Comparator>() {
                    Ok(cmp) => binary(frame, cmp)?,
                    Err(symbol) => {
                        let (left, right) = pop_pair(frame)?;
                        return Err(ExecError::UnsupportedOperator {
                            op: symbol,
                            lhs: left.type_name(),
                            rhs: right.type_name(),
                        });
                    }
                }
            }
            Opcode::GetIter => {
                let iterable = frame.pop()?;
                frame.push(Value::Iterator(Box::new(iterable.iterate()?)));
            }
            Opcode::ForIter => {
                let step = match frame.top_mut()? {
                    Value::Iterator(iter) => iter.advance(),
                    other => {
                        return Err(ExecError::TypeError(format!(
                            "FOR_ITER expects an iterator, found '{}'",
                            other.type_name()
                        )));
                    }
                };
                match step {
                    Step::Next(value) => frame.push(value),
                    Step::Exhausted => {
                        frame.pop()?;
                        frame.jump(instr)?;
                        // The iterator is already gone: step over the epilogue
                        // that would pop it, which is END_FOR or END_FOR; POP_TOP.
                        if frame.skip_if(Opcode::EndFor) {
                            frame.skip_if(Opcode::PopTop);
                        }
                    }
                }
            }
            Opcode::EndFor => {}
            Opcode::Jump => frame.jump(instr)?,
            Opcode::PopJumpIfFalse => {
                if !frame.pop()?.is_truthy() {
                    frame.jump(instr)?;
                }
            }
            Opcode::PopJumpIfTrue => {
                if frame.pop()?.is_truthy() {
                    frame.jump(instr)?;
                }
            }
            Opcode::Call => {
                let argc = instr.count()?;
                self.call_from_stack(frame, argc)?;
            }
            Opcode::MakeFunction => self.make_function(frame, instr)?,
            Opcode::PopTop => {
                frame.pop()?;
            }
            Opcode::ReturnValue => {
                let value = frame.pop()?;
                frame.finish();
                return Ok(ControlFlow::Return(value));
            }
            Opcode::ReturnConst => {
                frame.finish();
                return Ok(ControlFlow::Return(instr.constant()));
            }
        }
        Ok(ControlFlow::Continue)
    }

    /// Resolves a name in the global environment, then in the builtins.
    fn load_global(&self, name: &str) -> ExecResult<Value> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        self.builtins
            .lookup(name)
            .ok_or_else(|| ExecError::NameNotFound(name.to_string()))
    }
}

fn load_local(frame: &Frame<'_>, name: &str) -> ExecResult<Value> {
    frame
        .local(name)
        .cloned()
        .ok_or_else(|| ExecError::NameNotFound(name.to_string()))
}

/// Pops the right then the left operand.
fn pop_pair(frame: &mut Frame<'_>) -> ExecResult<(Value, Value)> {
    frame.require(2)?;
    let right = frame.pop()?;
    let left = frame.pop()?;
    Ok((left, right))
}

fn binary(frame: &mut Frame<'_>, op: impl BinaryEval) -> ExecResult<()> {
    let (left, right) = pop_pair(frame)?;
    frame.push(op.eval(left, right)?);
    Ok(())
}
