//! Execution frames.
//!
//! A frame holds the state of one code object in flight: its program counter,
//! operand stack and, for function bodies, the local variables.

use crate::error::{ExecError, ExecResult};
use crate::instruction::{Instruction, Opcode};
use crate::program::CodeObject;
use crate::value::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Arguments popped for a call. Most calls pass only a handful.
pub type Args = SmallVec<[Value; 4]>;

#[derive(Debug)]
pub struct Frame<'c> {
    code: &'c CodeObject,
    pc: usize,
    stack: Vec<Value>,
    /// `None` for module-level code, whose names live in the global environment.
    locals: Option<HashMap<Arc<str>, Value>>,
    /// Instruction being executed, for diagnostics.
    current: Option<&'c Instruction>,
}

impl<'c> Frame<'c> {
    /// Frame for module-level code.
    pub fn module(code: &'c CodeObject) -> Self {
        Self {
            code,
            pc: 0,
            stack: Vec::new(),
            locals: None,
            current: None,
        }
    }

    /// Frame for a function body with its parameters already bound.
    pub fn function(code: &'c CodeObject, locals: HashMap<Arc<str>, Value>) -> Self {
        Self {
            code,
            pc: 0,
            stack: Vec::new(),
            locals: Some(locals),
            current: None,
        }
    }

    pub fn code(&self) -> &'c CodeObject {
        self.code
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Fetches the next instruction and advances the program counter past it.
    /// Returns `None` once the counter runs off the end of the sequence.
    pub fn fetch(&mut self) -> Option<&'c Instruction> {
        let instr = self.code.instructions().get(self.pc)?;
        self.pc += 1;
        self.current = Some(instr);
        Some(instr)
    }

    /// Moves the program counter to the target of `instr`.
    pub fn jump(&mut self, instr: &Instruction) -> ExecResult<()> {
        self.pc = self.code.resolve_jump(instr)?;
        tracing::trace!("Jump from offset {} to position {}", instr.offset, self.pc);
        Ok(())
    }

    /// Steps over the next instruction when it has the given opcode.
    pub fn skip_if(&mut self, opcode: Opcode) -> bool {
        let matches = self
            .code
            .instructions()
            .get(self.pc)
            .is_some_and(|next| next.opcode == opcode);
        if matches {
            self.pc += 1;
        }
        matches
    }

    /// Moves the program counter past the end, stopping the dispatch loop.
    pub fn finish(&mut self) {
        self.pc = self.code.instructions().len();
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> ExecResult<Value> {
        self.stack.pop().ok_or_else(|| self.underflow(1))
    }

    /// Fails unless the stack holds at least `needed` values.
    pub fn require(&self, needed: usize) -> ExecResult<()> {
        if self.stack.len() < needed {
            return Err(self.underflow(needed));
        }
        Ok(())
    }

    /// Pops `n` values, returning them in push order.
    pub fn pop_n(&mut self, n: usize) -> ExecResult<Args> {
        self.require(n)?;
        let at = self.stack.len() - n;
        Ok(self.stack.drain(at..).collect())
    }

    pub fn peek(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> ExecResult<&mut Value> {
        if self.stack.is_empty() {
            return Err(self.underflow(1));
        }
        let top = self.stack.len() - 1;
        Ok(&mut self.stack[top])
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.as_ref()?.get(name)
    }

    /// Binds a local. Returns the value back when the frame has no locals.
    pub fn set_local(&mut self, name: Arc<str>, value: Value) -> Result<(), Value> {
        match &mut self.locals {
            Some(locals) => {
                locals.insert(name, value);
                Ok(())
            }
            None => Err(value),
        }
    }

    fn underflow(&self, needed: usize) -> ExecError {
        let (opcode, offset) = self
            .current
            .map(|instr| (instr.opcode, instr.offset))
            .unwrap_or((Opcode::Nop, 0));
        ExecError::StackUnderflow {
            opcode,
            offset,
            needed,
            depth: self.stack.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(instructions: Vec<Instruction>) -> CodeObject {
        CodeObject::new("<test>", 0, Vec::new(), instructions).unwrap()
    }

    #[test]
    fn test_new_frame() {
        let code = code(vec![Instruction::new(0, Opcode::Nop)]);
        let frame = Frame::module(&code);
        assert_eq!(frame.pc(), 0);
        assert_eq!(frame.depth(), 0);
    }

    #[test]
    fn test_skip_if_only_matching_opcode() {
        let code = code(vec![
            Instruction::new(0, Opcode::EndFor),
            Instruction::new(2, Opcode::PopTop),
        ]);
        let mut frame = Frame::module(&code);
        assert!(!frame.skip_if(Opcode::PopTop));
        assert_eq!(frame.pc(), 0);
        assert!(frame.skip_if(Opcode::EndFor));
        assert!(frame.skip_if(Opcode::PopTop));
        assert_eq!(frame.pc(), 2);
        assert!(!frame.skip_if(Opcode::PopTop));
    }

    #[test]
    fn test_fetch_advances_until_end() {
        let code = code(vec![
            Instruction::new(0, Opcode::Nop),
            Instruction::new(2, Opcode::PopTop),
        ]);
        let mut frame = Frame::module(&code);
        assert_eq!(frame.fetch().map(|i| i.offset), Some(0));
        assert_eq!(frame.pc(), 1);
        assert_eq!(frame.fetch().map(|i| i.offset), Some(2));
        assert!(frame.fetch().is_none());
    }

    #[test]
    fn test_pop_n_keeps_push_order() {
        let code = code(Vec::new());
        let mut frame = Frame::module(&code);
        for i in 0..5 {
            frame.push(Value::Int(i));
        }
        let args = frame.pop_n(3).unwrap();
        assert_eq!(&args[..], &[Value::Int(2), Value::Int(3), Value::Int(4)]);
        assert_eq!(frame.depth(), 2);
    }

    #[test]
    fn test_underflow_reports_current_instruction() {
        let code = code(vec![Instruction::new(6, Opcode::PopTop)]);
        let mut frame = Frame::module(&code);
        frame.fetch();
        let err = frame.pop().unwrap_err();
        assert!(matches!(
            err,
            ExecError::StackUnderflow {
                opcode: Opcode::PopTop,
                offset: 6,
                needed: 1,
                depth: 0
            }
        ));
    }

    #[test]
    fn test_pop_n_is_all_or_nothing() {
        let code = code(Vec::new());
        let mut frame = Frame::module(&code);
        frame.push(Value::Int(1));
        assert!(frame.pop_n(2).is_err());
        assert_eq!(frame.depth(), 1);
    }

    #[test]
    fn test_module_frame_has_no_locals() {
        let code = code(Vec::new());
        let mut frame = Frame::module(&code);
        assert_eq!(frame.set_local(Arc::from("x"), Value::Int(1)), Err(Value::Int(1)));

        let mut frame = Frame::function(&code, HashMap::new());
        frame.set_local(Arc::from("x"), Value::Int(1)).unwrap();
        assert_eq!(frame.local("x"), Some(&Value::Int(1)));
    }
}
