//! Calls and function creation.

use super::Interpreter;
use super::frame::{Args, Frame};
use crate::error::{ExecError, ExecResult};
use crate::instruction::Instruction;
use crate::program::CodeObject;
use crate::value::Value;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

impl<W: Write> Interpreter<W> {
    /// Executes a call with `argc` positional arguments.
    ///
    /// The callee sits beneath the arguments, next to a no-bound-method
    /// marker that may be on either side of it:
    ///
    /// ```text
    /// [.., NULL, callee, arg0 .. argN]   marker pushed first
    /// [.., callee, NULL, arg0 .. argN]   marker pushed after the callee
    /// [.., callee, arg0 .. argN]         no marker
    /// ```
    ///
    /// All of it is consumed and the result is pushed.
    pub(super) fn call_from_stack(&mut self, frame: &mut Frame<'_>, argc: usize) -> ExecResult<()> {
        frame.require(argc + 1)?;
        let args = frame.pop_n(argc)?;
        let mut callee = frame.pop()?;
        if callee == Value::Null {
            callee = frame.pop()?;
        } else if frame.peek() == Some(&Value::Null) {
            frame.pop()?;
        }
        let result = self.call(callee, args)?;
        frame.push(result);
        Ok(())
    }

    fn call(&mut self, callee: Value, args: Args) -> ExecResult<Value> {
        match callee {
            Value::Builtin(builtin) => {
                debug!("Calling builtin {} with {} arguments", builtin.name(), args.len());
                builtin.call(&mut self.out, &args)
            }
            Value::Function(code) => self.call_function(&code, args),
            other => Err(ExecError::TypeError(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Runs a function body in a fresh frame with its parameters bound.
    fn call_function(&mut self, code: &CodeObject, args: Args) -> ExecResult<Value> {
        if args.len() != code.argcount() {
            return Err(ExecError::TypeError(format!(
                "{}() takes {} positional arguments but {} were given",
                code.name(),
                code.argcount(),
                args.len()
            )));
        }
        let limit = self.config.max_call_depth();
        if self.call_depth >= limit {
            return Err(ExecError::RecursionLimit(limit));
        }

        let locals: HashMap<Arc<str>, Value> = code.params().iter().cloned().zip(args).collect();
        let mut callee_frame = Frame::function(code, locals);

        self.call_depth += 1;
        info!("Entering {} (call depth {})", code.name(), self.call_depth);
        let result = self.execute(&mut callee_frame);
        self.call_depth -= 1;

        debug!("Leaving {}", code.name());
        result
    }

    /// Wraps a code object into a function value.
    ///
    /// Default arguments, closures and annotations are not supported; their
    /// presence is signalled by non-zero flags.
    pub(super) fn make_function(
        &mut self,
        frame: &mut Frame<'_>,
        instr: &Instruction,
    ) -> ExecResult<()> {
        let flags = instr.arg.unwrap_or(0);
        if flags != 0 {
            return Err(ExecError::UnsupportedFeature(format!(
                "MAKE_FUNCTION with flags {flags:#x} at offset {}",
                instr.offset
            )));
        }
        // Older listings push the qualified name above the code object.
        if let Some(Value::Str(_)) = frame.peek() {
            frame.require(2)?;
            frame.pop()?;
        }
        match frame.pop()? {
            Value::Code(code) => {
                debug!("Created function {}", code.name());
                frame.push(Value::Function(code));
                Ok(())
            }
            other => Err(ExecError::TypeError(format!(
                "MAKE_FUNCTION expects a code object, found '{}'",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;
    use crate::interpreter::EngineConfig;
    use crate::program::Program;

    fn i(offset: u32, opcode: Opcode) -> Instruction {
        Instruction::new(offset, opcode)
    }

    fn print_call(layout: &[Instruction]) -> String {
        let mut instructions = layout.to_vec();
        instructions.push(i(20, Opcode::PopTop));
        let program = Program::from_instructions(instructions).unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        interpreter.run(&program).unwrap();
        String::from_utf8(interpreter.into_output()).unwrap()
    }

    /// `def add(a, b): return a + b`
    fn add_function() -> Value {
        let body = vec![
            i(0, Opcode::LoadFast).with_argval("a"),
            i(2, Opcode::LoadFast).with_argval("b"),
            i(4, Opcode::BinaryOp).with_arg(0),
            i(8, Opcode::ReturnValue),
        ];
        let code = CodeObject::new("add", 2, vec![Arc::from("a"), Arc::from("b")], body).unwrap();
        Value::Code(Arc::new(code))
    }

    #[test]
    fn test_null_before_callee() {
        let output = print_call(&[
            i(0, Opcode::PushNull),
            i(2, Opcode::LoadName).with_argval("print"),
            i(4, Opcode::LoadConst).with_argval("hi"),
            i(6, Opcode::Call).with_arg(1),
        ]);
        assert_eq!(output, "hi\n");
    }

    #[test]
    fn test_null_after_callee() {
        let output = print_call(&[
            i(0, Opcode::LoadName).with_argval("print"),
            i(2, Opcode::PushNull),
            i(4, Opcode::LoadConst).with_argval("hi"),
            i(6, Opcode::Call).with_arg(1),
        ]);
        assert_eq!(output, "hi\n");
    }

    #[test]
    fn test_no_null_marker() {
        let output = print_call(&[
            i(0, Opcode::LoadName).with_argval("print"),
            i(2, Opcode::LoadConst).with_argval("hi"),
            i(4, Opcode::LoadConst).with_argval(2i64),
            i(6, Opcode::Call).with_arg(2),
        ]);
        assert_eq!(output, "hi 2\n");
    }

    #[test]
    fn test_call_consumes_whole_layout() {
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval("below"),
            i(2, Opcode::PushNull),
            i(4, Opcode::LoadName).with_argval("len"),
            i(6, Opcode::LoadConst).with_argval("abcd"),
            i(8, Opcode::Call).with_arg(1),
        ])
        .unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        let mut frame = Frame::module(program.code());
        for _ in 0..5 {
            interpreter.step(&mut frame).unwrap();
        }
        assert_eq!(frame.stack(), &[Value::from("below"), Value::Int(4)]);
    }

    #[test]
    fn test_call_underflow() {
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval(1i64),
            i(2, Opcode::Call).with_arg(1),
        ])
        .unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        assert!(matches!(
            interpreter.run(&program),
            Err(ExecError::StackUnderflow {
                opcode: Opcode::Call,
                needed: 2,
                depth: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_not_callable() {
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval(3i64),
            i(2, Opcode::Call).with_arg(0),
        ])
        .unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        let err = interpreter.run(&program).unwrap_err();
        assert_eq!(err.to_string(), "type error: 'int' object is not callable");
    }

    #[test]
    fn test_define_and_call_function() {
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval(add_function()),
            i(2, Opcode::MakeFunction).with_arg(0),
            i(4, Opcode::StoreName).with_argval("add"),
            i(6, Opcode::PushNull),
            i(8, Opcode::LoadName).with_argval("add"),
            i(10, Opcode::LoadConst).with_argval(2i64),
            i(12, Opcode::LoadConst).with_argval(3i64),
            i(14, Opcode::Call).with_arg(2),
            i(22, Opcode::ReturnValue),
        ])
        .unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        assert_eq!(interpreter.run(&program).unwrap(), Value::Int(5));
        assert!(matches!(interpreter.global("add"), Some(Value::Function(_))));
        assert!(interpreter.global("a").is_none());
    }

    #[test]
    fn test_make_function_drops_qualified_name() {
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval(add_function()),
            i(2, Opcode::LoadConst).with_argval("add"),
            i(4, Opcode::MakeFunction).with_arg(0),
            i(6, Opcode::ReturnValue),
        ])
        .unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        let value = interpreter.run(&program).unwrap();
        assert_eq!(value.repr().to_string(), "<function add>");
    }

    #[test]
    fn test_arity_mismatch() {
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval(add_function()),
            i(2, Opcode::MakeFunction),
            i(4, Opcode::LoadConst).with_argval(1i64),
            i(6, Opcode::Call).with_arg(1),
        ])
        .unwrap();
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        let err = interpreter.run(&program).unwrap_err();
        assert!(err.to_string().contains("add() takes 2 positional arguments but 1 were given"));
    }

    #[test]
    fn test_recursion_limit() {
        // def f(): return f()
        let body = vec![
            i(0, Opcode::LoadGlobal).with_arg(1).with_argval("f"),
            i(10, Opcode::Call).with_arg(0),
            i(18, Opcode::ReturnValue),
        ];
        let code = CodeObject::new("f", 0, Vec::new(), body).unwrap();
        let program = Program::from_instructions(vec![
            i(0, Opcode::LoadConst).with_argval(Value::Code(Arc::new(code))),
            i(2, Opcode::MakeFunction),
            i(4, Opcode::StoreName).with_argval("f"),
            i(6, Opcode::LoadName).with_argval("f"),
            i(8, Opcode::Call).with_arg(0),
        ])
        .unwrap();
        let config = EngineConfig::new(8).unwrap();
        let mut interpreter = Interpreter::with_config(config, Vec::<u8>::new());
        assert!(matches!(
            interpreter.run(&program),
            Err(ExecError::RecursionLimit(8))
        ));
    }
}
