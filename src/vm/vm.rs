use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::trace;

use super::chunk::{Closure, Function};
use super::debug::TraceEntry;
use super::effects::{EffectLink, Handler};
use super::error::{Exception, HostFault, RuntimeError};
use super::operators::{self, Operator};
use super::ops::{self, Instruction, Opcode};
use super::value::Value;
use crate::builtins::{self, BUILTINS};
use crate::config::RuntimeConfig;

/// A call frame for the VM.
pub(crate) struct Frame {
    pub(crate) closure: Rc<Closure>,
    /// Operand stack
    pub(crate) stack: Vec<Value>,
    capacity: usize,
    /// Slot 0 is the closure itself, then parameters, then locals.
    pub(crate) slots: Vec<Value>,
    pub(crate) ip: usize,
    /// Set on handler frames: where `resume` returns to.
    pub(crate) effect: Option<EffectLink>,
}

impl Frame {
    pub(crate) fn push(&mut self, value: Value) -> Result<(), HostFault> {
        if self.stack.len() >= self.capacity {
            return Err(HostFault::StackOverflow(self.capacity));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, HostFault> {
        self.stack.pop().ok_or(HostFault::StackUnderflow)
    }

    fn function(&self) -> &Function {
        &self.closure.function
    }

    fn slot(&self, slot: u8) -> Result<&Value, HostFault> {
        self.slots
            .get(slot as usize)
            .ok_or_else(|| slot_out_of_range("local", slot, self.function()))
    }

    fn slot_mut(&mut self, slot: u8) -> Result<&mut Value, HostFault> {
        if slot as usize >= self.slots.len() {
            return Err(slot_out_of_range("local", slot, self.function()));
        }
        Ok(&mut self.slots[slot as usize])
    }

    /// Source line of the instruction the frame is executing (or, for a
    /// caller, the `CALL` it is waiting on).
    fn current_line(&self) -> u32 {
        self.function()
            .chunk
            .debug
            .line_at(self.ip.saturating_sub(1))
    }
}

enum ControlFlow {
    Continue,
    Finished(Value),
}

/// The sable virtual machine.
pub struct Vm {
    frames: Vec<Frame>,
    globals: HashMap<String, Value>,
    /// Operator overloads keyed by the left operand's type name.
    methods: HashMap<(String, Operator), Value>,
    pub(crate) handlers: Vec<Handler>,
    config: RuntimeConfig,
    /// Output stream for print statements
    output: Box<dyn Write>,
}

impl Vm {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_output(config, Box::new(io::stdout()))
    }

    pub fn with_output(config: RuntimeConfig, output: Box<dyn Write>) -> Self {
        let mut vm = Self {
            frames: Vec::new(),
            globals: HashMap::new(),
            methods: HashMap::new(),
            handlers: Vec::new(),
            config,
            output,
        };
        for builtin in BUILTINS {
            vm.globals
                .insert(builtin.name.to_string(), Value::Builtin(builtin));
        }
        vm.define_method("list", Operator::Eq, Value::Builtin(&builtins::LIST_EQ));
        vm.define_method("map", Operator::Eq, Value::Builtin(&builtins::MAP_EQ));
        vm
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Register `callable` as the implementation of `op` when the left
    /// operand has type `type_name`.
    pub fn define_method(&mut self, type_name: &str, op: Operator, callable: Value) {
        self.methods.insert((type_name.to_string(), op), callable);
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.output, "{}", line)?;
        self.output.flush()
    }

    /// Run a compiled script to completion.
    pub fn interpret(&mut self, function: Rc<Function>) -> Result<Value, RuntimeError> {
        self.frames.clear();
        self.handlers.clear();
        let closure = Rc::new(Closure::new(function, Vec::new()));
        let result = self
            .push_frame(closure, Vec::new())
            .and_then(|()| self.run());
        result.map_err(|mut err| {
            self.unwind(&mut err);
            err
        })
    }

    fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let frame = self.frame_mut()?;
            let closure = Rc::clone(&frame.closure);
            let instruction = ops::decode(&closure.function.chunk.code, frame.ip)?;
            frame.ip = instruction.next();
            let flow = self.execute(instruction, &closure.function)?;
            if let ControlFlow::Finished(value) = flow {
                return Ok(value);
            }
        }
    }

    /// Record a trace entry per live frame (innermost first) and drop them.
    fn unwind(&mut self, err: &mut RuntimeError) {
        if let Some(trace) = err.trace_mut() {
            for frame in self.frames.iter().rev() {
                let name = frame.function().name.clone();
                trace.push(TraceEntry::new(name, frame.current_line()));
            }
        }
        self.frames.clear();
        self.handlers.clear();
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame, HostFault> {
        self.frames
            .last_mut()
            .ok_or_else(|| HostFault::Corrupt("no active frame".to_string()))
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn frames_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.frames
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), HostFault> {
        self.frame_mut()?.push(value)
    }

    pub(crate) fn pop(&mut self) -> Result<Value, HostFault> {
        self.frame_mut()?.pop()
    }

    fn execute(
        &mut self,
        instruction: Instruction,
        function: &Function,
    ) -> Result<ControlFlow, RuntimeError> {
        let chunk = &function.chunk;
        match instruction.opcode {
            Opcode::LoadConst => {
                let index = instruction.byte();
                let Some(value) = chunk.constant(index).cloned() else {
                    let message = format!("constant {} out of range", index);
                    return Err(HostFault::Corrupt(message).into());
                };
                self.push(value)?;
            }
            Opcode::Nil => self.push(Value::Nil)?,
            Opcode::True => self.push(Value::Bool(true))?,
            Opcode::False => self.push(Value::Bool(false))?,
            Opcode::LoadLocal => {
                let frame = self.frame_mut()?;
                let value = frame.slot(instruction.byte())?.clone();
                frame.push(value)?;
            }
            Opcode::StoreLocal => {
                let frame = self.frame_mut()?;
                let value = frame.pop()?;
                *frame.slot_mut(instruction.byte())? = value;
            }
            Opcode::LoadHeap => {
                let frame = self.frame_mut()?;
                let value = match frame.slot(instruction.byte())? {
                    Value::Box(cell) => cell.borrow().clone(),
                    other => return Err(not_a_box(instruction, other).into()),
                };
                frame.push(value)?;
            }
            Opcode::StoreHeap => {
                let frame = self.frame_mut()?;
                let value = frame.pop()?;
                match frame.slot(instruction.byte())? {
                    Value::Box(cell) => *cell.borrow_mut() = value,
                    other => return Err(not_a_box(instruction, other).into()),
                }
            }
            Opcode::LoadGlobal => {
                let name = operand_name(function, instruction.byte())?;
                let value = self
                    .globals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Exception::undefined_name(name))?;
                self.push(value)?;
            }
            Opcode::StoreGlobal => {
                let name = operand_name(function, instruction.byte())?;
                let value = self.pop()?;
                self.globals.insert(name.to_string(), value);
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Swap => {
                let frame = self.frame_mut()?;
                let len = frame.stack.len();
                if len < 2 {
                    return Err(HostFault::StackUnderflow.into());
                }
                frame.stack.swap(len - 1, len - 2);
            }
            Opcode::Jump => {
                self.frame_mut()?.ip += instruction.short() as usize;
            }
            Opcode::JumpIfFalse => {
                let frame = self.frame_mut()?;
                if !frame.pop()?.is_truthy() {
                    frame.ip += instruction.short() as usize;
                }
            }
            Opcode::Loop => {
                let frame = self.frame_mut()?;
                let Some(target) = frame.ip.checked_sub(instruction.short() as usize) else {
                    let offset = instruction.offset;
                    let message = format!("LOOP at offset {} jumps before code start", offset);
                    return Err(HostFault::Corrupt(message).into());
                };
                frame.ip = target;
            }
            Opcode::Call => self.call(instruction.byte() as usize)?,
            Opcode::Return => {
                if let Some(value) = self.return_from_frame()? {
                    return Ok(ControlFlow::Finished(value));
                }
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Eq
            | Opcode::Lt
            | Opcode::Gt => {
                let Some(op) = Operator::from_opcode(instruction.opcode) else {
                    let mnemonic = instruction.opcode.mnemonic();
                    let message = format!("{} is not an operator", mnemonic);
                    return Err(HostFault::Corrupt(message).into());
                };
                self.binary_op(op)?;
            }
            Opcode::Neg => self.negate()?,
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()))?;
            }
            Opcode::MakeClosure => self.make_closure(function, instruction.byte())?,
            Opcode::SetHandler => {
                let name = operand_name(function, instruction.byte())?.to_string();
                let distance = instruction.trailing_short() as usize;
                self.set_handler(name, distance)?;
            }
            Opcode::Do => {
                let name = operand_name(function, instruction.byte())?.to_string();
                self.perform(name)?;
            }
            Opcode::PopHandlers => {
                let count = instruction.byte() as usize;
                let keep = self.handlers.len().saturating_sub(count);
                self.handlers.truncate(keep);
            }
            Opcode::Comment => {}
        }
        Ok(ControlFlow::Continue)
    }

    /// Call protocol: callee sits beneath `argc` arguments on the current
    /// frame's stack.
    pub(crate) fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let frame = self.frame_mut()?;
        let base = frame
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(HostFault::StackUnderflow)?;
        let mut args = frame.stack.split_off(base);
        let callee = args.remove(0);
        self.call_value(callee, args)
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<(), RuntimeError> {
        match callee {
            Value::Closure(closure) => {
                let function = &closure.function;
                if args.len() != function.arity {
                    return Err(Exception::type_error(format!(
                        "{} expects {} arguments, got {}",
                        function.name,
                        function.arity,
                        args.len()
                    ))
                    .into());
                }
                let depth = self.frames.len();
                trace!(target: "sable::vm", function = %function.name, depth, "call");
                self.push_frame(closure, args)
            }
            Value::Builtin(builtin) => {
                builtin.check_arity(args.len())?;
                trace!(target: "sable::vm", builtin = builtin.name, "call builtin");
                let result = (builtin.func)(self, args)?;
                self.push(result)?;
                Ok(())
            }
            other => {
                let message = format!("{} is not callable", other.type_name());
                Err(Exception::type_error(message).into())
            }
        }
    }

    fn push_frame(&mut self, closure: Rc<Closure>, args: Vec<Value>) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_frames {
            return Err(HostFault::FrameOverflow(self.config.max_frames).into());
        }
        let function = &closure.function;
        let mut slots = Vec::with_capacity(function.locals.max(args.len() + 1));
        slots.push(Value::Closure(Rc::clone(&closure)));
        slots.extend(args);
        if slots.len() < function.locals {
            slots.resize(function.locals, Value::Nil);
        }

        for (&slot, cell) in function.captures_inner.iter().zip(&closure.boxes) {
            let Some(target) = slots.get_mut(slot as usize) else {
                return Err(slot_out_of_range("capture", slot, function).into());
            };
            *target = Value::Box(Rc::clone(cell));
        }
        for &slot in &function.heap_slots {
            if function.captures_inner.contains(&slot) {
                continue;
            }
            let Some(target) = slots.get_mut(slot as usize) else {
                return Err(slot_out_of_range("heap", slot, function).into());
            };
            let value = std::mem::replace(target, Value::Nil);
            *target = Value::Box(Value::new_box(value));
        }

        let capacity = self.config.stack_capacity;
        self.frames.push(Frame {
            closure,
            stack: Vec::with_capacity(capacity.min(16)),
            capacity,
            slots,
            ip: 0,
            effect: None,
        });
        Ok(())
    }

    fn return_from_frame(&mut self) -> Result<Option<Value>, RuntimeError> {
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| HostFault::Corrupt("return without a frame".to_string()))?;
        let value = frame.pop()?;
        if !frame.stack.is_empty() {
            return Err(HostFault::UnbalancedStack {
                function: frame.function().name.clone(),
                remaining: frame.stack.len(),
            }
            .into());
        }

        let index = self.frames.len();
        while self.handlers.last().is_some_and(|h| h.frame >= index) {
            self.handlers.pop();
        }

        if let Some(link) = frame.effect.take() {
            self.abandon(link, value)?;
            return Ok(None);
        }
        match self.frames.last_mut() {
            Some(caller) => {
                caller.push(value)?;
                Ok(None)
            }
            None => Ok(Some(value)),
        }
    }

    fn method_for(&self, value: &Value, op: Operator) -> Option<Value> {
        self.methods
            .get(&(value.type_name().to_string(), op))
            .cloned()
    }

    fn binary_op(&mut self, op: Operator) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        if let Some(result) = operators::binary(op, &left, &right) {
            self.push(result?)?;
            return Ok(());
        }
        if let Some(method) = self.method_for(&left, op) {
            self.push(method)?;
            self.push(left)?;
            self.push(right)?;
            return self.call(2);
        }
        self.push(operators::fallback(op, &left, Some(&right))?)?;
        Ok(())
    }

    fn negate(&mut self) -> Result<(), RuntimeError> {
        let operand = self.pop()?;
        if let Some(result) = operators::unary(Operator::Neg, &operand) {
            self.push(result?)?;
            return Ok(());
        }
        if let Some(method) = self.method_for(&operand, Operator::Neg) {
            self.push(method)?;
            self.push(operand)?;
            return self.call(1);
        }
        self.push(operators::fallback(Operator::Neg, &operand, None)?)?;
        Ok(())
    }

    fn make_closure(&mut self, function: &Function, index: u8) -> Result<(), RuntimeError> {
        let template = match function.chunk.constant(index) {
            Some(Value::Function(template)) => Rc::clone(template),
            _ => {
                let message = format!("MAKE_CLOSURE operand {} is not a function", index);
                return Err(HostFault::Corrupt(message).into());
            }
        };
        let frame = self.frame_mut()?;
        let mut boxes = Vec::with_capacity(template.captures_outer.len());
        for &slot in &template.captures_outer {
            match frame.slot(slot)? {
                Value::Box(cell) => boxes.push(Rc::clone(cell)),
                other => {
                    let owner = &frame.function().name;
                    let found = other.type_name();
                    let message = format!("captured slot {} of '{}' is {}", slot, owner, found);
                    return Err(HostFault::Corrupt(message).into());
                }
            }
        }
        frame.push(Value::Closure(Rc::new(Closure::new(template, boxes))))?;
        Ok(())
    }
}

fn operand_name(function: &Function, index: u8) -> Result<&str, HostFault> {
    let Some(name) = function.chunk.name(index) else {
        let owner = &function.name;
        let message = format!("name {} out of range in '{}'", index, owner);
        return Err(HostFault::Corrupt(message));
    };
    Ok(name)
}

fn slot_out_of_range(kind: &str, slot: u8, function: &Function) -> HostFault {
    let owner = &function.name;
    HostFault::Corrupt(format!("{} slot {} out of range in '{}'", kind, slot, owner))
}

fn not_a_box(instruction: Instruction, found: &Value) -> HostFault {
    HostFault::Corrupt(format!(
        "{} at offset {} found {} instead of a box",
        instruction.opcode.mnemonic(),
        instruction.offset,
        found.type_name()
    ))
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::vm::chunk::Chunk;
    use crate::vm::error::ExceptionKind;
    use std::cell::RefCell;

    /// Shared buffer so tests can read what `print` wrote.
    #[derive(Clone, Default)]
    struct SharedOutput(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run_code(source: &str) -> Result<Value, RuntimeError> {
        run_with_config(source, RuntimeConfig::default())
    }

    fn run_with_config(source: &str, config: RuntimeConfig) -> Result<Value, RuntimeError> {
        let function = compile_source(source, "test.sbl").unwrap();
        let mut vm = Vm::with_output(config, Box::new(io::sink()));
        vm.interpret(function)
    }

    fn run_output(source: &str) -> String {
        let output = SharedOutput::default();
        let function = compile_source(source, "test.sbl").unwrap();
        let mut vm = Vm::with_output(RuntimeConfig::default(), Box::new(output.clone()));
        vm.interpret(function).unwrap();
        let bytes = output.0.borrow().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn hand_built(code: Vec<u8>, constants: Vec<Value>) -> Rc<Function> {
        let lines = vec![1; code.len()];
        let mut chunk = Chunk::new();
        chunk.code = code;
        chunk.constants = constants;
        chunk.debug.lines = lines;
        Rc::new(Function {
            name: "<script>".to_string(),
            locals: 1,
            chunk,
            ..Function::default()
        })
    }

    fn exception_kind(source: &str) -> Option<ExceptionKind> {
        match run_code(source) {
            Err(RuntimeError::Exception(e)) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run_code("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(run_code("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(run_code("-4 + 10 / 3").unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_simple_function() {
        assert_eq!(run_code("fn x(y) { y + 1 }; x(4)").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_nested_assignment_through_capture() {
        let source = "fn f() { a = 1; fn g() { a = a + 1 }; g(); a }; f()";
        assert_eq!(run_code(source).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_closures_capture_per_activation() {
        let source = "
            fn f(x) { fn g(y) { x + y }; g }
            add1 = f(1)
            add3 = f(3)
            add1(2) + add3(4)
        ";
        assert_eq!(run_code(source).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_shared_box_between_sibling_closures() {
        let source = "
            fn counter() {
                n = 0
                fn inc() { n = n + 1 }
                fn get() { n }
                list(inc, get)
            }
            pair = counter()
            inc = nth(pair, 0)
            get = nth(pair, 1)
            inc()
            inc()
            get()
        ";
        assert_eq!(run_code(source).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_recursion() {
        let source = "
            fn fib(n) { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } }
            fib(15)
        ";
        assert_eq!(run_code(source).unwrap(), Value::Int(610));
    }

    #[test]
    fn test_while_loop() {
        let source = "
            fn sum(n) {
                total = 0
                i = 0
                while i < n { i = i + 1; total = total + i }
                total
            }
            sum(10)
        ";
        assert_eq!(run_code(source).unwrap(), Value::Int(55));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run_code("1 != 2").unwrap(), Value::Bool(true));
        assert_eq!(run_code("2 <= 2").unwrap(), Value::Bool(true));
        assert_eq!(run_code("1 >= 2").unwrap(), Value::Bool(false));
        assert_eq!(run_code("!nil").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_list_equality_uses_method_table() {
        let equal = run_code("list(1, 2) == list(1, 2)").unwrap();
        assert_eq!(equal, Value::Bool(true));
        assert_eq!(run_code("list(1) == list(2)").unwrap(), Value::Bool(false));
        assert_eq!(run_code("list(1) == 1").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_list_concat_keeps_operands() {
        let source = "a = list(1, 2); b = list(3); c = a + b; print(a, b, c)";
        assert_eq!(run_output(source), "[1, 2] [3] [1, 2, 3]\n");
    }

    #[test]
    fn test_user_method() {
        let source = r#"
            fn add_maps(a, b) { put(a, "sum", get(a, "v") + get(b, "v")) }
            method("map", "add", add_maps)
            m = map("v", 2) + map("v", 3)
            get(m, "sum")
        "#;
        assert_eq!(run_code(source).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_type_errors() {
        let type_error = Some(ExceptionKind::TypeError);
        assert_eq!(exception_kind("1 + \"a\""), type_error);
        assert_eq!(exception_kind("3(1)"), type_error);
        assert_eq!(exception_kind("fn f(a) { a }; f(1, 2)"), type_error);
        let undefined = Some(ExceptionKind::UndefinedName);
        assert_eq!(exception_kind("missing"), undefined);
    }

    #[test]
    fn test_exception_trace() {
        let source = "fn inner() {\n  raise(\"boom\")\n}\nfn outer() {\n  inner()\n}\nouter()";
        let err = run_code(source).unwrap_err();
        let trace: Vec<(String, u32)> = err
            .trace()
            .iter()
            .map(|e| (e.function.clone(), e.line))
            .collect();
        assert_eq!(
            trace,
            vec![
                ("inner".to_string(), 2),
                ("outer".to_string(), 5),
                ("<script>".to_string(), 7),
            ]
        );
    }

    #[test]
    fn test_print() {
        assert_eq!(run_output("print(\"hi\", 1, nil)"), "hi 1 nil\n");
    }

    #[test]
    fn test_frame_overflow() {
        let config = RuntimeConfig {
            max_frames: 16,
            ..RuntimeConfig::default()
        };
        let source = "fn f(n) { f(n + 1) }; f(0)";
        let err = run_with_config(source, config).unwrap_err();
        assert!(matches!(err, RuntimeError::HostFault(HostFault::FrameOverflow(16))));
    }

    #[test]
    fn test_stack_overflow() {
        let function = hand_built(
            vec![Opcode::Nil as u8, Opcode::Nil as u8, Opcode::Nil as u8],
            vec![],
        );
        let config = RuntimeConfig {
            stack_capacity: 2,
            ..RuntimeConfig::default()
        };
        let err = Vm::new(config).interpret(function).unwrap_err();
        assert!(matches!(err, RuntimeError::HostFault(HostFault::StackOverflow(2))));
    }

    #[test]
    fn test_unbalanced_stack() {
        let function = hand_built(
            vec![Opcode::Nil as u8, Opcode::True as u8, Opcode::Return as u8],
            vec![],
        );
        let err = Vm::default().interpret(function).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::HostFault(HostFault::UnbalancedStack { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let function = hand_built(vec![Opcode::Nil as u8, 0xee], vec![]);
        let err = Vm::default().interpret(function).unwrap_err();
        let expected = HostFault::UnknownOpcode {
            byte: 0xee,
            offset: 1,
        };
        assert!(matches!(&err, RuntimeError::HostFault(fault) if *fault == expected));
        assert!(err.trace().is_empty());
    }

    #[test]
    fn test_hand_built_chunk() {
        let function = hand_built(
            vec![
                Opcode::LoadConst as u8,
                0,
                Opcode::LoadConst as u8,
                1,
                Opcode::Swap as u8,
                Opcode::Sub as u8,
                Opcode::Return as u8,
            ],
            vec![Value::Int(2), Value::Int(10)],
        );
        assert_eq!(Vm::default().interpret(function).unwrap(), Value::Int(8));
    }

    #[test]
    fn test_vm_reusable_after_error() {
        let mut vm = Vm::with_output(RuntimeConfig::default(), Box::new(io::sink()));
        let bad = compile_source("raise(\"x\")", "a.sbl").unwrap();
        assert!(vm.interpret(bad).is_err());
        let good = compile_source("x = 40; x + 2", "b.sbl").unwrap();
        assert_eq!(vm.interpret(good).unwrap(), Value::Int(42));
        assert_eq!(vm.global("x"), Some(&Value::Int(40)));
    }
}
