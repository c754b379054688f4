use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::compiler::ast::{BinaryOp, Block, Expr, HandleClause, Literal, UnaryOp};
use crate::compiler::error::CompileError;
use crate::compiler::scope::FunctionScope;
use crate::vm::{Function, Opcode, Value};

/// Name given to the top-level function.
pub const SCRIPT_NAME: &str = "<script>";

/// Write-only placeholder name, e.g. for an unused handler parameter.
pub const WILDCARD: &str = "_";

/// Where an assignment writes.
enum StoreTarget {
    Slot(u8),
    Global(u8),
}

/// Compiles a syntax tree into bytecode.
///
/// The function being compiled is `current`; the functions lexically
/// enclosing it wait in `enclosing`, outermost (the script) first. Scope
/// level `k` is `enclosing[k]`, or `current` when `k == enclosing.len()`.
pub struct Compiler {
    current: FunctionScope,
    enclosing: Vec<FunctionScope>,
}

impl Compiler {
    /// Compile a whole program into the top-level function.
    pub fn compile_script(program: &Block) -> Result<Rc<Function>, CompileError> {
        let line = program.span.line as u32;
        let mut compiler = Compiler {
            current: FunctionScope::new(SCRIPT_NAME, &[], line)?,
            enclosing: Vec::new(),
        };
        compiler.compile_block(program)?;
        let end_line = compiler.current.last_line().unwrap_or(line);
        compiler.current.emit(Opcode::Return, &[], end_line);
        Ok(Rc::new(finish(compiler.current)))
    }

    fn level(&self) -> usize {
        self.enclosing.len()
    }

    fn scope_mut(&mut self, level: usize) -> &mut FunctionScope {
        if level < self.enclosing.len() {
            &mut self.enclosing[level]
        } else {
            &mut self.current
        }
    }

    /// Compile a nested function body in a fresh scope.
    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &Block,
        line: u32,
    ) -> Result<Rc<Function>, CompileError> {
        let scope = FunctionScope::new(name, params, line)?;
        let outer = mem::replace(&mut self.current, scope);
        self.enclosing.push(outer);

        let result = self.compile_function_body(name, body, line);

        let outer = self.enclosing.pop().unwrap_or_default();
        let inner = mem::replace(&mut self.current, outer);
        result?;
        Ok(Rc::new(finish(inner)))
    }

    fn compile_function_body(
        &mut self,
        name: &str,
        body: &Block,
        line: u32,
    ) -> Result<(), CompileError> {
        self.current.add_comment(name, line);
        self.compile_block(body)?;
        let end_line = self.current.last_line().unwrap_or(line);
        self.current.emit(Opcode::Return, &[], end_line);
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let Some((last, init)) = block.exprs.split_last() else {
            self.current.emit_statement_nil(block.span.line as u32);
            return Ok(());
        };
        for expr in init {
            self.compile_expr(expr)?;
            self.current.discard(expr.span().line as u32);
        }
        self.compile_expr(last)
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let line = expr.span().line as u32;
        match expr {
            Expr::Literal { value, .. } => self.compile_literal(value, line),
            Expr::Ident { name, .. } => self.load_variable(name, line),
            Expr::Assign { target, value, .. } => {
                let Expr::Ident { name, .. } = target.as_ref() else {
                    return Err(CompileError::Unsupported {
                        what: format!("assignment to {}", target.kind_name()),
                        line: line as usize,
                    });
                };
                self.compile_expr(value)?;
                let target = self.store_target(name, line)?;
                self.emit_store(target, line);
                self.current.emit_statement_nil(line);
                Ok(())
            }
            Expr::FnDef(def) => {
                let target = self.store_target(&def.name, line)?;
                let (params, body) = (&def.params, &def.body);
                let function = self.compile_function(&def.name, params, body, line)?;
                self.emit_closure(function, line)?;
                self.emit_store(target, line);
                self.current.emit_statement_nil(line);
                Ok(())
            }
            Expr::Block(block) => self.compile_block(block),
            Expr::Binary {
                op, left, right, ..
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let (opcode, negate) = match op {
                    BinaryOp::Add => (Opcode::Add, false),
                    BinaryOp::Sub => (Opcode::Sub, false),
                    BinaryOp::Mul => (Opcode::Mul, false),
                    BinaryOp::Div => (Opcode::Div, false),
                    BinaryOp::Eq => (Opcode::Eq, false),
                    BinaryOp::Ne => (Opcode::Eq, true),
                    BinaryOp::Lt => (Opcode::Lt, false),
                    BinaryOp::Le => (Opcode::Gt, true),
                    BinaryOp::Gt => (Opcode::Gt, false),
                    BinaryOp::Ge => (Opcode::Lt, true),
                };
                self.current.emit(opcode, &[], line);
                if negate {
                    self.current.emit(Opcode::Not, &[], line);
                }
                Ok(())
            }
            Expr::Unary { op, operand, .. } => {
                self.compile_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                };
                self.current.emit(opcode, &[], line);
                Ok(())
            }
            Expr::Call { callee, args, .. } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let Ok(argc) = u8::try_from(args.len()) else {
                    let limit = u8::MAX as usize;
                    return Err(CompileError::too_many("arguments", limit, line));
                };
                self.current.emit(Opcode::Call, &[argc], line);
                Ok(())
            }
            Expr::If {
                condition,
                then_block,
                else_branch,
                ..
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.current.emit_jump(Opcode::JumpIfFalse, line);
                self.compile_block(then_block)?;
                let end_jump = self.current.emit_jump(Opcode::Jump, line);
                self.current.patch_jump(else_jump, line)?;
                match else_branch {
                    Some(branch) => self.compile_expr(branch)?,
                    None => {
                        self.current.emit(Opcode::Nil, &[], line);
                    }
                }
                self.current.patch_jump(end_jump, line)
            }
            Expr::While {
                condition, body, ..
            } => {
                let loop_start = self.current.label();
                self.compile_expr(condition)?;
                let exit_jump = self.current.emit_jump(Opcode::JumpIfFalse, line);
                self.compile_block(body)?;
                self.current.discard(line);
                self.current.emit_loop(loop_start, line)?;
                self.current.patch_jump(exit_jump, line)?;
                self.current.emit_statement_nil(line);
                Ok(())
            }
            Expr::Try { body, handlers, .. } => self.compile_try(body, handlers, line),
            Expr::Do {
                effect, payload, ..
            } => {
                match payload {
                    Some(payload) => self.compile_expr(payload)?,
                    None => {
                        self.current.emit(Opcode::Nil, &[], line);
                    }
                }
                let index = self.current.name_index(effect, line)?;
                self.current.emit(Opcode::Do, &[index], line);
                Ok(())
            }
        }
    }

    fn compile_literal(&mut self, value: &Literal, line: u32) -> Result<(), CompileError> {
        let constant = match value {
            Literal::Unit => {
                self.current.emit(Opcode::Nil, &[], line);
                return Ok(());
            }
            Literal::Bool(true) => {
                self.current.emit(Opcode::True, &[], line);
                return Ok(());
            }
            Literal::Bool(false) => {
                self.current.emit(Opcode::False, &[], line);
                return Ok(());
            }
            Literal::Int(n) => Value::Int(*n),
            Literal::Str(s) => Value::str(s),
            Literal::Float(_) => {
                return Err(CompileError::Unsupported {
                    what: "float literal".to_string(),
                    line: line as usize,
                });
            }
        };
        let index = self.current.add_constant(constant, line)?;
        self.current.emit(Opcode::LoadConst, &[index], line);
        Ok(())
    }

    /// Handler clauses compile to one-parameter closures registered before
    /// the body runs; every `SET_HANDLER` jumps to the end of the `try`.
    fn compile_try(
        &mut self,
        body: &Block,
        handlers: &[HandleClause],
        line: u32,
    ) -> Result<(), CompileError> {
        let Ok(count) = u8::try_from(handlers.len()) else {
            let limit = u8::MAX as usize;
            return Err(CompileError::too_many("handlers", limit, line));
        };

        let mut sites = Vec::with_capacity(handlers.len());
        for clause in handlers {
            let clause_line = clause.span.line as u32;
            let name = format!("handle {}", clause.effect);
            let params = std::slice::from_ref(&clause.param);
            let function = self.compile_function(&name, params, &clause.body, clause_line)?;
            self.emit_closure(function, clause_line)?;
            let effect = self.current.name_index(&clause.effect, clause_line)?;
            sites.push(self.current.emit_set_handler(effect, clause_line));
        }

        self.compile_block(body)?;
        self.current.emit(Opcode::PopHandlers, &[count], line);
        for site in sites {
            self.current.patch_handler(site, line)?;
        }
        Ok(())
    }

    /// Find `name` as a local of the scope at `level`, threading a capture
    /// through every function scope between the defining one and `level`.
    /// The script scope never provides captures.
    fn resolve(
        &mut self,
        level: usize,
        name: &str,
        line: u32,
    ) -> Result<Option<u8>, CompileError> {
        if let Some(slot) = self.scope_mut(level).lookup_local(name) {
            return Ok(Some(slot));
        }
        if level <= 1 {
            return Ok(None);
        }
        let Some(outer_slot) = self.resolve(level - 1, name, line)? else {
            return Ok(None);
        };
        self.scope_mut(level - 1).promote(outer_slot);
        let scope = self.scope_mut(level);
        let slot = scope.declare_capture(name, outer_slot, line)?;
        Ok(Some(slot))
    }

    fn load_variable(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        if name == WILDCARD {
            return Err(CompileError::Unresolved {
                name: name.to_string(),
                line: line as usize,
            });
        }
        match self.resolve(self.level(), name, line)? {
            Some(slot) => {
                let opcode = if self.current.is_heap(slot) {
                    Opcode::LoadHeap
                } else {
                    Opcode::LoadLocal
                };
                self.current.emit(opcode, &[slot], line);
            }
            None => {
                let index = self.current.name_index(name, line)?;
                self.current.emit(Opcode::LoadGlobal, &[index], line);
            }
        }
        Ok(())
    }

    /// Resolve an assignment target, declaring it when it is new: a local in
    /// a function, a global in the script.
    fn store_target(&mut self, name: &str, line: u32) -> Result<StoreTarget, CompileError> {
        let level = self.level();
        if let Some(slot) = self.resolve(level, name, line)? {
            return Ok(StoreTarget::Slot(slot));
        }
        if level == 0 {
            return Ok(StoreTarget::Global(self.current.name_index(name, line)?));
        }
        Ok(StoreTarget::Slot(self.current.declare_local(name, line)?))
    }

    fn emit_closure(&mut self, function: Rc<Function>, line: u32) -> Result<(), CompileError> {
        let index = self.current.add_constant(Value::Function(function), line)?;
        self.current.emit(Opcode::MakeClosure, &[index], line);
        Ok(())
    }

    /// The heap check happens at emission time: compiling a function body
    /// may have promoted the slot in between.
    fn emit_store(&mut self, target: StoreTarget, line: u32) {
        match target {
            StoreTarget::Slot(slot) => {
                let opcode = if self.current.is_heap(slot) {
                    Opcode::StoreHeap
                } else {
                    Opcode::StoreLocal
                };
                self.current.emit(opcode, &[slot], line);
            }
            StoreTarget::Global(index) => {
                self.current.emit(Opcode::StoreGlobal, &[index], line);
            }
        }
    }
}

fn finish(scope: FunctionScope) -> Function {
    let function = scope.finish();
    debug!(
        target: "sable::compiler",
        function = %function.name,
        bytes = function.chunk.code.len(),
        constants = function.chunk.constants.len(),
        locals = function.locals,
        captures = function.captures_inner.len(),
        "compiled function"
    );
    function
}
