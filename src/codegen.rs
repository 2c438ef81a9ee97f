use crate::error::{Error, Result};
use crate::ir::{cube, Op, Operand, Quadruple, Type};
use crate::memory::{MemoryManager, Value};
use crate::symbols::SymbolTable;

/// Operator-stack entry. The paren sentinel keeps reductions from crossing
/// a parenthesized subexpression's boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StackOp {
    Op(Op),
    Paren,
}

/// What a factor token is: a name to resolve or a literal to intern.
#[derive(Debug, Clone, Copy)]
pub enum Factor<'a> {
    Ident(&'a str),
    Literal(&'a str, Type),
}

/// The quadruple emitter. Owns the quadruple list, the three expression
/// stacks, the jump stack for backpatching, and the memory manager that
/// hands out every address the quadruples mention.
pub struct CodeGen {
    pub quads: Vec<Quadruple>,
    pub memory: MemoryManager,
    operands: Vec<usize>,
    operators: Vec<StackOp>,
    types: Vec<Type>,
    jumps: Vec<usize>,
}

impl CodeGen {
    pub fn new() -> Self {
        Self {
            quads: Vec::new(),
            memory: MemoryManager::new(),
            operands: Vec::new(),
            operators: Vec::new(),
            types: Vec::new(),
            jumps: Vec::new(),
        }
    }

    fn emit(&mut self, quad: Quadruple) -> usize {
        log::trace!("quad {}: {}", self.quads.len(), quad);
        self.quads.push(quad);
        self.quads.len() - 1
    }

    fn patch(&mut self, pos: usize, target: usize) {
        log::debug!("backpatch quad {} -> {}", pos, target);
        self.quads[pos].result = Some(Operand::Idx(target));
    }

    /// Index the next emitted quadruple will get.
    pub fn next_quad(&self) -> usize {
        self.quads.len()
    }

    fn pop_operand(&mut self) -> Result<(usize, Type)> {
        match (self.operands.pop(), self.types.pop()) {
            (Some(addr), Some(ty)) => Ok((addr, ty)),
            _ => Err(Error::MissingOperand),
        }
    }

    fn push_operand(&mut self, addr: usize, ty: Type) {
        self.operands.push(addr);
        self.types.push(ty);
    }

    /// Both expression stacks drained, no operator pending. Holds at the
    /// end of every statement.
    pub fn stacks_empty(&self) -> bool {
        self.operands.is_empty() && self.operators.is_empty() && self.types.is_empty()
    }

    /// Quad 0 is a jump over the function bodies; its target is patched
    /// once the main section starts.
    pub fn handle_program_start(&mut self) {
        self.emit(Quadruple::new(Op::Goto, None, None, None));
    }

    /// The main section starts here: resolve the entry jump.
    pub fn handle_main_start(&mut self) {
        let target = self.next_quad();
        self.patch(0, target);
    }

    /// Resolve an identifier to its declared address and type, or intern a
    /// numeric literal (leading sign included) as a constant. Pushes the
    /// address and type for the pending expression.
    pub fn handle_factor(
        &mut self,
        factor: Factor,
        symbols: &SymbolTable,
        line: usize,
    ) -> Result<Type> {
        let (addr, ty) = match factor {
            Factor::Ident(name) => {
                let ty = symbols.get_type(name, line)?;
                (symbols.get_address(name, line)?, ty)
            }
            Factor::Literal(lit, ty) => {
                let value = match ty {
                    Type::Int => Value::Int(lit.parse().map_err(|_| Error::Lex {
                        line,
                        col: 0,
                        msg: format!("invalid integer literal '{}'", lit),
                    })?),
                    Type::Float => Value::Float(lit.parse().map_err(|_| Error::Lex {
                        line,
                        col: 0,
                        msg: format!("invalid float literal '{}'", lit),
                    })?),
                    _ => Value::Str(lit.to_string()),
                };
                (self.memory.allocate_constant(lit, ty, value)?, ty)
            }
        };
        self.push_operand(addr, ty);
        Ok(ty)
    }

    /// The parser pushes an operator before compiling its right operand.
    pub fn push_operator(&mut self, op: Op) {
        self.operators.push(StackOp::Op(op));
    }

    /// Reduce: pop the pending operator and its two operands, consult the
    /// cube, emit into a fresh temp, push the temp back.
    pub fn handle_op(&mut self) -> Result<()> {
        let op = match self.operators.pop() {
            Some(StackOp::Op(op)) => op,
            _ => return Err(Error::MissingOperand),
        };
        let (right, right_ty) = self.pop_operand()?;
        let (left, left_ty) = self.pop_operand()?;
        let result_ty = cube(op, left_ty, right_ty).ok_or(Error::Incompatible {
            op,
            left: left_ty,
            right: right_ty,
        })?;
        let temp = self.memory.allocate_temp(result_ty)?;
        self.emit(Quadruple::new(
            op,
            Some(Operand::Addr(left)),
            Some(Operand::Addr(right)),
            Some(Operand::Addr(temp)),
        ));
        self.push_operand(temp, result_ty);
        Ok(())
    }

    pub fn handle_open_paren(&mut self) {
        self.operators.push(StackOp::Paren);
    }

    pub fn handle_close_paren(&mut self) -> Result<()> {
        match self.operators.pop() {
            Some(StackOp::Paren) => Ok(()),
            _ => Err(Error::MissingOperand),
        }
    }

    /// Pop the expression result and assign it to `target`.
    pub fn handle_assignment(&mut self, target: usize, target_ty: Type) -> Result<()> {
        let (src, src_ty) = self.pop_operand()?;
        cube(Op::Assign, target_ty, src_ty).ok_or(Error::Incompatible {
            op: Op::Assign,
            left: target_ty,
            right: src_ty,
        })?;
        self.emit(Quadruple::new(
            Op::Assign,
            Some(Operand::Addr(src)),
            None,
            Some(Operand::Addr(target)),
        ));
        Ok(())
    }

    /// Print the pending expression result.
    pub fn handle_print_expr(&mut self) -> Result<()> {
        let (addr, _) = self.pop_operand()?;
        self.emit(Quadruple::new(
            Op::Print,
            Some(Operand::Addr(addr)),
            None,
            None,
        ));
        Ok(())
    }

    /// Print a string literal, interned like any other constant. The
    /// stored text keeps its quotes; the VM strips them.
    pub fn handle_print_str(&mut self, lit: &str) -> Result<()> {
        let addr = self
            .memory
            .allocate_constant(lit, Type::Str, Value::Str(lit.to_string()))?;
        self.emit(Quadruple::new(
            Op::Print,
            Some(Operand::Addr(addr)),
            None,
            None,
        ));
        Ok(())
    }

    fn pop_guard(&mut self) -> Result<usize> {
        let (cond, ty) = self.pop_operand()?;
        if ty != Type::Bool {
            return Err(Error::Incompatible {
                op: Op::GotoF,
                left: ty,
                right: Type::Bool,
            });
        }
        Ok(cond)
    }

    /// After an `if` guard: emit the false-jump and remember it.
    pub fn handle_if(&mut self) -> Result<()> {
        let cond = self.pop_guard()?;
        let idx = self.emit(Quadruple::new(
            Op::GotoF,
            Some(Operand::Addr(cond)),
            None,
            None,
        ));
        self.jumps.push(idx);
        Ok(())
    }

    /// Between the then and else blocks: jump over the else, point the
    /// guard's false-jump just past it.
    pub fn handle_else(&mut self) -> Result<()> {
        let over_else = self.emit(Quadruple::new(Op::Goto, None, None, None));
        let false_jump = self.jumps.pop().ok_or(Error::MissingOperand)?;
        self.patch(false_jump, over_else + 1);
        self.jumps.push(over_else);
        Ok(())
    }

    /// Close the statement: whatever jump is pending lands here.
    pub fn handle_end_if(&mut self) -> Result<()> {
        let pending = self.jumps.pop().ok_or(Error::MissingOperand)?;
        let target = self.next_quad();
        self.patch(pending, target);
        Ok(())
    }

    /// Loop head: the index the back-edge returns to.
    pub fn handle_while_start(&self) -> usize {
        self.next_quad()
    }

    /// After the guard: same false-jump as `if`.
    pub fn handle_while_condition(&mut self) -> Result<()> {
        self.handle_if()
    }

    /// After the body: back-edge to the guard, exit jump past it.
    pub fn handle_while_end(&mut self, start: usize) -> Result<()> {
        self.emit(Quadruple::new(
            Op::Goto,
            None,
            None,
            Some(Operand::Idx(start)),
        ));
        let false_jump = self.jumps.pop().ok_or(Error::MissingOperand)?;
        let target = self.next_quad();
        self.patch(false_jump, target);
        Ok(())
    }

    /// Request an activation record for the callee.
    pub fn handle_era(&mut self, name: &str) {
        self.emit(Quadruple::new(
            Op::Era,
            Some(Operand::Name(name.to_string())),
            None,
            None,
        ));
    }

    /// Pop the k-th argument's result and pass it. Returns the argument's
    /// type so the call site can validate the signature.
    pub fn handle_param(&mut self, k: usize) -> Result<Type> {
        let (arg, ty) = self.pop_operand()?;
        self.emit(Quadruple::new(
            Op::Param,
            Some(Operand::Addr(arg)),
            None,
            Some(Operand::Idx(k)),
        ));
        Ok(ty)
    }

    pub fn handle_gosub(&mut self, name: &str, start_quad: usize) {
        self.emit(Quadruple::new(
            Op::Gosub,
            Some(Operand::Name(name.to_string())),
            None,
            Some(Operand::Idx(start_quad)),
        ));
    }

    pub fn handle_endproc(&mut self) {
        self.emit(Quadruple::new(Op::EndProc, None, None, None));
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}
