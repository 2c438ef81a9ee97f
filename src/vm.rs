use std::io::Write;

use crate::error::{Error, Result};
use crate::ir::{Op, Operand, Quadruple};
use crate::memory::{MemoryManager, Value};
use crate::symbols::SymbolTable;

/// Where execution goes after a quadruple.
enum Next {
    Step,
    Jump(usize),
}

/// Executes a quadruple list against the segmented memory the compiler
/// allocated from. Print output goes through the injected writer; the
/// binary passes stdout, tests capture a buffer.
pub struct VirtualMachine<W> {
    quads: Vec<Quadruple>,
    symbols: SymbolTable,
    memory: MemoryManager,
    ip: usize,
    out: W,
}

impl<W: Write> VirtualMachine<W> {
    pub fn new(
        quads: Vec<Quadruple>,
        symbols: SymbolTable,
        memory: MemoryManager,
        out: W,
    ) -> Self {
        Self {
            quads,
            symbols,
            memory,
            ip: 0,
            out,
        }
    }

    /// Run to completion or the first fatal. Execution starts at quad 0,
    /// the entry jump over the function bodies.
    pub fn run(&mut self) -> Result<()> {
        while self.ip < self.quads.len() {
            let ip = self.ip;
            match self.step().map_err(|e| e.at_instruction(ip))? {
                Next::Step => self.ip += 1,
                Next::Jump(target) => self.ip = target,
            }
        }
        Ok(())
    }

    fn addr_of(operand: &Option<Operand>) -> Result<usize> {
        match operand {
            Some(Operand::Addr(a)) => Ok(*a),
            _ => Err(Error::Malformed("expected a memory address")),
        }
    }

    fn idx_of(operand: &Option<Operand>) -> Result<usize> {
        match operand {
            Some(Operand::Idx(i)) => Ok(*i),
            _ => Err(Error::Malformed("expected an instruction index")),
        }
    }

    fn name_of(operand: &Option<Operand>) -> Result<&str> {
        match operand {
            Some(Operand::Name(n)) => Ok(n),
            _ => Err(Error::Malformed("expected a function name")),
        }
    }

    fn numeric(value: &Value, addr: usize) -> Result<f64> {
        value.as_f64().ok_or(Error::TypeMismatch {
            addr,
            cell: crate::ir::Type::Float,
            value: value.kind(),
        })
    }

    fn step(&mut self) -> Result<Next> {
        let quad = self.quads[self.ip].clone();
        log::trace!("ip {}: {}", self.ip, quad);
        match quad.op {
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let left = self.memory.load(Self::addr_of(&quad.left)?)?;
                let right = self.memory.load(Self::addr_of(&quad.right)?)?;
                let result = self.arithmetic(quad.op, left, right, &quad)?;
                self.memory.store(Self::addr_of(&quad.result)?, result)?;
                Ok(Next::Step)
            }
            Op::Lt | Op::Gt | Op::Eq | Op::Ne => {
                let laddr = Self::addr_of(&quad.left)?;
                let raddr = Self::addr_of(&quad.right)?;
                let left = Self::numeric(&self.memory.load(laddr)?, laddr)?;
                let right = Self::numeric(&self.memory.load(raddr)?, raddr)?;
                let holds = match quad.op {
                    Op::Lt => left < right,
                    Op::Gt => left > right,
                    Op::Eq => left == right,
                    _ => left != right,
                };
                self.memory
                    .store(Self::addr_of(&quad.result)?, Value::Int(holds as i64))?;
                Ok(Next::Step)
            }
            Op::Assign => {
                let value = self.memory.load(Self::addr_of(&quad.left)?)?;
                self.memory.store(Self::addr_of(&quad.result)?, value)?;
                Ok(Next::Step)
            }
            Op::Goto => Ok(Next::Jump(Self::idx_of(&quad.result)?)),
            Op::GotoF => {
                let cond = self.memory.load(Self::addr_of(&quad.left)?)?;
                if cond == Value::Int(0) {
                    Ok(Next::Jump(Self::idx_of(&quad.result)?))
                } else {
                    Ok(Next::Step)
                }
            }
            Op::Print => {
                let value = self.memory.load(Self::addr_of(&quad.left)?)?;
                let text = match &value {
                    // string literals carry their source quotes
                    Value::Str(s) => s.trim_matches('"').to_string(),
                    other => other.to_string(),
                };
                writeln!(self.out, "{}", text).map_err(|e| Error::Io {
                    path: "output".to_string(),
                    source: e,
                })?;
                Ok(Next::Step)
            }
            Op::Era => {
                let name = Self::name_of(&quad.left)?;
                self.memory.push_pending(name);
                Ok(Next::Step)
            }
            Op::Param => {
                let value = self.memory.load(Self::addr_of(&quad.left)?)?;
                let k = Self::idx_of(&quad.result)?;
                let callee = self
                    .memory
                    .pending_func()
                    .ok_or(Error::Malformed("param without a pending frame"))?
                    .to_string();
                let func = self
                    .symbols
                    .function(&callee)
                    .ok_or(Error::Malformed("param names an unknown function"))?;
                let slot = func
                    .params
                    .get(k)
                    .ok_or(Error::Malformed("param index out of range"))?
                    .addr;
                self.memory.store_pending(slot, value)?;
                Ok(Next::Step)
            }
            Op::Gosub => {
                let start = Self::idx_of(&quad.result)?;
                self.memory.commit_frame(self.ip + 1)?;
                Ok(Next::Jump(start))
            }
            Op::EndProc => {
                let resume = self.memory.pop_frame()?;
                Ok(Next::Jump(resume))
            }
        }
    }

    fn arithmetic(&self, op: Op, left: Value, right: Value, quad: &Quadruple) -> Result<Value> {
        if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
            let (a, b) = (*a, *b);
            return Ok(Value::Int(match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                _ => {
                    if b == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    a / b
                }
            }));
        }
        let laddr = Self::addr_of(&quad.left)?;
        let raddr = Self::addr_of(&quad.right)?;
        let a = Self::numeric(&left, laddr)?;
        let b = Self::numeric(&right, raddr)?;
        Ok(Value::Float(match op {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            _ => {
                if b == 0.0 {
                    return Err(Error::DivisionByZero);
                }
                a / b
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(src: &str) -> Result<String> {
        let tokens = Lexer::new(src).lex()?;
        let mut parser = Parser::new(tokens);
        parser.parse_program()?;
        let (quads, symbols, memory) = parser.into_parts();
        let mut out = Vec::new();
        VirtualMachine::new(quads, symbols, memory, &mut out).run()?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let out = run("program p; var x : int; begin x = 7 / 2; print(x); end").unwrap();
        assert_eq!(out, "3\n");
    }

    #[test]
    fn float_division_keeps_the_fraction() {
        let out = run("program p; var x : float; begin x = 7.0 / 2; print(x); end").unwrap();
        assert_eq!(out, "3.5\n");
    }

    #[test]
    fn string_literals_print_without_quotes() {
        let out = run("program p; begin print(\"hello\"); end").unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn print_takes_a_mixed_list() {
        let out = run("program p; var x : int; begin x = 2; print(\"x is\", x); end").unwrap();
        assert_eq!(out, "x is\n2\n");
    }

    #[test]
    fn false_guard_skips_the_block() {
        let out =
            run("program p; var x : int; begin x = 5; if (x < 2) { print(1); } print(2); end")
                .unwrap();
        assert_eq!(out, "2\n");
    }

    #[test]
    fn division_by_zero_reports_the_instruction() {
        let err = run("program p; var x : int; begin x = 1 / 0; end").unwrap_err();
        match err {
            Error::Runtime { source, .. } => {
                assert!(matches!(*source, Error::DivisionByZero))
            }
            other => panic!("expected a runtime wrapper, got {}", other),
        }
    }

    #[test]
    fn float_division_by_zero_is_fatal_too() {
        let err = run("program p; var x : float; begin x = 1.5 / 0; end").unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }

    #[test]
    fn calls_pass_arguments_by_position() {
        let out = run(
            "program p; func sub(a : int, b : int) { print(a - b); }; begin sub(5, 3); end",
        )
        .unwrap();
        assert_eq!(out, "2\n");
    }

    #[test]
    fn locals_do_not_leak_into_the_caller() {
        let src = "program p; \
                   var x : int; \
                   func f(x : int) { x = 99; print(x); }; \
                   begin x = 1; f(7); print(x); end";
        let out = run(src).unwrap();
        assert_eq!(out, "99\n1\n");
    }

    #[test]
    fn consecutive_calls_each_get_a_fresh_frame() {
        let src = "program p; \
                   func echo(n : int) { print(n); }; \
                   begin echo(1); echo(2); end";
        let out = run(src).unwrap();
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn unary_minus_on_a_variable_negates_it() {
        let out =
            run("program p; var x, y : int; begin x = 4; y = -x; print(y); end").unwrap();
        assert_eq!(out, "-4\n");
    }

    #[test]
    fn negative_literals_compare_correctly() {
        let out = run(
            "program p; var x : int; begin x = -3; if (x < 0) { print(\"neg\"); } end",
        )
        .unwrap();
        assert_eq!(out, "neg\n");
    }
}
