use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar type tags. `Bool` exists at compile time only; comparison results
/// are stored as int 0/1 at run time. Strings are print-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Float,
    Str,
    Bool,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "string"),
            Type::Bool => write!(f, "bool"),
        }
    }
}

/// The closed opcode set. `Display` renders the canonical string form used
/// in quadruple listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Eq,
    Ne,
    Assign,
    Goto,
    GotoF,
    Era,
    Param,
    Gosub,
    EndProc,
    Print,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Assign => "=",
            Op::Goto => "goto",
            Op::GotoF => "gotof",
            Op::Era => "ERA",
            Op::Param => "param",
            Op::Gosub => "GOSUB",
            Op::EndProc => "ENDPROC",
            Op::Print => "print",
        };
        write!(f, "{}", s)
    }
}

/// A quadruple field: a memory address, an instruction index (jump targets,
/// argument positions), or a function name (ERA/GOSUB).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Addr(usize),
    Idx(usize),
    Name(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Addr(a) => write!(f, "{}", a),
            Operand::Idx(i) => write!(f, "{}", i),
            Operand::Name(n) => write!(f, "{}", n),
        }
    }
}

/// Three-address instruction. `result` stays `None` on a jump until
/// backpatching fills the target in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadruple {
    pub op: Op,
    pub left: Option<Operand>,
    pub right: Option<Operand>,
    pub result: Option<Operand>,
}

impl Quadruple {
    pub fn new(
        op: Op,
        left: Option<Operand>,
        right: Option<Operand>,
        result: Option<Operand>,
    ) -> Self {
        Self {
            op,
            left,
            right,
            result,
        }
    }
}

impl fmt::Display for Quadruple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn field(o: &Option<Operand>) -> String {
            o.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "({}, {}, {}, {})",
            self.op,
            field(&self.left),
            field(&self.right),
            field(&self.result)
        )
    }
}

/// The semantic cube: the one place that decides which operand types each
/// operator accepts and what it produces. `None` means incompatible.
///
/// For `Op::Assign`, `left` is the target and `right` the source; int
/// widens to float on assignment, nothing else converts.
pub fn cube(op: Op, left: Type, right: Type) -> Option<Type> {
    use Type::*;
    match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div => match (left, right) {
            (Int, Int) => Some(Int),
            (Int, Float) | (Float, Int) | (Float, Float) => Some(Float),
            _ => None,
        },
        Op::Lt | Op::Gt | Op::Eq | Op::Ne => {
            if left.is_numeric() && right.is_numeric() {
                Some(Bool)
            } else {
                None
            }
        }
        Op::Assign => match (left, right) {
            (Int, Int) => Some(Int),
            (Float, Int) | (Float, Float) => Some(Float),
            (Str, Str) => Some(Str),
            _ => None,
        },
        // Control, call, and I/O opcodes carry no value typing.
        _ => None,
    }
}
