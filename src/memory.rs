use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ir::Type;

/// Width of every (scope, type) address range.
pub const SEGMENT_SIZE: usize = 1000;

/// Address-range owners. Global/Local/Temp each pair with the four scalar
/// types; Constant carries int, float, and string literals only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Local,
    Temp,
    Constant,
}

impl Scope {
    pub fn name(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Local => "local",
            Scope::Temp => "temp",
            Scope::Constant => "constant",
        }
    }
}

fn type_index(ty: Type) -> usize {
    match ty {
        Type::Int => 0,
        Type::Float => 1,
        Type::Str => 2,
        Type::Bool => 3,
    }
}

/// Base address of a (scope, type) segment. The layout is fixed and shared
/// verbatim between compiler and VM: fifteen contiguous 1000-wide ranges
/// starting at 1000, so `addr / 1000` recovers the segment.
pub fn segment_base(scope: Scope, ty: Type) -> Option<usize> {
    let slot = match scope {
        Scope::Global => type_index(ty),
        Scope::Local => 4 + type_index(ty),
        Scope::Temp => 8 + type_index(ty),
        Scope::Constant => match ty {
            Type::Bool => return None,
            _ => 12 + type_index(ty),
        },
    };
    Some((slot + 1) * SEGMENT_SIZE)
}

/// Recover (scope, type) from a raw address, or `None` if the address lies
/// outside every segment.
pub fn segment_of(addr: usize) -> Option<(Scope, Type)> {
    const TYPES: [Type; 4] = [Type::Int, Type::Float, Type::Str, Type::Bool];
    let slot = addr / SEGMENT_SIZE;
    match slot {
        1..=4 => Some((Scope::Global, TYPES[slot - 1])),
        5..=8 => Some((Scope::Local, TYPES[slot - 5])),
        9..=12 => Some((Scope::Temp, TYPES[slot - 9])),
        13..=15 => Some((Scope::Constant, TYPES[slot - 13])),
        _ => None,
    }
}

/// A run-time scalar. Booleans never reach run time; comparisons store
/// int 0/1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counters {
    global: [usize; 4],
    local: [usize; 4],
    temp: [usize; 4],
    constant: [usize; 3],
}

impl Counters {
    fn slot(&mut self, scope: Scope, ty: Type) -> &mut usize {
        match scope {
            Scope::Global => &mut self.global[type_index(ty)],
            Scope::Local => &mut self.local[type_index(ty)],
            Scope::Temp => &mut self.temp[type_index(ty)],
            Scope::Constant => &mut self.constant[type_index(ty)],
        }
    }
}

/// One activation record: the local and temp cells of a single call, plus
/// where to resume the caller.
#[derive(Debug, Clone)]
pub struct Frame {
    pub func: String,
    pub return_ip: usize,
    cells: HashMap<usize, Value>,
}

impl Frame {
    fn new(func: &str) -> Self {
        Self {
            func: func.to_string(),
            return_ip: 0,
            cells: HashMap::new(),
        }
    }
}

/// Segmented memory. At compile time it hands out addresses by bumping the
/// per-segment counters and interns constants; at run time it stores and
/// retrieves typed cells, routing Local/Temp addresses through the active
/// activation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryManager {
    counters: Counters,
    interned: HashMap<String, usize>,
    constants: HashMap<usize, Value>,
    #[serde(skip)]
    saved: Vec<([usize; 4], [usize; 4])>,
    #[serde(skip, default = "base_frames")]
    frames: Vec<Frame>,
    #[serde(skip)]
    pending: Vec<Frame>,
    #[serde(skip)]
    globals: HashMap<usize, Value>,
}

fn base_frames() -> Vec<Frame> {
    vec![Frame::new("")]
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            counters: Counters::default(),
            interned: HashMap::new(),
            constants: HashMap::new(),
            saved: Vec::new(),
            frames: base_frames(),
            pending: Vec::new(),
            globals: HashMap::new(),
        }
    }

    fn allocate(&mut self, scope: Scope, ty: Type) -> Result<usize> {
        let base = segment_base(scope, ty).ok_or(Error::SegmentExhausted {
            scope: scope.name(),
            ty,
        })?;
        let counter = self.counters.slot(scope, ty);
        if *counter >= SEGMENT_SIZE {
            return Err(Error::SegmentExhausted {
                scope: scope.name(),
                ty,
            });
        }
        let addr = base + *counter;
        *counter += 1;
        Ok(addr)
    }

    pub fn allocate_global(&mut self, ty: Type) -> Result<usize> {
        self.allocate(Scope::Global, ty)
    }

    pub fn allocate_local(&mut self, ty: Type) -> Result<usize> {
        self.allocate(Scope::Local, ty)
    }

    pub fn allocate_temp(&mut self, ty: Type) -> Result<usize> {
        self.allocate(Scope::Temp, ty)
    }

    /// Intern a literal: the first occurrence allocates a constant cell and
    /// records the value, later occurrences reuse the same address.
    pub fn allocate_constant(&mut self, lit: &str, ty: Type, value: Value) -> Result<usize> {
        let key = format!("{}:{}", ty, lit);
        if let Some(&addr) = self.interned.get(&key) {
            return Ok(addr);
        }
        let addr = self.allocate(Scope::Constant, ty)?;
        log::debug!("interned {} constant '{}' at {}", ty, lit, addr);
        self.interned.insert(key, addr);
        self.constants.insert(addr, value);
        Ok(addr)
    }

    /// Save the Local and Temp counters and start both from zero for the
    /// next function body.
    pub fn push_function_segment(&mut self) {
        self.saved.push((self.counters.local, self.counters.temp));
        self.counters.local = [0; 4];
        self.counters.temp = [0; 4];
    }

    /// Restore the counters saved by the matching push.
    pub fn pop_function_segment(&mut self) {
        if let Some((local, temp)) = self.saved.pop() {
            self.counters.local = local;
            self.counters.temp = temp;
        }
    }

    fn cells_mut(&mut self, scope: Scope) -> &mut HashMap<usize, Value> {
        match scope {
            Scope::Global => &mut self.globals,
            Scope::Constant => &mut self.constants,
            // frames always holds at least the base frame
            Scope::Local | Scope::Temp => {
                let frame = self.frames.last_mut().unwrap();
                &mut frame.cells
            }
        }
    }

    fn cells(&self, scope: Scope) -> &HashMap<usize, Value> {
        match scope {
            Scope::Global => &self.globals,
            Scope::Constant => &self.constants,
            Scope::Local | Scope::Temp => &self.frames.last().unwrap().cells,
        }
    }

    fn check(addr: usize, cell: Type, value: Value) -> Result<Value> {
        match (cell, value) {
            (Type::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (Type::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (Type::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (Type::Str, Value::Str(s)) => Ok(Value::Str(s)),
            // comparison results land in bool cells as 0/1
            (Type::Bool, Value::Int(i)) => Ok(Value::Int(i)),
            (expected, value) => Err(Error::TypeMismatch {
                addr,
                cell: expected,
                value: value.kind(),
            }),
        }
    }

    /// Write `value` into the cell at `addr`. The cell's type comes from
    /// the address's segment; int widens into float cells, nothing else
    /// converts.
    pub fn store(&mut self, addr: usize, value: Value) -> Result<()> {
        let (scope, ty) = segment_of(addr).ok_or(Error::BadAddress { addr })?;
        let value = Self::check(addr, ty, value)?;
        self.cells_mut(scope).insert(addr, value);
        Ok(())
    }

    /// Read the cell at `addr`, failing if it has never been written.
    pub fn load(&self, addr: usize) -> Result<Value> {
        let (scope, _) = segment_of(addr).ok_or(Error::BadAddress { addr })?;
        self.cells(scope)
            .get(&addr)
            .cloned()
            .ok_or(Error::Unbound { addr })
    }

    /// ERA: open a pending activation record for `func`. Argument
    /// expressions still evaluate in the caller's frame.
    pub fn push_pending(&mut self, func: &str) {
        self.pending.push(Frame::new(func));
    }

    pub fn pending_func(&self) -> Option<&str> {
        self.pending.last().map(|f| f.func.as_str())
    }

    /// param: write an argument value into the pending frame.
    pub fn store_pending(&mut self, addr: usize, value: Value) -> Result<()> {
        let (_, ty) = segment_of(addr).ok_or(Error::BadAddress { addr })?;
        let value = Self::check(addr, ty, value)?;
        let frame = self.pending.last_mut().ok_or(Error::MissingOperand)?;
        frame.cells.insert(addr, value);
        Ok(())
    }

    /// GOSUB: commit the pending frame, making its locals the active ones.
    pub fn commit_frame(&mut self, return_ip: usize) -> Result<()> {
        let mut frame = self.pending.pop().ok_or(Error::MissingOperand)?;
        frame.return_ip = return_ip;
        self.frames.push(frame);
        Ok(())
    }

    /// ENDPROC: discard the active frame, resume at the saved index.
    pub fn pop_frame(&mut self) -> Result<usize> {
        // the base frame never pops
        if self.frames.len() <= 1 {
            return Err(Error::MissingOperand);
        }
        let frame = self.frames.pop().unwrap();
        Ok(frame.return_ip)
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_land_in_their_segment() {
        let mut mm = MemoryManager::new();
        let a = mm.allocate_global(Type::Int).unwrap();
        let b = mm.allocate_global(Type::Float).unwrap();
        let c = mm.allocate_local(Type::Int).unwrap();
        let d = mm.allocate_temp(Type::Bool).unwrap();
        assert_eq!(segment_of(a), Some((Scope::Global, Type::Int)));
        assert_eq!(segment_of(b), Some((Scope::Global, Type::Float)));
        assert_eq!(segment_of(c), Some((Scope::Local, Type::Int)));
        assert_eq!(segment_of(d), Some((Scope::Temp, Type::Bool)));
    }

    #[test]
    fn sequential_allocation_bumps() {
        let mut mm = MemoryManager::new();
        let a = mm.allocate_global(Type::Int).unwrap();
        let b = mm.allocate_global(Type::Int).unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn constants_intern_once() {
        let mut mm = MemoryManager::new();
        let a = mm.allocate_constant("42", Type::Int, Value::Int(42)).unwrap();
        let b = mm.allocate_constant("42", Type::Int, Value::Int(42)).unwrap();
        let c = mm.allocate_constant("7", Type::Int, Value::Int(7)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(mm.load(a).unwrap(), Value::Int(42));
    }

    #[test]
    fn same_literal_different_type_does_not_collide() {
        let mut mm = MemoryManager::new();
        let i = mm.allocate_constant("1", Type::Int, Value::Int(1)).unwrap();
        let f = mm
            .allocate_constant("1", Type::Float, Value::Float(1.0))
            .unwrap();
        assert_ne!(i, f);
    }

    #[test]
    fn segment_exhaustion_is_an_error() {
        let mut mm = MemoryManager::new();
        for _ in 0..SEGMENT_SIZE {
            mm.allocate_global(Type::Int).unwrap();
        }
        assert!(matches!(
            mm.allocate_global(Type::Int),
            Err(Error::SegmentExhausted { .. })
        ));
    }

    #[test]
    fn function_segment_counters_reset_and_restore() {
        let mut mm = MemoryManager::new();
        let outer = mm.allocate_temp(Type::Int).unwrap();
        mm.push_function_segment();
        let inner = mm.allocate_temp(Type::Int).unwrap();
        assert_eq!(inner, segment_base(Scope::Temp, Type::Int).unwrap());
        mm.pop_function_segment();
        let next = mm.allocate_temp(Type::Int).unwrap();
        assert_eq!(next, outer + 1);
    }

    #[test]
    fn store_checks_cell_type() {
        let mut mm = MemoryManager::new();
        let i = mm.allocate_global(Type::Int).unwrap();
        let f = mm.allocate_global(Type::Float).unwrap();
        mm.store(i, Value::Int(3)).unwrap();
        mm.store(f, Value::Int(3)).unwrap();
        assert_eq!(mm.load(f).unwrap(), Value::Float(3.0));
        assert!(matches!(
            mm.store(i, Value::Float(1.5)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unbound_reads_fail() {
        let mm = MemoryManager::new();
        let addr = segment_base(Scope::Global, Type::Int).unwrap();
        assert!(matches!(mm.load(addr), Err(Error::Unbound { .. })));
    }

    #[test]
    fn committed_frames_shadow_the_caller() {
        let mut mm = MemoryManager::new();
        let local = segment_base(Scope::Local, Type::Int).unwrap();
        mm.store(local, Value::Int(1)).unwrap();
        mm.push_pending("f");
        mm.store_pending(local, Value::Int(9)).unwrap();
        mm.commit_frame(7).unwrap();
        assert_eq!(mm.load(local).unwrap(), Value::Int(9));
        assert_eq!(mm.pop_frame().unwrap(), 7);
        assert_eq!(mm.load(local).unwrap(), Value::Int(1));
    }
}
