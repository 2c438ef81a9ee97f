use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ir::{cube, Op, Type};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub line: usize,
    pub col: usize,
    pub addr: usize,
}

/// A function record: ordered parameters (all Local addresses), the index
/// of its first body quadruple, and its local table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Variable>,
    pub start_quad: usize,
    locals: HashMap<String, Variable>,
}

/// Two-level symbol table: one global scope plus one local scope per
/// function. Lookups fall through local to global; functions live in the
/// global table only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    globals: HashMap<String, Variable>,
    functions: HashMap<String, Function>,
    #[serde(skip)]
    current: Option<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            globals: HashMap::new(),
            functions: HashMap::new(),
            current: None,
        }
    }

    pub fn add_global(&mut self, var: Variable) -> Result<()> {
        if self.globals.contains_key(&var.name) || self.functions.contains_key(&var.name) {
            return Err(Error::DuplicateName {
                name: var.name,
                line: var.line,
            });
        }
        self.globals.insert(var.name.clone(), var);
        Ok(())
    }

    pub fn add_local(&mut self, var: Variable) -> Result<()> {
        let Some(current) = self.current.clone() else {
            return self.add_global(var);
        };
        let Some(func) = self.functions.get_mut(&current) else {
            return Err(Error::Undeclared {
                name: current,
                line: var.line,
            });
        };
        if func.locals.contains_key(&var.name) {
            return Err(Error::DuplicateName {
                name: var.name,
                line: var.line,
            });
        }
        func.locals.insert(var.name.clone(), var);
        Ok(())
    }

    /// Register a function and seed its local scope with the parameters.
    pub fn add_function(
        &mut self,
        name: &str,
        params: Vec<Variable>,
        line: usize,
    ) -> Result<()> {
        if self.functions.contains_key(name) || self.globals.contains_key(name) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
                line,
            });
        }
        let mut locals = HashMap::new();
        for p in &params {
            if locals.insert(p.name.clone(), p.clone()).is_some() {
                return Err(Error::DuplicateName {
                    name: p.name.clone(),
                    line: p.line,
                });
            }
        }
        self.functions.insert(
            name.to_string(),
            Function {
                name: name.to_string(),
                params,
                start_quad: 0,
                locals,
            },
        );
        Ok(())
    }

    pub fn enter_function(&mut self, name: &str, line: usize) -> Result<()> {
        if !self.functions.contains_key(name) {
            return Err(Error::Undeclared {
                name: name.to_string(),
                line,
            });
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    pub fn exit_function(&mut self) {
        self.current = None;
    }

    /// Local-then-global lookup.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        if let Some(f) = self.current.as_ref().and_then(|c| self.functions.get(c)) {
            if let Some(v) = f.locals.get(name) {
                return Some(v);
            }
        }
        self.globals.get(name)
    }

    pub fn get_type(&self, name: &str, line: usize) -> Result<Type> {
        self.lookup(name)
            .map(|v| v.ty)
            .ok_or_else(|| Error::Undeclared {
                name: name.to_string(),
                line,
            })
    }

    pub fn get_address(&self, name: &str, line: usize) -> Result<usize> {
        self.lookup(name)
            .map(|v| v.addr)
            .ok_or_else(|| Error::Undeclared {
                name: name.to_string(),
                line,
            })
    }

    pub fn validate_assignment(&self, name: &str, line: usize) -> Result<()> {
        if self.lookup(name).is_none() {
            return Err(Error::Undeclared {
                name: name.to_string(),
                line,
            });
        }
        Ok(())
    }

    /// Arity and per-position type check of a call. Each argument must be
    /// assignable to its parameter under the cube's `=` rule.
    pub fn validate_call(&self, name: &str, line: usize, args: &[Type]) -> Result<()> {
        let func = self.functions.get(name).ok_or_else(|| Error::Undeclared {
            name: name.to_string(),
            line,
        })?;
        if func.params.len() != args.len() {
            return Err(Error::ArityMismatch {
                name: name.to_string(),
                line,
                expected: func.params.len(),
                got: args.len(),
            });
        }
        for (i, (param, &arg)) in func.params.iter().zip(args).enumerate() {
            if cube(Op::Assign, param.ty, arg).is_none() {
                return Err(Error::ArgTypeMismatch {
                    name: name.to_string(),
                    line,
                    index: i + 1,
                    expected: param.ty,
                    got: arg,
                });
            }
        }
        Ok(())
    }

    pub fn set_function_start(&mut self, name: &str, quad: usize) {
        if let Some(f) = self.functions.get_mut(name) {
            f.start_quad = quad;
        }
    }

    pub fn function_start(&self, name: &str, line: usize) -> Result<usize> {
        self.functions
            .get(name)
            .map(|f| f.start_quad)
            .ok_or_else(|| Error::Undeclared {
                name: name.to_string(),
                line,
            })
    }

    /// The VM resolves `param k` through this.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: Type, addr: usize) -> Variable {
        Variable {
            name: name.to_string(),
            ty,
            line: 1,
            col: 1,
            addr,
        }
    }

    #[test]
    fn duplicate_global_is_rejected() {
        let mut st = SymbolTable::new();
        st.add_global(var("x", Type::Int, 1000)).unwrap();
        assert!(matches!(
            st.add_global(var("x", Type::Float, 2000)),
            Err(Error::DuplicateName { .. })
        ));
    }

    #[test]
    fn local_shadows_global() {
        let mut st = SymbolTable::new();
        st.add_global(var("x", Type::Int, 1000)).unwrap();
        st.add_function("f", vec![], 1).unwrap();
        st.enter_function("f", 1).unwrap();
        st.add_local(var("x", Type::Float, 6000)).unwrap();
        assert_eq!(st.get_address("x", 2).unwrap(), 6000);
        assert_eq!(st.get_type("x", 2).unwrap(), Type::Float);
        st.exit_function();
        assert_eq!(st.get_address("x", 3).unwrap(), 1000);
    }

    #[test]
    fn local_lookup_falls_through_to_global() {
        let mut st = SymbolTable::new();
        st.add_global(var("g", Type::Int, 1000)).unwrap();
        st.add_function("f", vec![], 1).unwrap();
        st.enter_function("f", 1).unwrap();
        assert_eq!(st.get_address("g", 2).unwrap(), 1000);
    }

    #[test]
    fn undeclared_lookup_fails() {
        let st = SymbolTable::new();
        assert!(matches!(
            st.get_type("ghost", 4),
            Err(Error::Undeclared { line: 4, .. })
        ));
    }

    #[test]
    fn call_validation_checks_arity_and_types() {
        let mut st = SymbolTable::new();
        st.add_function(
            "f",
            vec![var("a", Type::Int, 5000), var("b", Type::Float, 6000)],
            1,
        )
        .unwrap();

        st.validate_call("f", 2, &[Type::Int, Type::Float]).unwrap();
        // int widens into a float parameter
        st.validate_call("f", 2, &[Type::Int, Type::Int]).unwrap();
        assert!(matches!(
            st.validate_call("f", 2, &[Type::Int]),
            Err(Error::ArityMismatch { .. })
        ));
        assert!(matches!(
            st.validate_call("f", 2, &[Type::Float, Type::Float]),
            Err(Error::ArgTypeMismatch { index: 1, .. })
        ));
        assert!(matches!(
            st.validate_call("g", 2, &[]),
            Err(Error::Undeclared { .. })
        ));
    }

    #[test]
    fn function_start_quad_updates() {
        let mut st = SymbolTable::new();
        st.add_function("f", vec![], 1).unwrap();
        st.set_function_start("f", 17);
        assert_eq!(st.function_start("f", 1).unwrap(), 17);
    }
}
