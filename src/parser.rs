use crate::codegen::{CodeGen, Factor};
use crate::error::{Error, Result};
use crate::ir::{Op, Quadruple, Type};
use crate::lexer::{Token, TokenKind};
use crate::memory::MemoryManager;
use crate::symbols::{SymbolTable, Variable};

/// Single-pass translator: each production consumes its tokens and fires
/// the emitter hooks at the structural points, so quadruples come out as
/// the source goes in. There is no AST.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    symbols: SymbolTable,
    codegen: CodeGen,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            symbols: SymbolTable::new(),
            codegen: CodeGen::new(),
        }
    }

    fn cur(&self) -> &Token {
        // the lexer always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.cur().kind == kind {
            Ok(self.advance())
        } else {
            let tok = self.cur();
            Err(Error::Parse {
                line: tok.line,
                col: tok.col,
                found: if tok.kind == TokenKind::Eof {
                    "end of input".to_string()
                } else {
                    tok.lit.clone()
                },
                expected: kind.describe().to_string(),
            })
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let tok = self.cur();
        Error::Parse {
            line: tok.line,
            col: tok.col,
            found: if tok.kind == TokenKind::Eof {
                "end of input".to_string()
            } else {
                tok.lit.clone()
            },
            expected: expected.to_string(),
        }
    }

    /// Compile the whole token stream. On success the quadruple list is
    /// complete and every jump target is resolved.
    pub fn parse_program(&mut self) -> Result<()> {
        self.codegen.handle_program_start();

        self.expect(TokenKind::Program)?;
        self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Semicolon)?;

        self.parse_var_declarations(true)?;
        while self.cur().kind == TokenKind::Func {
            self.parse_function()?;
        }
        self.parse_main_section()?;
        self.expect(TokenKind::Eof)?;
        Ok(())
    }

    pub fn into_parts(self) -> (Vec<Quadruple>, SymbolTable, MemoryManager) {
        (self.codegen.quads, self.symbols, self.codegen.memory)
    }

    fn parse_var_declarations(&mut self, global: bool) -> Result<()> {
        while self.cur().kind == TokenKind::Var {
            self.advance();
            let mut names = vec![self.expect(TokenKind::Ident)?];
            while self.cur().kind == TokenKind::Comma {
                self.advance();
                names.push(self.expect(TokenKind::Ident)?);
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            self.expect(TokenKind::Semicolon)?;

            for tok in names {
                let addr = if global {
                    self.codegen.memory.allocate_global(ty)?
                } else {
                    self.codegen.memory.allocate_local(ty)?
                };
                let var = Variable {
                    name: tok.lit.clone(),
                    ty,
                    line: tok.line,
                    col: tok.col,
                    addr,
                };
                if global {
                    self.symbols.add_global(var)?;
                } else {
                    self.symbols.add_local(var)?;
                }
            }
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<Type> {
        let tok = self.expect(TokenKind::TypeName)?;
        match tok.lit.as_str() {
            "int" => Ok(Type::Int),
            _ => Ok(Type::Float),
        }
    }

    fn parse_function(&mut self) -> Result<()> {
        self.expect(TokenKind::Func)?;
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LParen)?;

        // parameters and body share one fresh Local/Temp range
        self.codegen.memory.push_function_segment();

        let params = self.parse_parameter_list()?;
        self.symbols.add_function(&name.lit, params, name.line)?;
        self.symbols.enter_function(&name.lit, name.line)?;
        self.expect(TokenKind::RParen)?;

        let start = self.codegen.next_quad();
        self.symbols.set_function_start(&name.lit, start);
        log::debug!("function '{}' body starts at quad {}", name.lit, start);

        self.expect(TokenKind::LBrace)?;
        self.parse_var_declarations(false)?;
        self.parse_statement_list()?;
        self.expect(TokenKind::RBrace)?;

        self.codegen.handle_endproc();
        self.codegen.memory.pop_function_segment();
        self.expect(TokenKind::Semicolon)?;
        self.symbols.exit_function();
        Ok(())
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<Variable>> {
        let mut params = Vec::new();
        if self.cur().kind == TokenKind::RParen {
            return Ok(params);
        }
        loop {
            let tok = self.expect(TokenKind::Ident)?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let addr = self.codegen.memory.allocate_local(ty)?;
            params.push(Variable {
                name: tok.lit.clone(),
                ty,
                line: tok.line,
                col: tok.col,
                addr,
            });
            if self.cur().kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        Ok(params)
    }

    fn parse_main_section(&mut self) -> Result<()> {
        self.expect(TokenKind::Begin)?;
        self.codegen.handle_main_start();
        self.parse_statement_list()?;
        self.expect(TokenKind::End)?;
        Ok(())
    }

    fn parse_block(&mut self) -> Result<()> {
        self.expect(TokenKind::LBrace)?;
        self.parse_statement_list()?;
        self.expect(TokenKind::RBrace)?;
        Ok(())
    }

    fn parse_statement_list(&mut self) -> Result<()> {
        loop {
            match self.cur().kind {
                TokenKind::If | TokenKind::While | TokenKind::Print | TokenKind::Ident => {
                    self.parse_statement()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<()> {
        match self.cur().kind {
            TokenKind::If => self.parse_if_statement()?,
            TokenKind::While => self.parse_while_statement()?,
            TokenKind::Print => self.parse_print_statement()?,
            TokenKind::Ident => {
                // one token of lookahead: '(' is a call, '=' an assignment
                let id = self.advance();
                match self.cur().kind {
                    TokenKind::LParen => self.parse_call(id)?,
                    TokenKind::Assign => {
                        self.symbols.validate_assignment(&id.lit, id.line)?;
                        self.parse_assignment(id)?;
                    }
                    _ => return Err(self.unexpected("'=' or '('")),
                }
            }
            _ => return Err(self.unexpected("a statement")),
        }
        debug_assert!(self.codegen.stacks_empty());
        Ok(())
    }

    fn parse_assignment(&mut self, id: Token) -> Result<()> {
        self.expect(TokenKind::Assign)?;
        self.parse_expression()?;

        let ty = self.symbols.get_type(&id.lit, id.line)?;
        let addr = self.symbols.get_address(&id.lit, id.line)?;
        self.codegen.handle_assignment(addr, ty)?;

        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn parse_if_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        self.parse_expression()?;
        self.expect(TokenKind::RParen)?;

        self.codegen.handle_if()?;
        self.parse_block()?;

        if self.cur().kind == TokenKind::Else {
            self.advance();
            self.codegen.handle_else()?;
            self.parse_block()?;
        }
        self.codegen.handle_end_if()
    }

    fn parse_while_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::While)?;
        let start = self.codegen.handle_while_start();

        self.expect(TokenKind::LParen)?;
        self.parse_expression()?;
        self.codegen.handle_while_condition()?;
        self.expect(TokenKind::RParen)?;

        self.parse_block()?;
        self.codegen.handle_while_end(start)
    }

    fn parse_print_statement(&mut self) -> Result<()> {
        self.expect(TokenKind::Print)?;
        self.expect(TokenKind::LParen)?;
        loop {
            self.parse_print_item()?;
            if self.cur().kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn parse_print_item(&mut self) -> Result<()> {
        if self.cur().kind == TokenKind::StrLit {
            let tok = self.advance();
            self.codegen.handle_print_str(&tok.lit)
        } else {
            self.parse_expression()?;
            self.codegen.handle_print_expr()
        }
    }

    fn parse_call(&mut self, id: Token) -> Result<()> {
        self.expect(TokenKind::LParen)?;
        self.codegen.handle_era(&id.lit);

        let args = self.parse_argument_list()?;
        self.expect(TokenKind::RParen)?;

        self.symbols.validate_call(&id.lit, id.line, &args)?;
        let start = self.symbols.function_start(&id.lit, id.line)?;
        self.codegen.handle_gosub(&id.lit, start);

        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Type>> {
        let mut args = Vec::new();
        if self.cur().kind == TokenKind::RParen {
            return Ok(args);
        }
        loop {
            self.parse_expression()?;
            let ty = self.codegen.handle_param(args.len())?;
            args.push(ty);
            if self.cur().kind != TokenKind::Comma {
                break;
            }
            self.advance();
        }
        Ok(args)
    }

    // Expression := Exp (relOp Exp)?
    fn parse_expression(&mut self) -> Result<Type> {
        let left = self.parse_exp()?;
        if self.cur().kind == TokenKind::RelOp {
            let op = match self.cur().lit.as_str() {
                "<" => Op::Lt,
                ">" => Op::Gt,
                "==" => Op::Eq,
                _ => Op::Ne,
            };
            self.codegen.push_operator(op);
            self.advance();
            self.parse_exp()?;
            self.codegen.handle_op()?;
            return Ok(Type::Bool);
        }
        Ok(left)
    }

    // Exp := Term (addOp Term)*, left-associative
    fn parse_exp(&mut self) -> Result<Type> {
        let mut ty = self.parse_term()?;
        while self.cur().kind == TokenKind::AddOp {
            let op = if self.cur().lit == "+" { Op::Add } else { Op::Sub };
            self.codegen.push_operator(op);
            self.advance();
            let right = self.parse_term()?;
            self.codegen.handle_op()?;
            ty = if ty == Type::Float || right == Type::Float {
                Type::Float
            } else {
                Type::Int
            };
        }
        Ok(ty)
    }

    // Term := Factor (mulOp Factor)*, left-associative
    fn parse_term(&mut self) -> Result<Type> {
        let mut ty = self.parse_factor()?;
        while self.cur().kind == TokenKind::MulOp {
            let op = if self.cur().lit == "*" { Op::Mul } else { Op::Div };
            self.codegen.push_operator(op);
            self.advance();
            let right = self.parse_factor()?;
            self.codegen.handle_op()?;
            ty = if ty == Type::Float || right == Type::Float {
                Type::Float
            } else {
                Type::Int
            };
        }
        Ok(ty)
    }

    // Factor := '(' Expression ')' | ('+'|'-')? (id | intLit | floatLit)
    fn parse_factor(&mut self) -> Result<Type> {
        match self.cur().kind {
            TokenKind::LParen => {
                self.codegen.handle_open_paren();
                self.advance();
                let ty = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                self.codegen.handle_close_paren()?;
                Ok(ty)
            }
            TokenKind::AddOp => {
                let negative = self.cur().lit == "-";
                self.advance();
                match self.cur().kind {
                    TokenKind::IntLit | TokenKind::FloatLit => {
                        let ty = if self.cur().kind == TokenKind::IntLit {
                            Type::Int
                        } else {
                            Type::Float
                        };
                        let tok = self.advance();
                        let lit = if negative {
                            format!("-{}", tok.lit)
                        } else {
                            tok.lit
                        };
                        self.codegen
                            .handle_factor(Factor::Literal(&lit, ty), &self.symbols, tok.line)
                    }
                    TokenKind::Ident => {
                        let tok = self.advance();
                        let ty = self.codegen.handle_factor(
                            Factor::Ident(&tok.lit),
                            &self.symbols,
                            tok.line,
                        )?;
                        if negative {
                            // -x compiles as x * -1
                            self.codegen.push_operator(Op::Mul);
                            self.codegen.handle_factor(
                                Factor::Literal("-1", Type::Int),
                                &self.symbols,
                                tok.line,
                            )?;
                            self.codegen.handle_op()?;
                        }
                        Ok(ty)
                    }
                    _ => Err(self.unexpected("an identifier or numeric literal after the sign")),
                }
            }
            TokenKind::Ident => {
                let tok = self.advance();
                self.codegen
                    .handle_factor(Factor::Ident(&tok.lit), &self.symbols, tok.line)
            }
            TokenKind::IntLit => {
                let tok = self.advance();
                self.codegen
                    .handle_factor(Factor::Literal(&tok.lit, Type::Int), &self.symbols, tok.line)
            }
            TokenKind::FloatLit => {
                let tok = self.advance();
                self.codegen.handle_factor(
                    Factor::Literal(&tok.lit, Type::Float),
                    &self.symbols,
                    tok.line,
                )
            }
            _ => Err(self.unexpected("'(', a sign, an identifier, or a numeric literal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;
    use crate::lexer::Lexer;

    fn compile(src: &str) -> Result<(Vec<Quadruple>, SymbolTable, MemoryManager)> {
        let tokens = Lexer::new(src).lex()?;
        let mut parser = Parser::new(tokens);
        parser.parse_program()?;
        Ok(parser.into_parts())
    }

    #[test]
    fn entry_jump_lands_on_the_main_section() {
        let (quads, _, _) =
            compile("program p; func f() { print(1); }; begin f(); end").unwrap();
        assert_eq!(quads[0].op, Op::Goto);
        let target = match quads[0].result {
            Some(Operand::Idx(t)) => t,
            _ => panic!("entry jump unresolved"),
        };
        // the first main quad is the call's ERA
        assert_eq!(quads[target].op, Op::Era);
    }

    #[test]
    fn precedence_multiplies_before_adding() {
        let (quads, _, _) =
            compile("program p; var x : int; begin x = 2 + 3 * 4; end").unwrap();
        let ops: Vec<Op> = quads[1..].iter().map(|q| q.op).collect();
        assert_eq!(ops, vec![Op::Mul, Op::Add, Op::Assign]);
    }

    #[test]
    fn multiplication_is_left_associative() {
        let (quads, _, _) =
            compile("program p; var x : int; begin x = 8 / 4 / 2; end").unwrap();
        // (8/4)/2: the first division's temp feeds the second's left side
        let first = match quads[1].result {
            Some(Operand::Addr(a)) => a,
            _ => panic!("no temp"),
        };
        assert_eq!(quads[2].left, Some(Operand::Addr(first)));
    }

    #[test]
    fn no_unresolved_jumps_remain() {
        let src = "program p; var i : int; begin i = 0; while (i < 3) { \
                   if (i > 1) { print(i); } else { print(0); } i = i + 1; } end";
        let (quads, _, _) = compile(src).unwrap();
        for (n, q) in quads.iter().enumerate() {
            if matches!(q.op, Op::Goto | Op::GotoF) {
                assert!(
                    matches!(q.result, Some(Operand::Idx(t)) if t <= quads.len()),
                    "quad {} has an unresolved target: {}",
                    n,
                    q
                );
            }
        }
    }

    #[test]
    fn repeated_literals_intern_once() {
        let (_, _, memory) = compile(
            "program p; var x, y : int; begin x = 42; y = 42 + 42; print(42); end",
        )
        .unwrap();
        let mut memory = memory;
        let a = memory
            .allocate_constant("42", Type::Int, crate::memory::Value::Int(42))
            .unwrap();
        // a fresh intern of the same literal reuses the compile-time cell
        assert_eq!(memory.load(a).unwrap(), crate::memory::Value::Int(42));
        assert_eq!(
            a,
            crate::memory::segment_base(crate::memory::Scope::Constant, Type::Int).unwrap()
        );
    }

    #[test]
    fn local_and_global_names_get_distinct_addresses() {
        let (_, symbols, _) = compile(
            "program p; var x : int; func f(x : float) { print(x); }; begin x = 1; end",
        )
        .unwrap();
        let global = symbols.lookup("x").unwrap().addr;
        let local = symbols.function("f").unwrap().params[0].addr;
        assert_ne!(global, local);
    }

    #[test]
    fn assigning_a_float_to_an_int_fails() {
        let err = compile("program p; var s : int; begin s = 1.5; end").unwrap_err();
        assert!(matches!(err, Error::Incompatible { op: Op::Assign, .. }));
    }

    #[test]
    fn undeclared_variable_fails() {
        let err = compile("program p; begin x = 1; end").unwrap_err();
        assert!(matches!(err, Error::Undeclared { .. }));
    }

    #[test]
    fn duplicate_declaration_fails() {
        let err = compile("program p; var x : int; var x : float; begin end").unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));
    }

    #[test]
    fn call_arity_is_checked() {
        let err = compile(
            "program p; func add(a : int, b : int) { print(a + b); }; begin add(2); end",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ArityMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[test]
    fn call_argument_types_are_checked() {
        let err = compile(
            "program p; func f(a : int) { print(a); }; begin f(1.5); end",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ArgTypeMismatch { index: 1, .. }));
    }

    #[test]
    fn statement_must_start_with_assign_or_call() {
        let err = compile("program p; var x : int; begin x + 1; end").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn nested_functions_are_rejected() {
        let err = compile(
            "program p; func f() { func g() { }; }; begin f(); end",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let src = "program p; var i : int; begin i = 0; while (i < 3) { print(i); i = i + 1; } end";
        let (a, _, _) = compile(src).unwrap();
        let (b, _, _) = compile(src).unwrap();
        assert_eq!(a, b);
    }
}
