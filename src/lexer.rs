use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Program,
    Var,
    Func,
    Begin,
    End,
    If,
    Else,
    While,
    Print,
    TypeName,
    Ident,
    IntLit,
    FloatLit,
    StrLit,
    RelOp,
    AddOp,
    MulOp,
    Assign,
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Eof,
}

impl TokenKind {
    /// Human form for parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Program => "'program'",
            TokenKind::Var => "'var'",
            TokenKind::Func => "'func'",
            TokenKind::Begin => "'begin'",
            TokenKind::End => "'end'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::Print => "'print'",
            TokenKind::TypeName => "a type name",
            TokenKind::Ident => "an identifier",
            TokenKind::IntLit => "an integer literal",
            TokenKind::FloatLit => "a float literal",
            TokenKind::StrLit => "a string literal",
            TokenKind::RelOp => "a comparison operator",
            TokenKind::AddOp => "'+' or '-'",
            TokenKind::MulOp => "'*' or '/'",
            TokenKind::Assign => "'='",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lit: String,
    pub line: usize,
    pub col: usize,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            input: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn cur(&self) -> u8 {
        self.input.get(self.pos).copied().unwrap_or(0)
    }

    fn peek(&self) -> u8 {
        self.input.get(self.pos + 1).copied().unwrap_or(0)
    }

    fn advance(&mut self) {
        if self.cur() == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() {
            match self.cur() {
                b' ' | b'\t' | b'\n' | b'\r' => self.advance(),
                b'/' if self.peek() == b'/' => {
                    while self.pos < self.input.len() && self.cur() != b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn err(&self, msg: String) -> Error {
        Error::Lex {
            line: self.line,
            col: self.col,
            msg,
        }
    }

    pub fn lex(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::with_capacity(self.input.len() / 6);

        while self.pos < self.input.len() {
            self.skip_whitespace();
            if self.pos >= self.input.len() {
                break;
            }

            let (line, col) = (self.line, self.col);
            let mut push = |kind, lit: String| {
                tokens.push(Token {
                    kind,
                    lit,
                    line,
                    col,
                })
            };

            match self.cur() {
                b'0'..=b'9' => {
                    let start = self.pos;
                    while matches!(self.cur(), b'0'..=b'9') {
                        self.advance();
                    }
                    let mut kind = TokenKind::IntLit;
                    if self.cur() == b'.' && matches!(self.peek(), b'0'..=b'9') {
                        kind = TokenKind::FloatLit;
                        self.advance();
                        while matches!(self.cur(), b'0'..=b'9') {
                            self.advance();
                        }
                    }
                    let lit = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                    push(kind, lit);
                }
                b'"' => {
                    let start = self.pos;
                    self.advance();
                    while self.pos < self.input.len() && self.cur() != b'"' {
                        if self.cur() == b'\n' {
                            return Err(self.err("unterminated string literal".to_string()));
                        }
                        self.advance();
                    }
                    if self.pos >= self.input.len() {
                        return Err(self.err("unterminated string literal".to_string()));
                    }
                    self.advance();
                    // the quotes stay in the literal; print strips them
                    let lit = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                    push(TokenKind::StrLit, lit);
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    let start = self.pos;
                    while matches!(self.cur(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
                        self.advance();
                    }
                    let word = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                    let kind = match word.as_str() {
                        "program" => TokenKind::Program,
                        "var" => TokenKind::Var,
                        "func" => TokenKind::Func,
                        "begin" => TokenKind::Begin,
                        "end" => TokenKind::End,
                        "if" => TokenKind::If,
                        "else" => TokenKind::Else,
                        "while" => TokenKind::While,
                        "print" => TokenKind::Print,
                        "int" | "float" => TokenKind::TypeName,
                        _ => TokenKind::Ident,
                    };
                    push(kind, word);
                }
                b'+' => {
                    push(TokenKind::AddOp, "+".to_string());
                    self.advance();
                }
                b'-' => {
                    push(TokenKind::AddOp, "-".to_string());
                    self.advance();
                }
                b'*' => {
                    push(TokenKind::MulOp, "*".to_string());
                    self.advance();
                }
                b'/' => {
                    push(TokenKind::MulOp, "/".to_string());
                    self.advance();
                }
                b'=' => {
                    self.advance();
                    if self.cur() == b'=' {
                        self.advance();
                        push(TokenKind::RelOp, "==".to_string());
                    } else {
                        push(TokenKind::Assign, "=".to_string());
                    }
                }
                b'!' => {
                    self.advance();
                    if self.cur() == b'=' {
                        self.advance();
                        push(TokenKind::RelOp, "!=".to_string());
                    } else {
                        return Err(self.err("expected '=' after '!'".to_string()));
                    }
                }
                b'<' => {
                    push(TokenKind::RelOp, "<".to_string());
                    self.advance();
                }
                b'>' => {
                    push(TokenKind::RelOp, ">".to_string());
                    self.advance();
                }
                b':' => {
                    push(TokenKind::Colon, ":".to_string());
                    self.advance();
                }
                b';' => {
                    push(TokenKind::Semicolon, ";".to_string());
                    self.advance();
                }
                b',' => {
                    push(TokenKind::Comma, ",".to_string());
                    self.advance();
                }
                b'(' => {
                    push(TokenKind::LParen, "(".to_string());
                    self.advance();
                }
                b')' => {
                    push(TokenKind::RParen, ")".to_string());
                    self.advance();
                }
                b'{' => {
                    push(TokenKind::LBrace, "{".to_string());
                    self.advance();
                }
                b'}' => {
                    push(TokenKind::RBrace, "}".to_string());
                    self.advance();
                }
                ch => {
                    return Err(self.err(format!("unexpected character '{}'", ch as char)));
                }
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            lit: String::new(),
            line: self.line,
            col: self.col,
        });
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_a_small_program() {
        let got = kinds("program p; var x : int; begin x = 2 + 3; end");
        use TokenKind::*;
        assert_eq!(
            got,
            vec![
                Program, Ident, Semicolon, Var, Ident, Colon, TypeName, Semicolon, Begin, Ident,
                Assign, IntLit, AddOp, IntLit, Semicolon, End, Eof
            ]
        );
    }

    #[test]
    fn floats_need_a_digit_after_the_dot() {
        let toks = Lexer::new("1.5 2").lex().unwrap();
        assert_eq!(toks[0].kind, TokenKind::FloatLit);
        assert_eq!(toks[0].lit, "1.5");
        assert_eq!(toks[1].kind, TokenKind::IntLit);
    }

    #[test]
    fn strings_keep_their_quotes() {
        let toks = Lexer::new("\"hello\"").lex().unwrap();
        assert_eq!(toks[0].kind, TokenKind::StrLit);
        assert_eq!(toks[0].lit, "\"hello\"");
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = Lexer::new("x\n  y").lex().unwrap();
        assert_eq!((toks[0].line, toks[0].col), (1, 1));
        assert_eq!((toks[1].line, toks[1].col), (2, 3));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let got = kinds("x // ignored\ny");
        assert_eq!(got, vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn comparison_operators_lex_as_relops() {
        let toks = Lexer::new("< > == !=").lex().unwrap();
        for t in &toks[..4] {
            assert_eq!(t.kind, TokenKind::RelOp);
        }
    }

    #[test]
    fn bare_bang_is_an_error() {
        assert!(Lexer::new("!x").lex().is_err());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(Lexer::new("\"oops").lex().is_err());
    }
}
