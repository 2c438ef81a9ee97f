pub mod codegen;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod store;
pub mod symbols;
pub mod vm;

use error::Result;
use store::Artifact;

/// Compile a source text into an executable artifact.
pub fn compile(source: &str) -> Result<Artifact> {
    let tokens = lexer::Lexer::new(source).lex()?;
    let mut parser = parser::Parser::new(tokens);
    parser.parse_program()?;
    let (quads, symbols, memory) = parser.into_parts();
    log::info!("compiled {} quadruples", quads.len());
    Ok(Artifact {
        quads,
        symbols,
        memory,
    })
}
