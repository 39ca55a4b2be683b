// ==============================================================================
// robot_ast: Robot Framework token stream + syntax model
// ==============================================================================
//
// This crate is the parser boundary for the rest of the workspace: everything
// downstream consumes Robot Framework source only through the token and
// statement types defined here. The lexer is line-oriented (Robot is a
// line-oriented language), the syntax model is a flat statement arena with
// sections and blocks referencing statements by id.

mod ast;
mod lexer;
mod tokens;
mod version;

pub use ast::{
    Ast, IfBranch, KeywordDef, NodeRange, ParseError, Section, SectionBody, SectionKind, Statement,
    StatementId, StatementKind, TestCase, TryBranch,
};
pub use lexer::{lex, lex_lines, LexLine};
pub use tokens::{Token, TokenKind};
pub use version::RobotVersion;

/// Parse a full document into its syntax model.
pub fn parse(text: &str, version: RobotVersion) -> Ast {
    ast::parse(text, version)
}
