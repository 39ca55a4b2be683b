// ==============================================================================
// Syntax model: sections, blocks, statement arena
// ==============================================================================
//
// Statements live in a `la_arena::Arena`; sections and control-flow blocks
// reference them by `StatementId`. Token indices inside a statement point into
// that statement's own token vector, which holds every token of the
// statement's source lines in order (for blocks: the header line, branch
// marker lines, and the closing END line — nested statements own their own
// tokens).

use la_arena::{Arena, Idx};
use smol_str::SmolStr;

use crate::lexer::{lex_lines, LexLine};
use crate::tokens::{Token, TokenKind};
use crate::version::RobotVersion;

pub type StatementId = Idx<Statement>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: SmolStr,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Settings,
    Variables,
    TestCases,
    Keywords,
    Comments,
    Invalid,
}

#[derive(Debug)]
pub struct Section {
    pub kind: SectionKind,
    pub header: Token,
    pub body: SectionBody,
}

#[derive(Debug)]
pub enum SectionBody {
    Statements(Vec<StatementId>),
    TestCases(Vec<TestCase>),
    Keywords(Vec<KeywordDef>),
}

#[derive(Debug)]
pub struct TestCase {
    pub name: Token,
    pub body: Vec<StatementId>,
}

#[derive(Debug)]
pub struct KeywordDef {
    pub name: Token,
    pub body: Vec<StatementId>,
}

#[derive(Debug)]
pub struct Statement {
    pub kind: StatementKind,
    pub tokens: Vec<Token>,
}

#[derive(Debug)]
pub enum StatementKind {
    KeywordCall {
        assigns: Vec<usize>,
        keyword: usize,
        args: Vec<usize>,
    },
    LibraryImport {
        name: Option<usize>,
        args: Vec<usize>,
        alias: Option<usize>,
    },
    ResourceImport {
        name: Option<usize>,
    },
    VariablesImport {
        name: Option<usize>,
        args: Vec<usize>,
    },
    VariableDef {
        name: usize,
        values: Vec<usize>,
    },
    Setting {
        name: usize,
        values: Vec<usize>,
    },
    For {
        variables: Vec<usize>,
        separator: Option<usize>,
        values: Vec<usize>,
        body: Vec<StatementId>,
    },
    If {
        branches: Vec<IfBranch>,
    },
    While {
        condition: Vec<usize>,
        body: Vec<StatementId>,
    },
    Try {
        branches: Vec<TryBranch>,
    },
    Return {
        values: Vec<usize>,
    },
    Break,
    Continue,
    Var {
        name: Option<usize>,
        values: Vec<usize>,
    },
    /// `Language: xx` marker before the first section.
    Config {
        marker: usize,
        values: Vec<usize>,
    },
    Error {
        message: SmolStr,
    },
}

#[derive(Debug)]
pub struct IfBranch {
    /// Index of the IF / ELSE IF / ELSE token in the statement's tokens.
    pub marker: usize,
    pub condition: Vec<usize>,
    pub body: Vec<StatementId>,
}

#[derive(Debug)]
pub struct TryBranch {
    /// Index of the TRY / EXCEPT / ELSE / FINALLY token.
    pub marker: usize,
    pub patterns: Vec<usize>,
    pub body: Vec<StatementId>,
}

#[derive(Debug, Default)]
pub struct Ast {
    pub arena: Arena<Statement>,
    pub sections: Vec<Section>,
    /// Statements appearing before the first section header.
    pub orphans: Vec<StatementId>,
    pub errors: Vec<ParseError>,
}

impl Ast {
    pub fn statement(&self, id: StatementId) -> &Statement {
        &self.arena[id]
    }

    /// Source range of a statement, including nested body statements.
    pub fn statement_range(&self, id: StatementId) -> NodeRange {
        let stmt = &self.arena[id];
        let mut range = tokens_range(&stmt.tokens).unwrap_or(NodeRange {
            start_line: 0,
            start_col: 0,
            end_line: 0,
            end_col: 0,
        });
        for child in stmt.kind.bodies().iter().flat_map(|b| b.iter()) {
            let child_range = self.statement_range(*child);
            if (child_range.end_line, child_range.end_col) > (range.end_line, range.end_col) {
                range.end_line = child_range.end_line;
                range.end_col = child_range.end_col;
            }
        }
        range
    }

    /// Depth-first walk over every statement in the document.
    pub fn walk(&self, f: &mut impl FnMut(StatementId, &Statement)) {
        let mut visit = Vec::new();
        for id in &self.orphans {
            visit.push(*id);
        }
        for section in &self.sections {
            match &section.body {
                SectionBody::Statements(ids) => visit.extend(ids.iter().copied()),
                SectionBody::TestCases(cases) => {
                    for case in cases {
                        visit.extend(case.body.iter().copied());
                    }
                }
                SectionBody::Keywords(defs) => {
                    for def in defs {
                        visit.extend(def.body.iter().copied());
                    }
                }
            }
        }
        for id in visit {
            self.walk_statement(id, f);
        }
    }

    fn walk_statement(&self, id: StatementId, f: &mut impl FnMut(StatementId, &Statement)) {
        f(id, &self.arena[id]);
        let children: Vec<StatementId> = self.arena[id]
            .kind
            .bodies()
            .iter()
            .flat_map(|b| b.iter().copied())
            .collect();
        for child in children {
            self.walk_statement(child, f);
        }
    }

    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.sections.iter().filter_map(|s| match &s.body {
            SectionBody::TestCases(cases) => Some(cases.iter()),
            _ => None,
        })
        .flatten()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &KeywordDef> {
        self.sections.iter().filter_map(|s| match &s.body {
            SectionBody::Keywords(defs) => Some(defs.iter()),
            _ => None,
        })
        .flatten()
    }
}

impl Statement {
    /// Range of the statement's own tokens (not nested bodies).
    pub fn own_range(&self) -> Option<NodeRange> {
        tokens_range(&self.tokens)
    }

    pub fn content_token(&self, idx: usize) -> &Token {
        &self.tokens[idx]
    }
}

impl StatementKind {
    /// Nested statement bodies, for walking.
    pub fn bodies(&self) -> Vec<&Vec<StatementId>> {
        match self {
            StatementKind::For { body, .. } | StatementKind::While { body, .. } => vec![body],
            StatementKind::If { branches } => branches.iter().map(|b| &b.body).collect(),
            StatementKind::Try { branches } => branches.iter().map(|b| &b.body).collect(),
            _ => Vec::new(),
        }
    }
}

fn tokens_range(tokens: &[Token]) -> Option<NodeRange> {
    let content: Vec<&Token> = tokens.iter().filter(|t| t.kind.is_content()).collect();
    let picked: Vec<&Token> = if content.is_empty() {
        tokens.iter().collect()
    } else {
        content
    };
    let first = picked.first()?;
    let mut range = NodeRange {
        start_line: first.line,
        start_col: first.col,
        end_line: first.line,
        end_col: first.end_col,
    };
    for tok in picked {
        if (tok.line, tok.col) < (range.start_line, range.start_col) {
            range.start_line = tok.line;
            range.start_col = tok.col;
        }
        if (tok.line, tok.end_col) > (range.end_line, range.end_col) {
            range.end_line = tok.line;
            range.end_col = tok.end_col;
        }
    }
    Some(range)
}

// ==============================================================================
// Parsing
// ==============================================================================

pub fn parse(text: &str, version: RobotVersion) -> Ast {
    let lines = lex_lines(text, version);
    Parser::default().run(lines)
}

/// What a body line means to the block parser.
enum LineCmd {
    Stmt(Statement),
    Open(Statement),
    Branch { kind: TokenKind, tokens: Vec<Token> },
    End { tokens: Vec<Token> },
}

#[derive(Default)]
struct Parser {
    ast: Ast,
    /// Open control-flow blocks, innermost last.
    stack: Vec<StatementId>,
}

impl Parser {
    fn run(mut self, lines: Vec<LexLine>) -> Ast {
        // Merge continuation lines into logical lines first.
        let logicals = merge_continuations(lines);

        let mut section: Option<Section> = None;
        let mut block: Option<BlockUnderConstruction> = None;

        for logical in logicals {
            let first_content = logical
                .tokens
                .iter()
                .find(|t| t.kind.is_content())
                .cloned();
            let Some(first) = first_content else {
                continue;
            };

            if is_header_kind(first.kind) {
                self.close_block(&mut section, &mut block);
                if let Some(done) = section.take() {
                    self.ast.sections.push(done);
                }
                section = Some(new_section(first));
                continue;
            }

            match section.as_ref().map(|s| s.kind) {
                None => {
                    let stmt = self.build_statement(logical.tokens);
                    let id = self.ast.arena.alloc(stmt);
                    self.ast.orphans.push(id);
                }
                Some(SectionKind::TestCases) | Some(SectionKind::Keywords) => {
                    if !logical.indented
                        && matches!(
                            first.kind,
                            TokenKind::TestCaseName | TokenKind::KeywordName
                        )
                    {
                        self.close_block(&mut section, &mut block);
                        let (name, rest) = split_name_line(logical.tokens);
                        block = Some(BlockUnderConstruction {
                            name,
                            body: Vec::new(),
                        });
                        if let Some(rest) = rest {
                            self.handle_body_line(rest, block.as_mut().unwrap());
                        }
                    } else if let Some(current) = block.as_mut() {
                        self.handle_body_line(logical.tokens, current);
                    } else {
                        self.ast.errors.push(ParseError {
                            message: "statement outside any test case or keyword".into(),
                            line: first.line,
                        });
                        let stmt = self.build_statement(logical.tokens);
                        let id = self.ast.arena.alloc(stmt);
                        self.ast.orphans.push(id);
                    }
                }
                Some(_) => {
                    let stmt = self.build_statement(logical.tokens);
                    let id = self.ast.arena.alloc(stmt);
                    if let Some(Section {
                        body: SectionBody::Statements(ids),
                        ..
                    }) = section.as_mut()
                    {
                        ids.push(id);
                    }
                }
            }
        }

        self.close_block(&mut section, &mut block);
        if let Some(done) = section.take() {
            self.ast.sections.push(done);
        }
        self.ast
    }

    fn handle_body_line(&mut self, tokens: Vec<Token>, block: &mut BlockUnderConstruction) {
        match self.parse_body_line(tokens) {
            LineCmd::Stmt(stmt) => {
                let id = self.ast.arena.alloc(stmt);
                self.append(id, block);
            }
            LineCmd::Open(stmt) => {
                let id = self.ast.arena.alloc(stmt);
                self.append(id, block);
                self.stack.push(id);
            }
            LineCmd::Branch { kind, tokens } => {
                let line = tokens.first().map(|t| t.line).unwrap_or(0);
                let Some(&open) = self.stack.last() else {
                    self.ast.errors.push(ParseError {
                        message: format!("{kind:?} without an open block").into(),
                        line,
                    });
                    return;
                };
                if !self.start_branch(open, kind, tokens) {
                    self.ast.errors.push(ParseError {
                        message: format!("{kind:?} not valid in this block").into(),
                        line,
                    });
                }
            }
            LineCmd::End { tokens } => match self.stack.pop() {
                Some(open) => self.ast.arena[open].tokens.extend(tokens),
                None => {
                    let line = tokens.first().map(|t| t.line).unwrap_or(0);
                    self.ast.errors.push(ParseError {
                        message: "END without an open block".into(),
                        line,
                    });
                }
            },
        }
    }

    /// Append a finished statement into the innermost open body.
    fn append(&mut self, id: StatementId, block: &mut BlockUnderConstruction) {
        if let Some(&open) = self.stack.last() {
            match &mut self.ast.arena[open].kind {
                StatementKind::For { body, .. } | StatementKind::While { body, .. } => {
                    body.push(id)
                }
                StatementKind::If { branches } => branches.last_mut().unwrap().body.push(id),
                StatementKind::Try { branches } => branches.last_mut().unwrap().body.push(id),
                _ => block.body.push(id),
            }
        } else {
            block.body.push(id);
        }
    }

    /// Attach a branch marker line to the innermost open block. Returns false
    /// when the marker does not fit the block kind.
    fn start_branch(&mut self, open: StatementId, kind: TokenKind, tokens: Vec<Token>) -> bool {
        let stmt = &mut self.ast.arena[open];
        let marker_base = stmt.tokens.len();
        let marker_offset = tokens.iter().position(|t| t.kind == kind);
        let content_after: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(i, t)| {
                t.kind.is_content() && Some(*i) != marker_offset
            })
            .map(|(i, _)| marker_base + i)
            .collect();
        let Some(marker_offset) = marker_offset else {
            return false;
        };
        let marker = marker_base + marker_offset;

        let ok = match (&mut stmt.kind, kind) {
            (StatementKind::If { branches }, TokenKind::ElseIf | TokenKind::Else) => {
                branches.push(IfBranch {
                    marker,
                    condition: content_after,
                    body: Vec::new(),
                });
                true
            }
            (
                StatementKind::Try { branches },
                TokenKind::Except | TokenKind::Else | TokenKind::Finally,
            ) => {
                branches.push(TryBranch {
                    marker,
                    patterns: content_after,
                    body: Vec::new(),
                });
                true
            }
            _ => false,
        };
        if ok {
            stmt.tokens.extend(tokens);
        }
        ok
    }

    /// Close the current test/keyword block, implicitly terminating any open
    /// control-flow blocks.
    fn close_block(
        &mut self,
        section: &mut Option<Section>,
        block: &mut Option<BlockUnderConstruction>,
    ) {
        while let Some(open) = self.stack.pop() {
            let line = self.ast.arena[open]
                .own_range()
                .map(|r| r.start_line)
                .unwrap_or(0);
            self.ast.errors.push(ParseError {
                message: "block is missing its END".into(),
                line,
            });
        }
        let Some(done) = block.take() else {
            return;
        };
        if let Some(sec) = section.as_mut() {
            match &mut sec.body {
                SectionBody::TestCases(cases) => cases.push(TestCase {
                    name: done.name,
                    body: done.body,
                }),
                SectionBody::Keywords(defs) => defs.push(KeywordDef {
                    name: done.name,
                    body: done.body,
                }),
                SectionBody::Statements(_) => {}
            }
        }
    }

    fn parse_body_line(&mut self, tokens: Vec<Token>) -> LineCmd {
        let first = tokens
            .iter()
            .find(|t| t.kind.is_content())
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Error);
        match first {
            TokenKind::For | TokenKind::If | TokenKind::While | TokenKind::Try => {
                LineCmd::Open(self.build_statement(tokens))
            }
            TokenKind::ElseIf | TokenKind::Else | TokenKind::Except | TokenKind::Finally => {
                LineCmd::Branch {
                    kind: first,
                    tokens,
                }
            }
            TokenKind::End => LineCmd::End { tokens },
            _ => LineCmd::Stmt(self.build_statement(tokens)),
        }
    }

    fn build_statement(&mut self, tokens: Vec<Token>) -> Statement {
        let content: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind.is_content())
            .map(|(i, _)| i)
            .collect();
        let kind = build_statement_kind(&tokens, &content);
        Statement { kind, tokens }
    }
}

struct BlockUnderConstruction {
    name: Token,
    body: Vec<StatementId>,
}

fn is_header_kind(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::SettingHeader
            | TokenKind::VariableHeader
            | TokenKind::TestCaseHeader
            | TokenKind::KeywordHeader
            | TokenKind::CommentHeader
            | TokenKind::InvalidHeader
    )
}

fn new_section(header: Token) -> Section {
    let kind = match header.kind {
        TokenKind::SettingHeader => SectionKind::Settings,
        TokenKind::VariableHeader => SectionKind::Variables,
        TokenKind::TestCaseHeader => SectionKind::TestCases,
        TokenKind::KeywordHeader => SectionKind::Keywords,
        TokenKind::CommentHeader => SectionKind::Comments,
        _ => SectionKind::Invalid,
    };
    let body = match kind {
        SectionKind::TestCases => SectionBody::TestCases(Vec::new()),
        SectionKind::Keywords => SectionBody::Keywords(Vec::new()),
        _ => SectionBody::Statements(Vec::new()),
    };
    Section { kind, header, body }
}

/// Split a block-name line into the name token and, when the line carries an
/// inline statement, the remaining tokens.
fn split_name_line(tokens: Vec<Token>) -> (Token, Option<Vec<Token>>) {
    let name_idx = tokens
        .iter()
        .position(|t| matches!(t.kind, TokenKind::TestCaseName | TokenKind::KeywordName))
        .unwrap_or(0);
    let name = tokens[name_idx].clone();
    let rest: Vec<Token> = tokens.into_iter().skip(name_idx + 1).collect();
    if rest.iter().any(|t| t.kind.is_content()) {
        (name, Some(rest))
    } else {
        (name, None)
    }
}

fn build_statement_kind(tokens: &[Token], content: &[usize]) -> StatementKind {
    let Some(&first) = content.first() else {
        return StatementKind::Error {
            message: "empty statement".into(),
        };
    };
    let first_tok = &tokens[first];
    let rest = &content[1..];

    match first_tok.kind {
        TokenKind::SettingName => {
            let lowered = first_tok.value.to_ascii_lowercase();
            match lowered.as_str() {
                "library" => {
                    let name = rest.first().copied();
                    // `AS` (or the older `WITH NAME`) introduces the alias.
                    let as_pos = rest.iter().position(|&i| {
                        tokens[i].value == "AS" || tokens[i].value == "WITH NAME"
                    });
                    let (args, alias) = match as_pos {
                        Some(p) => (
                            rest[1..p].to_vec(),
                            rest.get(p + 1).copied(),
                        ),
                        None => (rest.get(1..).unwrap_or(&[]).to_vec(), None),
                    };
                    StatementKind::LibraryImport { name, args, alias }
                }
                "resource" => StatementKind::ResourceImport {
                    name: rest.first().copied(),
                },
                "variables" => StatementKind::VariablesImport {
                    name: rest.first().copied(),
                    args: rest.get(1..).unwrap_or(&[]).to_vec(),
                },
                _ => StatementKind::Setting {
                    name: first,
                    values: rest.to_vec(),
                },
            }
        }
        TokenKind::Variable => StatementKind::VariableDef {
            name: first,
            values: rest.to_vec(),
        },
        TokenKind::Assign | TokenKind::Keyword => {
            let assigns: Vec<usize> = content
                .iter()
                .copied()
                .filter(|&i| tokens[i].kind == TokenKind::Assign)
                .collect();
            let keyword = content
                .iter()
                .copied()
                .find(|&i| tokens[i].kind == TokenKind::Keyword);
            match keyword {
                Some(keyword) => {
                    let args: Vec<usize> = content
                        .iter()
                        .copied()
                        .filter(|&i| i > keyword)
                        .collect();
                    StatementKind::KeywordCall {
                        assigns,
                        keyword,
                        args,
                    }
                }
                None => StatementKind::Error {
                    message: "assignment without a keyword call".into(),
                },
            }
        }
        TokenKind::For => {
            let variables: Vec<usize> = rest
                .iter()
                .copied()
                .filter(|&i| tokens[i].kind == TokenKind::Variable)
                .collect();
            let separator = rest
                .iter()
                .copied()
                .find(|&i| tokens[i].kind == TokenKind::ForSeparator);
            let values: Vec<usize> = match separator {
                Some(sep) => rest.iter().copied().filter(|&i| i > sep).collect(),
                None => Vec::new(),
            };
            StatementKind::For {
                variables,
                separator,
                values,
                body: Vec::new(),
            }
        }
        TokenKind::If => StatementKind::If {
            branches: vec![IfBranch {
                marker: first,
                condition: rest.to_vec(),
                body: Vec::new(),
            }],
        },
        TokenKind::While => StatementKind::While {
            condition: rest.to_vec(),
            body: Vec::new(),
        },
        TokenKind::Try => StatementKind::Try {
            branches: vec![TryBranch {
                marker: first,
                patterns: rest.to_vec(),
                body: Vec::new(),
            }],
        },
        TokenKind::Return => StatementKind::Return {
            values: rest.to_vec(),
        },
        TokenKind::Break => StatementKind::Break,
        TokenKind::Continue => StatementKind::Continue,
        TokenKind::Var => StatementKind::Var {
            name: rest
                .first()
                .copied()
                .filter(|&i| tokens[i].kind == TokenKind::Variable),
            values: rest.get(1..).unwrap_or(&[]).to_vec(),
        },
        TokenKind::Config => StatementKind::Config {
            marker: first,
            values: rest.to_vec(),
        },
        _ => StatementKind::Error {
            message: format!("unexpected {:?} token", first_tok.kind).into(),
        },
    }
}

/// Merge `...` continuation lines into their preceding logical line.
fn merge_continuations(lines: Vec<LexLine>) -> Vec<Logical> {
    let mut out: Vec<Logical> = Vec::new();
    for line in lines {
        if line.continuation {
            if let Some(prev) = out.last_mut() {
                prev.tokens.extend(line.tokens);
                continue;
            }
        }
        if line.is_blank() {
            continue;
        }
        out.push(Logical {
            indented: line.indented,
            tokens: line.tokens,
        });
    }
    out
}

struct Logical {
    tokens: Vec<Token>,
    indented: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(src: &str) -> Ast {
        parse(src, RobotVersion::default())
    }

    #[test]
    fn sections_and_blocks() {
        let src = "\
*** Settings ***
Library    Collections

*** Test Cases ***
First
    Log    one
Second
    Log    two

*** Keywords ***
My Keyword
    No Operation
";
        let ast = parse_default(src);
        assert_eq!(ast.sections.len(), 3);
        assert_eq!(ast.test_cases().count(), 2);
        assert_eq!(ast.keywords().count(), 1);
        let names: Vec<_> = ast.test_cases().map(|t| t.name.value.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
    }

    #[test]
    fn library_import_with_alias() {
        let src = "*** Settings ***\nLibrary    Remote    http://x    AS    R\n";
        let ast = parse_default(src);
        let SectionBody::Statements(ids) = &ast.sections[0].body else {
            panic!("expected statement body");
        };
        let stmt = ast.statement(ids[0]);
        let StatementKind::LibraryImport { name, args, alias } = &stmt.kind else {
            panic!("expected library import: {:?}", stmt.kind);
        };
        assert_eq!(stmt.tokens[name.unwrap()].value, "Remote");
        assert_eq!(args.len(), 1);
        assert_eq!(stmt.tokens[alias.unwrap()].value, "R");
    }

    #[test]
    fn keyword_call_with_assigns() {
        let src = "*** Test Cases ***\nT\n    ${x}    ${y} =    Split Name    full\n";
        let ast = parse_default(src);
        let case = ast.test_cases().next().unwrap();
        let stmt = ast.statement(case.body[0]);
        let StatementKind::KeywordCall {
            assigns,
            keyword,
            args,
        } = &stmt.kind
        else {
            panic!("expected keyword call: {:?}", stmt.kind);
        };
        assert_eq!(assigns.len(), 2);
        assert_eq!(stmt.tokens[*keyword].value, "Split Name");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn nested_for_and_if() {
        let src = "\
*** Test Cases ***
T
    FOR    ${i}    IN    a    b
        IF    ${i}
            Log    yes
        ELSE
            Log    no
        END
    END
";
        let ast = parse_default(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let case = ast.test_cases().next().unwrap();
        assert_eq!(case.body.len(), 1);
        let StatementKind::For { body, .. } = &ast.statement(case.body[0]).kind else {
            panic!("expected FOR");
        };
        assert_eq!(body.len(), 1);
        let StatementKind::If { branches } = &ast.statement(body[0]).kind else {
            panic!("expected IF");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].body.len(), 1);
        assert_eq!(branches[1].body.len(), 1);
    }

    #[test]
    fn missing_end_is_reported_not_fatal() {
        let src = "*** Test Cases ***\nT\n    FOR    ${i}    IN    a\n        Log    x\n";
        let ast = parse_default(src);
        assert!(
            ast.errors.iter().any(|e| e.message.contains("END")),
            "{:?}",
            ast.errors
        );
        assert_eq!(ast.test_cases().count(), 1);
    }

    #[test]
    fn continuation_merges_into_statement() {
        let src = "\
*** Settings ***
Library    OperatingSystem
...    WITH NAME
...    OS
";
        let ast = parse_default(src);
        let SectionBody::Statements(ids) = &ast.sections[0].body else {
            panic!()
        };
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn try_except_branches() {
        let src = "\
*** Keywords ***
K
    TRY
        Risky
    EXCEPT    Oops*
        Recover
    FINALLY
        Cleanup
    END
";
        let ast = parse_default(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let def = ast.keywords().next().unwrap();
        let StatementKind::Try { branches } = &ast.statement(def.body[0]).kind else {
            panic!("expected TRY");
        };
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[1].patterns.len(), 1);
    }

    #[test]
    fn statement_range_covers_block_body() {
        let src = "*** Test Cases ***\nT\n    FOR    ${i}    IN    a\n        Log    x\n    END\n";
        let ast = parse_default(src);
        let case = ast.test_cases().next().unwrap();
        let range = ast.statement_range(case.body[0]);
        assert_eq!(range.start_line, 2);
        assert_eq!(range.end_line, 4, "range should include END: {range:?}");
    }

    #[test]
    fn variable_section_definitions() {
        let src = "*** Variables ***\n${NAME}    value\n@{LIST}    a    b\n";
        let ast = parse_default(src);
        let SectionBody::Statements(ids) = &ast.sections[0].body else {
            panic!()
        };
        assert_eq!(ids.len(), 2);
        let StatementKind::VariableDef { name, values } = &ast.statement(ids[1]).kind else {
            panic!()
        };
        assert_eq!(ast.statement(ids[1]).tokens[*name].value, "@{LIST}");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn orphan_content_before_sections() {
        let src = "junk line\n*** Settings ***\n";
        let ast = parse_default(src);
        assert_eq!(ast.orphans.len(), 1);
    }
}
