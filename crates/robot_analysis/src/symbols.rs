// ==============================================================================
// Document symbols
// ==============================================================================
//
// A nested outline: sections at the top, test cases / keywords / variables
// inside them. Selection ranges pin the name token; full ranges cover the
// whole definition.

use robot_ast::{Ast, NodeRange, SectionBody, SectionKind, StatementKind, Token};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Section,
    TestCase,
    Keyword,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSymbol {
    pub name: SmolStr,
    pub kind: SymbolKind,
    /// Full extent of the definition.
    pub range: NodeRange,
    /// The name itself, for cursor placement.
    pub selection_range: NodeRange,
    pub children: Vec<DocumentSymbol>,
}

pub fn document_symbols(ast: &Ast) -> Vec<DocumentSymbol> {
    let mut out = Vec::new();

    for section in &ast.sections {
        let header = &section.header;
        let mut children = Vec::new();
        let mut end = token_range(header);

        match &section.body {
            SectionBody::Statements(ids) => {
                for &id in ids {
                    let stmt = ast.statement(id);
                    let range = ast.statement_range(id);
                    end = widen(end, range);
                    if section.kind == SectionKind::Variables {
                        if let StatementKind::VariableDef { name, .. } = &stmt.kind {
                            let name_tok = &stmt.tokens[*name];
                            children.push(DocumentSymbol {
                                name: name_tok.value.clone(),
                                kind: SymbolKind::Variable,
                                range,
                                selection_range: token_range(name_tok),
                                children: Vec::new(),
                            });
                        }
                    }
                }
            }
            SectionBody::TestCases(cases) => {
                for case in cases {
                    let range = block_range(ast, &case.name, &case.body);
                    end = widen(end, range);
                    children.push(DocumentSymbol {
                        name: case.name.value.clone(),
                        kind: SymbolKind::TestCase,
                        range,
                        selection_range: token_range(&case.name),
                        children: Vec::new(),
                    });
                }
            }
            SectionBody::Keywords(defs) => {
                for def in defs {
                    let range = block_range(ast, &def.name, &def.body);
                    end = widen(end, range);
                    children.push(DocumentSymbol {
                        name: def.name.value.clone(),
                        kind: SymbolKind::Keyword,
                        range,
                        selection_range: token_range(&def.name),
                        children: Vec::new(),
                    });
                }
            }
        }

        out.push(DocumentSymbol {
            name: header.value.clone(),
            kind: SymbolKind::Section,
            range: end,
            selection_range: token_range(header),
            children,
        });
    }

    out
}

fn token_range(token: &Token) -> NodeRange {
    NodeRange {
        start_line: token.line,
        start_col: token.col,
        end_line: token.line,
        end_col: token.end_col,
    }
}

fn block_range(ast: &Ast, name: &Token, body: &[robot_ast::StatementId]) -> NodeRange {
    let mut range = token_range(name);
    for &id in body {
        range = widen(range, ast.statement_range(id));
    }
    range
}

fn widen(mut range: NodeRange, other: NodeRange) -> NodeRange {
    if (other.end_line, other.end_col) > (range.end_line, range.end_col) {
        range.end_line = other.end_line;
        range.end_col = other.end_col;
    }
    range
}
