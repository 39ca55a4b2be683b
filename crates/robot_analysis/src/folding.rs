// ==============================================================================
// Folding ranges
// ==============================================================================
//
// Sections fold from their header to the last line they contain; test cases
// and keywords from their name line; control-flow blocks from their opening
// statement to their END. Single-line constructs produce no range.

use robot_ast::{Ast, SectionBody, StatementId, StatementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldingKind {
    Section,
    TestCase,
    Keyword,
    Block,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldingRange {
    pub start_line: u32,
    pub end_line: u32,
    pub kind: FoldingKind,
}

pub fn folding_ranges(ast: &Ast) -> Vec<FoldingRange> {
    let mut out = Vec::new();

    for section in &ast.sections {
        let header_line = section.header.line;
        let mut last_line = header_line;

        match &section.body {
            SectionBody::Statements(ids) => {
                for &id in ids {
                    last_line = last_line.max(ast.statement_range(id).end_line);
                    collect_blocks(ast, id, &mut out);
                }
            }
            SectionBody::TestCases(cases) => {
                for case in cases {
                    let mut case_end = case.name.line;
                    for &id in &case.body {
                        case_end = case_end.max(ast.statement_range(id).end_line);
                        collect_blocks(ast, id, &mut out);
                    }
                    push_range(&mut out, case.name.line, case_end, FoldingKind::TestCase);
                    last_line = last_line.max(case_end);
                }
            }
            SectionBody::Keywords(defs) => {
                for def in defs {
                    let mut def_end = def.name.line;
                    for &id in &def.body {
                        def_end = def_end.max(ast.statement_range(id).end_line);
                        collect_blocks(ast, id, &mut out);
                    }
                    push_range(&mut out, def.name.line, def_end, FoldingKind::Keyword);
                    last_line = last_line.max(def_end);
                }
            }
        }

        let kind = match section.kind {
            robot_ast::SectionKind::Comments => FoldingKind::Comment,
            _ => FoldingKind::Section,
        };
        push_range(&mut out, header_line, last_line, kind);
    }

    out.sort_by_key(|r| (r.start_line, r.end_line));
    out
}

fn collect_blocks(ast: &Ast, id: StatementId, out: &mut Vec<FoldingRange>) {
    let stmt = ast.statement(id);
    if matches!(
        stmt.kind,
        StatementKind::For { .. }
            | StatementKind::If { .. }
            | StatementKind::While { .. }
            | StatementKind::Try { .. }
    ) {
        let range = ast.statement_range(id);
        push_range(out, range.start_line, range.end_line, FoldingKind::Block);
    }
    for body in stmt.kind.bodies() {
        for &child in body {
            collect_blocks(ast, child, out);
        }
    }
}

fn push_range(out: &mut Vec<FoldingRange>, start_line: u32, end_line: u32, kind: FoldingKind) {
    if end_line > start_line {
        out.push(FoldingRange {
            start_line,
            end_line,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_ast::RobotVersion;

    fn ranges(src: &str) -> Vec<FoldingRange> {
        folding_ranges(&robot_ast::parse(src, RobotVersion::new(7, 0)))
    }

    #[test]
    fn sections_test_cases_and_blocks_fold() {
        let src = "\
*** Test Cases ***
First
    FOR    ${i}    IN    a    b
        Log    ${i}
    END
Second
    Log    two
";
        let got = ranges(src);
        assert!(got.contains(&FoldingRange {
            start_line: 0,
            end_line: 6,
            kind: FoldingKind::Section
        }), "{got:?}");
        assert!(got.contains(&FoldingRange {
            start_line: 1,
            end_line: 4,
            kind: FoldingKind::TestCase
        }), "{got:?}");
        assert!(got.contains(&FoldingRange {
            start_line: 2,
            end_line: 4,
            kind: FoldingKind::Block
        }), "{got:?}");
        assert!(got.contains(&FoldingRange {
            start_line: 5,
            end_line: 6,
            kind: FoldingKind::TestCase
        }), "{got:?}");
    }

    #[test]
    fn single_line_constructs_do_not_fold() {
        let src = "*** Settings ***\n";
        assert!(ranges(src).is_empty());
    }

    #[test]
    fn nested_blocks_fold_independently() {
        let src = "\
*** Keywords ***
K
    IF    ${x}
        FOR    ${i}    IN    a
            Log    ${i}
        END
    END
";
        let got = ranges(src);
        let blocks: Vec<_> = got
            .iter()
            .filter(|r| r.kind == FoldingKind::Block)
            .collect();
        assert_eq!(blocks.len(), 2, "{got:?}");
    }
}
