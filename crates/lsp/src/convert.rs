// ==============================================================================
// Core <-> LSP wire type conversion
// ==============================================================================
//
// The kernel measures columns in Unicode scalars (UTF-32); the wire uses the
// negotiated position encoding. All conversions transcode against the
// referenced line of the document text.

use tower_lsp::lsp_types;

use robot_analysis::{
    analyze_call, AnalysisDiagnostic, CallPart, CallPartKind, KeywordHit, Namespace, Severity,
};
use robot_ast::{Ast, NodeRange, StatementKind, Token};
use robot_text::{CancellationToken, Position, PositionEncoding, TextDocument};

pub fn position_from_lsp(pos: lsp_types::Position) -> Position {
    Position::new(pos.line, pos.character)
}

/// A wire position translated into scalar columns.
pub fn scalar_position(
    document: &TextDocument,
    pos: lsp_types::Position,
    encoding: PositionEncoding,
) -> Position {
    let character = document
        .transcode_column(pos.line, pos.character, encoding, PositionEncoding::Utf32)
        .unwrap_or(pos.character);
    Position::new(pos.line, character)
}

fn column_to_wire(
    document: &TextDocument,
    line: u32,
    col: u32,
    encoding: PositionEncoding,
) -> u32 {
    document
        .transcode_column(line, col, PositionEncoding::Utf32, encoding)
        .unwrap_or(col)
}

pub fn node_range_to_lsp(
    document: &TextDocument,
    range: NodeRange,
    encoding: PositionEncoding,
) -> lsp_types::Range {
    lsp_types::Range::new(
        lsp_types::Position::new(
            range.start_line,
            column_to_wire(document, range.start_line, range.start_col, encoding),
        ),
        lsp_types::Position::new(
            range.end_line,
            column_to_wire(document, range.end_line, range.end_col, encoding),
        ),
    )
}

pub fn token_range_to_lsp(
    document: &TextDocument,
    token: &Token,
    encoding: PositionEncoding,
) -> lsp_types::Range {
    node_range_to_lsp(
        document,
        NodeRange {
            start_line: token.line,
            start_col: token.col,
            end_line: token.line,
            end_col: token.end_col,
        },
        encoding,
    )
}

pub fn severity_to_lsp(severity: Severity) -> lsp_types::DiagnosticSeverity {
    match severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Information => lsp_types::DiagnosticSeverity::INFORMATION,
        Severity::Hint => lsp_types::DiagnosticSeverity::HINT,
    }
}

pub fn diagnostic_to_lsp(
    document: &TextDocument,
    diagnostic: &AnalysisDiagnostic,
    encoding: PositionEncoding,
) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: node_range_to_lsp(document, diagnostic.range, encoding),
        severity: Some(severity_to_lsp(diagnostic.severity())),
        source: Some("robot".to_string()),
        message: diagnostic.kind.to_string(),
        ..Default::default()
    }
}

// ==============================================================================
// Cursor resolution
// ==============================================================================

/// The keyword call under the cursor, resolved through the namespace. Covers
/// nested run-keyword names: the cursor on the second `Log` of a
/// `Run Keyword If` resolves that `Log`, not the outer call.
pub fn keyword_at(
    ast: &Ast,
    namespace: &Namespace,
    pos: Position,
    token: &CancellationToken,
) -> Option<(CallPart, KeywordHit)> {
    let mut found = None;
    ast.walk(&mut |_, stmt| {
        if found.is_some() {
            return;
        }
        let StatementKind::KeywordCall { keyword, args, .. } = &stmt.kind else {
            return;
        };
        let on_line = stmt.tokens.iter().any(|t| t.line == pos.line);
        if !on_line {
            return;
        }
        let arg_tokens: Vec<&Token> = args.iter().map(|&i| &stmt.tokens[i]).collect();
        let lookup = |name: &str| namespace.find_keyword(name, token).ok().flatten();
        for part in analyze_call(&stmt.tokens[*keyword], &arg_tokens, &lookup) {
            let covers = part.line == pos.line
                && part.col <= pos.character
                && pos.character < part.end_col;
            if covers && matches!(part.kind, CallPartKind::KeywordCall { .. }) {
                if let Some(hit) = lookup(&part.value) {
                    found = Some((part, hit));
                }
                return;
            }
        }
    });
    found
}

/// The token under the cursor, with its owning statement's kind discarded.
pub fn token_at(ast: &Ast, pos: Position) -> Option<Token> {
    let mut found = None;
    ast.walk(&mut |_, stmt| {
        if found.is_some() {
            return;
        }
        for tok in &stmt.tokens {
            if tok.line == pos.line && tok.col <= pos.character && pos.character < tok.end_col {
                found = Some(tok.clone());
                return;
            }
        }
    });
    found
}
