// ==============================================================================
// textDocument/publishDiagnostics — kernel findings to wire diagnostics
// ==============================================================================
//
// Three sources, in order: lexer token errors, parse errors, and the
// namespace's import/analysis diagnostics. Import failures never abort
// collection; a cancelled analysis yields no diagnostics at all (the caller
// drops the publish).

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::convert;
use crate::state::AnalysisShared;
use robot_analysis::AnalysisError;
use robot_text::{CancellationToken, TextDocument};

pub fn collect(
    shared: &AnalysisShared,
    document: &TextDocument,
    token: &CancellationToken,
) -> Result<Vec<Diagnostic>, AnalysisError> {
    let mut out = Vec::new();

    for tok in shared.cache.get_tokens(document).iter() {
        token.check().map_err(AnalysisError::from)?;
        if let Some(error) = &tok.error {
            out.push(Diagnostic {
                range: convert::token_range_to_lsp(document, tok, shared.encoding),
                severity: Some(DiagnosticSeverity::WARNING),
                source: Some("robot".to_string()),
                message: error.to_string(),
                ..Default::default()
            });
        }
    }

    let ast = shared.cache.get_model(document);
    for error in &ast.errors {
        out.push(Diagnostic {
            range: Range::new(
                Position::new(error.line, 0),
                Position::new(error.line, u32::MAX),
            ),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some("robot".to_string()),
            message: error.message.to_string(),
            ..Default::default()
        });
    }

    let namespace = shared.cache.get_namespace(document, token)?;
    for diagnostic in namespace.get_diagnostics() {
        out.push(convert::diagnostic_to_lsp(
            document,
            diagnostic,
            shared.encoding,
        ));
    }

    Ok(out)
}
