// ==============================================================================
// textDocument/semanticTokens/full — wire encoding of the kernel's stream
// ==============================================================================

use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens,
    SemanticTokensLegend,
};

use crate::state::AnalysisShared;
use robot_analysis::AnalysisError;
use robot_text::{CancellationToken, TextDocument};

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: robot_analysis::legend_types()
            .iter()
            .copied()
            .map(SemanticTokenType::new)
            .collect(),
        token_modifiers: robot_analysis::legend_modifiers()
            .iter()
            .copied()
            .map(SemanticTokenModifier::new)
            .collect(),
    }
}

pub fn semantic_tokens_full(
    shared: &AnalysisShared,
    document: &TextDocument,
    token: &CancellationToken,
) -> Result<SemanticTokens, AnalysisError> {
    let data = shared
        .cache
        .get_semantic_tokens(document, shared.encoding, token)?
        .iter()
        .map(|tok| SemanticToken {
            delta_line: tok.delta_line,
            delta_start: tok.delta_start,
            length: tok.length,
            token_type: tok.token_type,
            token_modifiers_bitset: tok.modifiers,
        })
        .collect();
    Ok(SemanticTokens {
        result_id: None,
        data,
    })
}
