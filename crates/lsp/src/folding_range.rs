// ==============================================================================
// textDocument/foldingRange
// ==============================================================================

use tower_lsp::lsp_types::{self, FoldingRangeKind};

use crate::state::AnalysisShared;
use robot_analysis::FoldingKind;
use robot_text::TextDocument;

pub fn folding_ranges(
    shared: &AnalysisShared,
    document: &TextDocument,
) -> Vec<lsp_types::FoldingRange> {
    shared
        .cache
        .get_folding_ranges(document)
        .iter()
        .map(|range| lsp_types::FoldingRange {
            start_line: range.start_line,
            start_character: None,
            end_line: range.end_line,
            end_character: None,
            kind: match range.kind {
                FoldingKind::Comment => Some(FoldingRangeKind::Comment),
                _ => Some(FoldingRangeKind::Region),
            },
            collapsed_text: None,
        })
        .collect()
}
