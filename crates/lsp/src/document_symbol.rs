// ==============================================================================
// textDocument/documentSymbol — nested outline
// ==============================================================================

use tower_lsp::lsp_types::{self, DocumentSymbolResponse};

use crate::convert;
use crate::state::AnalysisShared;
use robot_analysis::{DocumentSymbol, SymbolKind};
use robot_text::TextDocument;

pub fn document_symbols(
    shared: &AnalysisShared,
    document: &TextDocument,
) -> DocumentSymbolResponse {
    let symbols = shared
        .cache
        .get_document_symbols(document)
        .iter()
        .map(|symbol| to_lsp(shared, document, symbol))
        .collect();
    DocumentSymbolResponse::Nested(symbols)
}

fn to_lsp(
    shared: &AnalysisShared,
    document: &TextDocument,
    symbol: &DocumentSymbol,
) -> lsp_types::DocumentSymbol {
    let kind = match symbol.kind {
        SymbolKind::Section => lsp_types::SymbolKind::NAMESPACE,
        SymbolKind::TestCase => lsp_types::SymbolKind::METHOD,
        SymbolKind::Keyword => lsp_types::SymbolKind::FUNCTION,
        SymbolKind::Variable => lsp_types::SymbolKind::VARIABLE,
    };
    let children: Vec<_> = symbol
        .children
        .iter()
        .map(|child| to_lsp(shared, document, child))
        .collect();
    #[allow(deprecated)]
    lsp_types::DocumentSymbol {
        name: symbol.name.to_string(),
        detail: None,
        kind,
        tags: None,
        deprecated: None,
        range: convert::node_range_to_lsp(document, symbol.range, shared.encoding),
        selection_range: convert::node_range_to_lsp(
            document,
            symbol.selection_range,
            shared.encoding,
        ),
        children: (!children.is_empty()).then_some(children),
    }
}
