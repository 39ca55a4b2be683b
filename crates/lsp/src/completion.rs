// ==============================================================================
// textDocument/completion — keyword and variable names
// ==============================================================================
//
// Keyword completion offers everything the namespace can see, labeled with
// its source; variable completion kicks in when the cell under the cursor
// opens a `${…}` substitution.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionResponse, Documentation, MarkupContent,
    MarkupKind, Position,
};

use crate::convert;
use crate::state::AnalysisShared;
use robot_analysis::KeywordSource;
use robot_text::{CancellationToken, TextDocument};

pub fn completion(
    shared: &AnalysisShared,
    document: &TextDocument,
    pos: Position,
    token: &CancellationToken,
) -> Option<CompletionResponse> {
    let namespace = shared.cache.get_namespace(document, token).ok()?;
    let ast = shared.cache.get_model(document);
    let scalar = convert::scalar_position(document, pos, shared.encoding);

    // Inside an opened `${` the variables win.
    let in_variable = convert::token_at(&ast, scalar)
        .map(|tok| {
            let prefix_len = scalar.character.saturating_sub(tok.col) as usize;
            let prefix: String = tok.value.chars().take(prefix_len).collect();
            prefix.rfind("${").is_some_and(|open| {
                !prefix[open..].contains('}')
            })
        })
        .unwrap_or(false);

    let items = if in_variable {
        namespace
            .get_file_variables()
            .into_iter()
            .map(|hit| CompletionItem {
                label: hit.name.to_string(),
                kind: Some(CompletionItemKind::VARIABLE),
                detail: hit.value.map(|v| v.to_string()),
                ..Default::default()
            })
            .collect()
    } else {
        namespace
            .get_keywords()
            .into_iter()
            .map(|hit| {
                let detail = match &hit.source {
                    KeywordSource::Local => "keyword in this file".to_string(),
                    KeywordSource::Library(name) => name.to_string(),
                    KeywordSource::Resource(name) => format!("{name} (resource)"),
                };
                let documentation = (!hit.keyword.doc.is_empty()).then(|| {
                    Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::Markdown,
                        value: hit.keyword.doc.clone(),
                    })
                });
                CompletionItem {
                    label: hit.keyword.name.to_string(),
                    kind: Some(CompletionItemKind::FUNCTION),
                    detail: Some(detail),
                    documentation,
                    ..Default::default()
                }
            })
            .collect()
    };
    Some(CompletionResponse::Array(items))
}
