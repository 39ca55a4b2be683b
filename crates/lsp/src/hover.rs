// ==============================================================================
// textDocument/hover — keyword documentation and variable values
// ==============================================================================

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::convert;
use crate::state::AnalysisShared;
use robot_analysis::{ArgumentKind, KeywordHit, KeywordSource};
use robot_ast::TokenKind;
use robot_text::{CancellationToken, TextDocument};

pub fn hover(
    shared: &AnalysisShared,
    document: &TextDocument,
    pos: Position,
    token: &CancellationToken,
) -> Option<Hover> {
    let namespace = shared.cache.get_namespace(document, token).ok()?;
    let ast = shared.cache.get_model(document);
    let scalar = convert::scalar_position(document, pos, shared.encoding);

    if let Some((part, hit)) = convert::keyword_at(&ast, &namespace, scalar, token) {
        let range = convert::node_range_to_lsp(
            document,
            robot_ast::NodeRange {
                start_line: part.line,
                start_col: part.col,
                end_line: part.line,
                end_col: part.end_col,
            },
            shared.encoding,
        );
        return Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: keyword_markdown(&hit),
            }),
            range: Some(range),
        });
    }

    // Variables: hover on `${…}` shows the resolved value.
    let tok = convert::token_at(&ast, scalar)?;
    if matches!(tok.kind, TokenKind::Variable | TokenKind::Assign) {
        let hit = namespace.find_variable(&tok.value, Some(scalar))?;
        let mut value = format!("**{}**", hit.name);
        if let Some(v) = &hit.value {
            value.push_str(&format!("\n\n`{v}`"));
        }
        return Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: Some(convert::token_range_to_lsp(document, &tok, shared.encoding)),
        });
    }
    None
}

fn keyword_markdown(hit: &KeywordHit) -> String {
    let source = match &hit.source {
        KeywordSource::Local => "this file".to_string(),
        KeywordSource::Library(name) => name.to_string(),
        KeywordSource::Resource(name) => format!("{name} (resource)"),
    };
    let mut out = format!("**{}**\n\n*{source}*\n", hit.keyword.name);
    if !hit.keyword.args.is_empty() {
        out.push_str("\n```\n");
        for arg in &hit.keyword.args {
            let decorated = match arg.kind {
                ArgumentKind::VarPositional => format!("*{}", arg.name),
                ArgumentKind::VarNamed => format!("**{}", arg.name),
                _ => arg.name.to_string(),
            };
            match &arg.default {
                Some(default) => out.push_str(&format!("{decorated}={default}\n")),
                None => out.push_str(&format!("{decorated}\n")),
            }
        }
        out.push_str("```\n");
    }
    if !hit.keyword.doc.is_empty() {
        out.push('\n');
        out.push_str(&hit.keyword.doc);
    }
    out
}
