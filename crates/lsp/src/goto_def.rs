// ==============================================================================
// textDocument/definition — jump to a keyword or variable definition
// ==============================================================================
//
// Keyword calls resolve through the namespace: local definitions jump within
// the file, resource keywords jump into the resource, library keywords jump
// to their source when the libdoc recorded one (embedded default libraries
// have no file to jump to).

use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::convert;
use crate::state::AnalysisShared;
use robot_analysis::KeywordSource;
use robot_ast::TokenKind;
use robot_text::{CancellationToken, TextDocument};

pub fn goto_definition(
    shared: &AnalysisShared,
    document: &TextDocument,
    uri: &Url,
    pos: Position,
    token: &CancellationToken,
) -> Option<Location> {
    let namespace = shared.cache.get_namespace(document, token).ok()?;
    let ast = shared.cache.get_model(document);
    let scalar = convert::scalar_position(document, pos, shared.encoding);

    if let Some((_, hit)) = convert::keyword_at(&ast, &namespace, scalar, token) {
        if hit.source == KeywordSource::Local {
            let def = ast
                .keywords()
                .find(|def| hit.keyword.matcher().matches(&def.name.value))?;
            return Some(Location::new(
                uri.clone(),
                convert::token_range_to_lsp(document, &def.name, shared.encoding),
            ));
        }
        let source = hit.keyword.source.as_ref()?;
        let target = Url::from_file_path(source).ok()?;
        let line = hit.keyword.line;
        return Some(Location::new(
            target,
            Range::new(Position::new(line, 0), Position::new(line, 0)),
        ));
    }

    let tok = convert::token_at(&ast, scalar)?;
    if matches!(tok.kind, TokenKind::Variable | TokenKind::Assign) {
        let hit = namespace.find_variable(&tok.value, Some(scalar))?;
        let range = hit.range?;
        return Some(Location::new(
            uri.clone(),
            convert::node_range_to_lsp(document, range, shared.encoding),
        ));
    }
    None
}
