// ==============================================================================
// textDocument/signatureHelp — argument spec of the call under the cursor
// ==============================================================================

use tower_lsp::lsp_types::{
    Documentation, ParameterInformation, ParameterLabel, Position, SignatureHelp,
    SignatureInformation,
};

use crate::convert;
use crate::state::AnalysisShared;
use robot_analysis::ArgumentKind;
use robot_text::{CancellationToken, TextDocument};

pub fn signature_help(
    shared: &AnalysisShared,
    document: &TextDocument,
    pos: Position,
    token: &CancellationToken,
) -> Option<SignatureHelp> {
    let namespace = shared.cache.get_namespace(document, token).ok()?;
    let ast = shared.cache.get_model(document);
    let scalar = convert::scalar_position(document, pos, shared.encoding);
    let (_, hit) = convert::keyword_at(&ast, &namespace, scalar, token)?;

    let mut parameters = Vec::new();
    let mut rendered = Vec::new();
    for arg in &hit.keyword.args {
        let mut label = match arg.kind {
            ArgumentKind::VarPositional => format!("*{}", arg.name),
            ArgumentKind::VarNamed => format!("**{}", arg.name),
            _ => arg.name.to_string(),
        };
        if let Some(default) = &arg.default {
            label.push('=');
            label.push_str(default);
        }
        parameters.push(ParameterInformation {
            label: ParameterLabel::Simple(label.clone()),
            documentation: None,
        });
        rendered.push(label);
    }

    let signature = SignatureInformation {
        label: format!("{}    {}", hit.keyword.name, rendered.join("    ")),
        documentation: (!hit.keyword.doc.is_empty()).then(|| {
            Documentation::String(hit.keyword.doc.clone())
        }),
        parameters: Some(parameters),
        active_parameter: None,
    };
    Some(SignatureHelp {
        signatures: vec![signature],
        active_signature: Some(0),
        active_parameter: None,
    })
}
