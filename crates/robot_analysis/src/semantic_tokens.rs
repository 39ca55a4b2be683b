// ==============================================================================
// Semantic token generation
// ==============================================================================
//
// Two phases, like every generator here: collect raw classified spans in
// statement order, then sort into reading order and delta-encode into the
// LSP five-integer stream. Classification is version-gated (`TRY`/`WHILE`
// are control flow from RF 5.0, `Language:` markers from 6.0, `VAR` from
// 7.0); keyword-call statements route through the call analyzer so nested
// run-keyword structure and named arguments color correctly. Token values
// that permit variable substitution are expanded into `${…}` variable and
// backslash-escape sub-tokens.

use robot_ast::{Ast, RobotVersion, SectionBody, StatementKind, Token, TokenKind};
use robot_text::{CancellationToken, Cancelled, LineIndex, PositionEncoding};

use crate::keyword_call::{analyze_call, CallPart, CallPartKind, KeywordLookup};

// ==============================================================================
// Types, modifiers, legend
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SemTokenType {
    HeaderSettings,
    HeaderVariable,
    HeaderTestcase,
    HeaderKeyword,
    HeaderComment,
    Setting,
    SettingImport,
    TestcaseName,
    KeywordName,
    ControlFlow,
    Argument,
    Variable,
    KeywordCall,
    NamedArgument,
    Operator,
    Continuation,
    Separator,
    Terminator,
    ForSeparator,
    Config,
    Var,
    Escape,
    Comment,
}

impl SemTokenType {
    pub fn index(self) -> u32 {
        self as u32
    }

    fn permits_substitution(self) -> bool {
        matches!(
            self,
            SemTokenType::Argument
                | SemTokenType::KeywordCall
                | SemTokenType::KeywordName
                | SemTokenType::TestcaseName
        )
    }
}

/// Legend entries, in `index()` order.
pub fn legend_types() -> &'static [&'static str] {
    &[
        "headerSettings",
        "headerVariable",
        "headerTestcase",
        "headerKeyword",
        "headerComment",
        "setting",
        "settingImport",
        "testcaseName",
        "keywordName",
        "controlFlow",
        "argument",
        "variable",
        "keywordCall",
        "namedArgument",
        "operator",
        "continuation",
        "separator",
        "terminator",
        "forSeparator",
        "config",
        "var",
        "escape",
        "comment",
    ]
}

pub const MOD_BUILTIN: u32 = 1 << 0;
pub const MOD_DECLARATION: u32 = 1 << 1;
pub const MOD_DEFAULT_LIBRARY: u32 = 1 << 2;

pub fn legend_modifiers() -> &'static [&'static str] {
    &["builtin", "declaration", "defaultLibrary"]
}

/// One LSP wire token: positions relative to the previous token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticToken {
    pub delta_line: u32,
    pub delta_start: u32,
    pub length: u32,
    pub token_type: u32,
    pub modifiers: u32,
}

/// A classified span in absolute scalar columns, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawToken {
    line: u32,
    col: u32,
    end_col: u32,
    value: Option<smol_str::SmolStr>,
    ty: SemTokenType,
    modifiers: u32,
}

// ==============================================================================
// Version-gated kind mapping
// ==============================================================================

/// Map a lexical token kind to its semantic classification. `None` for
/// layout kinds with no color and for kinds gated behind a newer Robot
/// version than the one in use.
pub fn classify_kind(kind: TokenKind, version: RobotVersion) -> Option<(SemTokenType, u32)> {
    let gated_5 = |ty| version.has_try_while().then_some((ty, 0));
    match kind {
        TokenKind::SettingHeader => Some((SemTokenType::HeaderSettings, 0)),
        TokenKind::VariableHeader => Some((SemTokenType::HeaderVariable, 0)),
        TokenKind::TestCaseHeader => Some((SemTokenType::HeaderTestcase, 0)),
        TokenKind::KeywordHeader => Some((SemTokenType::HeaderKeyword, 0)),
        TokenKind::CommentHeader | TokenKind::InvalidHeader => {
            Some((SemTokenType::HeaderComment, 0))
        }
        TokenKind::TestCaseName => Some((SemTokenType::TestcaseName, MOD_DECLARATION)),
        TokenKind::KeywordName => Some((SemTokenType::KeywordName, MOD_DECLARATION)),
        TokenKind::SettingName => Some((SemTokenType::Setting, 0)),
        TokenKind::Keyword => Some((SemTokenType::KeywordCall, 0)),
        TokenKind::Argument => Some((SemTokenType::Argument, 0)),
        TokenKind::Variable => Some((SemTokenType::Variable, 0)),
        TokenKind::Assign => Some((SemTokenType::Variable, MOD_DECLARATION)),
        TokenKind::For | TokenKind::End | TokenKind::If | TokenKind::ElseIf | TokenKind::Else => {
            Some((SemTokenType::ControlFlow, 0))
        }
        TokenKind::While
        | TokenKind::Try
        | TokenKind::Except
        | TokenKind::Finally
        | TokenKind::Break
        | TokenKind::Continue
        | TokenKind::Return => gated_5(SemTokenType::ControlFlow),
        TokenKind::ForSeparator => Some((SemTokenType::ForSeparator, 0)),
        TokenKind::Var => version.has_var().then_some((SemTokenType::Var, 0)),
        TokenKind::Config => version.has_config().then_some((SemTokenType::Config, 0)),
        TokenKind::Continuation => Some((SemTokenType::Continuation, 0)),
        TokenKind::Comment => Some((SemTokenType::Comment, 0)),
        TokenKind::Separator | TokenKind::Eol | TokenKind::Error => None,
    }
}

// ==============================================================================
// Generation
// ==============================================================================

/// Generate the delta-encoded token stream for a parsed document. `lookup`
/// resolves keyword names (typically `Namespace::find_keyword` behind a
/// closure); `encoding` is the negotiated position encoding of the output.
pub fn generate(
    text: &str,
    ast: &Ast,
    version: RobotVersion,
    lookup: &KeywordLookup,
    encoding: PositionEncoding,
    token: &CancellationToken,
) -> Result<Vec<SemanticToken>, Cancelled> {
    let mut raw = Vec::new();

    for section in &ast.sections {
        token.check()?;
        push_plain(&mut raw, &section.header, version);
        match &section.body {
            SectionBody::Statements(ids) => {
                for &id in ids {
                    token.check()?;
                    collect_statement(ast, id, version, lookup, &mut raw);
                }
            }
            SectionBody::TestCases(cases) => {
                for case in cases {
                    token.check()?;
                    push_plain(&mut raw, &case.name, version);
                    for &id in &case.body {
                        collect_statement(ast, id, version, lookup, &mut raw);
                    }
                }
            }
            SectionBody::Keywords(defs) => {
                for def in defs {
                    token.check()?;
                    push_plain(&mut raw, &def.name, version);
                    for &id in &def.body {
                        collect_statement(ast, id, version, lookup, &mut raw);
                    }
                }
            }
        }
    }
    for &id in &ast.orphans {
        token.check()?;
        collect_statement(ast, id, version, lookup, &mut raw);
    }

    let expanded = expand_all(raw);
    Ok(encode(text, expanded, encoding))
}

fn collect_statement(
    ast: &Ast,
    id: robot_ast::StatementId,
    version: RobotVersion,
    lookup: &KeywordLookup,
    raw: &mut Vec<RawToken>,
) {
    let stmt = ast.statement(id);
    match &stmt.kind {
        StatementKind::KeywordCall {
            assigns,
            keyword,
            args,
        } => {
            for &idx in assigns {
                push_plain(raw, &stmt.tokens[idx], version);
            }
            let arg_tokens: Vec<&Token> = args.iter().map(|&i| &stmt.tokens[i]).collect();
            for part in analyze_call(&stmt.tokens[*keyword], &arg_tokens, lookup) {
                push_call_part(raw, part);
            }
            push_layout(raw, stmt, version);
        }
        StatementKind::LibraryImport { .. }
        | StatementKind::ResourceImport { .. }
        | StatementKind::VariablesImport { .. } => {
            for tok in &stmt.tokens {
                match tok.kind {
                    TokenKind::SettingName => raw.push(RawToken {
                        line: tok.line,
                        col: tok.col,
                        end_col: tok.end_col,
                        value: Some(tok.value.clone()),
                        ty: SemTokenType::SettingImport,
                        modifiers: 0,
                    }),
                    _ => push_plain(raw, tok, version),
                }
            }
        }
        _ => {
            for tok in &stmt.tokens {
                push_plain(raw, tok, version);
            }
        }
    }

    // Nested bodies (FOR/IF/WHILE/TRY) own their statements.
    for body in stmt.kind.bodies() {
        for &child in body {
            collect_statement(ast, child, version, lookup, raw);
        }
    }
}

/// Layout tokens of a statement analyzed by the call analyzer: the analyzer
/// covers content tokens, comments and continuations still need their color.
fn push_layout(raw: &mut Vec<RawToken>, stmt: &robot_ast::Statement, version: RobotVersion) {
    for tok in &stmt.tokens {
        if matches!(tok.kind, TokenKind::Comment | TokenKind::Continuation) {
            push_plain(raw, tok, version);
        }
    }
}

fn push_plain(raw: &mut Vec<RawToken>, tok: &Token, version: RobotVersion) {
    if tok.is_empty() {
        return;
    }
    let Some((ty, modifiers)) = classify_kind(tok.kind, version) else {
        return;
    };
    raw.push(RawToken {
        line: tok.line,
        col: tok.col,
        end_col: tok.end_col,
        value: Some(tok.value.clone()),
        ty,
        modifiers,
    });
}

fn push_call_part(raw: &mut Vec<RawToken>, part: CallPart) {
    let (ty, modifiers) = match part.kind {
        CallPartKind::KeywordCall { default_library } => (
            SemTokenType::KeywordCall,
            if default_library {
                MOD_BUILTIN | MOD_DEFAULT_LIBRARY
            } else {
                0
            },
        ),
        CallPartKind::BddPrefix => (SemTokenType::ControlFlow, 0),
        CallPartKind::Argument => (SemTokenType::Argument, 0),
        CallPartKind::NamedArgumentName => (SemTokenType::NamedArgument, 0),
        CallPartKind::NamedArgumentOperator => (SemTokenType::Operator, 0),
        CallPartKind::Separator => (SemTokenType::ControlFlow, 0),
    };
    if part.col == part.end_col {
        return;
    }
    raw.push(RawToken {
        line: part.line,
        col: part.col,
        end_col: part.end_col,
        value: Some(part.value),
        ty,
        modifiers,
    });
}

// ==============================================================================
// Variable and escape sub-token expansion
// ==============================================================================

fn expand_all(raw: Vec<RawToken>) -> Vec<RawToken> {
    let mut out = Vec::with_capacity(raw.len());
    for tok in raw {
        if tok.ty.permits_substitution() {
            expand_token(tok, &mut out);
        } else {
            out.push(tok);
        }
    }
    out
}

/// Split a token's value into literal spans, `${…}`/`@{…}`/`&{…}` variable
/// spans, and recognized escape sequences.
fn expand_token(tok: RawToken, out: &mut Vec<RawToken>) {
    let Some(value) = tok.value.clone() else {
        out.push(tok);
        return;
    };
    let chars: Vec<char> = value.chars().collect();
    let mut spans: Vec<(usize, usize, SemTokenType)> = Vec::new();
    let mut i = 0usize;
    let mut literal_start = 0usize;

    while i < chars.len() {
        if let Some(len) = variable_span(&chars[i..]) {
            if i > literal_start {
                spans.push((literal_start, i, tok.ty));
            }
            spans.push((i, i + len, SemTokenType::Variable));
            i += len;
            literal_start = i;
            continue;
        }
        if let Some(len) = escape_span(&chars[i..]) {
            if i > literal_start {
                spans.push((literal_start, i, tok.ty));
            }
            spans.push((i, i + len, SemTokenType::Escape));
            i += len;
            literal_start = i;
            continue;
        }
        i += 1;
    }
    if literal_start < chars.len() {
        spans.push((literal_start, chars.len(), tok.ty));
    }

    if spans.len() <= 1 && spans.first().is_none_or(|s| s.2 == tok.ty) {
        out.push(tok);
        return;
    }
    for (start, end, ty) in spans {
        out.push(RawToken {
            line: tok.line,
            col: tok.col + start as u32,
            end_col: tok.col + end as u32,
            value: Some(chars[start..end].iter().collect::<String>().into()),
            ty,
            modifiers: if ty == tok.ty { tok.modifiers } else { 0 },
        });
    }
}

/// Length (in scalars) of a `${…}` / `@{…}` / `&{…}` substitution starting
/// at the slice head, honoring nested braces.
fn variable_span(chars: &[char]) -> Option<usize> {
    if chars.len() < 3 {
        return None;
    }
    if !matches!(chars[0], '$' | '@' | '&') || chars[1] != '{' {
        return None;
    }
    let mut depth = 1usize;
    for (i, &c) in chars.iter().enumerate().skip(2) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Length of a recognized escape at the slice head:
/// `\n \t \r \\ \xHH \uHHHH \UHHHHHHHH`.
fn escape_span(chars: &[char]) -> Option<usize> {
    if chars.first() != Some(&'\\') {
        return None;
    }
    let hex_run = |wanted: usize| {
        let digits = chars
            .iter()
            .skip(2)
            .take(wanted)
            .filter(|c| c.is_ascii_hexdigit())
            .count();
        (digits == wanted).then_some(2 + wanted)
    };
    match chars.get(1) {
        Some('n') | Some('t') | Some('r') | Some('\\') => Some(2),
        Some('x') => hex_run(2),
        Some('u') => hex_run(4),
        Some('U') => hex_run(8),
        _ => None,
    }
}

// ==============================================================================
// Delta encoding
// ==============================================================================

/// Sort into reading order, transcode columns into the negotiated encoding,
/// and emit the relative five-integer stream.
fn encode(text: &str, mut raw: Vec<RawToken>, encoding: PositionEncoding) -> Vec<SemanticToken> {
    raw.sort_by_key(|t| (t.line, t.col));
    let index = LineIndex::new(text);

    let mut out = Vec::with_capacity(raw.len());
    let mut prev_line = 0u32;
    let mut prev_start = 0u32;

    for tok in raw {
        let start = index
            .transcode_column(text, tok.line, tok.col, PositionEncoding::Utf32, encoding)
            .unwrap_or(tok.col);
        let end = index
            .transcode_column(text, tok.line, tok.end_col, PositionEncoding::Utf32, encoding)
            .unwrap_or(tok.end_col);
        let length = end.saturating_sub(start);
        if length == 0 {
            continue;
        }

        let delta_line = tok.line - prev_line;
        let delta_start = if delta_line == 0 {
            start - prev_start
        } else {
            start
        };
        out.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type: tok.ty.index(),
            modifiers: tok.modifiers,
        });
        prev_line = tok.line;
        prev_start = start;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libdoc::default_library;
    use crate::namespace::{strip_bdd_prefix, KeywordHit, KeywordSource};
    use std::sync::Arc;

    fn builtin_lookup() -> impl Fn(&str) -> Option<KeywordHit> {
        let builtin = Arc::new(default_library("BuiltIn").unwrap());
        move |name: &str| {
            let name = strip_bdd_prefix(name).unwrap_or(name);
            builtin.find_keyword(name).map(|kw| KeywordHit {
                keyword: Arc::new(kw.clone()),
                source: KeywordSource::Library("BuiltIn".into()),
                default_library: true,
                embedded_args: None,
            })
        }
    }

    /// Decode with the LSP algorithm back into absolute positions.
    fn decode(tokens: &[SemanticToken]) -> Vec<(u32, u32, u32, u32, u32)> {
        let mut out = Vec::new();
        let mut line = 0u32;
        let mut start = 0u32;
        for tok in tokens {
            line += tok.delta_line;
            if tok.delta_line > 0 {
                start = tok.delta_start;
            } else {
                start += tok.delta_start;
            }
            out.push((line, start, tok.length, tok.token_type, tok.modifiers));
        }
        out
    }

    fn generate_for(src: &str) -> Vec<(u32, u32, u32, u32, u32)> {
        let ast = robot_ast::parse(src, RobotVersion::new(7, 0));
        let lookup = builtin_lookup();
        let tokens = generate(
            src,
            &ast,
            RobotVersion::new(7, 0),
            &lookup,
            PositionEncoding::Utf16,
            &CancellationToken::new(),
        )
        .unwrap();
        decode(&tokens)
    }

    fn ty(t: SemTokenType) -> u32 {
        t.index()
    }

    #[test]
    fn simple_test_case_classifies_every_piece() {
        let src = "*** Test Cases ***\nT\n    Log    Hello\n";
        let tokens = generate_for(src);
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 0 && t.1 == 0 && t.2 == 18 && t.3 == ty(SemTokenType::HeaderTestcase)),
            "{tokens:?}"
        );
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 1 && t.1 == 0 && t.3 == ty(SemTokenType::TestcaseName)
                    && t.4 & MOD_DECLARATION != 0),
            "{tokens:?}"
        );
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 2 && t.1 == 4 && t.2 == 3 && t.3 == ty(SemTokenType::KeywordCall)
                    && t.4 & MOD_DEFAULT_LIBRARY != 0),
            "{tokens:?}"
        );
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 2 && t.1 == 11 && t.2 == 5 && t.3 == ty(SemTokenType::Argument)),
            "{tokens:?}"
        );
    }

    #[test]
    fn variable_substitution_yields_sub_tokens() {
        let src = "*** Test Cases ***\nT\n    Log    pre${name}post\n";
        let tokens = generate_for(src);
        // pre (7..10), ${name} (10..17), post (17..21)
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 2 && t.1 == 11 && t.2 == 3 && t.3 == ty(SemTokenType::Argument)),
            "{tokens:?}"
        );
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 2 && t.1 == 14 && t.2 == 7 && t.3 == ty(SemTokenType::Variable)),
            "{tokens:?}"
        );
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 2 && t.1 == 21 && t.2 == 4 && t.3 == ty(SemTokenType::Argument)),
            "{tokens:?}"
        );
    }

    #[test]
    fn escapes_yield_escape_sub_tokens() {
        let src = "*** Test Cases ***\nT\n    Log    a\\nb\\x41c\n";
        let tokens = generate_for(src);
        let escapes: Vec<_> = tokens
            .iter()
            .filter(|t| t.3 == ty(SemTokenType::Escape))
            .collect();
        assert_eq!(escapes.len(), 2, "{tokens:?}");
        assert_eq!(escapes[0].2, 2, "\\n is two scalars");
        assert_eq!(escapes[1].2, 4, "\\x41 is four scalars");
    }

    #[test]
    fn run_keyword_if_colors_nested_calls() {
        let src = "*** Test Cases ***\nT\n    Run Keyword If    ${x}    Log    a    ELSE    Log    b\n";
        let tokens = generate_for(src);
        let calls = tokens
            .iter()
            .filter(|t| t.3 == ty(SemTokenType::KeywordCall))
            .count();
        assert_eq!(calls, 3, "outer call + two Log branches: {tokens:?}");
        // ELSE is control flow.
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 2 && t.2 == 4 && t.3 == ty(SemTokenType::ControlFlow)),
            "{tokens:?}"
        );
    }

    #[test]
    fn named_argument_colors_name_operator_value() {
        let src = "*** Test Cases ***\nT\n    Log    msg    level=WARN\n";
        let tokens = generate_for(src);
        assert!(tokens
            .iter()
            .any(|t| t.2 == 5 && t.3 == ty(SemTokenType::NamedArgument)));
        assert!(tokens
            .iter()
            .any(|t| t.2 == 1 && t.3 == ty(SemTokenType::Operator)));
    }

    #[test]
    fn import_statements_use_setting_import() {
        let src = "*** Settings ***\nLibrary    Collections\n";
        let tokens = generate_for(src);
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 1 && t.1 == 0 && t.3 == ty(SemTokenType::SettingImport)),
            "{tokens:?}"
        );
    }

    #[test]
    fn control_flow_gated_by_version() {
        assert_eq!(
            classify_kind(TokenKind::While, RobotVersion::new(4, 0)),
            None
        );
        assert_eq!(
            classify_kind(TokenKind::While, RobotVersion::new(5, 0)),
            Some((SemTokenType::ControlFlow, 0))
        );
        assert_eq!(classify_kind(TokenKind::Var, RobotVersion::new(6, 1)), None);
        assert_eq!(
            classify_kind(TokenKind::Var, RobotVersion::new(7, 0)),
            Some((SemTokenType::Var, 0))
        );
        assert_eq!(
            classify_kind(TokenKind::Config, RobotVersion::new(5, 0)),
            None
        );
        assert_eq!(
            classify_kind(TokenKind::Config, RobotVersion::new(6, 0)),
            Some((SemTokenType::Config, 0))
        );
    }

    #[test]
    fn delta_encoding_roundtrips_in_reading_order() {
        let src = "*** Test Cases ***\nT\n    Log    one\n    Log    two\n";
        let ast = robot_ast::parse(src, RobotVersion::new(7, 0));
        let lookup = builtin_lookup();
        let encoded = generate(
            src,
            &ast,
            RobotVersion::new(7, 0),
            &lookup,
            PositionEncoding::Utf16,
            &CancellationToken::new(),
        )
        .unwrap();
        let decoded = decode(&encoded);
        let mut sorted = decoded.clone();
        sorted.sort_by_key(|t| (t.0, t.1));
        assert_eq!(decoded, sorted, "stream must already be in reading order");
        assert!(decoded.windows(2).all(|w| w[0] != w[1]), "no duplicates");
    }

    #[test]
    fn non_bmp_positions_transcode_to_utf16() {
        // The argument follows a separator after "Log"; the supplementary
        // scalar in it counts twice in UTF-16 lengths.
        let src = "*** Test Cases ***\nT\n    Log    h\u{1D538}llo\n";
        let tokens = generate_for(src);
        let arg = tokens
            .iter()
            .find(|t| t.0 == 2 && t.3 == ty(SemTokenType::Argument))
            .unwrap();
        assert_eq!(arg.2, 6, "5 scalars, one supplementary: {tokens:?}");
    }

    #[test]
    fn cancellation_stops_generation() {
        let src = "*** Test Cases ***\nT\n    Log    x\n";
        let ast = robot_ast::parse(src, RobotVersion::new(7, 0));
        let lookup = builtin_lookup();
        let token = CancellationToken::new();
        token.cancel();
        let result = generate(
            src,
            &ast,
            RobotVersion::new(7, 0),
            &lookup,
            PositionEncoding::Utf16,
            &token,
        );
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn variable_definition_declares() {
        let src = "*** Variables ***\n${NAME}    value\n";
        let tokens = generate_for(src);
        assert!(
            tokens
                .iter()
                .any(|t| t.0 == 1 && t.1 == 0 && t.2 == 7 && t.3 == ty(SemTokenType::Variable)),
            "{tokens:?}"
        );
    }
}
