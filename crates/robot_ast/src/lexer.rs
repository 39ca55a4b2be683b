// ==============================================================================
// Line-oriented Robot Framework lexer
// ==============================================================================
//
// Robot source is a grid: lines split into cells on two-or-more spaces, tabs,
// or pipe layout. The lexer runs a small section state machine so each cell
// gets its final token kind here; the statement parser in `ast.rs` only groups
// tokens, it never re-classifies them.
//
// Columns are Unicode scalar counts. A token never spans physical lines.

use smol_str::SmolStr;

use crate::tokens::{Token, TokenKind};
use crate::version::RobotVersion;

/// One physical line of tokens, plus the layout facts the parser needs.
#[derive(Debug, Clone)]
pub struct LexLine {
    pub tokens: Vec<Token>,
    /// First content cell does not start at column zero.
    pub indented: bool,
    /// Line begins with a `...` continuation marker.
    pub continuation: bool,
}

impl LexLine {
    /// Indices of content tokens (everything except separators, EOLs,
    /// continuations and comments).
    pub fn content_indices(&self) -> Vec<usize> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind.is_content())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_blank(&self) -> bool {
        !self.tokens.iter().any(|t| t.kind.is_content())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionState {
    None,
    Settings,
    Variables,
    TestCases,
    Keywords,
    Comments,
}

/// Lex a document into per-line token vectors.
pub fn lex_lines(text: &str, version: RobotVersion) -> Vec<LexLine> {
    let mut out = Vec::new();
    let mut section = SectionState::None;

    for (line_no, line) in text.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let line_no = line_no as u32;
        let pieces = split_line(line, line_no);

        let first_cell = pieces.iter().find_map(|p| match p {
            Piece::Cell { text, col } => Some((text.as_str(), *col)),
            Piece::Sep { .. } => None,
        });

        // Section headers reset the state machine.
        if let Some((text, col)) = first_cell {
            if col == 0 && text.starts_with('*') {
                let (kind, next) = classify_header(text);
                section = next;
                out.push(header_line(&pieces, kind, line_no, line));
                continue;
            }
            // `Language:` configuration markers before the first section.
            if col == 0
                && section == SectionState::None
                && version.has_config()
                && text.to_ascii_lowercase().starts_with("language:")
            {
                out.push(config_line(&pieces, line_no, line));
                continue;
            }
        }

        let continuation = matches!(first_cell, Some(("...", _)));
        let indented = match first_cell {
            Some((_, col)) => col > 0,
            None => false,
        };

        let tokens = classify_line(&pieces, section, version, continuation, line_no, line);
        out.push(LexLine {
            tokens,
            indented,
            continuation,
        });
    }

    out
}

/// Lex a document into a flat token stream in reading order.
pub fn lex(text: &str, version: RobotVersion) -> Vec<Token> {
    lex_lines(text, version)
        .into_iter()
        .flat_map(|l| l.tokens)
        .collect()
}

// ==============================================================================
// Cell splitting
// ==============================================================================

enum Piece {
    Cell { text: String, col: u32 },
    Sep { col: u32, end_col: u32, line: u32 },
}

/// Split a physical line into cells and separators. Handles both the
/// space-separated and the pipe layout.
fn split_line(line: &str, line_no: u32) -> Vec<Piece> {
    let trimmed = line.trim_start();
    if trimmed == "|" || trimmed.starts_with("| ") || trimmed.starts_with("|\t") {
        split_pipe_line(line, line_no)
    } else {
        split_space_line(line, line_no)
    }
}

fn split_space_line(line: &str, line_no: u32) -> Vec<Piece> {
    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut i = 0usize;

    // Leading whitespace of any width is indentation.
    if matches!(chars.first(), Some(' ') | Some('\t')) {
        while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
            i += 1;
        }
        pieces.push(Piece::Sep {
            col: 0,
            end_col: i as u32,
            line: line_no,
        });
    }

    while i < chars.len() {
        // A separator is a tab or a run of two or more spaces.
        let sep_start = i;
        let mut j = i;
        loop {
            if j < chars.len() && chars[j] == '\t' {
                j += 1;
                continue;
            }
            let mut spaces = 0;
            while j + spaces < chars.len() && chars[j + spaces] == ' ' {
                spaces += 1;
            }
            let followed_by_tab = chars.get(j + spaces) == Some(&'\t');
            if spaces >= 2 || (spaces >= 1 && (followed_by_tab || j + spaces == chars.len())) {
                j += spaces;
                if followed_by_tab {
                    continue;
                }
            }
            break;
        }
        if j > sep_start {
            pieces.push(Piece::Sep {
                col: sep_start as u32,
                end_col: j as u32,
                line: line_no,
            });
            i = j;
            continue;
        }

        // Cell: runs until the next separator.
        let cell_start = i;
        while i < chars.len() {
            if chars[i] == '\t' {
                break;
            }
            if chars[i] == ' ' {
                let mut spaces = 0;
                while i + spaces < chars.len() && chars[i + spaces] == ' ' {
                    spaces += 1;
                }
                if spaces >= 2
                    || chars.get(i + spaces) == Some(&'\t')
                    || i + spaces == chars.len()
                {
                    break;
                }
                i += spaces;
                continue;
            }
            i += 1;
        }
        let text: String = chars[cell_start..i].iter().collect();
        pieces.push(Piece::Cell {
            text,
            col: cell_start as u32,
        });
    }

    pieces
}

fn split_pipe_line(line: &str, line_no: u32) -> Vec<Piece> {
    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        // Pipe boundaries: `| ` at line start, ` | ` inside, trailing ` |`.
        let at_boundary = chars[i] == '|'
            && (i == 0 || chars[i - 1] == ' ' || chars[i - 1] == '\t' || pieces.is_empty())
            && (i + 1 >= chars.len() || chars[i + 1] == ' ' || chars[i + 1] == '\t');
        if at_boundary || chars[i] == ' ' || chars[i] == '\t' {
            let sep_start = i;
            while i < chars.len() {
                let c = chars[i];
                let boundary_pipe = c == '|'
                    && (i + 1 >= chars.len() || chars[i + 1] == ' ' || chars[i + 1] == '\t')
                    && (i == 0 || chars[i - 1] == ' ' || chars[i - 1] == '\t');
                if c == ' ' || c == '\t' || boundary_pipe {
                    i += 1;
                } else {
                    break;
                }
            }
            pieces.push(Piece::Sep {
                col: sep_start as u32,
                end_col: i as u32,
                line: line_no,
            });
            continue;
        }

        let cell_start = i;
        while i < chars.len() {
            let c = chars[i];
            if (c == ' ' || c == '\t')
                && matches!(chars.get(i + 1), Some('|'))
                && matches!(chars.get(i + 2), Some(' ') | Some('\t') | None)
            {
                break;
            }
            i += 1;
        }
        let text: String = chars[cell_start..i].iter().collect();
        pieces.push(Piece::Cell {
            text,
            col: cell_start as u32,
        });
    }

    pieces
}

// ==============================================================================
// Classification
// ==============================================================================

fn classify_header(text: &str) -> (TokenKind, SectionState) {
    let name: String = text
        .trim_matches(|c| c == '*' || c == ' ' || c == '\t')
        .to_ascii_lowercase();
    match name.as_str() {
        "settings" | "setting" => (TokenKind::SettingHeader, SectionState::Settings),
        "variables" | "variable" => (TokenKind::VariableHeader, SectionState::Variables),
        "test cases" | "test case" | "tasks" | "task" => {
            (TokenKind::TestCaseHeader, SectionState::TestCases)
        }
        "keywords" | "keyword" => (TokenKind::KeywordHeader, SectionState::Keywords),
        "comments" | "comment" => (TokenKind::CommentHeader, SectionState::Comments),
        _ => (TokenKind::InvalidHeader, SectionState::None),
    }
}

fn header_line(pieces: &[Piece], kind: TokenKind, line_no: u32, line: &str) -> LexLine {
    let mut tokens = Vec::new();
    let mut first = true;
    for piece in pieces {
        match piece {
            Piece::Sep { col, end_col, line } => {
                tokens.push(sep_token(*col, *end_col, *line));
            }
            Piece::Cell { text, col } => {
                if first {
                    let mut tok = Token::new(kind, text.as_str(), line_no, *col);
                    if kind == TokenKind::InvalidHeader {
                        tok = tok.with_error(format!("unrecognized section header '{text}'"));
                    }
                    tokens.push(tok);
                    first = false;
                } else {
                    tokens.push(Token::new(TokenKind::Argument, text.as_str(), line_no, *col));
                }
            }
        }
    }
    tokens.push(eol_token(line_no, line));
    LexLine {
        tokens,
        indented: false,
        continuation: false,
    }
}

fn config_line(pieces: &[Piece], line_no: u32, line: &str) -> LexLine {
    let mut tokens = Vec::new();
    let mut first = true;
    for piece in pieces {
        match piece {
            Piece::Sep { col, end_col, line } => tokens.push(sep_token(*col, *end_col, *line)),
            Piece::Cell { text, col } => {
                let kind = if first {
                    TokenKind::Config
                } else {
                    TokenKind::Argument
                };
                tokens.push(Token::new(kind, text.as_str(), line_no, *col));
                first = false;
            }
        }
    }
    tokens.push(eol_token(line_no, line));
    LexLine {
        tokens,
        indented: false,
        continuation: false,
    }
}

fn classify_line(
    pieces: &[Piece],
    section: SectionState,
    version: RobotVersion,
    continuation: bool,
    line_no: u32,
    line: &str,
) -> Vec<Token> {
    let mut tokens = Vec::new();
    // Index among content cells only; separators do not advance it.
    let mut cell_index = 0usize;
    // Set once a cell opened a comment; everything after merges into it.
    let mut comment_from: Option<u32> = None;
    // Line shape decided by the first content cell.
    let mut shape = LineShape::Unknown;

    for piece in pieces {
        if comment_from.is_some() {
            break;
        }
        match piece {
            Piece::Sep { col, end_col, line } => tokens.push(sep_token(*col, *end_col, *line)),
            Piece::Cell { text, col } => {
                if text.starts_with('#') {
                    comment_from = Some(*col);
                    break;
                }
                let token = classify_cell(
                    text,
                    *col,
                    line_no,
                    cell_index,
                    section,
                    version,
                    continuation,
                    &mut shape,
                );
                tokens.push(token);
                cell_index += 1;
            }
        }
    }

    if let Some(col) = comment_from {
        let text: String = line.chars().skip(col as usize).collect();
        tokens.push(Token::new(TokenKind::Comment, text, line_no, col));
    }

    tokens.push(eol_token(line_no, line));
    tokens
}

/// Shape of the current line, decided by its leading content cells. Controls
/// how later cells on the same line classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineShape {
    Unknown,
    /// Collecting leading assignment cells of a keyword call.
    Assigns,
    /// The keyword cell has been emitted; the rest are arguments.
    Arguments,
    /// FOR line: loop variables until the `IN` separator, then values.
    ForVariables,
    ForValues,
    /// VAR line: the variable name comes next, then values.
    VarName,
    /// Block-name line in a test/keyword section: body cells may follow.
    Body,
}

#[allow(clippy::too_many_arguments)]
fn classify_cell(
    text: &str,
    col: u32,
    line_no: u32,
    cell_index: usize,
    section: SectionState,
    version: RobotVersion,
    continuation: bool,
    shape: &mut LineShape,
) -> Token {
    let make = |kind: TokenKind| Token::new(kind, text, line_no, col);

    if cell_index == 0 && text == "..." && continuation {
        *shape = LineShape::Arguments;
        return make(TokenKind::Continuation);
    }

    match section {
        SectionState::None => {
            make(TokenKind::Error).with_error("content outside any section")
        }
        SectionState::Comments => make(TokenKind::Comment),
        SectionState::Settings => {
            if *shape == LineShape::Unknown {
                *shape = LineShape::Arguments;
                make(TokenKind::SettingName)
            } else {
                make(TokenKind::Argument)
            }
        }
        SectionState::Variables => {
            if *shape == LineShape::Unknown {
                *shape = LineShape::Arguments;
                if is_variable_syntax(text) {
                    make(TokenKind::Variable)
                } else {
                    make(TokenKind::Variable)
                        .with_error(format!("invalid variable name '{text}'"))
                }
            } else {
                make(TokenKind::Argument)
            }
        }
        SectionState::TestCases | SectionState::Keywords => classify_body_cell(
            text, col, line_no, section, version, shape, make,
        ),
    }
}

fn classify_body_cell(
    text: &str,
    col: u32,
    line_no: u32,
    section: SectionState,
    version: RobotVersion,
    shape: &mut LineShape,
    make: impl Fn(TokenKind) -> Token,
) -> Token {
    match *shape {
        LineShape::Unknown => {
            if col == 0 {
                *shape = LineShape::Body;
                return match section {
                    SectionState::TestCases => make(TokenKind::TestCaseName),
                    _ => make(TokenKind::KeywordName),
                };
            }
            first_body_cell(text, version, shape, make)
        }
        // A block-name line may carry the first statement inline.
        LineShape::Body => first_body_cell(text, version, shape, make),
        LineShape::Assigns => {
            if is_assign_syntax(text) {
                make(TokenKind::Assign)
            } else {
                *shape = LineShape::Arguments;
                make(TokenKind::Keyword)
            }
        }
        LineShape::ForVariables => {
            if is_for_separator(text) {
                *shape = LineShape::ForValues;
                make(TokenKind::ForSeparator)
            } else if is_variable_syntax(text) {
                make(TokenKind::Variable)
            } else {
                make(TokenKind::Variable).with_error(format!("invalid loop variable '{text}'"))
            }
        }
        LineShape::ForValues => make(TokenKind::Argument),
        LineShape::VarName => {
            *shape = LineShape::Arguments;
            if is_variable_syntax(text) {
                make(TokenKind::Variable)
            } else {
                make(TokenKind::Variable).with_error(format!("invalid variable name '{text}'"))
            }
        }
        LineShape::Arguments => make(TokenKind::Argument),
    }
}

fn first_body_cell(
    text: &str,
    version: RobotVersion,
    shape: &mut LineShape,
    make: impl Fn(TokenKind) -> Token,
) -> Token {
    if text.starts_with('[') && text.ends_with(']') {
        *shape = LineShape::Arguments;
        return make(TokenKind::SettingName);
    }

    // Control-flow words match case-sensitively, exactly as Robot does.
    let kind = match text {
        "FOR" => Some(TokenKind::For),
        "END" => Some(TokenKind::End),
        "IF" => Some(TokenKind::If),
        "ELSE IF" => Some(TokenKind::ElseIf),
        "ELSE" => Some(TokenKind::Else),
        "WHILE" if version.has_try_while() => Some(TokenKind::While),
        "TRY" if version.has_try_while() => Some(TokenKind::Try),
        "EXCEPT" if version.has_try_while() => Some(TokenKind::Except),
        "FINALLY" if version.has_try_while() => Some(TokenKind::Finally),
        "BREAK" if version.has_try_while() => Some(TokenKind::Break),
        "CONTINUE" if version.has_try_while() => Some(TokenKind::Continue),
        "RETURN" if version.has_try_while() => Some(TokenKind::Return),
        "VAR" if version.has_var() => Some(TokenKind::Var),
        _ => None,
    };
    if let Some(kind) = kind {
        *shape = match kind {
            TokenKind::For => LineShape::ForVariables,
            TokenKind::Var => LineShape::VarName,
            _ => LineShape::Arguments,
        };
        return make(kind);
    }

    if is_assign_syntax(text) {
        *shape = LineShape::Assigns;
        return make(TokenKind::Assign);
    }

    *shape = LineShape::Arguments;
    make(TokenKind::Keyword)
}

// ==============================================================================
// Cell syntax predicates
// ==============================================================================

/// `${name}` / `@{name}` / `&{name}` with balanced outer braces.
pub(crate) fn is_variable_syntax(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some('$') | Some('@') | Some('&'))
        && chars.next() == Some('{')
        && text.ends_with('}')
        && text.chars().count() > 3
}

/// A leading assignment cell: variable syntax with an optional trailing `=`
/// (optionally preceded by one space).
fn is_assign_syntax(text: &str) -> bool {
    let base = text
        .strip_suffix('=')
        .map(|t| t.strip_suffix(' ').unwrap_or(t))
        .unwrap_or(text);
    is_variable_syntax(base)
}

fn is_for_separator(text: &str) -> bool {
    matches!(text, "IN" | "IN RANGE" | "IN ENUMERATE" | "IN ZIP")
}

fn sep_token(col: u32, end_col: u32, line: u32) -> Token {
    Token {
        kind: TokenKind::Separator,
        value: SmolStr::default(),
        line,
        col,
        end_col,
        error: None,
    }
}

fn eol_token(line_no: u32, line: &str) -> Token {
    let end = line.chars().count() as u32;
    Token {
        kind: TokenKind::Eol,
        value: SmolStr::default(),
        line: line_no,
        col: end,
        end_col: end,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        lex(src, RobotVersion::default())
            .into_iter()
            .filter(|t| t.kind.is_content())
            .map(|t| (t.kind, t.value.to_string()))
            .collect()
    }

    #[test]
    fn section_headers() {
        let toks = kinds("*** Settings ***\n*** Test Cases ***\n*** Keywords ***");
        assert_eq!(toks[0].0, TokenKind::SettingHeader);
        assert_eq!(toks[1].0, TokenKind::TestCaseHeader);
        assert_eq!(toks[2].0, TokenKind::KeywordHeader);
    }

    #[test]
    fn header_is_case_insensitive_and_star_tolerant() {
        let toks = kinds("***settings***\n* Tasks *");
        assert_eq!(toks[0].0, TokenKind::SettingHeader);
        assert_eq!(toks[1].0, TokenKind::TestCaseHeader);
    }

    #[test]
    fn unknown_header_flags_error() {
        let toks = lex("*** Bogus ***", RobotVersion::default());
        let header = toks.iter().find(|t| t.kind == TokenKind::InvalidHeader);
        assert!(header.is_some_and(|t| t.error.is_some()), "{toks:?}");
    }

    #[test]
    fn test_case_body_tokens() {
        let src = "*** Test Cases ***\nMy Test\n    Log    Hello\n";
        let toks = kinds(src);
        assert_eq!(
            toks,
            vec![
                (TokenKind::TestCaseHeader, "*** Test Cases ***".to_string()),
                (TokenKind::TestCaseName, "My Test".to_string()),
                (TokenKind::Keyword, "Log".to_string()),
                (TokenKind::Argument, "Hello".to_string()),
            ]
        );
    }

    #[test]
    fn single_space_stays_inside_cell() {
        let src = "*** Test Cases ***\nT\n    Log Many    a b    c\n";
        let toks = kinds(src);
        assert_eq!(toks[2], (TokenKind::Keyword, "Log Many".to_string()));
        assert_eq!(toks[3], (TokenKind::Argument, "a b".to_string()));
        assert_eq!(toks[4], (TokenKind::Argument, "c".to_string()));
    }

    #[test]
    fn assign_cells() {
        let src = "*** Keywords ***\nK\n    ${x} =    Get Value    1\n    ${a}    ${b}    Split\n";
        let toks = kinds(src);
        assert_eq!(toks[2], (TokenKind::Assign, "${x} =".to_string()));
        assert_eq!(toks[3], (TokenKind::Keyword, "Get Value".to_string()));
        assert_eq!(toks[5], (TokenKind::Assign, "${a}".to_string()));
        assert_eq!(toks[6], (TokenKind::Assign, "${b}".to_string()));
        assert_eq!(toks[7], (TokenKind::Keyword, "Split".to_string()));
    }

    #[test]
    fn for_loop_tokens() {
        let src = "*** Test Cases ***\nT\n    FOR    ${i}    IN RANGE    10\n    END\n";
        let toks = kinds(src);
        assert_eq!(toks[2].0, TokenKind::For);
        assert_eq!(toks[3], (TokenKind::Variable, "${i}".to_string()));
        assert_eq!(toks[4], (TokenKind::ForSeparator, "IN RANGE".to_string()));
        assert_eq!(toks[5], (TokenKind::Argument, "10".to_string()));
        assert_eq!(toks[6].0, TokenKind::End);
    }

    #[test]
    fn control_words_gated_by_version() {
        let src = "*** Test Cases ***\nT\n    VAR    ${x}    1\n";
        let rf7 = kinds(src);
        assert_eq!(rf7[2].0, TokenKind::Var);

        let rf4: Vec<_> = lex(src, RobotVersion::new(4, 0))
            .into_iter()
            .filter(|t| t.kind.is_content())
            .collect();
        assert_eq!(rf4[2].kind, TokenKind::Keyword, "{rf4:?}");
    }

    #[test]
    fn language_marker_gated_by_version() {
        let src = "Language: pt\n*** Settings ***\n";
        let rf7 = lex(src, RobotVersion::default());
        assert_eq!(rf7[0].kind, TokenKind::Config);

        let rf5 = lex(src, RobotVersion::new(5, 0));
        assert_ne!(rf5[0].kind, TokenKind::Config, "{rf5:?}");
    }

    #[test]
    fn comment_swallows_rest_of_line() {
        let src = "*** Test Cases ***\nT\n    Log    arg    # trailing    note\n";
        let toks = lex(src, RobotVersion::default());
        let comment = toks.iter().find(|t| t.kind == TokenKind::Comment).unwrap();
        assert_eq!(comment.value, "# trailing    note");
    }

    #[test]
    fn continuation_marker() {
        let src = "*** Settings ***\nLibrary    Collections\n...    arg\n";
        let lines = lex_lines(src, RobotVersion::default());
        assert!(lines[2].continuation);
        let toks: Vec<_> = lines[2]
            .tokens
            .iter()
            .filter(|t| t.kind.is_content())
            .collect();
        assert_eq!(toks[0].kind, TokenKind::Continuation);
        assert_eq!(toks[1].kind, TokenKind::Argument);
    }

    #[test]
    fn pipe_layout() {
        let src = "*** Test Cases ***\n| My Test |\n| | Log | Hello |\n";
        let toks = kinds(src);
        assert_eq!(toks[1], (TokenKind::TestCaseName, "My Test".to_string()));
        assert_eq!(toks[2], (TokenKind::Keyword, "Log".to_string()));
        assert_eq!(toks[3], (TokenKind::Argument, "Hello".to_string()));
    }

    #[test]
    fn settings_section_tokens() {
        let src = "*** Settings ***\nLibrary    Collections    AS    Col\nResource    common.resource\n";
        let toks = kinds(src);
        assert_eq!(toks[1], (TokenKind::SettingName, "Library".to_string()));
        assert_eq!(toks[2], (TokenKind::Argument, "Collections".to_string()));
        assert_eq!(toks[5], (TokenKind::SettingName, "Resource".to_string()));
    }

    #[test]
    fn variables_section_tokens() {
        let src = "*** Variables ***\n${GREETING}    Hello\nnot-a-var    x\n";
        let toks = lex(src, RobotVersion::default());
        let content: Vec<_> = toks.iter().filter(|t| t.kind.is_content()).collect();
        assert_eq!(content[1].kind, TokenKind::Variable);
        assert!(content[1].error.is_none());
        assert_eq!(content[3].kind, TokenKind::Variable);
        assert!(content[3].error.is_some(), "{content:?}");
    }

    #[test]
    fn columns_are_scalar_counts() {
        let src = "*** Test Cases ***\nT\n    Log    h\u{1D538}llo\n";
        let toks = lex(src, RobotVersion::default());
        let arg = toks
            .iter()
            .find(|t| t.kind == TokenKind::Argument)
            .unwrap();
        // "h" + one supplementary scalar + "llo" = 5 scalars.
        assert_eq!(arg.len(), 5);
    }

    #[test]
    fn token_ranges_are_single_line() {
        let src = "*** Settings ***\nLibrary    OperatingSystem\n";
        for tok in lex(src, RobotVersion::default()) {
            assert!(tok.col <= tok.end_col);
        }
    }
}
