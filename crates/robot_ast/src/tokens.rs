use smol_str::SmolStr;

/// Closed enumeration of Robot Framework token kinds.
///
/// Downstream code matches exhaustively on this; the lexer never produces
/// anything outside it. Kinds that only exist from a certain Robot version on
/// are produced only when the lexer runs with that version (see
/// `RobotVersion`); on older versions the same cell lexes as `Keyword` or
/// `Argument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Section headers.
    SettingHeader,
    VariableHeader,
    TestCaseHeader,
    KeywordHeader,
    CommentHeader,
    InvalidHeader,

    // Names introducing blocks.
    TestCaseName,
    KeywordName,

    // Statement content.
    SettingName,
    Keyword,
    Argument,
    Variable,
    Assign,

    // Layout.
    Separator,
    Continuation,
    Eol,
    Comment,

    // Control flow.
    For,
    ForSeparator,
    End,
    If,
    ElseIf,
    Else,
    While,
    Try,
    Except,
    Finally,
    Break,
    Continue,
    Return,
    Var,

    /// `Language: xx` marker line at the top of a file.
    Config,

    Error,
}

impl TokenKind {
    /// Control-flow marker words (used by the block parser and the semantic
    /// token mapping).
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            TokenKind::For
                | TokenKind::ForSeparator
                | TokenKind::End
                | TokenKind::If
                | TokenKind::ElseIf
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Try
                | TokenKind::Except
                | TokenKind::Finally
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
        )
    }

    /// Whether this token carries statement content, as opposed to layout
    /// (separators, EOLs, continuations, comments).
    pub fn is_content(self) -> bool {
        !matches!(
            self,
            TokenKind::Separator | TokenKind::Continuation | TokenKind::Eol | TokenKind::Comment
        )
    }
}

/// A single-line token. Columns are Unicode scalar counts (UTF-32 units);
/// encoding translation happens downstream against the owning line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: SmolStr,
    pub line: u32,
    pub col: u32,
    pub end_col: u32,
    pub error: Option<SmolStr>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<SmolStr>, line: u32, col: u32) -> Self {
        let value = value.into();
        let end_col = col + value.chars().count() as u32;
        Self {
            kind,
            value,
            line,
            col,
            end_col,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<SmolStr>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Length in Unicode scalars.
    pub fn len(&self) -> u32 {
        self.end_col - self.col
    }

    pub fn is_empty(&self) -> bool {
        self.col == self.end_col
    }
}
