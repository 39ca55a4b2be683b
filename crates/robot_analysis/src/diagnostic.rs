// ==============================================================================
// Display-Ready Diagnostics
// ==============================================================================
//
// Import failures, analysis findings, and parse errors all funnel into
// `AnalysisDiagnostic`. These are not Rust errors: a diagnostic never fails
// the enclosing request, it is attached to a source range and shipped to the
// client.

use std::fmt;

use robot_ast::NodeRange;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisDiagnostic {
    pub range: NodeRange,
    pub kind: AnalysisDiagnosticKind,
}

impl AnalysisDiagnostic {
    pub fn new(range: NodeRange, kind: AnalysisDiagnosticKind) -> Self {
        Self { range, kind }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisDiagnosticKind {
    LibraryNotFound {
        name: SmolStr,
        message: String,
    },
    ResourceNotFound {
        name: SmolStr,
    },
    VariablesNotFound {
        name: SmolStr,
        message: String,
    },
    /// Resource import cycle (A imports B which transitively imports A).
    CyclicImport {
        path: String,
    },
    LibdocTimeout {
        name: SmolStr,
        seconds: u64,
    },
    LibdocError {
        name: SmolStr,
        message: String,
    },
    ParseError {
        message: SmolStr,
    },
    TokenError {
        message: SmolStr,
    },
    KeywordNotFound {
        name: SmolStr,
    },
    /// The same unqualified keyword name is exposed by several imports; the
    /// last import won.
    AmbiguousKeyword {
        name: SmolStr,
        sources: Vec<SmolStr>,
    },
    /// An import statement without a name argument.
    MissingImportName,
}

impl AnalysisDiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            AnalysisDiagnosticKind::AmbiguousKeyword { .. } => Severity::Warning,
            AnalysisDiagnosticKind::TokenError { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for AnalysisDiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisDiagnosticKind::LibraryNotFound { name, message } => {
                write!(f, "importing library '{name}' failed: {message}")
            }
            AnalysisDiagnosticKind::ResourceNotFound { name } => {
                write!(f, "resource file '{name}' not found")
            }
            AnalysisDiagnosticKind::VariablesNotFound { name, message } => {
                write!(f, "importing variables file '{name}' failed: {message}")
            }
            AnalysisDiagnosticKind::CyclicImport { path } => {
                write!(f, "cyclic resource import: {path}")
            }
            AnalysisDiagnosticKind::LibdocTimeout { name, seconds } => {
                write!(f, "loading library '{name}' timed out after {seconds} s")
            }
            AnalysisDiagnosticKind::LibdocError { name, message } => {
                write!(f, "error in library '{name}': {message}")
            }
            AnalysisDiagnosticKind::ParseError { message } => write!(f, "{message}"),
            AnalysisDiagnosticKind::TokenError { message } => write!(f, "{message}"),
            AnalysisDiagnosticKind::KeywordNotFound { name } => {
                write!(f, "keyword '{name}' not found")
            }
            AnalysisDiagnosticKind::AmbiguousKeyword { name, sources } => {
                write!(f, "keyword '{name}' is defined in multiple imports (")?;
                for (i, source) in sources.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{source}")?;
                }
                write!(f, "); the last import wins")
            }
            AnalysisDiagnosticKind::MissingImportName => {
                write!(f, "import statement is missing a name")
            }
        }
    }
}

impl fmt::Display for AnalysisDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_not_found_display() {
        let kind = AnalysisDiagnosticKind::LibraryNotFound {
            name: "NoSuchLib".into(),
            message: "module not found".into(),
        };
        let msg = kind.to_string();
        assert!(msg.contains("NoSuchLib"));
        assert!(msg.contains("module not found"));
        assert_eq!(kind.severity(), Severity::Error);
    }

    #[test]
    fn ambiguous_keyword_is_warning() {
        let kind = AnalysisDiagnosticKind::AmbiguousKeyword {
            name: "Open Connection".into(),
            sources: vec!["SSHLibrary".into(), "Telnet".into()],
        };
        assert_eq!(kind.severity(), Severity::Warning);
        let msg = kind.to_string();
        assert!(msg.contains("SSHLibrary, Telnet"));
        assert!(msg.contains("last import wins"));
    }

    #[test]
    fn timeout_display() {
        let kind = AnalysisDiagnosticKind::LibdocTimeout {
            name: "Slow".into(),
            seconds: 60,
        };
        assert!(kind.to_string().contains("timed out after 60 s"));
    }
}
