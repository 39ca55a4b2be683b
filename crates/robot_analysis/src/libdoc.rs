// ==============================================================================
// Library documentation model
// ==============================================================================
//
// A `LibraryDoc` is the enumerable form of a Python library, resource file,
// or variables file: its keywords with their argument specs, plus any errors
// collected while producing it. Immutable once returned by the loader.
//
// The `BuiltIn`, `Reserved`, and `Easter` libraries ship embedded here so
// every namespace sees them without an explicit import and without touching
// the external Robot runtime.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::matcher::KeywordMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibraryKind {
    Library,
    Resource,
    Variables,
}

/// Argument kinds, named as Robot's libdoc JSON spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentKind {
    PositionalOnly,
    PositionalOrNamed,
    NamedOnly,
    VarPositional,
    VarNamed,
}

impl ArgumentKind {
    /// Whether an argument of this kind may be passed as `name=value`.
    pub fn admits_named(self) -> bool {
        matches!(
            self,
            ArgumentKind::PositionalOrNamed | ArgumentKind::NamedOnly | ArgumentKind::VarNamed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: SmolStr,
    pub kind: ArgumentKind,
    #[serde(default)]
    pub default: Option<SmolStr>,
    #[serde(default)]
    pub type_hint: Option<SmolStr>,
}

impl ArgumentSpec {
    pub fn positional(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::PositionalOrNamed,
            default: None,
            type_hint: None,
        }
    }

    pub fn with_default(name: &str, default: &str) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::PositionalOrNamed,
            default: Some(default.into()),
            type_hint: None,
        }
    }

    pub fn var_positional(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::VarPositional,
            default: None,
            type_hint: None,
        }
    }

    pub fn var_named(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: ArgumentKind::VarNamed,
            default: None,
            type_hint: None,
        }
    }
}

/// How a run-keyword consumes its argument stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKeywordInfo {
    /// `name, args…` — the first argument is the nested keyword.
    Plain,
    /// `cond₁ … condₙ, name, args…` — n leading arguments are plain values
    /// (conditions, counts, expected errors) before the nested keyword.
    WithCondition(usize),
    /// `cond, name, args… [ELSE IF cond name args…]* [ELSE name args…]?`
    If,
    /// `name₁ args… AND name₂ args… AND …`
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDoc {
    pub name: SmolStr,
    pub args: Vec<ArgumentSpec>,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub tags: Vec<SmolStr>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub run_keyword: Option<RunKeywordInfo>,
}

impl KeywordDoc {
    pub fn new(name: &str, args: Vec<ArgumentSpec>) -> Self {
        Self {
            name: name.into(),
            args,
            doc: String::new(),
            tags: Vec::new(),
            line: 0,
            source: None,
            run_keyword: None,
        }
    }

    fn run_keyword(mut self, info: RunKeywordInfo) -> Self {
        self.run_keyword = Some(info);
        self
    }

    pub fn has_embedded_args(&self) -> bool {
        self.name.contains("${")
    }

    pub fn matcher(&self) -> KeywordMatcher {
        KeywordMatcher::new(self.name.clone())
    }

    pub fn is_run_keyword(&self) -> bool {
        self.run_keyword.is_some()
    }

    pub fn is_run_keyword_if(&self) -> bool {
        matches!(self.run_keyword, Some(RunKeywordInfo::If))
    }

    pub fn is_run_keywords(&self) -> bool {
        matches!(self.run_keyword, Some(RunKeywordInfo::Keywords))
    }

    /// Number of leading plain arguments before the nested keyword name.
    pub fn run_keyword_condition_count(&self) -> usize {
        match self.run_keyword {
            Some(RunKeywordInfo::WithCondition(n)) => n,
            Some(RunKeywordInfo::If) => 1,
            _ => 0,
        }
    }

    /// Whether `name=` is an accepted named-argument prefix for this keyword.
    pub fn accepts_named_argument(&self, name: &str) -> bool {
        if self
            .args
            .iter()
            .any(|a| a.kind == ArgumentKind::VarNamed)
        {
            return true;
        }
        self.args
            .iter()
            .any(|a| a.kind.admits_named() && a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDoc {
    pub name: SmolStr,
    pub kind: LibraryKind,
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub doc_format: SmolStr,
    #[serde(default)]
    pub scope: SmolStr,
    /// In definition order; the namespace builds its own lookup index.
    pub keywords: Vec<KeywordDoc>,
    #[serde(default)]
    pub inits: Vec<KeywordDoc>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Variables exposed by a variables file, as `name -> printed value`.
    #[serde(default)]
    pub variables: Vec<(SmolStr, SmolStr)>,
}

impl LibraryDoc {
    pub fn empty(name: &str, kind: LibraryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            source: None,
            line: 0,
            doc: String::new(),
            doc_format: "ROBOT".into(),
            scope: "GLOBAL".into(),
            keywords: Vec::new(),
            inits: Vec::new(),
            errors: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// Linear scan by matcher; the namespace keeps an O(1) index for the hot
    /// path, this is for one-off lookups.
    pub fn find_keyword(&self, name: &str) -> Option<&KeywordDoc> {
        self.keywords.iter().find(|kw| kw.matcher().matches(name))
    }
}

// ==============================================================================
// Embedded default libraries
// ==============================================================================

pub const DEFAULT_LIBRARIES: &[&str] = &["BuiltIn", "Reserved", "Easter"];

pub fn is_default_library(name: &str) -> bool {
    DEFAULT_LIBRARIES.contains(&name)
}

/// The embedded doc for a default library, or `None` for anything else.
pub fn default_library(name: &str) -> Option<LibraryDoc> {
    match name {
        "BuiltIn" => Some(builtin_library()),
        "Reserved" => Some(reserved_library()),
        "Easter" => Some(easter_library()),
        _ => None,
    }
}

fn builtin_library() -> LibraryDoc {
    use RunKeywordInfo::{If, Keywords, Plain, WithCondition};

    let name_args = |extra: Vec<ArgumentSpec>| {
        let mut args = extra;
        args.push(ArgumentSpec::positional("name"));
        args.push(ArgumentSpec::var_positional("args"));
        args
    };

    let keywords = vec![
        KeywordDoc::new("Run Keyword", name_args(vec![])).run_keyword(Plain),
        KeywordDoc::new("Run Keywords", vec![ArgumentSpec::var_positional("keywords")])
            .run_keyword(Keywords),
        KeywordDoc::new(
            "Run Keyword If",
            name_args(vec![ArgumentSpec::positional("condition")]),
        )
        .run_keyword(If),
        KeywordDoc::new(
            "Run Keyword Unless",
            name_args(vec![ArgumentSpec::positional("condition")]),
        )
        .run_keyword(WithCondition(1)),
        KeywordDoc::new("Run Keyword And Ignore Error", name_args(vec![])).run_keyword(Plain),
        KeywordDoc::new("Run Keyword And Return Status", name_args(vec![])).run_keyword(Plain),
        KeywordDoc::new("Run Keyword And Continue On Failure", name_args(vec![]))
            .run_keyword(Plain),
        KeywordDoc::new("Run Keyword And Return", name_args(vec![])).run_keyword(Plain),
        KeywordDoc::new(
            "Run Keyword And Return If",
            name_args(vec![ArgumentSpec::positional("condition")]),
        )
        .run_keyword(WithCondition(1)),
        KeywordDoc::new(
            "Run Keyword And Expect Error",
            name_args(vec![ArgumentSpec::positional("expected_error")]),
        )
        .run_keyword(WithCondition(1)),
        KeywordDoc::new(
            "Run Keyword If Test Failed",
            name_args(vec![]),
        )
        .run_keyword(Plain),
        KeywordDoc::new(
            "Run Keyword If Test Passed",
            name_args(vec![]),
        )
        .run_keyword(Plain),
        KeywordDoc::new(
            "Wait Until Keyword Succeeds",
            name_args(vec![
                ArgumentSpec::positional("retry"),
                ArgumentSpec::positional("retry_interval"),
            ]),
        )
        .run_keyword(WithCondition(2)),
        KeywordDoc::new(
            "Repeat Keyword",
            name_args(vec![ArgumentSpec::positional("repeat")]),
        )
        .run_keyword(WithCondition(1)),
        KeywordDoc::new(
            "Log",
            vec![
                ArgumentSpec::positional("message"),
                ArgumentSpec::with_default("level", "INFO"),
                ArgumentSpec::with_default("html", "False"),
                ArgumentSpec::with_default("console", "False"),
            ],
        ),
        KeywordDoc::new(
            "Log To Console",
            vec![
                ArgumentSpec::positional("message"),
                ArgumentSpec::with_default("stream", "STDOUT"),
            ],
        ),
        KeywordDoc::new("Log Many", vec![ArgumentSpec::var_positional("messages")]),
        KeywordDoc::new("No Operation", vec![]),
        KeywordDoc::new("Fail", vec![ArgumentSpec::with_default("msg", "None")]),
        KeywordDoc::new("Comment", vec![ArgumentSpec::var_positional("messages")]),
        KeywordDoc::new("Sleep", vec![
            ArgumentSpec::positional("time_"),
            ArgumentSpec::with_default("reason", "None"),
        ]),
        KeywordDoc::new("Set Variable", vec![ArgumentSpec::var_positional("values")]),
        KeywordDoc::new("Set Local Variable", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::var_positional("values"),
        ]),
        KeywordDoc::new("Set Test Variable", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::var_positional("values"),
        ]),
        KeywordDoc::new("Set Suite Variable", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::var_positional("values"),
        ]),
        KeywordDoc::new("Set Global Variable", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::var_positional("values"),
        ]),
        KeywordDoc::new("Get Variable Value", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::with_default("default", "None"),
        ]),
        KeywordDoc::new("Variable Should Exist", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Evaluate", vec![
            ArgumentSpec::positional("expression"),
            ArgumentSpec::var_named("namespace"),
        ]),
        KeywordDoc::new("Catenate", vec![ArgumentSpec::var_positional("items")]),
        KeywordDoc::new("Create List", vec![ArgumentSpec::var_positional("items")]),
        KeywordDoc::new("Create Dictionary", vec![ArgumentSpec::var_named("items")]),
        KeywordDoc::new("Get Length", vec![ArgumentSpec::positional("item")]),
        KeywordDoc::new("Get Count", vec![
            ArgumentSpec::positional("container"),
            ArgumentSpec::positional("item"),
        ]),
        KeywordDoc::new("Should Be Equal", vec![
            ArgumentSpec::positional("first"),
            ArgumentSpec::positional("second"),
            ArgumentSpec::with_default("msg", "None"),
            ArgumentSpec::with_default("values", "True"),
            ArgumentSpec::with_default("ignore_case", "False"),
        ]),
        KeywordDoc::new("Should Not Be Equal", vec![
            ArgumentSpec::positional("first"),
            ArgumentSpec::positional("second"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Should Be True", vec![
            ArgumentSpec::positional("condition"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Should Not Be True", vec![
            ArgumentSpec::positional("condition"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Should Contain", vec![
            ArgumentSpec::positional("container"),
            ArgumentSpec::positional("item"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Should Match", vec![
            ArgumentSpec::positional("string"),
            ArgumentSpec::positional("pattern"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Should Match Regexp", vec![
            ArgumentSpec::positional("string"),
            ArgumentSpec::positional("pattern"),
            ArgumentSpec::with_default("msg", "None"),
        ]),
        KeywordDoc::new("Convert To Integer", vec![
            ArgumentSpec::positional("item"),
            ArgumentSpec::with_default("base", "None"),
        ]),
        KeywordDoc::new("Convert To String", vec![ArgumentSpec::positional("item")]),
        KeywordDoc::new("Convert To Boolean", vec![ArgumentSpec::positional("item")]),
        KeywordDoc::new("Convert To Number", vec![
            ArgumentSpec::positional("item"),
            ArgumentSpec::with_default("precision", "None"),
        ]),
        KeywordDoc::new("Fatal Error", vec![ArgumentSpec::with_default("msg", "None")]),
        KeywordDoc::new("Pass Execution", vec![
            ArgumentSpec::positional("message"),
            ArgumentSpec::var_positional("tags"),
        ]),
        KeywordDoc::new("Import Library", vec![
            ArgumentSpec::positional("name"),
            ArgumentSpec::var_positional("args"),
        ]),
        KeywordDoc::new("Import Resource", vec![ArgumentSpec::positional("path")]),
        KeywordDoc::new("Import Variables", vec![
            ArgumentSpec::positional("path"),
            ArgumentSpec::var_positional("args"),
        ]),
    ];

    LibraryDoc {
        doc: "Generic keywords available automatically in every namespace.".into(),
        keywords,
        ..LibraryDoc::empty("BuiltIn", LibraryKind::Library)
    }
}

/// Marker words reserved for future or structural use; calling one gives a
/// clear error in Robot, and defining them here keeps lookups resolving.
fn reserved_library() -> LibraryDoc {
    let keywords = ["For", "End", "If", "Else", "Else If", "While", "Return", "Continue", "Break"]
        .iter()
        .map(|name| KeywordDoc::new(name, vec![ArgumentSpec::var_positional("args")]))
        .collect();
    LibraryDoc {
        keywords,
        ..LibraryDoc::empty("Reserved", LibraryKind::Library)
    }
}

fn easter_library() -> LibraryDoc {
    LibraryDoc {
        keywords: vec![KeywordDoc::new("None Shall Pass", vec![ArgumentSpec::positional("who")])],
        ..LibraryDoc::empty("Easter", LibraryKind::Library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_run_keyword_table() {
        let lib = default_library("BuiltIn").unwrap();
        let rk = lib.find_keyword("Run Keyword").unwrap();
        assert_eq!(rk.run_keyword, Some(RunKeywordInfo::Plain));
        let rki = lib.find_keyword("run_keyword_if").unwrap();
        assert!(rki.is_run_keyword_if());
        assert_eq!(rki.run_keyword_condition_count(), 1);
        let rks = lib.find_keyword("RunKeywords").unwrap();
        assert!(rks.is_run_keywords());
        let wait = lib.find_keyword("Wait Until Keyword Succeeds").unwrap();
        assert_eq!(wait.run_keyword_condition_count(), 2);
    }

    #[test]
    fn log_is_not_a_run_keyword() {
        let lib = default_library("BuiltIn").unwrap();
        assert!(!lib.find_keyword("Log").unwrap().is_run_keyword());
    }

    #[test]
    fn named_argument_acceptance() {
        let lib = default_library("BuiltIn").unwrap();
        let log = lib.find_keyword("Log").unwrap();
        assert!(log.accepts_named_argument("level"));
        assert!(!log.accepts_named_argument("volume"));
        // Evaluate takes **namespace, so any name goes.
        let eval = lib.find_keyword("Evaluate").unwrap();
        assert!(eval.accepts_named_argument("anything"));
    }

    #[test]
    fn default_library_names() {
        assert!(is_default_library("BuiltIn"));
        assert!(!is_default_library("Collections"));
        assert!(default_library("Easter").is_some());
        assert!(default_library("Collections").is_none());
    }

    #[test]
    fn doc_roundtrips_through_json() {
        let lib = default_library("BuiltIn").unwrap();
        let json = serde_json::to_string(&lib).unwrap();
        let back: LibraryDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(lib, back);
    }
}
