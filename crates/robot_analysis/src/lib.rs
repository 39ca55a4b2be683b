// ==============================================================================
// robot_analysis: the analysis kernel
// ==============================================================================
//
// Everything the LSP adapters call into: libdoc loading (disk-cached,
// fingerprinted), namespace resolution with import-graph invalidation, the
// keyword-call analyzer with run-keyword handling, and the semantic token
// generator. All long-running entry points take a `CancellationToken` and
// poll it between imports and per statement.

pub mod diagnostic;
pub mod disk_cache;
pub mod documents;
pub mod environment;
pub mod folding;
pub mod keyword_call;
pub mod libdoc;
pub mod loader;
pub mod matcher;
pub mod namespace;
pub mod semantic_tokens;
pub mod settings;
pub mod symbols;

pub use diagnostic::{AnalysisDiagnostic, AnalysisDiagnosticKind, Severity};
pub use disk_cache::{CacheKind, CacheMeta, DiskCache};
pub use documents::{AnalysisError, DocumentType, DocumentsCache, StoreResourceResolver};
pub use environment::EnvironmentProbe;
pub use folding::{folding_ranges, FoldingKind, FoldingRange};
pub use keyword_call::{analyze_call, CallPart, CallPartKind};
pub use libdoc::{
    default_library, ArgumentKind, ArgumentSpec, KeywordDoc, LibraryDoc, LibraryKind,
    RunKeywordInfo,
};
pub use loader::{resource_doc, LibdocError, LibdocLoader};
pub use matcher::KeywordMatcher;
pub use namespace::{
    strip_bdd_prefix, FileResourceResolver, KeywordHit, KeywordSource, LibraryEntry, Namespace,
    ResourceEntry, ResourceResolution, ResourceResolver, VariableHit, VariableScope,
    VariablesEntry,
};
pub use semantic_tokens::{
    legend_modifiers, legend_types, SemTokenType, SemanticToken, MOD_BUILTIN, MOD_DECLARATION,
    MOD_DEFAULT_LIBRARY,
};
pub use settings::{
    DiagnosticMode, ExternalDiagnostics, WorkspaceSettings, DEFAULT_LIBDOC_TIMEOUT_SECS,
};
pub use symbols::{document_symbols, DocumentSymbol, SymbolKind};
