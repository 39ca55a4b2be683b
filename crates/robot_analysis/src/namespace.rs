// ==============================================================================
// Namespace: everything visible from one Robot file
// ==============================================================================
//
// `ensure_initialized` walks the file's import statements in order, loads a
// `LibraryDoc` (or records a diagnostic) for each, pulls in the default
// libraries, and indexes every visible keyword. Resource imports are walked
// transitively with an in-progress set, so a cycle yields a diagnostic
// instead of unbounded recursion. Initialization is idempotent and guarded
// by a namespace-wide lock; only one thread resolves a given namespace.
//
// Lookup order for `find_keyword`:
//   1. unqualified local keywords defined in the document,
//   2. unqualified imports, last import winning exact-name ties (with an
//      ambiguity diagnostic recorded at init for ties across imports),
//   3. qualified `library.name`, the library part resolving against the
//      alias before the name,
//   4. embedded-argument patterns, consulted only when no exact match
//      exists.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use robot_ast::{Ast, NodeRange, RobotVersion, SectionBody, SectionKind, StatementKind};
use robot_text::{CancellationToken, Cancelled, DocumentUri, Position};

use crate::diagnostic::{AnalysisDiagnostic, AnalysisDiagnosticKind};
use crate::libdoc::{default_library, KeywordDoc, LibraryDoc, DEFAULT_LIBRARIES};
use crate::loader::{resource_doc, LibdocError, LibdocLoader};
use crate::matcher::{normalize, KeywordMatcher};

// ==============================================================================
// Resource resolution boundary
// ==============================================================================

/// A resolved resource import: where it lives and its parsed model. The
/// documents cache implements this over open documents; `FileResourceResolver`
/// reads straight from disk.
pub struct ResourceResolution {
    pub uri: DocumentUri,
    pub path: PathBuf,
    pub ast: Arc<Ast>,
}

pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, base_dir: &Path, name: &str) -> Result<ResourceResolution, LibdocError>;
}

/// Disk-backed resolver used by tests and one-shot analyses.
pub struct FileResourceResolver {
    version: RobotVersion,
    search_paths: Vec<PathBuf>,
}

impl FileResourceResolver {
    pub fn new(version: RobotVersion, search_paths: Vec<PathBuf>) -> Self {
        Self {
            version,
            search_paths,
        }
    }
}

impl ResourceResolver for FileResourceResolver {
    fn resolve(&self, base_dir: &Path, name: &str) -> Result<ResourceResolution, LibdocError> {
        let path = resolve_import_path(base_dir, name, &self.search_paths).ok_or_else(|| {
            LibdocError::NotFound {
                name: name.into(),
                message: "no such file".into(),
            }
        })?;
        let text = std::fs::read_to_string(&path).map_err(|source| LibdocError::Io {
            path: path.clone(),
            source,
        })?;
        let ast = Arc::new(robot_ast::parse(&text, self.version));
        let uri = DocumentUri::from_file_path(&path).ok_or_else(|| LibdocError::NotFound {
            name: name.into(),
            message: "path is not representable as a URI".into(),
        })?;
        Ok(ResourceResolution { uri, path, ast })
    }
}

/// Resolve an import path against the importing file's directory first, then
/// the configured search paths. Canonicalized so cycle detection is stable
/// under `..` segments and symlinks.
pub fn resolve_import_path(
    base_dir: &Path,
    name: &str,
    search_paths: &[PathBuf],
) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate
            .exists()
            .then(|| candidate.canonicalize().unwrap_or_else(|_| candidate.to_path_buf()));
    }
    std::iter::once(base_dir.to_path_buf())
        .chain(search_paths.iter().cloned())
        .map(|dir| dir.join(candidate))
        .find(|p| p.exists())
        .map(|p| p.canonicalize().unwrap_or(p))
}

// ==============================================================================
// Entries and hits
// ==============================================================================

#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub import_name: SmolStr,
    pub alias: Option<SmolStr>,
    pub args: Vec<SmolStr>,
    pub doc: Arc<LibraryDoc>,
    pub range: Option<NodeRange>,
    pub is_default: bool,
    /// Position in overall import order; later imports win exact-name ties.
    pub import_order: usize,
}

impl LibraryEntry {
    /// The name this entry is addressed by in qualified calls.
    pub fn visible_name(&self) -> &SmolStr {
        self.alias.as_ref().unwrap_or(&self.doc.name)
    }
}

#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub import_name: SmolStr,
    pub path: PathBuf,
    pub doc: Arc<LibraryDoc>,
    pub range: Option<NodeRange>,
    pub import_order: usize,
}

#[derive(Debug, Clone)]
pub struct VariablesEntry {
    pub import_name: SmolStr,
    pub doc: Arc<LibraryDoc>,
    pub range: Option<NodeRange>,
}

/// Where a resolved keyword came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordSource {
    Local,
    Library(SmolStr),
    Resource(SmolStr),
}

#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub keyword: Arc<KeywordDoc>,
    pub source: KeywordSource,
    /// Set for default-library keywords (`BuiltIn`, `Reserved`, `Easter`).
    pub default_library: bool,
    /// Captures from an embedded-argument match, in pattern order.
    pub embedded_args: Option<Vec<(SmolStr, SmolStr)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Local,
    File,
    Imported,
    Global,
}

#[derive(Debug, Clone)]
pub struct VariableHit {
    pub name: SmolStr,
    pub scope: VariableScope,
    pub range: Option<NodeRange>,
    pub value: Option<SmolStr>,
}

// ==============================================================================
// Namespace
// ==============================================================================

struct IndexedKeyword {
    doc: Arc<KeywordDoc>,
    matcher: KeywordMatcher,
    source: KeywordSource,
    /// Position in import order; later imports win exact-name ties.
    import_order: usize,
    default_library: bool,
    range: Option<NodeRange>,
}

struct Resolved {
    libraries: Vec<LibraryEntry>,
    resources: Vec<ResourceEntry>,
    variable_files: Vec<VariablesEntry>,
    keywords: Vec<IndexedKeyword>,
    /// Normalized name -> indices into `keywords` (exact matchers only).
    exact: FxHashMap<String, Vec<usize>>,
    /// Indices of keywords whose matcher carries an embedded pattern.
    embedded: Vec<usize>,
    /// `${NAME}` definitions from this file's `*** Variables ***` sections.
    file_variables: Vec<(SmolStr, NodeRange, SmolStr)>,
    /// Globally configured variables (`variables` setting).
    global_variables: Vec<(SmolStr, SmolStr)>,
    diagnostics: Vec<AnalysisDiagnostic>,
    /// Files this namespace read; a change to any of them invalidates it.
    depends_on: Vec<PathBuf>,
}

pub struct Namespace {
    uri: DocumentUri,
    ast: Arc<Ast>,
    loader: Arc<LibdocLoader>,
    resolver: Arc<dyn ResourceResolver>,
    init_lock: Mutex<()>,
    resolved: OnceLock<Resolved>,
}

impl Namespace {
    pub fn new(
        uri: DocumentUri,
        ast: Arc<Ast>,
        loader: Arc<LibdocLoader>,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            uri,
            ast,
            loader,
            resolver,
            init_lock: Mutex::new(()),
            resolved: OnceLock::new(),
        }
    }

    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    pub fn ast(&self) -> &Arc<Ast> {
        &self.ast
    }

    pub fn is_initialized(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Walk imports and build the keyword index. Idempotent; concurrent
    /// callers block on the first initializer. Cancellation leaves the
    /// namespace uninitialized, so a later request starts over.
    pub fn ensure_initialized(&self, token: &CancellationToken) -> Result<(), Cancelled> {
        if self.resolved.get().is_some() {
            return Ok(());
        }
        let _guard = self.init_lock.lock();
        if self.resolved.get().is_some() {
            return Ok(());
        }
        let resolved = self.resolve_all(token)?;
        let _ = self.resolved.set(resolved);
        Ok(())
    }

    // --------------------------------------------------------------------------
    // Accessors (empty until initialized)
    // --------------------------------------------------------------------------

    pub fn get_libraries(&self) -> &[LibraryEntry] {
        self.resolved
            .get()
            .map(|r| r.libraries.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_resources(&self) -> &[ResourceEntry] {
        self.resolved
            .get()
            .map(|r| r.resources.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_variable_files(&self) -> &[VariablesEntry] {
        self.resolved
            .get()
            .map(|r| r.variable_files.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_diagnostics(&self) -> &[AnalysisDiagnostic] {
        self.resolved
            .get()
            .map(|r| r.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    /// Every visible keyword, local definitions first, then import order.
    pub fn get_keywords(&self) -> Vec<KeywordHit> {
        let Some(resolved) = self.resolved.get() else {
            return Vec::new();
        };
        resolved
            .keywords
            .iter()
            .map(|indexed| KeywordHit {
                keyword: indexed.doc.clone(),
                source: indexed.source.clone(),
                default_library: indexed.default_library,
                embedded_args: None,
            })
            .collect()
    }

    /// Variables visible at file scope: own `*** Variables ***` definitions,
    /// then imported variables files and resource variables.
    pub fn get_file_variables(&self) -> Vec<VariableHit> {
        let Some(resolved) = self.resolved.get() else {
            return Vec::new();
        };
        let mut out: Vec<VariableHit> = resolved
            .file_variables
            .iter()
            .map(|(name, range, value)| VariableHit {
                name: name.clone(),
                scope: VariableScope::File,
                range: Some(*range),
                value: Some(value.clone()),
            })
            .collect();
        for entry in &resolved.variable_files {
            out.extend(entry.doc.variables.iter().map(|(name, value)| VariableHit {
                name: name.clone(),
                scope: VariableScope::Imported,
                range: entry.range,
                value: Some(value.clone()),
            }));
        }
        for entry in &resolved.resources {
            out.extend(entry.doc.variables.iter().map(|(name, value)| VariableHit {
                name: name.clone(),
                scope: VariableScope::Imported,
                range: entry.range,
                value: Some(value.clone()),
            }));
        }
        out
    }

    /// Files whose changes must invalidate this namespace.
    pub fn dependencies(&self) -> &[PathBuf] {
        self.resolved
            .get()
            .map(|r| r.depends_on.as_slice())
            .unwrap_or(&[])
    }

    // --------------------------------------------------------------------------
    // Keyword lookup
    // --------------------------------------------------------------------------

    pub fn find_keyword(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<Option<KeywordHit>, Cancelled> {
        token.check()?;
        self.ensure_initialized(token)?;
        let resolved = self.resolved.get().expect("initialized above");

        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        if let Some(hit) = Self::lookup(resolved, name) {
            return Ok(Some(hit));
        }
        // BDD prefixes are transparent: `Given login` resolves `login`.
        if let Some(rest) = strip_bdd_prefix(name) {
            return Ok(Self::lookup(resolved, rest));
        }
        Ok(None)
    }

    fn lookup(resolved: &Resolved, name: &str) -> Option<KeywordHit> {
        let normalized = normalize(name);

        // 1 + 2: unqualified, locals before imports, later imports first.
        if let Some(candidates) = resolved.exact.get(&normalized) {
            let best = candidates
                .iter()
                .map(|&i| &resolved.keywords[i])
                .max_by_key(|k| {
                    (
                        k.source == KeywordSource::Local,
                        !k.default_library,
                        k.import_order,
                    )
                });
            if let Some(indexed) = best {
                return Some(indexed.hit(None));
            }
        }

        // 3: qualified `library.keyword`, longest prefix first so dotted
        // library names keep working.
        let mut split_points: Vec<usize> =
            name.match_indices('.').map(|(i, _)| i).collect();
        split_points.reverse();
        for split in split_points {
            let (prefix, rest) = name.split_at(split);
            let rest = &rest[1..];
            if rest.is_empty() {
                continue;
            }
            if let Some(hit) = Self::lookup_qualified(resolved, prefix, rest) {
                return Some(hit);
            }
        }

        // 4: embedded-argument patterns, only without an exact match.
        for &i in &resolved.embedded {
            let indexed = &resolved.keywords[i];
            if let Some(captures) = indexed.matcher.matches_embedded(name) {
                return Some(indexed.hit(Some(captures)));
            }
        }
        None
    }

    fn lookup_qualified(resolved: &Resolved, library: &str, keyword: &str) -> Option<KeywordHit> {
        let wanted = normalize(library);
        let matches_entry = |entry: &LibraryEntry| {
            entry
                .alias
                .as_ref()
                .is_some_and(|alias| normalize(alias) == wanted)
                || normalize(&entry.doc.name) == wanted
        };
        // Alias resolution takes priority over plain names.
        let entry = resolved
            .libraries
            .iter()
            .find(|e| e.alias.as_ref().is_some_and(|a| normalize(a) == wanted))
            .or_else(|| resolved.libraries.iter().find(|e| matches_entry(e)));
        if let Some(entry) = entry {
            let kw = entry.doc.find_keyword(keyword)?;
            return Some(KeywordHit {
                keyword: Arc::new(kw.clone()),
                source: KeywordSource::Library(entry.visible_name().clone()),
                default_library: entry.is_default,
                embedded_args: None,
            });
        }
        let resource = resolved
            .resources
            .iter()
            .find(|e| normalize(&e.doc.name) == wanted)?;
        let kw = resource.doc.find_keyword(keyword)?;
        Some(KeywordHit {
            keyword: Arc::new(kw.clone()),
            source: KeywordSource::Resource(resource.doc.name.clone()),
            default_library: false,
            embedded_args: None,
        })
    }

    // --------------------------------------------------------------------------
    // Variable lookup
    // --------------------------------------------------------------------------

    /// Scope-aware variable lookup, walking outward from the innermost block
    /// enclosing `position`: block locals, file `*** Variables ***`,
    /// imported variables files and resource variables, then globally
    /// configured variables.
    pub fn find_variable(&self, name: &str, position: Option<Position>) -> Option<VariableHit> {
        let resolved = self.resolved.get()?;
        let wanted = normalize_variable(name);

        if let Some(position) = position {
            if let Some(hit) = self.find_local_variable(&wanted, position) {
                return Some(hit);
            }
        }

        for (def_name, range, value) in &resolved.file_variables {
            if normalize_variable(def_name) == wanted {
                return Some(VariableHit {
                    name: def_name.clone(),
                    scope: VariableScope::File,
                    range: Some(*range),
                    value: Some(value.clone()),
                });
            }
        }

        for entry in &resolved.variable_files {
            for (def_name, value) in &entry.doc.variables {
                if normalize_variable(def_name) == wanted {
                    return Some(VariableHit {
                        name: def_name.clone(),
                        scope: VariableScope::Imported,
                        range: entry.range,
                        value: Some(value.clone()),
                    });
                }
            }
        }
        for entry in &resolved.resources {
            for (def_name, value) in &entry.doc.variables {
                if normalize_variable(def_name) == wanted {
                    return Some(VariableHit {
                        name: def_name.clone(),
                        scope: VariableScope::Imported,
                        range: entry.range,
                        value: Some(value.clone()),
                    });
                }
            }
        }

        for (def_name, value) in &resolved.global_variables {
            if normalize_variable(def_name) == wanted {
                return Some(VariableHit {
                    name: def_name.clone(),
                    scope: VariableScope::Global,
                    range: None,
                    value: Some(value.clone()),
                });
            }
        }
        None
    }

    fn find_local_variable(&self, wanted: &str, position: Position) -> Option<VariableHit> {
        let body = self.enclosing_body(position)?;
        let mut found: Option<VariableHit> = None;
        for &stmt_id in body {
            let stmt = self.ast.statement(stmt_id);
            let Some(range) = self.statement_start_range(stmt_id) else {
                continue;
            };
            if range.start_line > position.line {
                break;
            }
            let mut record = |idx: usize| {
                let tok = &stmt.tokens[idx];
                found = Some(VariableHit {
                    name: tok.value.clone(),
                    scope: VariableScope::Local,
                    range: Some(NodeRange {
                        start_line: tok.line,
                        start_col: tok.col,
                        end_line: tok.line,
                        end_col: tok.end_col,
                    }),
                    value: None,
                });
            };
            match &stmt.kind {
                StatementKind::KeywordCall { assigns, .. } => {
                    for &idx in assigns {
                        if normalize_variable(&stmt.tokens[idx].value) == wanted {
                            record(idx);
                        }
                    }
                }
                StatementKind::Var { name: Some(idx), .. } => {
                    if normalize_variable(&stmt.tokens[*idx].value) == wanted {
                        record(*idx);
                    }
                }
                StatementKind::For { variables, .. } => {
                    for &idx in variables {
                        if normalize_variable(&stmt.tokens[idx].value) == wanted {
                            record(idx);
                        }
                    }
                }
                StatementKind::Setting { name, values } => {
                    if stmt.tokens[*name].value.eq_ignore_ascii_case("[arguments]") {
                        for &idx in values {
                            if normalize_variable(&stmt.tokens[idx].value) == wanted {
                                record(idx);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        found
    }

    /// The body of the test case or keyword whose lines enclose `position`.
    fn enclosing_body(&self, position: Position) -> Option<&Vec<robot_ast::StatementId>> {
        let line = position.line;
        for case in self.ast.test_cases() {
            if self.body_contains(&case.name, &case.body, line) {
                return Some(&case.body);
            }
        }
        for def in self.ast.keywords() {
            if self.body_contains(&def.name, &def.body, line) {
                return Some(&def.body);
            }
        }
        None
    }

    fn body_contains(
        &self,
        name: &robot_ast::Token,
        body: &[robot_ast::StatementId],
        line: u32,
    ) -> bool {
        let end = body
            .iter()
            .map(|&id| self.ast.statement_range(id).end_line)
            .max()
            .unwrap_or(name.line);
        line >= name.line && line <= end
    }

    fn statement_start_range(&self, id: robot_ast::StatementId) -> Option<NodeRange> {
        self.ast.statement(id).own_range()
    }

    // --------------------------------------------------------------------------
    // Initialization
    // --------------------------------------------------------------------------

    fn resolve_all(&self, token: &CancellationToken) -> Result<Resolved, Cancelled> {
        let mut resolved = Resolved {
            libraries: Vec::new(),
            resources: Vec::new(),
            variable_files: Vec::new(),
            keywords: Vec::new(),
            exact: FxHashMap::default(),
            embedded: Vec::new(),
            file_variables: Vec::new(),
            global_variables: self
                .loader
                .settings()
                .variables
                .iter()
                .map(|(k, v)| (SmolStr::from(format!("${{{k}}}")), SmolStr::from(v.as_str())))
                .collect(),
            diagnostics: Vec::new(),
            depends_on: Vec::new(),
        };
        let mut order = 0usize;

        // Default libraries first: lowest priority, so explicit imports win
        // exact-name ties against them.
        for name in DEFAULT_LIBRARIES {
            let doc = Arc::new(default_library(name).expect("embedded library"));
            resolved.libraries.push(LibraryEntry {
                import_name: SmolStr::from(*name),
                alias: None,
                args: Vec::new(),
                doc,
                range: None,
                is_default: true,
                import_order: order,
            });
            order += 1;
        }

        let base_dir = self
            .uri
            .to_file_path()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut in_progress: Vec<PathBuf> = Vec::new();
        if let Some(own) = self.uri.to_file_path() {
            in_progress.push(own.canonicalize().unwrap_or(own));
        }

        let ast = self.ast.clone();
        self.walk_imports(
            &ast,
            &base_dir,
            None,
            &mut in_progress,
            &mut resolved,
            &mut order,
            token,
        )?;

        self.collect_file_variables(&ast, &mut resolved);
        self.index_keywords(&mut resolved);
        Ok(resolved)
    }

    /// Walk the import statements of `ast` in file order, recursing into
    /// resource files. `origin_range` is set while inside a transitively
    /// imported resource so nested failures surface on the import statement
    /// of the current document.
    #[allow(clippy::too_many_arguments)]
    fn walk_imports(
        &self,
        ast: &Ast,
        base_dir: &Path,
        origin_range: Option<NodeRange>,
        in_progress: &mut Vec<PathBuf>,
        resolved: &mut Resolved,
        order: &mut usize,
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        for section in &ast.sections {
            if section.kind != SectionKind::Settings {
                continue;
            }
            let SectionBody::Statements(ids) = &section.body else {
                continue;
            };
            for &id in ids {
                token.check()?;
                let stmt = ast.statement(id);
                let stmt_range = origin_range.or_else(|| stmt.own_range());
                match &stmt.kind {
                    StatementKind::LibraryImport { name, args, alias } => {
                        let Some(name_idx) = name else {
                            resolved.diagnostics.push(diag(
                                stmt_range,
                                AnalysisDiagnosticKind::MissingImportName,
                            ));
                            continue;
                        };
                        let lib_name = stmt.tokens[*name_idx].value.clone();
                        let lib_args: Vec<SmolStr> = args
                            .iter()
                            .map(|&i| stmt.tokens[i].value.clone())
                            .collect();
                        let lib_alias = alias.map(|i| stmt.tokens[i].value.clone());
                        match self.loader.load_library(&lib_name, base_dir) {
                            Ok(doc) => {
                                if let Some(source) = &doc.source {
                                    resolved.depends_on.push(source.clone());
                                }
                                resolved.libraries.push(LibraryEntry {
                                    import_name: lib_name,
                                    alias: lib_alias,
                                    args: lib_args,
                                    doc,
                                    range: stmt_range,
                                    is_default: false,
                                    import_order: *order,
                                });
                                *order += 1;
                            }
                            Err(err) => {
                                resolved
                                    .diagnostics
                                    .push(diag(stmt_range, libdoc_error_kind(&lib_name, err)));
                            }
                        }
                    }
                    StatementKind::ResourceImport { name } => {
                        let Some(name_idx) = name else {
                            resolved.diagnostics.push(diag(
                                stmt_range,
                                AnalysisDiagnosticKind::MissingImportName,
                            ));
                            continue;
                        };
                        let res_name = stmt.tokens[*name_idx].value.clone();
                        self.import_resource(
                            &res_name,
                            base_dir,
                            stmt_range,
                            in_progress,
                            resolved,
                            order,
                            token,
                        )?;
                    }
                    StatementKind::VariablesImport { name, .. } => {
                        let Some(name_idx) = name else {
                            resolved.diagnostics.push(diag(
                                stmt_range,
                                AnalysisDiagnosticKind::MissingImportName,
                            ));
                            continue;
                        };
                        let var_name = stmt.tokens[*name_idx].value.clone();
                        let path = resolve_import_path(
                            base_dir,
                            &var_name,
                            &self.loader.settings().paths,
                        );
                        let result = match path {
                            Some(path) => {
                                resolved.depends_on.push(path.clone());
                                self.loader.load_variables(&path)
                            }
                            None => Err(LibdocError::NotFound {
                                name: var_name.clone(),
                                message: "no such file".into(),
                            }),
                        };
                        match result {
                            Ok(doc) => {
                                resolved.variable_files.push(VariablesEntry {
                                    import_name: var_name,
                                    doc,
                                    range: stmt_range,
                                });
                            }
                            Err(err) => {
                                resolved.diagnostics.push(diag(
                                    stmt_range,
                                    AnalysisDiagnosticKind::VariablesNotFound {
                                        name: var_name,
                                        message: err.to_string(),
                                    },
                                ));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn import_resource(
        &self,
        name: &SmolStr,
        base_dir: &Path,
        stmt_range: Option<NodeRange>,
        in_progress: &mut Vec<PathBuf>,
        resolved: &mut Resolved,
        order: &mut usize,
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let resolution = match self.resolver.resolve(base_dir, name) {
            Ok(resolution) => resolution,
            Err(LibdocError::NotFound { .. }) | Err(LibdocError::Io { .. }) => {
                resolved.diagnostics.push(diag(
                    stmt_range,
                    AnalysisDiagnosticKind::ResourceNotFound { name: name.clone() },
                ));
                return Ok(());
            }
            Err(err) => {
                resolved.diagnostics.push(diag(
                    stmt_range,
                    AnalysisDiagnosticKind::LibdocError {
                        name: name.clone(),
                        message: err.to_string(),
                    },
                ));
                return Ok(());
            }
        };

        if in_progress.contains(&resolution.path) {
            resolved.diagnostics.push(diag(
                stmt_range,
                AnalysisDiagnosticKind::CyclicImport {
                    path: resolution.path.display().to_string(),
                },
            ));
            return Ok(());
        }
        // Diamond imports resolve once.
        if resolved.resources.iter().any(|r| r.path == resolution.path) {
            return Ok(());
        }

        let doc = Arc::new(resource_doc(&resolution.path, &resolution.ast));
        resolved.depends_on.push(resolution.path.clone());
        resolved.resources.push(ResourceEntry {
            import_name: name.clone(),
            path: resolution.path.clone(),
            doc,
            range: stmt_range,
            import_order: *order,
        });
        *order += 1;

        let nested_base = resolution
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.to_path_buf());
        in_progress.push(resolution.path.clone());
        self.walk_imports(
            &resolution.ast,
            &nested_base,
            stmt_range,
            in_progress,
            resolved,
            order,
            token,
        )?;
        in_progress.pop();
        Ok(())
    }

    fn collect_file_variables(&self, ast: &Ast, resolved: &mut Resolved) {
        for section in &ast.sections {
            if section.kind != SectionKind::Variables {
                continue;
            }
            let SectionBody::Statements(ids) = &section.body else {
                continue;
            };
            for &id in ids {
                let stmt = ast.statement(id);
                if let StatementKind::VariableDef { name, values } = &stmt.kind {
                    let tok = &stmt.tokens[*name];
                    let value = values
                        .iter()
                        .map(|&i| stmt.tokens[i].value.as_str())
                        .collect::<Vec<_>>()
                        .join("    ");
                    resolved.file_variables.push((
                        tok.value.clone(),
                        NodeRange {
                            start_line: tok.line,
                            start_col: tok.col,
                            end_line: tok.line,
                            end_col: tok.end_col,
                        },
                        value.into(),
                    ));
                }
            }
        }
    }

    /// Build the flat keyword index: local definitions, then every import's
    /// keywords. Exact-name ties across non-default imports get an
    /// `AmbiguousKeyword` diagnostic here (last import wins at lookup time).
    fn index_keywords(&self, resolved: &mut Resolved) {
        for def in self.ast.keywords() {
            let mut doc = KeywordDoc::new(&def.name.value, Vec::new());
            doc.line = def.name.line;
            for &stmt_id in &def.body {
                let stmt = self.ast.statement(stmt_id);
                if let StatementKind::Setting { name, values } = &stmt.kind {
                    if stmt.tokens[*name].value.eq_ignore_ascii_case("[arguments]") {
                        doc.args = values
                            .iter()
                            .map(|&i| {
                                crate::loader::argument_spec_from_cell(&stmt.tokens[i].value)
                            })
                            .collect();
                    }
                }
            }
            let matcher = doc.matcher();
            push_indexed(
                resolved,
                IndexedKeyword {
                    doc: Arc::new(doc),
                    matcher,
                    source: KeywordSource::Local,
                    import_order: usize::MAX,
                    default_library: false,
                    range: Some(NodeRange {
                        start_line: def.name.line,
                        start_col: def.name.col,
                        end_line: def.name.line,
                        end_col: def.name.end_col,
                    }),
                },
            );
        }

        let libraries: Vec<(Arc<LibraryDoc>, SmolStr, bool, Option<NodeRange>, usize)> = resolved
            .libraries
            .iter()
            .map(|e| {
                (
                    e.doc.clone(),
                    e.visible_name().clone(),
                    e.is_default,
                    e.range,
                    e.import_order,
                )
            })
            .collect();
        for (doc, visible, is_default, range, import_order) in libraries {
            for kw in &doc.keywords {
                push_indexed(
                    resolved,
                    IndexedKeyword {
                        doc: Arc::new(kw.clone()),
                        matcher: kw.matcher(),
                        source: KeywordSource::Library(visible.clone()),
                        import_order,
                        default_library: is_default,
                        range,
                    },
                );
            }
        }

        let resources: Vec<(Arc<LibraryDoc>, Option<NodeRange>, usize)> = resolved
            .resources
            .iter()
            .map(|e| (e.doc.clone(), e.range, e.import_order))
            .collect();
        for (doc, range, import_order) in resources {
            for kw in &doc.keywords {
                push_indexed(
                    resolved,
                    IndexedKeyword {
                        doc: Arc::new(kw.clone()),
                        matcher: kw.matcher(),
                        source: KeywordSource::Resource(doc.name.clone()),
                        import_order,
                        default_library: false,
                        range,
                    },
                );
            }
        }

        // Ambiguity pass: exact-name ties across distinct non-default
        // imports. The lookup's last-import-wins rule still applies; the
        // diagnostic tells the author which sources collide.
        let mut flagged: Vec<(Option<NodeRange>, AnalysisDiagnosticKind)> = Vec::new();
        for indices in resolved.exact.values() {
            let imported: Vec<&IndexedKeyword> = indices
                .iter()
                .map(|&i| &resolved.keywords[i])
                .filter(|k| k.source != KeywordSource::Local && !k.default_library)
                .collect();
            if imported.len() < 2 {
                continue;
            }
            let mut sources: Vec<SmolStr> = imported
                .iter()
                .map(|k| match &k.source {
                    KeywordSource::Library(n) | KeywordSource::Resource(n) => n.clone(),
                    KeywordSource::Local => SmolStr::default(),
                })
                .collect();
            sources.sort_unstable();
            sources.dedup();
            if sources.len() < 2 {
                continue;
            }
            let winner = imported
                .iter()
                .max_by_key(|k| k.import_order)
                .expect("at least two entries");
            flagged.push((
                winner.range,
                AnalysisDiagnosticKind::AmbiguousKeyword {
                    name: winner.doc.name.clone(),
                    sources,
                },
            ));
        }
        for (range, kind) in flagged {
            resolved.diagnostics.push(diag(range, kind));
        }
    }
}

fn push_indexed(resolved: &mut Resolved, indexed: IndexedKeyword) {
    let idx = resolved.keywords.len();
    if indexed.matcher.has_embedded_args() {
        resolved.embedded.push(idx);
    } else {
        resolved
            .exact
            .entry(indexed.matcher.normalized().to_string())
            .or_default()
            .push(idx);
    }
    resolved.keywords.push(indexed);
}

impl IndexedKeyword {
    fn hit(&self, embedded_args: Option<Vec<(SmolStr, SmolStr)>>) -> KeywordHit {
        KeywordHit {
            keyword: self.doc.clone(),
            source: self.source.clone(),
            default_library: self.default_library,
            embedded_args,
        }
    }
}

fn diag(range: Option<NodeRange>, kind: AnalysisDiagnosticKind) -> AnalysisDiagnostic {
    AnalysisDiagnostic::new(
        range.unwrap_or(NodeRange {
            start_line: 0,
            start_col: 0,
            end_line: 0,
            end_col: 0,
        }),
        kind,
    )
}

fn libdoc_error_kind(name: &SmolStr, err: LibdocError) -> AnalysisDiagnosticKind {
    match err {
        LibdocError::Timeout { seconds, .. } => AnalysisDiagnosticKind::LibdocTimeout {
            name: name.clone(),
            seconds,
        },
        LibdocError::NotFound { message, .. } => AnalysisDiagnosticKind::LibraryNotFound {
            name: name.clone(),
            message,
        },
        other => AnalysisDiagnosticKind::LibdocError {
            name: name.clone(),
            message: other.to_string(),
        },
    }
}

static BDD_PREFIX: OnceLock<Regex> = OnceLock::new();

/// `Given|When|Then|And|But` prefixes are semantically transparent.
pub fn strip_bdd_prefix(name: &str) -> Option<&str> {
    let regex = BDD_PREFIX
        .get_or_init(|| Regex::new(r"(?i)^(given|when|then|and|but)\s+(.+)$").expect("valid regex"));
    regex
        .captures(name)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

/// Strip assignment and `${…}` decoration, then normalize like keyword
/// names; variables are case-, space-, and underscore-insensitive too.
pub fn normalize_variable(name: &str) -> String {
    let mut base = name.trim();
    // Trailing assignment decoration (`${x} =`).
    if let Some(stripped) = base.strip_suffix('=') {
        base = stripped.trim_end();
    }
    if let Some(rest) = base
        .strip_prefix("${")
        .or_else(|| base.strip_prefix("@{"))
        .or_else(|| base.strip_prefix("&{"))
    {
        base = rest.strip_suffix('}').unwrap_or(rest);
    }
    normalize(base)
}
