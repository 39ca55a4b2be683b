// ==============================================================================
// Libdoc loader
// ==============================================================================
//
// Produces a `LibraryDoc` for a Python library, resource file, or variables
// file. Python libraries and YAML variables files go through the external
// Robot runtime (`python -m robot.libdoc --format json`) in an isolated
// worker thread with a hard timeout; resource files parse in-process with
// `robot_ast`; JSON variables files with `serde_json`. Successful external
// loads are cached on disk. A failing load never fails the enclosing
// request: the namespace downgrades it to a diagnostic on the import
// statement.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use robot_ast::{Ast, RobotVersion, SectionBody, SectionKind, StatementKind};
use robot_text::run_in_thread;

use crate::disk_cache::{CacheKind, DiskCache};
use crate::environment::EnvironmentProbe;
use crate::libdoc::{
    default_library, ArgumentKind, ArgumentSpec, KeywordDoc, LibraryDoc, LibraryKind,
};
use crate::settings::WorkspaceSettings;

#[derive(Debug, thiserror::Error)]
pub enum LibdocError {
    #[error("library '{name}' not found: {message}")]
    NotFound { name: SmolStr, message: String },
    #[error("loading '{name}' timed out after {seconds} s")]
    Timeout { name: SmolStr, seconds: u64 },
    #[error("libdoc process failed for '{name}': {message}")]
    Process { name: SmolStr, message: String },
    #[error("could not parse libdoc output for '{name}': {message}")]
    Parse { name: SmolStr, message: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct LibdocLoader {
    probe: EnvironmentProbe,
    settings: WorkspaceSettings,
    cache: Option<Arc<DiskCache>>,
    timeout: Duration,
}

impl LibdocLoader {
    pub fn new(
        probe: EnvironmentProbe,
        settings: WorkspaceSettings,
        cache: Option<Arc<DiskCache>>,
    ) -> Self {
        let timeout = settings.libdoc_timeout();
        Self {
            probe,
            settings,
            cache,
            timeout,
        }
    }

    pub fn robot_version(&self) -> RobotVersion {
        self.probe.robot_version
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    // --------------------------------------------------------------------------
    // Libraries
    // --------------------------------------------------------------------------

    /// Load a library by name or path. Embedded default libraries resolve
    /// without touching the runtime; everything else goes through the disk
    /// cache and, on a miss, the libdoc worker.
    pub fn load_library(
        &self,
        name: &str,
        base_dir: &Path,
    ) -> Result<Arc<LibraryDoc>, LibdocError> {
        if let Some(doc) = default_library(name) {
            return Ok(Arc::new(doc));
        }

        let source = self.resolve_library_path(name, base_dir);

        // Only path-backed libraries have a file to fingerprint against.
        if let (Some(cache), Some(path)) = (self.cache.as_ref(), source.as_deref()) {
            if let Some(meta) = cache.meta_for(path) {
                if let Some(doc) = cache.load::<LibraryDoc>(CacheKind::Libdoc, &meta) {
                    log::debug!("libdoc cache hit for {name}");
                    return Ok(Arc::new(doc));
                }
            }
        }

        let target = source
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let doc = self.run_libdoc_worker(name, &target)?;

        if let (Some(cache), Some(path)) = (self.cache.as_ref(), source.as_deref()) {
            if let Some(meta) = cache.meta_for(path) {
                cache.store(CacheKind::Libdoc, meta, &doc);
            }
        }
        Ok(Arc::new(doc))
    }

    /// `name` ending in `.py` resolves against the import base directory and
    /// the configured search paths; module names are left to the runtime's
    /// own search rules.
    fn resolve_library_path(&self, name: &str, base_dir: &Path) -> Option<PathBuf> {
        if !name.ends_with(".py") {
            return None;
        }
        let candidate = Path::new(name);
        if candidate.is_absolute() {
            return candidate.exists().then(|| candidate.to_path_buf());
        }
        std::iter::once(base_dir.to_path_buf())
            .chain(self.settings.paths.iter().cloned())
            .chain(self.settings.python_path.iter().cloned())
            .map(|dir| dir.join(candidate))
            .find(|p| p.exists())
    }

    fn run_libdoc_worker(&self, name: &str, target: &str) -> Result<LibraryDoc, LibdocError> {
        let python = self.probe.python_executable.clone();
        let target = target.to_string();
        let python_path: Vec<PathBuf> = self.settings.python_path.clone();
        let env: Vec<(String, String)> = self
            .settings
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let out_path = scratch_path("libdoc");
        let out_for_worker = out_path.clone();
        let (tx, rx) = mpsc::channel();
        let handle = run_in_thread(move |_token| {
            let mut command = std::process::Command::new(&python);
            command.args(["-m", "robot.libdoc", "--format", "json"]);
            for dir in &python_path {
                command.arg("--pythonpath").arg(dir);
            }
            for (key, value) in &env {
                command.env(key, value);
            }
            command.arg(&target).arg(&out_for_worker);
            let _ = tx.send(command.output());
        });

        let outcome = rx.recv_timeout(self.timeout);
        let result = match outcome {
            Ok(output) => self.parse_worker_output(name, output, &out_path),
            Err(_) => {
                handle.cancel();
                Err(LibdocError::Timeout {
                    name: name.into(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };
        let _ = std::fs::remove_file(&out_path);
        result
    }

    fn parse_worker_output(
        &self,
        name: &str,
        output: std::io::Result<std::process::Output>,
        out_path: &Path,
    ) -> Result<LibraryDoc, LibdocError> {
        let output = output.map_err(|err| LibdocError::Process {
            name: name.into(),
            message: err.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.lines().last().unwrap_or("unknown error").to_string();
            return Err(LibdocError::NotFound {
                name: name.into(),
                message,
            });
        }
        let json = std::fs::read_to_string(out_path).map_err(|source| LibdocError::Io {
            path: out_path.to_path_buf(),
            source,
        })?;
        parse_libdoc_json(name, &json)
    }

    // --------------------------------------------------------------------------
    // Resource files
    // --------------------------------------------------------------------------

    /// Load a resource file from disk and distill its keywords and
    /// variables. Resource parsing happens in-process; there is no runtime
    /// round-trip to time out.
    pub fn load_resource(&self, path: &Path) -> Result<Arc<LibraryDoc>, LibdocError> {
        let text = std::fs::read_to_string(path).map_err(|source| LibdocError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ast = robot_ast::parse(&text, self.probe.robot_version);
        Ok(Arc::new(resource_doc(path, &ast)))
    }

    // --------------------------------------------------------------------------
    // Variables files
    // --------------------------------------------------------------------------

    /// Load a variables file. JSON parses in-process; YAML and Python go
    /// through the runtime worker.
    pub fn load_variables(&self, path: &Path) -> Result<Arc<LibraryDoc>, LibdocError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => {
                let text = std::fs::read_to_string(path).map_err(|source| LibdocError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                parse_json_variables(path, &text).map(Arc::new)
            }
            "yaml" | "yml" | "py" => self.run_variables_worker(path).map(Arc::new),
            other => Err(LibdocError::Parse {
                name: path.to_string_lossy().as_ref().into(),
                message: format!("unsupported variables file type '.{other}'"),
            }),
        }
    }

    fn run_variables_worker(&self, path: &Path) -> Result<LibraryDoc, LibdocError> {
        let name: SmolStr = path.to_string_lossy().as_ref().into();
        let python = self.probe.python_executable.clone();
        let target = path.to_path_buf();
        let (tx, rx) = mpsc::channel();
        let handle = run_in_thread(move |_token| {
            let script = "import json, sys\n\
                          from robot.variables import Variables\n\
                          v = Variables()\n\
                          v.set_from_file(sys.argv[1])\n\
                          print(json.dumps({k: repr(val) for k, val in v.as_dict().items()}))";
            let output = std::process::Command::new(&python)
                .arg("-c")
                .arg(script)
                .arg(&target)
                .output();
            let _ = tx.send(output);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                parse_json_variables(path, stdout.trim())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(LibdocError::NotFound {
                    name,
                    message: stderr.lines().last().unwrap_or("unknown error").to_string(),
                })
            }
            Ok(Err(err)) => Err(LibdocError::Process {
                name,
                message: err.to_string(),
            }),
            Err(_) => {
                handle.cancel();
                Err(LibdocError::Timeout {
                    name,
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn scratch_path(prefix: &str) -> PathBuf {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "robot-{prefix}-{}-{n}.json",
        std::process::id()
    ))
}

// ==============================================================================
// Resource distillation
// ==============================================================================

/// Distill a parsed resource file into a `LibraryDoc`: its keyword
/// definitions (with `[Arguments]` specs) and `*** Variables ***` entries.
/// Nested resource imports stay in the AST; the namespace walks them.
pub fn resource_doc(path: &Path, ast: &Ast) -> LibraryDoc {
    let name: SmolStr = path
        .file_stem()
        .map(|s| s.to_string_lossy().as_ref().into())
        .unwrap_or_else(|| SmolStr::from("resource"));

    let mut doc = LibraryDoc::empty(&name, LibraryKind::Resource);
    doc.source = Some(path.to_path_buf());

    for def in ast.keywords() {
        let mut keyword = KeywordDoc::new(&def.name.value, Vec::new());
        keyword.line = def.name.line;
        keyword.source = Some(path.to_path_buf());
        for &stmt_id in &def.body {
            let stmt = ast.statement(stmt_id);
            let StatementKind::Setting { name, values } = &stmt.kind else {
                continue;
            };
            if !stmt.tokens[*name].value.eq_ignore_ascii_case("[arguments]") {
                continue;
            }
            keyword.args = values
                .iter()
                .map(|&i| argument_spec_from_cell(&stmt.tokens[i].value))
                .collect();
        }
        doc.keywords.push(keyword);
    }

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
                let value = values
                    .iter()
                    .map(|&i| stmt.tokens[i].value.as_str())
                    .collect::<Vec<_>>()
                    .join("    ");
                doc.variables
                    .push((stmt.tokens[*name].value.clone(), value.into()));
            }
        }
    }

    for error in &ast.errors {
        doc.errors
            .push(format!("line {}: {}", error.line + 1, error.message));
    }
    doc
}

/// `${arg}`, `${arg}=default`, `@{varargs}`, `&{kwargs}` cells from an
/// `[Arguments]` setting.
pub(crate) fn argument_spec_from_cell(cell: &str) -> ArgumentSpec {
    let (base, default) = match cell.split_once('=') {
        Some((b, d)) => (b.trim_end(), Some(d)),
        None => (cell, None),
    };
    let inner = base
        .strip_prefix("${")
        .or_else(|| base.strip_prefix("@{"))
        .or_else(|| base.strip_prefix("&{"))
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(base);
    let kind = if base.starts_with("@{") {
        ArgumentKind::VarPositional
    } else if base.starts_with("&{") {
        ArgumentKind::VarNamed
    } else {
        ArgumentKind::PositionalOrNamed
    };
    ArgumentSpec {
        name: inner.into(),
        kind,
        default: default.map(SmolStr::from),
        type_hint: None,
    }
}

// ==============================================================================
// Variables files
// ==============================================================================

fn parse_json_variables(path: &Path, text: &str) -> Result<LibraryDoc, LibdocError> {
    let name: SmolStr = path
        .file_stem()
        .map(|s| s.to_string_lossy().as_ref().into())
        .unwrap_or_else(|| SmolStr::from("variables"));
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|err| LibdocError::Parse {
            name: path.to_string_lossy().as_ref().into(),
            message: err.to_string(),
        })?;
    let mut doc = LibraryDoc::empty(&name, LibraryKind::Variables);
    doc.source = Some(path.to_path_buf());
    for (key, value) in map {
        let printed = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        doc.variables.push((key.into(), printed.into()));
    }
    Ok(doc)
}

// ==============================================================================
// Libdoc JSON wire format
// ==============================================================================

#[derive(Deserialize)]
struct RawLibdoc {
    name: String,
    #[serde(default)]
    doc: String,
    #[serde(default, rename = "docFormat")]
    doc_format: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    source: Option<PathBuf>,
    #[serde(default)]
    lineno: i64,
    #[serde(default)]
    keywords: Vec<RawKeyword>,
    #[serde(default)]
    inits: Vec<RawKeyword>,
}

#[derive(Deserialize)]
struct RawKeyword {
    name: String,
    #[serde(default)]
    args: Vec<RawArgument>,
    #[serde(default)]
    doc: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    source: Option<PathBuf>,
    #[serde(default)]
    lineno: i64,
}

#[derive(Deserialize)]
struct RawArgument {
    name: String,
    kind: ArgumentKind,
    #[serde(default, rename = "defaultValue")]
    default_value: Option<String>,
    #[serde(default, rename = "type")]
    type_info: Option<serde_json::Value>,
}

fn parse_libdoc_json(name: &str, json: &str) -> Result<LibraryDoc, LibdocError> {
    let raw: RawLibdoc = serde_json::from_str(json).map_err(|err| LibdocError::Parse {
        name: name.into(),
        message: err.to_string(),
    })?;

    let convert_keyword = |kw: RawKeyword| KeywordDoc {
        name: kw.name.into(),
        args: kw
            .args
            .into_iter()
            .map(|arg| ArgumentSpec {
                name: arg.name.into(),
                kind: arg.kind,
                default: arg.default_value.map(SmolStr::from),
                type_hint: arg.type_info.and_then(|t| match t {
                    serde_json::Value::String(s) => Some(SmolStr::from(s)),
                    serde_json::Value::Object(o) => o
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(SmolStr::from),
                    _ => None,
                }),
            })
            .collect(),
        doc: kw.doc,
        tags: kw.tags.into_iter().map(SmolStr::from).collect(),
        line: kw.lineno.max(0) as u32,
        source: kw.source,
        run_keyword: None,
    };

    Ok(LibraryDoc {
        name: raw.name.into(),
        kind: LibraryKind::Library,
        source: raw.source,
        line: raw.lineno.max(0) as u32,
        doc: raw.doc,
        doc_format: raw.doc_format.into(),
        scope: raw.scope.into(),
        keywords: raw.keywords.into_iter().map(convert_keyword).collect(),
        inits: raw.inits.into_iter().map(convert_keyword).collect(),
        errors: Vec::new(),
        variables: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> LibdocLoader {
        LibdocLoader::new(
            EnvironmentProbe::fixed("python3", RobotVersion::new(7, 0)),
            WorkspaceSettings::default(),
            None,
        )
    }

    #[test]
    fn default_libraries_resolve_without_runtime() {
        let loader = loader();
        let doc = loader.load_library("BuiltIn", Path::new("/")).unwrap();
        assert!(doc.find_keyword("Log").is_some());
    }

    #[test]
    fn resource_doc_collects_keywords_and_arguments() {
        let src = "\
*** Variables ***
${HOST}    localhost

*** Keywords ***
Connect To Server
    [Arguments]    ${host}    ${port}=443    @{options}
    Log    ${host}
";
        let ast = robot_ast::parse(src, RobotVersion::default());
        let doc = resource_doc(Path::new("/suite/common.resource"), &ast);
        assert_eq!(doc.name, "common");
        assert_eq!(doc.kind, LibraryKind::Resource);
        assert_eq!(doc.variables, vec![("${HOST}".into(), "localhost".into())]);

        let kw = doc.find_keyword("Connect To Server").unwrap();
        assert_eq!(kw.args.len(), 3);
        assert_eq!(kw.args[0].name, "host");
        assert_eq!(kw.args[1].default.as_deref(), Some("443"));
        assert_eq!(kw.args[2].kind, ArgumentKind::VarPositional);
    }

    #[test]
    fn json_variables_file_parses_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");
        std::fs::write(&path, r#"{"HOST": "example.com", "PORT": 8080}"#).unwrap();
        let loader = loader();
        let doc = loader.load_variables(&path).unwrap();
        assert_eq!(doc.kind, LibraryKind::Variables);
        assert!(doc
            .variables
            .iter()
            .any(|(k, v)| k == "HOST" && v == "example.com"));
        assert!(doc.variables.iter().any(|(k, v)| k == "PORT" && v == "8080"));
    }

    #[test]
    fn unsupported_variables_extension_is_an_error() {
        let loader = loader();
        let err = loader
            .load_variables(Path::new("/tmp/vars.txt"))
            .unwrap_err();
        assert!(matches!(err, LibdocError::Parse { .. }));
    }

    #[test]
    fn missing_resource_reports_io_error() {
        let loader = loader();
        let err = loader
            .load_resource(Path::new("/no/such/file.resource"))
            .unwrap_err();
        assert!(matches!(err, LibdocError::Io { .. }));
    }

    #[test]
    fn libdoc_json_parses_into_doc() {
        let json = r#"{
            "name": "Collections",
            "doc": "A library.",
            "docFormat": "HTML",
            "scope": "GLOBAL",
            "lineno": 1,
            "keywords": [
                {
                    "name": "Append To List",
                    "args": [
                        {"name": "list_", "kind": "POSITIONAL_OR_NAMED"},
                        {"name": "values", "kind": "VAR_POSITIONAL"}
                    ],
                    "doc": "Adds values to the end of list.",
                    "tags": [],
                    "lineno": 30
                }
            ],
            "inits": []
        }"#;
        let doc = parse_libdoc_json("Collections", json).unwrap();
        assert_eq!(doc.name, "Collections");
        let kw = doc.find_keyword("Append To List").unwrap();
        assert_eq!(kw.args[1].kind, ArgumentKind::VarPositional);
    }

    #[test]
    fn argument_cell_shapes() {
        let plain = argument_spec_from_cell("${host}");
        assert_eq!(plain.name, "host");
        assert_eq!(plain.kind, ArgumentKind::PositionalOrNamed);

        let defaulted = argument_spec_from_cell("${port}=443");
        assert_eq!(defaulted.default.as_deref(), Some("443"));

        let kwargs = argument_spec_from_cell("&{extra}");
        assert_eq!(kwargs.kind, ArgumentKind::VarNamed);
    }
}
