use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::diagnostic::AnalysisDiagnostic;
use robot_text::DocumentUri;

/// Single consolidated default for the libdoc worker timeout.
pub const DEFAULT_LIBDOC_TIMEOUT_SECS: u64 = 60;

/// Workspace configuration, populated from `initializationOptions` and
/// `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceSettings {
    /// Extra search paths for imports.
    pub paths: Vec<PathBuf>,
    /// Added to the Python import search path of the libdoc worker.
    pub python_path: Vec<PathBuf>,
    /// Environment overrides for the libdoc worker.
    pub env: HashMap<String, String>,
    /// Predefined variables, as if given on the Robot command line.
    pub variables: HashMap<String, String>,
    pub analysis: AnalysisSettings,
    pub robocop: RobocopSettings,
    /// Seconds; falls back to `DEFAULT_LIBDOC_TIMEOUT_SECS`.
    pub load_library_timeout: Option<u64>,
    /// Interpreter used for libdoc loading and environment probing.
    pub python_executable: Option<String>,
}

impl WorkspaceSettings {
    pub fn libdoc_timeout(&self) -> Duration {
        Duration::from_secs(
            self.load_library_timeout
                .filter(|&s| s > 0)
                .unwrap_or(DEFAULT_LIBDOC_TIMEOUT_SECS),
        )
    }

    pub fn python(&self) -> &str {
        self.python_executable.as_deref().unwrap_or("python")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    pub diagnostic_mode: DiagnosticMode,
    /// Glob patterns skipped by workspace diagnostics.
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticMode {
    Off,
    Workspace,
    #[default]
    OpenFilesOnly,
}

/// External linter switch-through. The linter itself is a pluggable
/// diagnostics source behind `ExternalDiagnostics`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobocopSettings {
    pub enabled: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub configure: Vec<String>,
}

/// A pluggable diagnostics source (external linters). Implementations run
/// after the kernel's own analysis; their failures never fail a request.
pub trait ExternalDiagnostics: Send + Sync {
    fn name(&self) -> &str;
    fn diagnostics(&self, uri: &DocumentUri, text: &str) -> Vec<AnalysisDiagnostic>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = WorkspaceSettings::default();
        assert_eq!(s.libdoc_timeout(), Duration::from_secs(60));
        assert_eq!(s.analysis.diagnostic_mode, DiagnosticMode::OpenFilesOnly);
        assert!(!s.robocop.enabled);
    }

    #[test]
    fn parses_from_camel_case_json() {
        let s: WorkspaceSettings = serde_json::from_str(
            r#"{
                "paths": ["libs"],
                "pythonPath": ["src"],
                "loadLibraryTimeout": 10,
                "analysis": {"diagnosticMode": "workspace", "excludePatterns": ["**/out/**"]},
                "robocop": {"enabled": true, "include": ["W01"]}
            }"#,
        )
        .unwrap();
        assert_eq!(s.paths, vec![PathBuf::from("libs")]);
        assert_eq!(s.libdoc_timeout(), Duration::from_secs(10));
        assert_eq!(s.analysis.diagnostic_mode, DiagnosticMode::Workspace);
        assert!(s.robocop.enabled);
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let s: WorkspaceSettings =
            serde_json::from_str(r#"{"loadLibraryTimeout": 0}"#).unwrap();
        assert_eq!(s.libdoc_timeout(), Duration::from_secs(60));
    }
}
