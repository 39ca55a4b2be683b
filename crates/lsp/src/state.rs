// ==============================================================================
// Shared analysis state
// ==============================================================================
//
// Wires the kernel together for the server: the document store, the
// documents cache (with its libdoc loader and disk cache), the workspace
// settings, and the negotiated position encoding. Built at `initialize`,
// rebuilt when the configuration changes.

use std::path::PathBuf;
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use robot_analysis::{
    DiskCache, DocumentsCache, EnvironmentProbe, LibdocLoader, WorkspaceSettings,
};
use robot_ast::RobotVersion;
use robot_text::{DocumentStore, DocumentUri, PositionEncoding, TextDocument};

/// Startup overrides from the command line; they survive configuration
/// reloads.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub python: Option<String>,
    pub robot_version: Option<RobotVersion>,
}

pub struct AnalysisShared {
    pub store: Arc<DocumentStore>,
    pub cache: Arc<DocumentsCache>,
    pub settings: WorkspaceSettings,
    pub encoding: PositionEncoding,
    pub workspace_root: Option<PathBuf>,
}

impl AnalysisShared {
    pub fn new(
        mut settings: WorkspaceSettings,
        encoding: PositionEncoding,
        overrides: &Overrides,
        workspace_root: Option<PathBuf>,
    ) -> Arc<Self> {
        if let Some(python) = &overrides.python {
            settings.python_executable = Some(python.clone());
        }
        let probe = match overrides.robot_version {
            Some(version) => EnvironmentProbe::fixed(settings.python(), version),
            None => EnvironmentProbe::probe(settings.python()),
        };
        let disk_cache = workspace_root
            .as_ref()
            .map(|root| Arc::new(DiskCache::new(root, probe.clone())));
        let loader = Arc::new(LibdocLoader::new(probe, settings.clone(), disk_cache));
        let store = Arc::new(DocumentStore::default());
        let cache = Arc::new(DocumentsCache::new(store.clone(), loader));
        Arc::new(Self {
            store,
            cache,
            settings,
            encoding,
            workspace_root,
        })
    }

    /// Parse a wire URI into the core's normalized form. String-level so the
    /// core stays independent of the wire library's `Url` type.
    pub fn uri(raw: &Url) -> Option<DocumentUri> {
        DocumentUri::parse(raw.as_str()).ok()
    }

    pub fn document(&self, raw: &Url) -> Option<Arc<TextDocument>> {
        self.store.get(&Self::uri(raw)?)
    }
}
