// ==============================================================================
// DocumentsCache: document -> tokens -> model -> namespace -> artifacts
// ==============================================================================
//
// Memoized getters over each document's derived-data cache, plus the import
// dependency graph that propagates invalidation: when a document changes,
// every document whose namespace transitively imported it drops its derived
// cache and rebuilds on the next request. All long-running getters take a
// `CancellationToken`; a cancelled computation leaves no cache entry behind.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use petgraph::graphmap::DiGraphMap;
use rustc_hash::FxHashMap;

use robot_ast::{Ast, RobotVersion, Token};
use robot_text::{
    CancellationToken, Cancelled, Computation, DocumentError, DocumentStore, DocumentUri,
    PositionEncoding, Subscription, TextDocument,
};

use crate::loader::{LibdocError, LibdocLoader};
use crate::namespace::{resolve_import_path, Namespace, ResourceResolution, ResourceResolver};
use crate::semantic_tokens::{self, SemanticToken};
use crate::folding::{folding_ranges, FoldingRange};
use crate::symbols::{document_symbols, DocumentSymbol};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("unknown file type: {0}")]
    UnknownFileType(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Robot document classification from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    General,
    Resource,
    Init,
    Unknown,
}

impl DocumentType {
    pub fn of(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if name == "__init__.robot" {
            return DocumentType::Init;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("robot") => DocumentType::General,
            Some(ext) if ext.eq_ignore_ascii_case("resource") => DocumentType::Resource,
            _ => DocumentType::Unknown,
        }
    }

    pub fn of_uri(uri: &DocumentUri) -> Self {
        uri.to_file_path()
            .map(|p| Self::of(&p))
            .unwrap_or(DocumentType::Unknown)
    }
}

/// Path-keyed dependency edges: `dependency -> dependent document`.
#[derive(Default)]
struct DependencyGraph {
    graph: DiGraphMap<u32, ()>,
    ids: FxHashMap<PathBuf, u32>,
    uris: FxHashMap<u32, DocumentUri>,
    next: u32,
}

impl DependencyGraph {
    fn node_for_path(&mut self, path: &Path) -> u32 {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(path.to_path_buf(), id);
        self.graph.add_node(id);
        id
    }

    fn register(&mut self, dependent: &DocumentUri, dependent_path: &Path, deps: &[PathBuf]) {
        let dependent_node = self.node_for_path(dependent_path);
        self.uris.insert(dependent_node, dependent.clone());
        // Old edges go away with the old namespace: re-registration replaces
        // the dependent's incoming edge set.
        let stale: Vec<u32> = self
            .graph
            .neighbors_directed(dependent_node, petgraph::Direction::Incoming)
            .collect();
        for node in stale {
            self.graph.remove_edge(node, dependent_node);
        }
        for dep in deps {
            let dep_node = self.node_for_path(dep);
            self.graph.add_edge(dep_node, dependent_node, ());
        }
    }

    /// Documents that (transitively) depend on `path`.
    fn dependents_of(&self, path: &Path) -> Vec<DocumentUri> {
        let Some(&start) = self.ids.get(path) else {
            return Vec::new();
        };
        let mut seen = vec![start];
        let mut stack = vec![start];
        let mut out = Vec::new();
        while let Some(node) = stack.pop() {
            for next in self
                .graph
                .neighbors_directed(node, petgraph::Direction::Outgoing)
            {
                if !seen.contains(&next) {
                    seen.push(next);
                    stack.push(next);
                    if let Some(uri) = self.uris.get(&next) {
                        out.push(uri.clone());
                    }
                }
            }
        }
        out
    }
}

pub struct DocumentsCache {
    store: Arc<DocumentStore>,
    loader: Arc<LibdocLoader>,
    resolver: Arc<StoreResourceResolver>,
    graph: Arc<Mutex<DependencyGraph>>,
    _subscriptions: Vec<Subscription>,
}

impl DocumentsCache {
    pub fn new(store: Arc<DocumentStore>, loader: Arc<LibdocLoader>) -> Self {
        let resolver = Arc::new(StoreResourceResolver {
            store: store.clone(),
            version: loader.robot_version(),
            search_paths: loader.settings().paths.clone(),
        });
        let graph = Arc::new(Mutex::new(DependencyGraph::default()));

        // Changes propagate through the import graph: invalidate every
        // dependent's derived cache so namespaces rebuild on next request.
        let graph_for_listener = graph.clone();
        let store_for_listener = store.clone();
        let subscription = store.events.did_change.add(move |uri: &DocumentUri| {
            let Some(path) = uri.to_file_path() else {
                return;
            };
            let path = path.canonicalize().unwrap_or(path);
            let dependents = graph_for_listener.lock().dependents_of(&path);
            for dependent in dependents {
                if let Some(doc) = store_for_listener.get(&dependent) {
                    log::debug!("invalidating {dependent} after change to {uri}");
                    doc.apply_none_change();
                }
            }
        });

        Self {
            store,
            loader,
            resolver,
            graph,
            _subscriptions: vec![subscription],
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn loader(&self) -> &Arc<LibdocLoader> {
        &self.loader
    }

    pub fn robot_version(&self) -> RobotVersion {
        self.loader.robot_version()
    }

    /// Invalidate dependents of a path that changed outside the store
    /// (a watched library or resource file edited on disk).
    pub fn invalidate_path(&self, path: &Path) {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let dependents = self.graph.lock().dependents_of(&path);
        for dependent in dependents {
            if let Some(doc) = self.store.get(&dependent) {
                doc.apply_none_change();
            }
        }
    }

    // --------------------------------------------------------------------------
    // Memoized computations
    // --------------------------------------------------------------------------

    pub fn get_tokens(&self, document: &TextDocument) -> Arc<Vec<Token>> {
        let version = self.robot_version();
        document
            .cache()
            .get_or_try_compute::<_, Infallible>(Computation::Tokens, || {
                Ok(Arc::new(robot_ast::lex(&document.text(), version)))
            })
            .expect("infallible")
    }

    pub fn get_model(&self, document: &TextDocument) -> Arc<Ast> {
        let version = self.robot_version();
        document
            .cache()
            .get_or_try_compute::<_, Infallible>(Computation::Model, || {
                Ok(Arc::new(robot_ast::parse(&document.text(), version)))
            })
            .expect("infallible")
    }

    /// The namespace for a Robot document, fully initialized. Fails with
    /// `UnknownFileType` for files that are neither suites, init files, nor
    /// resources.
    pub fn get_namespace(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Result<Arc<Namespace>, AnalysisError> {
        if DocumentType::of_uri(document.uri()) == DocumentType::Unknown {
            return Err(AnalysisError::UnknownFileType(document.uri().to_string()));
        }
        let ast = self.get_model(document);
        let namespace = document
            .cache()
            .get_or_try_compute::<_, Infallible>(Computation::Namespace, || {
                Ok(Arc::new(Namespace::new(
                    document.uri().clone(),
                    ast.clone(),
                    self.loader.clone(),
                    self.resolver.clone() as Arc<dyn ResourceResolver>,
                )))
            })
            .expect("infallible");

        namespace.ensure_initialized(token)?;
        if let Some(path) = document.uri().to_file_path() {
            let path = path.canonicalize().unwrap_or(path);
            self.graph
                .lock()
                .register(document.uri(), &path, namespace.dependencies());
        }
        Ok(namespace)
    }

    pub fn get_general_namespace(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Result<Arc<Namespace>, AnalysisError> {
        self.namespace_of_type(document, token, DocumentType::General)
    }

    pub fn get_resource_namespace(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Result<Arc<Namespace>, AnalysisError> {
        self.namespace_of_type(document, token, DocumentType::Resource)
    }

    pub fn get_init_namespace(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Result<Arc<Namespace>, AnalysisError> {
        self.namespace_of_type(document, token, DocumentType::Init)
    }

    fn namespace_of_type(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
        wanted: DocumentType,
    ) -> Result<Arc<Namespace>, AnalysisError> {
        let actual = DocumentType::of_uri(document.uri());
        if actual != wanted {
            return Err(AnalysisError::UnknownFileType(document.uri().to_string()));
        }
        self.get_namespace(document, token)
    }

    pub fn get_semantic_tokens(
        &self,
        document: &TextDocument,
        encoding: PositionEncoding,
        token: &CancellationToken,
    ) -> Result<Arc<Vec<SemanticToken>>, AnalysisError> {
        let namespace = self.get_namespace(document, token)?;
        let ast = self.get_model(document);
        let version = self.robot_version();
        let text = document.text();
        let result = document.cache().get_or_try_compute::<_, Cancelled>(
            Computation::SemanticTokens,
            || {
                let lookup = |name: &str| {
                    namespace
                        .find_keyword(name, token)
                        .ok()
                        .flatten()
                };
                let tokens =
                    semantic_tokens::generate(&text, &ast, version, &lookup, encoding, token)?;
                Ok(Arc::new(tokens))
            },
        )?;
        Ok(result)
    }

    pub fn get_folding_ranges(&self, document: &TextDocument) -> Arc<Vec<FoldingRange>> {
        let ast = self.get_model(document);
        document
            .cache()
            .get_or_try_compute::<_, Infallible>(Computation::FoldingRanges, || {
                Ok(Arc::new(folding_ranges(&ast)))
            })
            .expect("infallible")
    }

    pub fn get_document_symbols(&self, document: &TextDocument) -> Arc<Vec<DocumentSymbol>> {
        let ast = self.get_model(document);
        document
            .cache()
            .get_or_try_compute::<_, Infallible>(Computation::DocumentSymbols, || {
                Ok(Arc::new(document_symbols(&ast)))
            })
            .expect("infallible")
    }
}

/// Resolves resource imports through the document store so unsaved editor
/// content wins over what is on disk, then parses through the target
/// document's own derived cache.
pub struct StoreResourceResolver {
    store: Arc<DocumentStore>,
    version: RobotVersion,
    search_paths: Vec<PathBuf>,
}

impl ResourceResolver for StoreResourceResolver {
    fn resolve(&self, base_dir: &Path, name: &str) -> Result<ResourceResolution, LibdocError> {
        let path = resolve_import_path(base_dir, name, &self.search_paths).ok_or_else(|| {
            LibdocError::NotFound {
                name: name.into(),
                message: "no such file".into(),
            }
        })?;
        let uri = DocumentUri::from_file_path(&path).ok_or_else(|| LibdocError::NotFound {
            name: name.into(),
            message: "path is not representable as a URI".into(),
        })?;
        let document = self.store.get_or_open(&uri).map_err(|err| match err {
            DocumentError::CantReadDocument { source, .. } => LibdocError::Io {
                path: path.clone(),
                source,
            },
            other => LibdocError::NotFound {
                name: name.into(),
                message: other.to_string(),
            },
        })?;
        let version = self.version;
        let ast = document
            .cache()
            .get_or_try_compute::<_, Infallible>(Computation::Model, || {
                Ok(Arc::new(robot_ast::parse(&document.text(), version)))
            })
            .expect("infallible");
        Ok(ResourceResolution { uri, path, ast })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentProbe;
    use crate::settings::WorkspaceSettings;

    fn cache_with_store() -> (DocumentsCache, Arc<DocumentStore>) {
        let store = Arc::new(DocumentStore::default());
        let loader = Arc::new(LibdocLoader::new(
            EnvironmentProbe::fixed("python3", RobotVersion::new(7, 0)),
            WorkspaceSettings::default(),
            None,
        ));
        (DocumentsCache::new(store.clone(), loader), store)
    }

    fn open(
        store: &DocumentStore,
        uri: &str,
        text: &str,
    ) -> Arc<TextDocument> {
        store.open(
            DocumentUri::parse(uri).unwrap(),
            Some("robotframework"),
            Some(1),
            text.to_string(),
        )
    }

    #[test]
    fn document_type_classification() {
        assert_eq!(
            DocumentType::of(Path::new("/s/__init__.robot")),
            DocumentType::Init
        );
        assert_eq!(DocumentType::of(Path::new("/s/a.robot")), DocumentType::General);
        assert_eq!(
            DocumentType::of(Path::new("/s/common.resource")),
            DocumentType::Resource
        );
        assert_eq!(DocumentType::of(Path::new("/s/lib.py")), DocumentType::Unknown);
    }

    #[test]
    fn tokens_and_model_are_memoized_per_text() {
        let (cache, store) = cache_with_store();
        let doc = open(&store, "file:///t/a.robot", "*** Test Cases ***\nT\n    Log    x\n");

        let t1 = cache.get_tokens(&doc);
        let t2 = cache.get_tokens(&doc);
        assert!(Arc::ptr_eq(&t1, &t2));
        let m1 = cache.get_model(&doc);
        let m2 = cache.get_model(&doc);
        assert!(Arc::ptr_eq(&m1, &m2));

        doc.apply_full_change(Some(2), Some("*** Test Cases ***\nT\n    Log    y\n".into()), false);
        let t3 = cache.get_tokens(&doc);
        assert!(!Arc::ptr_eq(&t1, &t3), "edit must drop the cached tokens");
    }

    #[test]
    fn namespace_requires_known_file_type() {
        let (cache, store) = cache_with_store();
        let doc = open(&store, "file:///t/script.py", "print('hi')");
        let err = cache
            .get_namespace(&doc, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownFileType(_)));
    }

    #[test]
    fn namespace_is_reused_until_edit() {
        let (cache, store) = cache_with_store();
        let doc = open(&store, "file:///t/a.robot", "*** Test Cases ***\nT\n    Log    x\n");
        let token = CancellationToken::new();

        let n1 = cache.get_namespace(&doc, &token).unwrap();
        let n2 = cache.get_namespace(&doc, &token).unwrap();
        assert!(Arc::ptr_eq(&n1, &n2));

        doc.apply_full_change(Some(2), Some("*** Test Cases ***\nT\n    Log    y\n".into()), false);
        let n3 = cache.get_namespace(&doc, &token).unwrap();
        assert!(!Arc::ptr_eq(&n1, &n3));
    }

    #[test]
    fn semantic_tokens_reflect_edits() {
        let (cache, store) = cache_with_store();
        let doc = open(&store, "file:///t/a.robot", "*** Test Cases ***\nT\n    Log    Hello\n");
        let token = CancellationToken::new();

        let first = cache
            .get_semantic_tokens(&doc, PositionEncoding::Utf16, &token)
            .unwrap();
        assert!(first.iter().any(|t| t.length == 5), "Hello argument");

        // Replace Hello with Hi via the document API, then recompute.
        doc.apply_full_change(Some(2), Some("*** Test Cases ***\nT\n    Log    Hi\n".into()), false);
        let second = cache
            .get_semantic_tokens(&doc, PositionEncoding::Utf16, &token)
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.iter().any(|t| t.length == 2), "Hi argument");
    }

    #[test]
    fn resource_change_invalidates_dependent_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let resource_path = dir.path().join("common.resource");
        std::fs::write(
            &resource_path,
            "*** Keywords ***\nShared Step\n    No Operation\n",
        )
        .unwrap();
        let suite_path = dir.path().join("suite.robot");
        std::fs::write(&suite_path, "*** Settings ***\nResource    common.resource\n").unwrap();

        let (cache, store) = cache_with_store();
        let suite_uri = DocumentUri::from_file_path(&suite_path).unwrap();
        let suite = store.get_or_open(&suite_uri).unwrap();
        let token = CancellationToken::new();

        let ns = cache.get_namespace(&suite, &token).unwrap();
        assert!(ns.find_keyword("Shared Step", &token).unwrap().is_some());

        // Edit the resource through the store: the suite's namespace entry
        // must drop and rebuild against the new content.
        let resource_uri = DocumentUri::from_file_path(&resource_path).unwrap();
        let resource = store.get_or_open(&resource_uri).unwrap();
        resource.apply_full_change(
            Some(2),
            Some("*** Keywords ***\nRenamed Step\n    No Operation\n".into()),
            false,
        );
        store.notify_changed(&resource_uri);

        let rebuilt = cache.get_namespace(&suite, &token).unwrap();
        assert!(!Arc::ptr_eq(&ns, &rebuilt), "namespace must rebuild");
        assert!(rebuilt.find_keyword("Shared Step", &token).unwrap().is_none());
        assert!(rebuilt
            .find_keyword("Renamed Step", &token)
            .unwrap()
            .is_some());
    }

    #[test]
    fn cancelled_semantic_tokens_leave_no_cache_entry() {
        let (cache, store) = cache_with_store();
        let doc = open(&store, "file:///t/a.robot", "*** Test Cases ***\nT\n    Log    x\n");

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let err = cache
            .get_semantic_tokens(&doc, PositionEncoding::Utf16, &cancelled)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled(_)));

        // A live token computes normally afterwards.
        let ok = cache
            .get_semantic_tokens(&doc, PositionEncoding::Utf16, &CancellationToken::new())
            .unwrap();
        assert!(!ok.is_empty());
    }

    #[test]
    fn folding_and_symbols_come_from_the_cache() {
        let (cache, store) = cache_with_store();
        let doc = open(
            &store,
            "file:///t/a.robot",
            "*** Test Cases ***\nT\n    Log    x\n",
        );
        let f1 = cache.get_folding_ranges(&doc);
        let f2 = cache.get_folding_ranges(&doc);
        assert!(Arc::ptr_eq(&f1, &f2));
        let s = cache.get_document_symbols(&doc);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].children[0].name, "T");
    }

    #[test]
    fn resource_specialization_rejects_suites() {
        let (cache, store) = cache_with_store();
        let doc = open(&store, "file:///t/a.robot", "*** Keywords ***\nK\n    Log    x\n");
        let err = cache
            .get_resource_namespace(&doc, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownFileType(_)));
        assert!(cache
            .get_general_namespace(&doc, &CancellationToken::new())
            .is_ok());
    }
}
