// ==============================================================================
// DocumentStore: process-wide URI -> document mapping
// ==============================================================================

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::document::{DocumentError, TextDocument};
use crate::event::{Event, Subscription};
use crate::uri::DocumentUri;

/// One recognized language: id, extensions, and whether the extension match
/// is case sensitive. Definitions are consulted in registration order; first
/// match wins, unmatched files are labeled `unknown`.
#[derive(Debug, Clone)]
pub struct LanguageDefinition {
    pub id: SmolStr,
    pub extensions: Vec<SmolStr>,
    pub case_sensitive: bool,
}

impl LanguageDefinition {
    pub fn new(id: &str, extensions: &[&str], case_sensitive: bool) -> Self {
        Self {
            id: id.into(),
            extensions: extensions.iter().map(|e| SmolStr::from(*e)).collect(),
            case_sensitive,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|candidate| {
            if self.case_sensitive {
                candidate == ext
            } else {
                candidate.eq_ignore_ascii_case(ext)
            }
        })
    }
}

/// Reader chain entry: returns `Some` to claim responsibility for a path.
pub type DocumentReader = Arc<dyn Fn(&Path) -> Option<std::io::Result<String>> + Send + Sync>;

#[derive(Default)]
pub struct StoreEvents {
    pub did_open: Event<DocumentUri>,
    pub did_change: Event<DocumentUri>,
    pub did_close: Event<DocumentUri>,
    pub did_save: Event<DocumentUri>,
    /// A URI not previously known to the store is about to get a document.
    pub did_create_uri: Event<DocumentUri>,
    /// An internal `get_or_open` created a document that is not open in the
    /// editor.
    pub did_create: Event<DocumentUri>,
    /// Rebroadcast of every document's own cache events.
    pub cache_invalidate: Event<DocumentUri>,
    pub cache_invalidated: Event<DocumentUri>,
}

struct StoreEntry {
    document: Arc<TextDocument>,
    /// Keeps the per-document event rebroadcast alive for the entry's
    /// lifetime.
    _subscriptions: Vec<Subscription>,
}

pub struct DocumentStore {
    documents: DashMap<DocumentUri, StoreEntry>,
    languages: Vec<LanguageDefinition>,
    readers: Mutex<Vec<DocumentReader>>,
    pub events: StoreEvents,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(default_languages())
    }
}

pub fn default_languages() -> Vec<LanguageDefinition> {
    vec![
        LanguageDefinition::new("robotframework", &["robot", "resource"], false),
        LanguageDefinition::new("python", &["py"], false),
        LanguageDefinition::new("yaml", &["yaml", "yml"], false),
        LanguageDefinition::new("json", &["json"], false),
    ]
}

impl DocumentStore {
    pub fn new(languages: Vec<LanguageDefinition>) -> Self {
        Self {
            documents: DashMap::new(),
            languages,
            readers: Mutex::new(Vec::new()),
            events: StoreEvents::default(),
        }
    }

    /// Register a reader consulted (most recent first) by `get_or_open`.
    pub fn add_reader(&self, reader: DocumentReader) {
        self.readers.lock().push(reader);
    }

    pub fn language_id_for_path(&self, path: &Path) -> SmolStr {
        self.languages
            .iter()
            .find(|def| def.matches(path))
            .map(|def| def.id.clone())
            .unwrap_or_else(|| SmolStr::from("unknown"))
    }

    pub fn get(&self, uri: &DocumentUri) -> Option<Arc<TextDocument>> {
        self.documents.get(uri).map(|e| e.document.clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> Vec<Arc<TextDocument>> {
        self.documents
            .iter()
            .map(|e| e.value().document.clone())
            .collect()
    }

    /// Open from the editor (`didOpen`): creates or replaces content and
    /// marks the document as editor-owned.
    pub fn open(
        &self,
        uri: DocumentUri,
        language_id: Option<&str>,
        version: Option<i32>,
        text: String,
    ) -> Arc<TextDocument> {
        let text = normalize_line_endings(text);
        if let Some(existing) = self.get(&uri) {
            existing.apply_full_change(version, Some(text), true);
            existing.set_opened_in_editor(true);
            self.events.did_open.emit(&uri);
            return existing;
        }
        let language = language_id
            .map(SmolStr::from)
            .or_else(|| uri.to_file_path().map(|p| self.language_id_for_path(&p)))
            .unwrap_or_else(|| SmolStr::from("unknown"));
        let document = self.insert(uri.clone(), language, version, text);
        document.set_opened_in_editor(true);
        self.events.did_open.emit(&uri);
        document
    }

    /// Return the open document or read it from disk through the reader
    /// chain. Documents opened this way are not editor-owned.
    pub fn get_or_open(&self, uri: &DocumentUri) -> Result<Arc<TextDocument>, DocumentError> {
        if let Some(existing) = self.get(uri) {
            return Ok(existing);
        }
        let Some(path) = uri.to_file_path() else {
            return Err(DocumentError::CantReadDocument {
                uri: uri.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Unsupported, "not a file URI"),
            });
        };
        let text = self
            .read_text(&path)
            .map_err(|source| DocumentError::CantReadDocument {
                uri: uri.to_string(),
                source,
            })?;
        let language = self.language_id_for_path(&path);
        self.events.did_create_uri.emit(uri);
        let document = self.insert(uri.clone(), language, None, normalize_line_endings(text));
        self.events.did_create.emit(uri);
        Ok(document)
    }

    fn read_text(&self, path: &Path) -> std::io::Result<String> {
        for reader in self.readers.lock().iter().rev() {
            if let Some(result) = reader(path) {
                return result;
            }
        }
        std::fs::read_to_string(path)
    }

    fn insert(
        &self,
        uri: DocumentUri,
        language_id: SmolStr,
        version: Option<i32>,
        text: String,
    ) -> Arc<TextDocument> {
        let document = Arc::new(TextDocument::new(
            uri.clone(),
            language_id,
            version,
            text,
        ));
        let mut subscriptions = Vec::new();
        let rebroadcast = self.events.cache_invalidate.clone();
        subscriptions.push(document.events.cache_invalidate.add(move |uri| {
            rebroadcast.emit(uri);
        }));
        let rebroadcast = self.events.cache_invalidated.clone();
        subscriptions.push(document.events.cache_invalidated.add(move |uri| {
            rebroadcast.emit(uri);
        }));
        self.documents.insert(
            uri,
            StoreEntry {
                document: document.clone(),
                _subscriptions: subscriptions,
            },
        );
        document
    }

    /// Notify listeners that `document` changed (the caller already applied
    /// the edit through the document API).
    pub fn notify_changed(&self, uri: &DocumentUri) {
        self.events.did_change.emit(uri);
    }

    pub fn save(&self, uri: &DocumentUri, version: Option<i32>, text: Option<String>) {
        if let Some(document) = self.get(uri) {
            document.save(version, text.map(normalize_line_endings));
            self.events.did_save.emit(uri);
        }
    }

    /// Close a document. `real_close` removes it entirely; otherwise it
    /// reverts to the saved state and stays available for internal use.
    pub fn close(&self, uri: &DocumentUri, real_close: bool) {
        let Some(document) = self.get(uri) else {
            return;
        };
        if real_close {
            self.documents.remove(uri);
            document.clear();
        } else {
            document.set_opened_in_editor(false);
            if document.revert(None) {
                self.events.did_change.emit(uri);
            }
        }
        self.events.did_close.emit(uri);
    }
}

fn normalize_line_endings(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text
    }
}
