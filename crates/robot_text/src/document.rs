// ==============================================================================
// TextDocument: versioned text + derived-data cache + opaque data
// ==============================================================================
//
// One write lock guards text and version; the derived cache has its own lock
// and per-entry locks so a read of one computation never blocks another.
// Every mutation emits `cache_invalidate` before its effects become visible
// to cache readers and `cache_invalidated` after; the derived cache is empty
// between the two. Listeners on these events must not call back into the
// document (the invalidate event fires with the document lock held).

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::event::Event;
use crate::line_index::LineIndex;
use crate::position::{Position, PositionEncoding, Range};
use crate::uri::DocumentUri;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid range {0:?}")]
    InvalidRange(Range),
    #[error("cannot read document {uri}")]
    CantReadDocument {
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown file type: {0}")]
    UnknownFileType(String),
}

/// Key of a derived-data cache entry. Deterministic instead of
/// weak-function-keyed: core computations are enum cases, plug-ins get
/// `Extension` values they manage themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Computation {
    Tokens,
    Model,
    Namespace,
    SemanticTokens,
    FoldingRanges,
    DocumentSymbols,
    Extension(u64),
}

struct CacheEntry {
    slot: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

/// Per-document memoization table. Reads of the same key are deduplicated by
/// the per-entry lock: at most one computation per (document, key) runs at a
/// time, concurrent callers block on it and then share the result.
#[derive(Default)]
pub struct DerivedCache {
    entries: Mutex<FxHashMap<Computation, Arc<CacheEntry>>>,
}

impl DerivedCache {
    pub fn get_or_try_compute<T, E>(
        &self,
        key: Computation,
        compute: impl FnOnce() -> Result<Arc<T>, E>,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
    {
        let entry = {
            let mut entries = self.entries.lock();
            entries
                .entry(key)
                .or_insert_with(|| {
                    Arc::new(CacheEntry {
                        slot: Mutex::new(None),
                    })
                })
                .clone()
        };

        let mut slot = entry.slot.lock();
        if let Some(value) = slot.as_ref() {
            if let Ok(typed) = value.clone().downcast::<T>() {
                return Ok(typed);
            }
        }
        let value = compute()?;
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Whether any entry currently holds data.
    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .values()
            .all(|e| e.slot.lock().is_none())
    }

    pub fn clear(&self) {
        // Entries held by in-flight computations keep their own Arc; their
        // results land in orphaned slots and are never observed again.
        self.entries.lock().clear();
    }
}

#[derive(Default)]
pub struct DocumentEvents {
    pub cache_invalidate: Event<DocumentUri>,
    pub cache_invalidated: Event<DocumentUri>,
}

struct DocumentInner {
    text: String,
    version: Option<i32>,
    saved_text: String,
    saved_version: Option<i32>,
    line_index: Option<Arc<LineIndex>>,
}

pub struct TextDocument {
    uri: DocumentUri,
    language_id: SmolStr,
    opened_in_editor: Mutex<bool>,
    inner: RwLock<DocumentInner>,
    cache: DerivedCache,
    opaque: Mutex<FxHashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
    pub events: DocumentEvents,
}

impl TextDocument {
    pub fn new(
        uri: DocumentUri,
        language_id: impl Into<SmolStr>,
        version: Option<i32>,
        text: String,
    ) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            opened_in_editor: Mutex::new(false),
            inner: RwLock::new(DocumentInner {
                saved_text: text.clone(),
                saved_version: version,
                text,
                version,
                line_index: None,
            }),
            cache: DerivedCache::default(),
            opaque: Mutex::new(FxHashMap::default()),
            events: DocumentEvents::default(),
        }
    }

    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn text(&self) -> String {
        self.inner.read().text.clone()
    }

    pub fn version(&self) -> Option<i32> {
        self.inner.read().version
    }

    /// Text and version captured together, for analyses that must observe a
    /// consistent snapshot.
    pub fn snapshot(&self) -> (String, Option<i32>) {
        let inner = self.inner.read();
        (inner.text.clone(), inner.version)
    }

    pub fn opened_in_editor(&self) -> bool {
        *self.opened_in_editor.lock()
    }

    pub fn set_opened_in_editor(&self, opened: bool) {
        *self.opened_in_editor.lock() = opened;
    }

    /// The lazily built line index for the current text.
    pub fn line_index(&self) -> Arc<LineIndex> {
        if let Some(index) = self.inner.read().line_index.clone() {
            return index;
        }
        let mut inner = self.inner.write();
        if let Some(index) = inner.line_index.clone() {
            return index;
        }
        let index = Arc::new(LineIndex::new(&inner.text));
        inner.line_index = Some(index.clone());
        index
    }

    pub fn cache(&self) -> &DerivedCache {
        &self.cache
    }

    // --------------------------------------------------------------------------
    // Mutations
    // --------------------------------------------------------------------------

    /// Replace text and/or version. With `save`, the new state also becomes
    /// the snapshot `revert` restores.
    pub fn apply_full_change(&self, version: Option<i32>, text: Option<String>, save: bool) {
        let mut inner = self.inner.write();
        self.events.cache_invalidate.emit(&self.uri);
        if let Some(text) = text {
            inner.text = text;
            inner.line_index = None;
        }
        if let Some(version) = version {
            inner.version = Some(version);
        }
        if save {
            inner.saved_text = inner.text.clone();
            inner.saved_version = inner.version;
        }
        self.cache.clear();
        drop(inner);
        self.events.cache_invalidated.emit(&self.uri);
    }

    /// Splice `new_text` over `range` (expressed in `encoding` code units).
    /// Atomic: on `InvalidRange` nothing changes and no event fires. A start
    /// line equal to the current line count appends at the end of the text.
    pub fn apply_incremental_change(
        &self,
        version: Option<i32>,
        range: Range,
        new_text: &str,
        encoding: PositionEncoding,
    ) -> Result<(), DocumentError> {
        let mut inner = self.inner.write();
        if !range.is_valid() {
            return Err(DocumentError::InvalidRange(range));
        }
        let index = match inner.line_index.clone() {
            Some(index) => index,
            None => Arc::new(LineIndex::new(&inner.text)),
        };
        let text_len = inner.text.len() as u32;
        let start = match index.offset(&inner.text, range.start, encoding) {
            Some(offset) => offset,
            None if range.start.line >= index.line_count() => text_len,
            None => return Err(DocumentError::InvalidRange(range)),
        };
        let end = index
            .offset(&inner.text, range.end, encoding)
            .unwrap_or(text_len)
            .max(start);

        self.events.cache_invalidate.emit(&self.uri);
        inner
            .text
            .replace_range(start as usize..end as usize, new_text);
        inner.line_index = None;
        if let Some(version) = version {
            inner.version = Some(version);
        }
        self.cache.clear();
        drop(inner);
        self.events.cache_invalidated.emit(&self.uri);
        Ok(())
    }

    /// Force a cache invalidation without altering text.
    pub fn apply_none_change(&self) {
        let inner = self.inner.write();
        self.events.cache_invalidate.emit(&self.uri);
        self.cache.clear();
        drop(inner);
        self.events.cache_invalidated.emit(&self.uri);
    }

    pub fn save(&self, version: Option<i32>, text: Option<String>) {
        self.apply_full_change(version, text, true);
    }

    /// Restore the last saved snapshot. Returns true when text or version
    /// actually changed.
    pub fn revert(&self, version: Option<i32>) -> bool {
        let (saved_text, saved_version) = {
            let inner = self.inner.read();
            if inner.text == inner.saved_text && inner.version == inner.saved_version {
                return false;
            }
            (inner.saved_text.clone(), version.or(inner.saved_version))
        };
        self.apply_full_change(saved_version, Some(saved_text), false);
        self.opaque.lock().clear();
        true
    }

    /// Drop line index, derived cache, and opaque data; used on real close.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        self.events.cache_invalidate.emit(&self.uri);
        inner.line_index = None;
        self.cache.clear();
        drop(inner);
        self.opaque.lock().clear();
        self.events.cache_invalidated.emit(&self.uri);
    }

    // --------------------------------------------------------------------------
    // Opaque data
    // --------------------------------------------------------------------------

    pub fn set_data(&self, key: &'static str, value: Arc<dyn Any + Send + Sync>) {
        self.opaque.lock().insert(key, value);
    }

    pub fn get_data<T: Any + Send + Sync>(&self, key: &'static str) -> Option<Arc<T>> {
        self.opaque
            .lock()
            .get(key)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    // --------------------------------------------------------------------------
    // Position helpers
    // --------------------------------------------------------------------------

    pub fn position_to_offset(&self, pos: Position, encoding: PositionEncoding) -> Option<u32> {
        let inner = self.inner.read();
        let index = self.line_index_for(&inner);
        index.offset(&inner.text, pos, encoding)
    }

    pub fn offset_to_position(&self, offset: u32, encoding: PositionEncoding) -> Position {
        let inner = self.inner.read();
        let index = self.line_index_for(&inner);
        index.position(&inner.text, offset, encoding)
    }

    /// Translate a column between encodings against the current text.
    pub fn transcode_column(
        &self,
        line: u32,
        character: u32,
        from: PositionEncoding,
        to: PositionEncoding,
    ) -> Option<u32> {
        let inner = self.inner.read();
        let index = self.line_index_for(&inner);
        index.transcode_column(&inner.text, line, character, from, to)
    }

    fn line_index_for(&self, inner: &DocumentInner) -> Arc<LineIndex> {
        match inner.line_index.clone() {
            Some(index) => index,
            None => Arc::new(LineIndex::new(&inner.text)),
        }
    }
}

impl std::fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDocument")
            .field("uri", &self.uri)
            .field("language_id", &self.language_id)
            .field("version", &self.version())
            .finish()
    }
}
