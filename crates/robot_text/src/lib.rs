// ==============================================================================
// robot_text: document substrate for the analysis kernel
// ==============================================================================
//
// Mirrors the text the editor currently sees: URIs, positions in negotiable
// encodings, versioned documents with incremental edits, a process-wide store,
// typed events, and the cancellation primitives every analysis runs on.

mod cancel;
mod document;
mod event;
mod line_index;
mod position;
mod store;
mod uri;

pub use cancel::{run_in_thread, CancellationToken, Cancelled, TaskHandle, TaskTracker};
pub use document::{Computation, DerivedCache, DocumentError, DocumentEvents, TextDocument};
pub use event::{Event, ListenerError, Subscription};
pub use line_index::LineIndex;
pub use position::{Position, PositionEncoding, Range};
pub use store::{DocumentStore, LanguageDefinition, StoreEvents};
pub use uri::DocumentUri;
