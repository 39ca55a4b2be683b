// ==============================================================================
// tower-lsp LanguageServer implementation
// ==============================================================================
//
// Lifecycle, document sync, and request dispatch over the analysis kernel.
// The read loop never runs analysis: every request and every debounced
// diagnostics pass goes through `spawn_blocking` with its own
// `CancellationToken`.
//
// Debouncing: didOpen/didChange notifications are coalesced per file (50 ms
// for opens, 300 ms for edits) so analysis only runs once the user pauses.
// A newer edit cancels the in-flight analysis for that file; results of a
// cancelled run are never published. Requests for a document supersede older
// in-flight requests of the same kind the same way.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use tower_lsp::jsonrpc::{Error as RpcError, ErrorCode, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use robot_analysis::{AnalysisError, WorkspaceSettings};
use robot_text::{CancellationToken, PositionEncoding};

use crate::state::{AnalysisShared, Overrides};

const DEBOUNCE_DELAY_MS: u64 = 300;

/// Shorter delay for didOpen: quick first feedback, while still coalescing
/// an editor restoring a many-tab session.
const DEBOUNCE_DELAY_DID_OPEN_MS: u64 = 50;

/// Per-file debounce state: a channel to the background worker plus the
/// cancellation token of the analysis currently in flight.
struct DebounceWorker {
    tx: mpsc::UnboundedSender<Duration>,
    cancel: Arc<Mutex<CancellationToken>>,
}

pub struct RobotLanguageServer {
    client: Client,
    overrides: Overrides,
    shared: Arc<RwLock<Option<Arc<AnalysisShared>>>>,
    workers: Mutex<HashMap<Url, DebounceWorker>>,
    /// In-flight request tokens, superseded per document.
    inflight: Mutex<HashMap<Url, CancellationToken>>,
}

fn cancelled_error() -> RpcError {
    RpcError {
        code: ErrorCode::ServerError(-32800),
        message: "request cancelled".into(),
        data: None,
    }
}

impl RobotLanguageServer {
    pub fn new(client: Client, overrides: Overrides) -> Self {
        Self {
            client,
            overrides,
            shared: Arc::new(RwLock::new(None)),
            workers: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn shared(&self) -> Option<Arc<AnalysisShared>> {
        self.shared.read().clone()
    }

    /// Schedule a debounced diagnostics pass for `uri`, cancelling any
    /// analysis already running for it.
    fn schedule_analysis(&self, uri: Url, delay: Duration) {
        let mut workers = self.workers.lock();
        if let Some(worker) = workers.get(&uri) {
            worker.cancel.lock().cancel();
            if worker.tx.send(delay).is_ok() {
                return;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(Mutex::new(CancellationToken::new()));
        tx.send(delay).ok();
        workers.insert(
            uri.clone(),
            DebounceWorker {
                tx,
                cancel: cancel.clone(),
            },
        );
        drop(workers);

        self.spawn_debounce_worker(uri, rx, cancel);
    }

    fn spawn_debounce_worker(
        &self,
        uri: Url,
        mut rx: mpsc::UnboundedReceiver<Duration>,
        cancel: Arc<Mutex<CancellationToken>>,
    ) {
        let client = self.client.clone();
        let shared_slot = self.shared.clone();

        tokio::spawn(async move {
            while let Some(mut delay) = rx.recv().await {
                // Debounce: keep absorbing newer signals until quiet.
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => break,
                        newer = rx.recv() => match newer {
                            Some(new_delay) => delay = new_delay,
                            None => return,
                        },
                    }
                }

                let Some(shared) = shared_slot.read().clone() else {
                    continue;
                };
                let Some(document) = shared.document(&uri) else {
                    continue;
                };

                let token = CancellationToken::new();
                *cancel.lock() = token.clone();

                let version = document.version();
                let worker_shared = shared.clone();
                let worker_token = token.clone();
                let started = std::time::Instant::now();
                let outcome = tokio::task::spawn_blocking(move || {
                    crate::diagnostics::collect(&worker_shared, &document, &worker_token)
                })
                .await;

                match outcome {
                    Ok(Ok(diagnostics)) if !token.is_cancelled() => {
                        log::info!(
                            "{}: {} diagnostics in {:.1}ms",
                            uri.path(),
                            diagnostics.len(),
                            started.elapsed().as_secs_f64() * 1000.0
                        );
                        client
                            .publish_diagnostics(uri.clone(), diagnostics, version)
                            .await;
                    }
                    Ok(Ok(_)) | Ok(Err(AnalysisError::Cancelled(_))) => {
                        log::debug!("analysis of {} superseded", uri.path());
                    }
                    Ok(Err(err)) => {
                        log::warn!("analysis of {} failed: {err}", uri.path());
                    }
                    Err(err) => {
                        log::error!("analysis worker for {} panicked: {err}", uri.path());
                    }
                }
            }
        });
    }

    /// Run a request handler off the protocol thread with a token that a
    /// newer request for the same document cancels.
    async fn with_document<T, F>(&self, uri: &Url, f: F) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce(Arc<AnalysisShared>, Arc<robot_text::TextDocument>, CancellationToken) -> Option<T>
            + Send
            + 'static,
    {
        let Some(shared) = self.shared() else {
            return Ok(None);
        };
        let Some(document) = shared.document(uri) else {
            return Ok(None);
        };

        let token = CancellationToken::new();
        if let Some(older) = self
            .inflight
            .lock()
            .insert(uri.clone(), token.clone())
        {
            older.cancel();
        }

        let worker_token = token.clone();
        let result = tokio::task::spawn_blocking(move || f(shared, document, worker_token))
            .await
            .map_err(|_| RpcError::internal_error())?;
        if token.is_cancelled() {
            return Err(cancelled_error());
        }
        Ok(result)
    }

    fn negotiate_encoding(params: &InitializeParams) -> PositionEncoding {
        let offered = params
            .capabilities
            .general
            .as_ref()
            .and_then(|general| general.position_encodings.as_ref());
        let Some(offered) = offered else {
            return PositionEncoding::Utf16;
        };
        for kind in offered {
            if *kind == PositionEncodingKind::UTF16 {
                return PositionEncoding::Utf16;
            }
            if *kind == PositionEncodingKind::UTF8 {
                return PositionEncoding::Utf8;
            }
            if *kind == PositionEncodingKind::UTF32 {
                return PositionEncoding::Utf32;
            }
        }
        PositionEncoding::Utf16
    }

    /// Replace the kernel (configuration change), carrying editor-owned
    /// documents over into the fresh store.
    fn rebuild_shared(&self, settings: WorkspaceSettings) {
        let old = self.shared.read().clone();
        let encoding = old
            .as_ref()
            .map(|s| s.encoding)
            .unwrap_or(PositionEncoding::Utf16);
        let root = old.as_ref().and_then(|s| s.workspace_root.clone());
        let fresh = AnalysisShared::new(settings, encoding, &self.overrides, root);

        if let Some(old) = old {
            for document in old.store.documents() {
                if !document.opened_in_editor() {
                    continue;
                }
                fresh.store.open(
                    document.uri().clone(),
                    Some(document.language_id()),
                    document.version(),
                    document.text(),
                );
            }
        }
        *self.shared.write() = Some(fresh);

        let open: Vec<Url> = self.workers.lock().keys().cloned().collect();
        for uri in open {
            self.schedule_analysis(uri, Duration::from_millis(DEBOUNCE_DELAY_MS));
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for RobotLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(info) = &params.client_info {
            log::info!(
                "client: {}{}",
                info.name,
                info.version
                    .as_deref()
                    .map_or(String::new(), |v| format!(" v{v}")),
            );
        }

        let settings = match params.initialization_options.clone() {
            Some(options) => serde_json::from_value::<WorkspaceSettings>(options)
                .unwrap_or_else(|err| {
                    log::warn!("failed to parse initializationOptions: {err}");
                    WorkspaceSettings::default()
                }),
            None => WorkspaceSettings::default(),
        };

        let encoding = Self::negotiate_encoding(&params);
        let workspace_root = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok());
        if let Some(root) = &workspace_root {
            log::info!("workspace root: {}", root.display());
        }

        let shared = AnalysisShared::new(settings, encoding, &self.overrides, workspace_root);
        *self.shared.write() = Some(shared);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(match encoding {
                    PositionEncoding::Utf8 => PositionEncodingKind::UTF8,
                    PositionEncoding::Utf16 => PositionEncodingKind::UTF16,
                    PositionEncoding::Utf32 => PositionEncodingKind::UTF32,
                }),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec!["$".to_string(), "{".to_string()]),
                    ..Default::default()
                }),
                document_symbol_provider: Some(OneOf::Left(true)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec![" ".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: Default::default(),
                }),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: crate::semantic_tokens::legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: None,
                            work_done_progress_options: Default::default(),
                        },
                    ),
                ),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let msg = {
            let shared = self.shared();
            match shared {
                Some(shared) => format!(
                    "robot-lsp ready — robot {}, {} position encoding",
                    shared.cache.robot_version(),
                    shared.encoding.as_str(),
                ),
                None => "robot-lsp ready".to_string(),
            }
        };
        log::info!("{msg}");
        self.client.log_message(MessageType::INFO, msg).await;
    }

    async fn shutdown(&self) -> Result<()> {
        for (_, worker) in self.workers.lock().drain() {
            worker.cancel.lock().cancel();
        }
        for (_, token) in self.inflight.lock().drain() {
            token.cancel();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(shared) = self.shared() else {
            return;
        };
        let doc = params.text_document;
        let Some(uri) = AnalysisShared::uri(&doc.uri) else {
            return;
        };
        shared
            .store
            .open(uri, Some(&doc.language_id), Some(doc.version), doc.text);
        self.schedule_analysis(
            doc.uri,
            Duration::from_millis(DEBOUNCE_DELAY_DID_OPEN_MS),
        );
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(shared) = self.shared() else {
            return;
        };
        let Some(uri) = AnalysisShared::uri(&params.text_document.uri) else {
            return;
        };
        let Some(document) = shared.store.get(&uri) else {
            return;
        };

        let version = params.text_document.version;
        for change in params.content_changes {
            match change.range {
                Some(range) => {
                    let core_range = robot_text::Range::new(
                        crate::convert::position_from_lsp(range.start),
                        crate::convert::position_from_lsp(range.end),
                    );
                    if let Err(err) = document.apply_incremental_change(
                        Some(version),
                        core_range,
                        &change.text,
                        shared.encoding,
                    ) {
                        log::error!("rejected edit for {uri}: {err}");
                    }
                }
                None => document.apply_full_change(Some(version), Some(change.text), false),
            }
        }
        shared.store.notify_changed(&uri);
        self.schedule_analysis(
            params.text_document.uri,
            Duration::from_millis(DEBOUNCE_DELAY_MS),
        );
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(shared) = self.shared() else {
            return;
        };
        let Some(uri) = AnalysisShared::uri(&params.text_document.uri) else {
            return;
        };
        shared.store.save(&uri, None, params.text);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.client
            .publish_diagnostics(params.text_document.uri.clone(), vec![], None)
            .await;

        if let Some(worker) = self.workers.lock().remove(&params.text_document.uri) {
            worker.cancel.lock().cancel();
        }
        if let Some(token) = self.inflight.lock().remove(&params.text_document.uri) {
            token.cancel();
        }
        if let Some(shared) = self.shared() {
            if let Some(uri) = AnalysisShared::uri(&params.text_document.uri) {
                shared.store.close(&uri, true);
            }
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        match serde_json::from_value::<WorkspaceSettings>(params.settings) {
            Ok(settings) => {
                log::info!("configuration changed; rebuilding analysis state");
                self.rebuild_shared(settings);
            }
            Err(err) => log::warn!("failed to parse configuration: {err}"),
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;
        self.with_document(&uri, move |shared, document, token| {
            crate::hover::hover(&shared, &document, pos, &token)
        })
        .await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;
        let target = uri.clone();
        self.with_document(&uri, move |shared, document, token| {
            crate::goto_def::goto_definition(&shared, &document, &target, pos, &token)
                .map(GotoDefinitionResponse::Scalar)
        })
        .await
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;
        self.with_document(&uri, move |shared, document, token| {
            crate::completion::completion(&shared, &document, pos, &token)
        })
        .await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        self.with_document(&params.text_document.uri, move |shared, document, _token| {
            Some(crate::document_symbol::document_symbols(&shared, &document))
        })
        .await
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        self.with_document(&params.text_document.uri, move |shared, document, _token| {
            Some(crate::folding_range::folding_ranges(&shared, &document))
        })
        .await
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;
        self.with_document(&uri, move |shared, document, token| {
            crate::signature_help::signature_help(&shared, &document, pos, &token)
        })
        .await
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let outcome = self
            .with_document(&params.text_document.uri, move |shared, document, token| {
                Some(crate::semantic_tokens::semantic_tokens_full(
                    &shared, &document, &token,
                ))
            })
            .await?;
        match outcome {
            Some(Ok(tokens)) => Ok(Some(SemanticTokensResult::Tokens(tokens))),
            Some(Err(AnalysisError::Cancelled(_))) => Err(cancelled_error()),
            Some(Err(err)) => {
                log::warn!("semantic tokens failed: {err}");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
