// ==============================================================================
// E2E LSP test harness
// ==============================================================================
//
// Exercises the full tower-lsp `Service` pipeline in-process: the real
// `LanguageServer` impl, the real document store and kernel, the real
// debounce/cancellation loop — without transport framing.
//
// `LspService::new()` returns `(LspService<S>, ClientSocket)`: the service
// takes JSON-RPC requests directly, and server-to-client notifications
// (`publishDiagnostics`) appear on the socket stream.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};
use tower_lsp::jsonrpc::{Request, Response};
use tower_lsp::lsp_types::*;
use tower_lsp::LspService;

use robot_lsp::server::RobotLanguageServer;
use robot_lsp::state::Overrides;

/// The server debounces diagnostics (50/300 ms); five seconds is ample
/// margin for CI.
pub const TIMEOUT: Duration = Duration::from_secs(5);

#[allow(dead_code)]
pub struct LspTestHarness {
    service: LspService<RobotLanguageServer>,
    notif_rx: mpsc::UnboundedReceiver<Request>,
    next_id: AtomicI64,
    root: tempfile::TempDir,
}

#[allow(dead_code)]
impl LspTestHarness {
    /// Create a harness with the given initial files on disk, initialized
    /// and ready for document notifications.
    pub async fn new(files: &[(&str, &str)]) -> Self {
        let root = tempfile::tempdir().expect("create workspace");
        for (name, text) in files {
            std::fs::write(root.path().join(name), text).expect("write workspace file");
        }
        let root_uri = Url::from_file_path(root.path()).unwrap();

        let overrides = Overrides {
            python: None,
            robot_version: Some("7.0".parse().unwrap()),
        };
        let (service, client_socket) =
            LspService::new(|client| RobotLanguageServer::new(client, overrides));

        // Drain the socket continuously; `publish_diagnostics` blocks on its
        // internal channel otherwise.
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = client_socket;
            while let Some(msg) = stream.next().await {
                let _ = notif_tx.send(msg);
            }
        });

        let mut harness = LspTestHarness {
            service,
            notif_rx,
            next_id: AtomicI64::new(1),
            root,
        };

        let init = Request::build("initialize")
            .params(json!({
                "capabilities": {},
                "rootUri": root_uri.as_str(),
            }))
            .id(harness.next_id())
            .finish();
        harness.send_request(init).await;
        let initialized = Request::build("initialized").params(json!({})).finish();
        harness.send_notification(initialized).await;

        harness
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn uri(&self, name: &str) -> Url {
        Url::from_file_path(self.path(name)).unwrap()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_request(&mut self, req: Request) -> Option<Response> {
        self.service
            .ready()
            .await
            .expect("service not ready")
            .call(req)
            .await
            .expect("service call failed")
    }

    async fn send_notification(&mut self, notif: Request) {
        let _ = self.service.ready().await.unwrap().call(notif).await;
    }

    // ==========================================================================
    // Document lifecycle
    // ==========================================================================

    pub async fn open(&mut self, name: &str) {
        let text = std::fs::read_to_string(self.path(name)).expect("read file for didOpen");
        let uri = self.uri(name);
        let notif = Request::build("textDocument/didOpen")
            .params(json!({
                "textDocument": {
                    "uri": uri.as_str(),
                    "languageId": "robotframework",
                    "version": 1,
                    "text": text,
                }
            }))
            .finish();
        self.send_notification(notif).await;
    }

    /// Send one incremental change replacing `range` with `new_text`.
    pub async fn edit_range(
        &mut self,
        name: &str,
        version: i32,
        range: (u32, u32, u32, u32),
        new_text: &str,
    ) {
        let uri = self.uri(name);
        let (sl, sc, el, ec) = range;
        let notif = Request::build("textDocument/didChange")
            .params(json!({
                "textDocument": { "uri": uri.as_str(), "version": version },
                "contentChanges": [{
                    "range": {
                        "start": { "line": sl, "character": sc },
                        "end": { "line": el, "character": ec }
                    },
                    "text": new_text
                }]
            }))
            .finish();
        self.send_notification(notif).await;
    }

    pub async fn close(&mut self, name: &str) {
        let uri = self.uri(name);
        let notif = Request::build("textDocument/didClose")
            .params(json!({ "textDocument": { "uri": uri.as_str() } }))
            .finish();
        self.send_notification(notif).await;
    }

    // ==========================================================================
    // Requests
    // ==========================================================================

    async fn request<T: serde::de::DeserializeOwned>(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Option<T> {
        let req = Request::build(method.to_string())
            .params(params)
            .id(self.next_id())
            .finish();
        let resp = self.send_request(req).await?;
        let (_id, result) = resp.into_parts();
        serde_json::from_value(result.ok()?).ok()
    }

    pub async fn semantic_tokens(&mut self, name: &str) -> Option<SemanticTokensResult> {
        let uri = self.uri(name);
        self.request(
            "textDocument/semanticTokens/full",
            json!({ "textDocument": { "uri": uri.as_str() } }),
        )
        .await
    }

    pub async fn hover(&mut self, name: &str, line: u32, character: u32) -> Option<Hover> {
        let uri = self.uri(name);
        self.request(
            "textDocument/hover",
            json!({
                "textDocument": { "uri": uri.as_str() },
                "position": { "line": line, "character": character }
            }),
        )
        .await
    }

    pub async fn goto_def(
        &mut self,
        name: &str,
        line: u32,
        character: u32,
    ) -> Option<GotoDefinitionResponse> {
        let uri = self.uri(name);
        self.request(
            "textDocument/definition",
            json!({
                "textDocument": { "uri": uri.as_str() },
                "position": { "line": line, "character": character }
            }),
        )
        .await
    }

    pub async fn document_symbols(&mut self, name: &str) -> Option<DocumentSymbolResponse> {
        let uri = self.uri(name);
        self.request(
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": uri.as_str() } }),
        )
        .await
    }

    pub async fn folding_ranges(&mut self, name: &str) -> Option<Vec<FoldingRange>> {
        let uri = self.uri(name);
        self.request(
            "textDocument/foldingRange",
            json!({ "textDocument": { "uri": uri.as_str() } }),
        )
        .await
    }

    pub async fn completion(
        &mut self,
        name: &str,
        line: u32,
        character: u32,
    ) -> Option<CompletionResponse> {
        let uri = self.uri(name);
        self.request(
            "textDocument/completion",
            json!({
                "textDocument": { "uri": uri.as_str() },
                "position": { "line": line, "character": character }
            }),
        )
        .await
    }

    // ==========================================================================
    // Diagnostics
    // ==========================================================================

    /// Wait for `publishDiagnostics` for the given file, skipping everything
    /// else. `None` on timeout.
    pub async fn wait_for_diagnostics(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> Option<PublishDiagnosticsParams> {
        let expected_uri = self.uri(name);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.notif_rx.recv()).await {
                Ok(Some(msg)) => {
                    if msg.method() == "textDocument/publishDiagnostics" {
                        if let Some(params) = msg.params() {
                            if let Ok(parsed) = serde_json::from_value::<PublishDiagnosticsParams>(
                                params.clone(),
                            ) {
                                if parsed.uri == expected_uri {
                                    return Some(parsed);
                                }
                            }
                        }
                    }
                }
                Ok(None) => return None,
                Err(_) => return None,
            }
        }
    }

    // ==========================================================================
    // Shutdown
    // ==========================================================================

    pub async fn shutdown(&mut self) {
        let shutdown = Request::build("shutdown").id(self.next_id()).finish();
        self.send_request(shutdown).await;
        let exit = Request::build("exit").finish();
        let _ = self.service.call(exit).await;
    }
}

/// Decode an LSP semantic token stream into `(line, start, length, type,
/// modifiers)` tuples.
#[allow(dead_code)]
pub fn decode_semantic_tokens(result: &SemanticTokensResult) -> Vec<(u32, u32, u32, u32, u32)> {
    let SemanticTokensResult::Tokens(tokens) = result else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut line = 0u32;
    let mut start = 0u32;
    for tok in &tokens.data {
        line += tok.delta_line;
        if tok.delta_line > 0 {
            start = tok.delta_start;
        } else {
            start += tok.delta_start;
        }
        out.push((
            line,
            start,
            tok.length,
            tok.token_type,
            tok.token_modifiers_bitset,
        ));
    }
    out
}

/// Index of a semantic token type in the server's legend.
#[allow(dead_code)]
pub fn legend_index(name: &str) -> u32 {
    robot_analysis::legend_types()
        .iter()
        .position(|t| *t == name)
        .unwrap_or_else(|| panic!("unknown token type {name}")) as u32
}
