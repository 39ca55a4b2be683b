mod common;

use common::{LspTestHarness, TIMEOUT};
use tower_lsp::lsp_types::DiagnosticSeverity;

#[tokio::test]
async fn missing_library_import_is_reported() {
    let src = "\
*** Settings ***
Library    NoSuchLib.py

*** Test Cases ***
T
    Log    x
";
    let mut h = LspTestHarness::new(&[("test.robot", src)]).await;
    h.open("test.robot").await;

    let params = h
        .wait_for_diagnostics("test.robot", TIMEOUT)
        .await
        .expect("diagnostics should be published");
    let diag = params
        .diagnostics
        .iter()
        .find(|d| d.message.contains("NoSuchLib"))
        .unwrap_or_else(|| panic!("{:?}", params.diagnostics));
    assert_eq!(diag.severity, Some(DiagnosticSeverity::ERROR));
    assert_eq!(diag.range.start.line, 1);

    // Other requests on the same file still succeed.
    let hover = h.hover("test.robot", 5, 5).await;
    assert!(hover.is_some(), "hover on Log must still work");

    h.shutdown().await;
}

#[tokio::test]
async fn clean_file_publishes_empty_diagnostics() {
    let src = "*** Test Cases ***\nT\n    Log    x\n";
    let mut h = LspTestHarness::new(&[("test.robot", src)]).await;
    h.open("test.robot").await;

    let params = h
        .wait_for_diagnostics("test.robot", TIMEOUT)
        .await
        .expect("diagnostics should be published");
    assert!(params.diagnostics.is_empty(), "{:?}", params.diagnostics);

    h.shutdown().await;
}

#[tokio::test]
async fn close_clears_diagnostics() {
    let src = "*** Settings ***\nLibrary    NoSuchLib.py\n";
    let mut h = LspTestHarness::new(&[("test.robot", src)]).await;
    h.open("test.robot").await;

    let first = h
        .wait_for_diagnostics("test.robot", TIMEOUT)
        .await
        .expect("initial diagnostics");
    assert!(!first.diagnostics.is_empty());

    h.close("test.robot").await;
    let cleared = h
        .wait_for_diagnostics("test.robot", TIMEOUT)
        .await
        .expect("clearing publish");
    assert!(cleared.diagnostics.is_empty(), "{:?}", cleared.diagnostics);

    h.shutdown().await;
}

#[tokio::test]
async fn missing_block_end_is_reported() {
    let src = "*** Test Cases ***\nT\n    FOR    ${i}    IN    a\n        Log    ${i}\n";
    let mut h = LspTestHarness::new(&[("test.robot", src)]).await;
    h.open("test.robot").await;

    let params = h
        .wait_for_diagnostics("test.robot", TIMEOUT)
        .await
        .expect("diagnostics");
    assert!(
        params.diagnostics.iter().any(|d| d.message.contains("END")),
        "{:?}",
        params.diagnostics
    );

    h.shutdown().await;
}
