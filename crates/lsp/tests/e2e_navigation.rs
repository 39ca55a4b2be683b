mod common;

use common::LspTestHarness;
use tower_lsp::lsp_types::{DocumentSymbolResponse, GotoDefinitionResponse, HoverContents};

const SUITE: &str = "\
*** Test Cases ***
Login Test
    Do Login    alice
    Run Keyword If    ${ok}    Log    yes    ELSE    Do Login    bob

*** Keywords ***
Do Login
    [Arguments]    ${user}
    Log    ${user}
";

#[tokio::test]
async fn goto_definition_of_local_keyword() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    // Cursor on "Do Login" in the test body (line 2, col 5).
    let response = h.goto_def("test.robot", 2, 5).await.expect("definition");
    let GotoDefinitionResponse::Scalar(location) = response else {
        panic!("expected a single location");
    };
    assert_eq!(location.range.start.line, 6, "the *** Keywords *** entry");

    h.shutdown().await;
}

#[tokio::test]
async fn goto_definition_through_run_keyword_branch() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    // Cursor on the "Do Login" nested in the ELSE branch (line 3, col 53).
    let line3 = SUITE.lines().nth(3).unwrap();
    let col = line3.find("Do Login").unwrap() as u32 + 1;
    let response = h.goto_def("test.robot", 3, col).await.expect("definition");
    let GotoDefinitionResponse::Scalar(location) = response else {
        panic!("expected a single location");
    };
    assert_eq!(location.range.start.line, 6);

    h.shutdown().await;
}

#[tokio::test]
async fn hover_shows_builtin_keyword_from_nested_call() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    // Cursor on the "Log" inside the Run Keyword If condition branch.
    let line3 = SUITE.lines().nth(3).unwrap();
    let col = line3.find("Log").unwrap() as u32 + 1;
    let hover = h.hover("test.robot", 3, col).await.expect("hover");
    let HoverContents::Markup(markup) = hover.contents else {
        panic!("expected markup hover");
    };
    assert!(markup.value.contains("Log"), "{}", markup.value);
    assert!(markup.value.contains("BuiltIn"), "{}", markup.value);

    h.shutdown().await;
}

#[tokio::test]
async fn document_symbols_outline() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    let DocumentSymbolResponse::Nested(symbols) =
        h.document_symbols("test.robot").await.expect("symbols")
    else {
        panic!("expected nested symbols");
    };
    assert_eq!(symbols.len(), 2);
    let cases = symbols[0].children.as_ref().expect("test cases");
    assert_eq!(cases[0].name, "Login Test");
    let keywords = symbols[1].children.as_ref().expect("keywords");
    assert_eq!(keywords[0].name, "Do Login");

    h.shutdown().await;
}

#[tokio::test]
async fn folding_covers_sections_and_blocks() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    let ranges = h.folding_ranges("test.robot").await.expect("ranges");
    assert!(ranges.iter().any(|r| r.start_line == 0), "{ranges:?}");
    assert!(
        ranges.iter().any(|r| r.start_line == 6 && r.end_line == 8),
        "keyword block: {ranges:?}"
    );

    h.shutdown().await;
}

#[tokio::test]
async fn completion_offers_local_and_builtin_keywords() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    let response = h.completion("test.robot", 2, 5).await.expect("completions");
    let items = match response {
        tower_lsp::lsp_types::CompletionResponse::Array(items) => items,
        tower_lsp::lsp_types::CompletionResponse::List(list) => list.items,
    };
    assert!(items.iter().any(|i| i.label == "Do Login"), "local keyword");
    assert!(items.iter().any(|i| i.label == "Log"), "builtin keyword");

    h.shutdown().await;
}
