mod common;

use common::{decode_semantic_tokens, legend_index, LspTestHarness};

const SUITE: &str = "\
*** Test Cases ***
T
    Log    Hello
";

#[tokio::test]
async fn open_file_yields_classified_tokens() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    let result = h.semantic_tokens("test.robot").await.expect("tokens");
    let tokens = decode_semantic_tokens(&result);

    assert!(
        tokens
            .iter()
            .any(|t| t.0 == 0 && t.1 == 0 && t.3 == legend_index("headerTestcase")),
        "{tokens:?}"
    );
    assert!(
        tokens
            .iter()
            .any(|t| t.0 == 1 && t.1 == 0 && t.2 == 1 && t.3 == legend_index("testcaseName")),
        "{tokens:?}"
    );
    assert!(
        tokens
            .iter()
            .any(|t| t.0 == 2 && t.1 == 4 && t.2 == 3 && t.3 == legend_index("keywordCall")),
        "{tokens:?}"
    );
    assert!(
        tokens
            .iter()
            .any(|t| t.0 == 2 && t.1 == 11 && t.2 == 5 && t.3 == legend_index("argument")),
        "{tokens:?}"
    );

    h.shutdown().await;
}

#[tokio::test]
async fn incremental_edit_invalidates_cached_tokens() {
    let mut h = LspTestHarness::new(&[("test.robot", SUITE)]).await;
    h.open("test.robot").await;

    let before = h.semantic_tokens("test.robot").await.expect("tokens");
    let before = decode_semantic_tokens(&before);
    assert!(before.iter().any(|t| t.0 == 2 && t.2 == 5), "Hello: {before:?}");

    // Replace "Hello" (line 2, cols 11..16) with "World!".
    h.edit_range("test.robot", 2, (2, 11, 2, 16), "World!").await;

    let after = h.semantic_tokens("test.robot").await.expect("tokens");
    let after = decode_semantic_tokens(&after);
    assert!(
        after
            .iter()
            .any(|t| t.0 == 2 && t.1 == 11 && t.2 == 6 && t.3 == legend_index("argument")),
        "edit must be reflected, not the cached array: {after:?}"
    );
    assert!(!after.iter().any(|t| t.0 == 2 && t.2 == 5), "{after:?}");

    h.shutdown().await;
}

#[tokio::test]
async fn run_keyword_if_branches_color_as_calls() {
    let src = "\
*** Test Cases ***
T
    Run Keyword If    ${x}    Log    a    ELSE    Log    b
";
    let mut h = LspTestHarness::new(&[("test.robot", src)]).await;
    h.open("test.robot").await;

    let result = h.semantic_tokens("test.robot").await.expect("tokens");
    let tokens = decode_semantic_tokens(&result);
    let calls = tokens
        .iter()
        .filter(|t| t.0 == 2 && t.3 == legend_index("keywordCall"))
        .count();
    assert_eq!(calls, 3, "outer call and both Log branches: {tokens:?}");

    h.shutdown().await;
}
