mod common;

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use web_summarizer::browser::BrowserFetcher;
use web_summarizer::summarizer::{strip_fence_artifacts, ERROR_TAG};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    init_test_tracing, sample_record, sse_body, summarizer_for, FailingRenderer, StaticFetcher,
};

async fn mock_completion(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({"model": "test-model", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn yields_cleaned_accumulation_per_chunk() {
    init_test_tracing();
    let server = MockServer::start().await;
    let deltas = ["```markdown\n", "# Acme", " builds markdown widgets", "\n```"];
    mock_completion(&server, sse_body(&deltas)).await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let updates: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    assert_eq!(
        updates,
        vec![
            "",
            "\n",
            "\n# Acme",
            "\n# Acme builds  widgets",
            "\n# Acme builds  widgets\n",
        ]
    );

    let mut accumulated = String::new();
    for (update, delta) in updates.iter().skip(1).zip(deltas) {
        accumulated.push_str(delta);
        assert_eq!(update, &strip_fence_artifacts(&accumulated));
    }
}

#[tokio::test]
async fn artifacts_split_across_chunks_never_leak() {
    let server = MockServer::start().await;
    mock_completion(&server, sse_body(&["Intro ``", "`mark", "down", " body"])).await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let updates: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    assert_eq!(updates.last().map(String::as_str), Some("Intro  body"));
    for update in &updates {
        assert!(!update.contains("```"), "{update:?}");
        assert!(!update.contains("markdown"), "{update:?}");
    }
}

#[tokio::test]
async fn stripping_does_not_rejoin_artifacts() {
    let server = MockServer::start().await;
    mock_completion(
        &server,
        sse_body(&["Use ``", "markdown", "` and markmarkdowndown"]),
    )
    .await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let updates: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    assert_eq!(updates, vec!["", "Use ``", "Use ``", "Use  and "]);
    for update in &updates {
        assert!(!update.contains("```"), "{update:?}");
        assert!(!update.contains("markdown"), "{update:?}");
    }
}

#[tokio::test]
async fn failed_page_load_still_summarizes_placeholder() {
    init_test_tracing();
    let server = MockServer::start().await;
    mock_completion(&server, sse_body(&["Nothing", " to see"])).await;

    let fetcher = BrowserFetcher::default().with_renderer(Arc::new(FailingRenderer));
    let summarizer = summarizer_for(&format!("{}/v1", server.uri()), Arc::new(fetcher));
    let updates: Vec<String> = summarizer.summarize("http://93.184.216.34/").collect().await;

    assert_eq!(updates, vec!["", "Nothing", "Nothing to see"]);
    assert!(updates.iter().all(|u| !u.starts_with(ERROR_TAG)));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("**No title found**"), "{user}");
}

#[tokio::test]
async fn request_carries_prompts_built_from_record() {
    let server = MockServer::start().await;
    mock_completion(&server, sse_body(&["ok"])).await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let _: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
    let user = messages[1]["content"].as_str().unwrap();
    assert!(user.contains("**Acme Widgets**"));
    assert!(user.ends_with("Acme builds widgets. ```markdown``` is everywhere."));
}

#[tokio::test]
async fn unsafe_url_yields_single_error() {
    let server = MockServer::start().await;
    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(BrowserFetcher::default()),
    );

    for url in ["http://127.0.0.1/", "http://10.0.0.5/", "ftp://example.com/", "not a url"] {
        let updates: Vec<String> = summarizer.summarize(url).collect().await;
        assert_eq!(updates.len(), 1, "{url}: {updates:?}");
        assert!(updates[0].starts_with(ERROR_TAG), "{url}: {}", updates[0]);
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn endpoint_rejection_yields_single_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"error":{"message":"Invalid API Key"}}"#),
        )
        .mount(&server)
        .await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let updates: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    assert_eq!(updates.len(), 1);
    assert!(updates[0].starts_with(ERROR_TAG));
    assert!(updates[0].contains("401"));
    assert!(updates[0].contains("Invalid API Key"));
}

#[tokio::test]
async fn mid_stream_error_ends_sequence() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Partial\"}}]}\n\n",
        "data: {\"error\":{\"message\":\"upstream overloaded\"}}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" never seen\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    mock_completion(&server, body.to_string()).await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let updates: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], "Partial");
    assert!(updates[1].starts_with(ERROR_TAG));
    assert!(updates[1].contains("upstream overloaded"));
}

#[tokio::test]
async fn unreachable_endpoint_yields_single_error() {
    // Nothing listens on port 9 (discard) locally.
    let summarizer = summarizer_for(
        "http://127.0.0.1:9/v1",
        Arc::new(StaticFetcher(sample_record())),
    );
    let updates: Vec<String> = summarizer.summarize("https://acme.example/").collect().await;

    assert_eq!(updates.len(), 1);
    assert!(updates[0].starts_with(ERROR_TAG));
}

#[tokio::test]
async fn cancelled_stream_stops_early() {
    let server = MockServer::start().await;
    mock_completion(&server, sse_body(&["a", "b", "c"])).await;

    let summarizer = summarizer_for(
        &format!("{}/v1", server.uri()),
        Arc::new(StaticFetcher(sample_record())),
    );
    let mut stream = summarizer.summarize("https://acme.example/");

    assert_eq!(stream.next().await.as_deref(), Some(""));
    assert_eq!(stream.next().await.as_deref(), Some("a"));
    stream.cancel();
    assert_eq!(stream.next().await, None);
}
