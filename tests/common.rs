#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use web_summarizer::browser::{FetchOutcome, PageFetcher, PageRenderer, RenderSession};
use web_summarizer::error::{AppError, Result};
use web_summarizer::llm::ChatClient;
use web_summarizer::scraper::PageRecord;
use web_summarizer::summarizer::Summarizer;

static INIT: Once = Once::new();

pub fn init_test_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Serves one fixed record regardless of URL.
pub struct StaticFetcher(pub PageRecord);

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchOutcome> {
        Ok(FetchOutcome::Loaded(self.0.clone()))
    }
}

/// Launches sessions whose page loads always fail.
pub struct FailingRenderer;

struct FailingSession;

#[async_trait]
impl PageRenderer for FailingRenderer {
    async fn launch(&self, _load_timeout: Duration) -> Result<Box<dyn RenderSession>> {
        Ok(Box::new(FailingSession))
    }
}

#[async_trait]
impl RenderSession for FailingSession {
    async fn render(&mut self, _url: &str, _limit: Duration) -> Result<String> {
        Err(AppError::BrowserError("net::ERR_CONNECTION_REFUSED".to_string()))
    }

    async fn close(&mut self) {}
}

pub fn sample_record() -> PageRecord {
    let mut record = PageRecord::placeholder("https://acme.example/");
    record.title = "Acme Widgets".to_string();
    record.text = "Acme builds widgets. ```markdown``` is everywhere.".to_string();
    record
}

pub fn summarizer_for(base_url: &str, fetcher: Arc<dyn PageFetcher>) -> Summarizer {
    Summarizer::new(fetcher, ChatClient::new(base_url, "test-key", "test-model"))
}

/// An SSE completion body: a role-only chunk, one chunk per delta, `[DONE]`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]})
    );
    for delta in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": delta}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
