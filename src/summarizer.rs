//! Page-to-summary pipeline.
//!
//! [`Summarizer::summarize`] returns a [`SummaryStream`] whose items are the
//! whole summary so far, cleaned of code-fence artifacts. Failures show up
//! as a single `[LLM Error]` item that ends the stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::browser::PageFetcher;
use crate::llm::ChatClient;
use crate::prompt;

pub const ERROR_TAG: &str = "[LLM Error]";

/// Remove every code fence and every literal `markdown` from `text`.
///
/// Removing one token can join its neighbours into another, so the
/// replacements repeat until the text stops changing.
pub fn strip_fence_artifacts(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = current.replace("```", "").replace("markdown", "");
        if next == current {
            return next;
        }
        current = next;
    }
}

#[derive(Clone)]
pub struct Summarizer {
    fetcher: Arc<dyn PageFetcher>,
    llm: ChatClient,
}

impl Summarizer {
    pub fn new(fetcher: Arc<dyn PageFetcher>, llm: ChatClient) -> Self {
        Self { fetcher, llm }
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    /// Lazily fetch `url` and stream its summary. Nothing happens until the
    /// stream is polled.
    pub fn summarize(&self, url: &str) -> SummaryStream {
        let fetcher = Arc::clone(&self.fetcher);
        let llm = self.llm.clone();
        let url = url.trim().to_string();

        let updates = async_stream::stream! {
            let record = match fetcher.fetch(&url).await {
                Ok(outcome) => outcome.into_record(),
                Err(err) => {
                    tracing::warn!(%url, error = %err, "fetch failed");
                    yield format!("{ERROR_TAG} {err}");
                    return;
                }
            };

            let messages = prompt::build_messages(&record);
            drop(record);

            tracing::info!(%url, model = llm.model(), "requesting summary");
            let mut deltas = match llm.stream_chat(&messages).await {
                Ok(deltas) => deltas,
                Err(err) => {
                    tracing::warn!(%url, error = %err, "summary request failed");
                    yield format!("{ERROR_TAG} {err}");
                    return;
                }
            };

            let mut accumulated = String::new();
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(piece) => {
                        accumulated.push_str(&piece);
                        yield strip_fence_artifacts(&accumulated);
                    }
                    Err(err) => {
                        tracing::warn!(%url, error = %err, "summary stream failed");
                        yield format!("{ERROR_TAG} {err}");
                        return;
                    }
                }
            }
            tracing::info!(%url, chars = accumulated.len(), "summary complete");
        };

        SummaryStream::new(updates.boxed())
    }
}

/// Progressive summary updates with an explicit cancellation hook.
///
/// Cancelling (or dropping) the stream drops the in-flight fetch or HTTP
/// response, which closes the browser session and the connection.
pub struct SummaryStream {
    inner: Option<BoxStream<'static, String>>,
    cancel: CancellationToken,
}

impl SummaryStream {
    fn new(updates: BoxStream<'static, String>) -> Self {
        let cancel = CancellationToken::new();
        let inner = updates
            .take_until(cancel.clone().cancelled_owned())
            .boxed();

        Self {
            inner: Some(inner),
            cancel,
        }
    }

    /// Stop producing updates and release resources now.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.inner = None;
    }

    /// Token that cancels this stream from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for SummaryStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
