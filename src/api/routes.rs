use std::convert::Infallible;

use axum::{
    routing::{get, post},
    Router,
    http::StatusCode,
    extract::{Json, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse,
    },
};
use futures::stream::{self, Stream, StreamExt};
use tower_http::cors::{CorsLayer, Any};
use chrono::Utc;

use crate::AppState;
use crate::error::AppError;
use crate::api::models::{PageResponse, SummarizeRequest, SummarizeResponse, UrlQuery};
use crate::api::response;
use crate::browser::FetchOutcome;
use crate::summarizer::ERROR_TAG;

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/summarize", post(summarize_handler))
        .route("/api/summarize/stream", get(summarize_stream_handler))
        .route("/api/page", get(page_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Server-Sent Events: one `summary` event per update carrying the whole
/// summary so far as a JSON string, then a final `done` event.
async fn summarize_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(url = %query.url, model = %state.config.llm_model, "streaming summary");

    let updates = state.summarizer.summarize(&query.url).map(|text| {
        Ok::<_, Infallible>(Event::default()
            .event("summary")
            .json_data(&text)
            .unwrap_or_default())
    });
    let done = stream::once(async { Ok::<_, Infallible>(Event::default().event("done").data("")) });

    Sse::new(updates.chain(done)).keep_alive(KeepAlive::default())
}

/// Unsafe URLs get a 400 here before any work starts. The fetcher checks
/// the URL again on its own, so each accepted request resolves the host
/// twice.
async fn summarize_handler(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> impl IntoResponse {
    tracing::info!(url = %req.url, model = %state.config.llm_model, "processing summary request");
    let start_time = std::time::Instant::now();

    if let Err(rejection) = state.validator.check(&req.url).await {
        tracing::info!(url = %req.url, %rejection, "rejected URL");
        return response::from_error::<SummarizeResponse>(&AppError::from(rejection));
    }

    let mut updates = state.summarizer.summarize(&req.url);
    let mut summary = String::new();
    while let Some(update) = updates.next().await {
        summary = update;
    }
    tracing::info!(url = %req.url, elapsed = ?start_time.elapsed(), "summary request finished");

    if let Some(message) = summary.strip_prefix(ERROR_TAG) {
        return response::error::<SummarizeResponse>(StatusCode::BAD_GATEWAY, message.trim().to_string());
    }

    let word_count = summary.split_whitespace().count();
    response::success(SummarizeResponse {
        url: req.url,
        summary,
        scraped_at: Utc::now(),
        word_count,
        status: "success".to_string(),
    })
}

async fn page_handler(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> impl IntoResponse {
    match state.summarizer.fetcher().fetch(&query.url).await {
        Ok(FetchOutcome::Loaded(record)) => response::success(PageResponse {
            record,
            load_error: None,
        }),
        Ok(FetchOutcome::Degraded { record, reason }) => response::success(PageResponse {
            record,
            load_error: Some(reason),
        }),
        Err(err) => {
            tracing::warn!(url = %query.url, error = %err, "page fetch failed");
            response::from_error(&err)
        }
    }
}
