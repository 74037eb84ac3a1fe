use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Deserialize)]
pub struct SummarizeRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct SummarizeResponse {
    pub url: String,
    #[serde(rename = "summary_markdown")]
    pub summary: String,
    pub scraped_at: DateTime<Utc>,
    pub word_count: usize,
    pub status: String,
}

#[derive(Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

#[derive(Serialize)]
pub struct PageResponse {
    #[serde(flatten)]
    pub record: crate::scraper::PageRecord,
    /// Why loading failed, when the record holds placeholder values.
    pub load_error: Option<String>,
}
