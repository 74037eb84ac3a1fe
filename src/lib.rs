pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod scraper;
pub mod summarizer;
pub mod validator;

use std::sync::Arc;
use config::Config;
use summarizer::Summarizer;
use validator::UrlValidator;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub summarizer: Arc<Summarizer>,
    pub validator: UrlValidator,
}

impl AppState {
    /// Wire the production pipeline: DNS-backed validation, headless
    /// Chromium fetching and the configured chat endpoint.
    pub fn new(config: Config) -> Self {
        let validator = UrlValidator::default();
        let fetcher = browser::BrowserFetcher::new(validator.clone())
            .with_chrome_path(config.chrome_path.clone());
        let llm = llm::ChatClient::new(
            config.llm_base_url.clone(),
            config.api_key.clone(),
            config.llm_model.clone(),
        );

        Self {
            config: Arc::new(config),
            summarizer: Arc::new(Summarizer::new(Arc::new(fetcher), llm)),
            validator,
        }
    }
}
