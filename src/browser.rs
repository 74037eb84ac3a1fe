//! Headless browser page loading.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{AppError, Result};
use crate::scraper::PageRecord;
use crate::validator::UrlValidator;

pub const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra Chromium flags on top of headless + no-sandbox.
const BROWSER_ARGS: [&str; 4] = [
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-blink-features=AutomationControlled",
];

/// Result of fetching a page that passed validation.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Loaded(PageRecord),
    /// The page failed to load; `record` holds placeholder values.
    Degraded { record: PageRecord, reason: String },
}

impl FetchOutcome {
    pub fn record(&self) -> &PageRecord {
        match self {
            FetchOutcome::Loaded(record) | FetchOutcome::Degraded { record, .. } => record,
        }
    }

    pub fn into_record(self) -> PageRecord {
        match self {
            FetchOutcome::Loaded(record) | FetchOutcome::Degraded { record, .. } => record,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, FetchOutcome::Degraded { .. })
    }
}

/// Source of scraped pages.
///
/// Errors are reserved for URLs that must not be fetched at all and for
/// infrastructure failures; a page that fails to load is a
/// [`FetchOutcome::Degraded`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome>;
}

/// Opens rendering sessions for [`BrowserFetcher`].
///
/// A failed `launch` aborts the fetch. A failed [`RenderSession::render`]
/// degrades it to a placeholder record.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn launch(&self, load_timeout: Duration) -> Result<Box<dyn RenderSession>>;
}

/// One live renderer; `close` is always called once rendering is done.
#[async_trait]
pub trait RenderSession: Send {
    async fn render(&mut self, url: &str, limit: Duration) -> Result<String>;
    async fn close(&mut self);
}

/// Headless Chromium, one process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    chrome_path: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }

    fn browser_config(&self, load_timeout: Duration) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .args(BROWSER_ARGS)
            .request_timeout(load_timeout);

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| AppError::BrowserError(format!("Invalid browser config: {e}")))
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn launch(&self, load_timeout: Duration) -> Result<Box<dyn RenderSession>> {
        let session = BrowserSession::launch(self.browser_config(load_timeout)?).await?;
        Ok(Box::new(session))
    }
}

/// Loads pages in a fresh headless Chromium per call.
///
/// Only the requested URL is validated. Redirects Chromium follows during
/// navigation are not re-checked, so a public page that redirects into
/// private address space is still loaded.
#[derive(Clone)]
pub struct BrowserFetcher {
    validator: UrlValidator,
    renderer: Arc<dyn PageRenderer>,
    page_load_timeout: Duration,
}

impl Default for BrowserFetcher {
    fn default() -> Self {
        Self::new(UrlValidator::default())
    }
}

impl BrowserFetcher {
    pub fn new(validator: UrlValidator) -> Self {
        Self {
            validator,
            renderer: Arc::new(ChromiumRenderer::default()),
            page_load_timeout: PAGE_LOAD_TIMEOUT,
        }
    }

    pub fn with_chrome_path(self, path: Option<PathBuf>) -> Self {
        self.with_renderer(Arc::new(ChromiumRenderer::new(path)))
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Load a URL that has already passed validation.
    async fn load(&self, url: &str, checked: &Url) -> Result<FetchOutcome> {
        tracing::info!(url, "launching headless browser");
        let mut session = self.renderer.launch(self.page_load_timeout).await?;
        let rendered = session.render(checked.as_str(), self.page_load_timeout).await;
        session.close().await;

        let outcome = match rendered {
            Ok(html) => {
                tracing::debug!(url, bytes = html.len(), "page rendered");
                FetchOutcome::Loaded(PageRecord::from_html(url, &html, &self.validator).await)
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "Error loading page with browser");
                FetchOutcome::Degraded {
                    record: PageRecord::placeholder(url),
                    reason: err.to_string(),
                }
            }
        };

        Ok(outcome)
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        let checked = self.validator.check(url).await?;
        self.load(url, &checked).await
    }
}

/// One Chromium process and the task driving its CDP connection.
///
/// `close` is the normal exit; dropping the session instead still
/// stops the handler task and lets `Browser`'s own drop kill the process.
struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The handler must be polled for any CDP command to complete.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler,
        })
    }

    async fn render_page(&self, url: &str, limit: Duration) -> Result<String> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| AppError::BrowserError("browser already shut down".to_string()))?;

        let load = async {
            let page = browser.new_page("about:blank").await?;
            page.goto(url).await?;
            let html = page.content().await?;
            Ok::<_, AppError>(html)
        };

        match tokio::time::timeout(limit, load).await {
            Ok(result) => result,
            Err(_) => Err(AppError::FetchError(format!(
                "page load timed out after {} seconds",
                limit.as_secs()
            ))),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "browser close failed, killing process");
                if let Some(Err(e)) = browser.kill().await {
                    tracing::warn!(error = %e, "failed to kill browser process");
                }
            }
            if let Err(e) = browser.wait().await {
                tracing::debug!(error = %e, "waiting for browser exit failed");
            }
        }
        self.handler.abort();
    }
}

#[async_trait]
impl RenderSession for BrowserSession {
    async fn render(&mut self, url: &str, limit: Duration) -> Result<String> {
        self.render_page(url, limit).await
    }

    async fn close(&mut self) {
        self.shutdown().await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
