//! Headless browser page fetching for JS-heavy pages.
//!
//! Feature-gated (`render`) implementation of [`PageFetcher`] using
//! chromiumoxide for headless Chrome/Chromium control. The page title and
//! `document.body.innerText` are read after navigation settles.
//!
//! Every fetch opens its own tab and closes it again, whether the fetch
//! succeeded, failed or timed out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;

use crate::fetch::{FetchError, FetchedPage, PageFetcher, parse_http_url};

/// Headless Chrome/Chromium page fetcher.
pub struct HeadlessPageFetcher {
    browser: Browser,
    timeout: Duration,
}

impl HeadlessPageFetcher {
    /// Launch a headless browser instance.
    ///
    /// The browser uses a background task to handle Chrome DevTools Protocol
    /// events for as long as it lives.
    pub async fn launch(timeout: Duration) -> Result<Self, FetchError> {
        let config = BrowserConfig::builder().build().map_err(FetchError::Render)?;
        let (browser, mut handler) =
            Browser::launch(config).await.map_err(|e| FetchError::Render(format!("browser launch failed: {e}")))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                    break;
                }
            }
        });

        Ok(Self { browser, timeout })
    }

    async fn open_tab(&self) -> Result<Page, FetchError> {
        tokio::time::timeout(self.timeout, self.browser.new_page("about:blank"))
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| FetchError::Render(format!("tab creation failed: {e}")))
    }

    #[cfg(test)]
    async fn open_tabs(&self) -> usize {
        self.browser.pages().await.map(|pages| pages.len()).unwrap_or_default()
    }
}

async fn read_page(page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
    page.goto(url).await.map_err(|e| FetchError::Render(format!("navigation failed: {e}")))?;

    let title = page
        .get_title()
        .await
        .map_err(|e| FetchError::Render(format!("title retrieval failed: {e}")))?
        .unwrap_or_default();

    let text = page
        .evaluate("document.body ? document.body.innerText : ''")
        .await
        .map_err(|e| FetchError::Render(format!("text retrieval failed: {e}")))?
        .into_value::<String>()
        .map_err(|e| FetchError::Render(format!("text was not a string: {e}")))?;

    Ok(FetchedPage { title, text })
}

#[async_trait]
impl PageFetcher for HeadlessPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let url = parse_http_url(url)?;
        let start = Instant::now();

        let tab = self.open_tab().await?;
        let result = match tokio::time::timeout(self.timeout, read_page(&tab, url.as_str())).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };
        if let Err(e) = tab.close().await {
            tracing::warn!("failed to close tab for {url}: {e}");
        }

        let page = result?;
        tracing::debug!("rendered {} in {}ms ({} chars of text)", url, start.elapsed().as_millis(), page.text.len());
        Ok(page)
    }
}
