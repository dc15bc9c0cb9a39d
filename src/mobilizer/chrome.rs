use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::{OnceCell, Semaphore};
use tracing::info;

use crate::app::{FlaxfeedError, Result};
use crate::mobilizer::{ContentExtractor, Mobilizer, MobilizerConfig};

fn mobilizer_error(context: &str, e: impl std::fmt::Display) -> FlaxfeedError {
    FlaxfeedError::Mobilizer(format!("{}: {}", context, e))
}

/// Headless Chrome via chromiumoxide. The browser is launched on the first
/// extraction, not at construction.
pub struct ChromeMobilizer {
    config: MobilizerConfig,
    extractor: ContentExtractor,
    browser: OnceCell<Arc<Browser>>,
    pages: Semaphore,
}

impl ChromeMobilizer {
    pub fn new(config: MobilizerConfig) -> Self {
        Self {
            extractor: ContentExtractor::new(&config),
            pages: Semaphore::new(config.max_concurrency.max(1)),
            browser: OnceCell::new(),
            config,
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>> {
        let browser = self
            .browser
            .get_or_try_init(|| async {
                let mut builder = BrowserConfig::builder()
                    .arg("--no-sandbox")
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage")
                    .request_timeout(self.config.timeout());
                if !self.config.headless {
                    builder = builder.with_head();
                }
                let browser_config = builder
                    .build()
                    .map_err(|e| mobilizer_error("invalid browser config", e))?;

                let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
                    mobilizer_error("failed to launch Chrome (is it installed and in PATH?)", e)
                })?;
                tokio::spawn(async move { while handler.next().await.is_some() {} });

                info!("Launched headless browser for full-text extraction");
                Ok::<_, FlaxfeedError>(Arc::new(browser))
            })
            .await?;
        Ok(browser.clone())
    }
}

#[async_trait]
impl Mobilizer for ChromeMobilizer {
    async fn extract(&self, url: &str) -> Result<String> {
        let _permit = self
            .pages
            .acquire()
            .await
            .map_err(|e| mobilizer_error("page pool closed", e))?;
        let browser = self.browser().await?;

        let page = browser
            .new_page(url)
            .await
            .map_err(|e| mobilizer_error("failed to open page", e))?;

        let extracted = async {
            if let Some(ref ua) = self.config.user_agent {
                page.set_user_agent(ua)
                    .await
                    .map_err(|e| mobilizer_error("failed to set user agent", e))?;
            }
            page.wait_for_navigation()
                .await
                .map_err(|e| mobilizer_error("navigation failed", e))?;
            tokio::time::sleep(self.config.wait_after_load()).await;

            let value: serde_json::Value = page
                .evaluate(self.extractor.extraction_script())
                .await
                .map_err(|e| mobilizer_error("extraction script failed", e))?
                .into_value()
                .map_err(|e| mobilizer_error("unexpected script result", e))?;
            self.extractor.parse_result(&value)
        }
        .await;

        let _ = page.close().await;
        extracted
    }
}
