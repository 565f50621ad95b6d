//! Headless browser rendering.
//!
//! The strategy delegates to a [`PageRenderer`] capability. A Chromium
//! renderer is available behind the `chromium` feature; without a renderer
//! the strategy reports `strategy-unavailable`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::{FetchConfig, FetchTarget};
use crate::error::{FetchError, FetchResult};
use crate::types::{ExtractionAttempt, StrategyKind};

/// Loads a URL in a browser engine and returns the rendered document.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `url`, failing with [`FetchError::RenderTimeout`] when the page
    /// does not settle within `timeout`.
    async fn render(&self, url: &str, user_agent: &str, timeout: Duration) -> FetchResult<String>;

    fn name(&self) -> &str;
}

pub struct HeadlessRenderStrategy {
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl HeadlessRenderStrategy {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self {
            renderer: Some(renderer),
        }
    }

    /// Slot with no backend; every fetch reports `strategy-unavailable`.
    pub fn unavailable() -> Self {
        Self { renderer: None }
    }

    pub(crate) async fn fetch(&self, target: &FetchTarget, config: &FetchConfig) -> ExtractionAttempt {
        let started = Instant::now();
        let Some(renderer) = &self.renderer else {
            return ExtractionAttempt::failed(
                StrategyKind::HeadlessRender,
                FetchError::Unavailable("no headless renderer configured".to_string()),
                0,
            );
        };

        debug!(url = %target.url, renderer = renderer.name(), "Rendering page");
        let result = renderer
            .render(target.url.as_str(), &config.user_agent, config.render_timeout)
            .await;
        let elapsed = started.elapsed().as_millis() as u64;

        match result {
            Ok(html) => ExtractionAttempt::content(StrategyKind::HeadlessRender, html, elapsed),
            Err(e) => ExtractionAttempt::failed(StrategyKind::HeadlessRender, e, elapsed),
        }
    }
}

#[cfg(feature = "chromium")]
mod chromium {
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use tracing::warn;

    use super::PageRenderer;
    use crate::error::{FetchError, FetchResult};

    /// Renderer backed by a headless Chromium instance.
    pub struct ChromiumRenderer {
        browser: Browser,
    }

    impl ChromiumRenderer {
        /// Launch a headless Chromium found on the system.
        pub async fn launch(user_agent: &str) -> FetchResult<Self> {
            let config = BrowserConfig::builder()
                .arg(format!("--user-agent={user_agent}"))
                .arg("--headless=new")
                .arg("--disable-gpu")
                .arg("--no-sandbox")
                .arg("--disable-dev-shm-usage")
                .build()
                .map_err(FetchError::Unavailable)?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| FetchError::Unavailable(format!("failed to launch Chromium: {e}")))?;

            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        warn!(error = %e, "Chromium handler error");
                    }
                }
            });

            Ok(Self { browser })
        }
    }

    #[async_trait]
    impl PageRenderer for ChromiumRenderer {
        // User agent is fixed at browser launch
        async fn render(&self, url: &str, _user_agent: &str, timeout: Duration) -> FetchResult<String> {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| FetchError::Network(format!("failed to open page: {e}")))?;

            let navigation = tokio::time::timeout(timeout, async {
                page.goto(url).await?;
                page.wait_for_navigation().await?;
                page.content().await
            })
            .await;

            let _ = page.close().await;

            match navigation {
                Ok(Ok(html)) => Ok(html),
                Ok(Err(e)) => Err(FetchError::Network(format!("navigation failed: {e}"))),
                Err(_) => Err(FetchError::RenderTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        }

        fn name(&self) -> &str {
            "chromium"
        }
    }
}

#[cfg(feature = "chromium")]
pub use chromium::ChromiumRenderer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use url::Url;

    struct SlowRenderer;

    #[async_trait]
    impl PageRenderer for SlowRenderer {
        async fn render(&self, _url: &str, _ua: &str, timeout: Duration) -> FetchResult<String> {
            Err(FetchError::RenderTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn target() -> FetchTarget {
        FetchTarget::new(Url::parse("https://example.com/t").unwrap(), "statistics", "t1")
    }

    #[tokio::test]
    async fn test_render_timeout_is_transient() {
        let strategy = HeadlessRenderStrategy::new(Arc::new(SlowRenderer));
        let attempt = strategy.fetch(&target(), &FetchConfig::default()).await;

        let error = attempt.fetch_error().unwrap();
        assert_eq!(error.reason(), FailureReason::RenderTimeout);
        assert!(error.is_transient());
        assert_eq!(attempt.strategy_used, StrategyKind::HeadlessRender);
    }

    #[tokio::test]
    async fn test_unavailable_without_renderer() {
        let attempt = HeadlessRenderStrategy::unavailable()
            .fetch(&target(), &FetchConfig::default())
            .await;

        assert_eq!(
            attempt.fetch_error().unwrap().reason(),
            FailureReason::StrategyUnavailable
        );
    }
}
