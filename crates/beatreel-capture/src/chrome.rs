//! Headless Chromium surface via `chromiumoxide`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use beatreel_models::{RenderParams, ResolutionProfile};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::surface::{CaptureSurface, SurfaceLauncher};

/// Launches one Chromium process per job.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: Arc<CaptureConfig>,
}

impl ChromeLauncher {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn browser_config(&self, resolution: ResolutionProfile, profile: &TempDir) -> CaptureResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .viewport(Viewport {
                width: resolution.width,
                height: resolution.height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .window_size(resolution.width, resolution.height)
            .request_timeout(self.config.navigation_timeout)
            .user_data_dir(profile.path())
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .arg("--autoplay-policy=no-user-gesture-required");

        if let Some(path) = &self.config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }

        builder.build().map_err(CaptureError::Launch)
    }
}

/// Visualizer URL in rendering mode for a given frame size.
pub fn render_url(base: &str, resolution: ResolutionProfile) -> CaptureResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| CaptureError::Navigation(format!("invalid visualizer URL {}: {}", base, e)))?;
    url.query_pairs_mut()
        .append_pair("render", "1")
        .append_pair("width", &resolution.width.to_string())
        .append_pair("height", &resolution.height.to_string());
    Ok(url)
}

#[async_trait]
impl SurfaceLauncher for ChromeLauncher {
    async fn launch(&self, resolution: ResolutionProfile) -> CaptureResult<Box<dyn CaptureSurface>> {
        let url = render_url(&self.config.visualizer_url, resolution)?;
        let profile = TempDir::new()?;
        let browser_config = self.browser_config(resolution, &profile)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CaptureError::Launch(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let mut surface = ChromeSurface {
            browser,
            page: None,
            target: None,
            handler_task,
            _profile: profile,
            config: Arc::clone(&self.config),
        };

        if let Err(e) = surface.navigate(&url).await {
            if let Err(close_err) = surface.close().await {
                warn!("Failed to close browser after navigation error: {}", close_err);
            }
            return Err(e);
        }

        debug!(url = %url, resolution = %resolution, "Visualizer page opened");
        Ok(Box::new(surface))
    }
}

/// A browser process, its single page and the resolved capture target.
pub struct ChromeSurface {
    browser: Browser,
    page: Option<Page>,
    target: Option<Element>,
    handler_task: JoinHandle<()>,
    /// Per-job profile directory, removed on drop
    _profile: TempDir,
    config: Arc<CaptureConfig>,
}

impl ChromeSurface {
    async fn navigate(&mut self, url: &Url) -> CaptureResult<()> {
        let open = async {
            let page = self.browser.new_page(url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(page)
        };

        let page = tokio::time::timeout(self.config.navigation_timeout, open)
            .await
            .map_err(|_| {
                CaptureError::Navigation(format!(
                    "{} did not load within {}s",
                    url,
                    self.config.navigation_timeout.as_secs()
                ))
            })?
            .map_err(|e| CaptureError::Navigation(format!("{}: {}", url, e)))?;

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> CaptureResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| CaptureError::script("page is not open"))
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> CaptureResult<T> {
        self.page()?
            .evaluate_expression(script)
            .await
            .map_err(|e| CaptureError::script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| CaptureError::script(e.to_string()))
    }

    fn counter_expr(&self) -> String {
        // JSON string literals are valid JS string literals
        let name = serde_json::Value::from(self.config.frame_counter.as_str());
        format!("Number(window[{}] || 0)", name)
    }
}

#[async_trait]
impl CaptureSurface for ChromeSurface {
    async fn wait_until_ready(&mut self, timeout: Duration) -> CaptureResult<bool> {
        let script = format!(
            r#"
            (async () => {{
              const deadline = Date.now() + {ms};
              while (typeof window.renderFrame !== "function") {{
                if (Date.now() > deadline) return false;
                await new Promise(resolve => setTimeout(resolve, 50));
              }}
              return true;
            }})()
            "#,
            ms = timeout.as_millis()
        );
        self.eval::<bool>(script).await
    }

    async fn locate_target(&mut self) -> CaptureResult<()> {
        let selector = self.config.selector.clone();
        let element = self
            .page()?
            .find_element(selector.clone())
            .await
            .map_err(|_| CaptureError::TargetMissing { selector })?;
        self.target = Some(element);
        Ok(())
    }

    async fn frame_counter(&mut self) -> CaptureResult<u64> {
        let value = self.eval::<f64>(self.counter_expr()).await?;
        Ok(value.max(0.0) as u64)
    }

    async fn render_frame(&mut self, time: f64, params: &RenderParams) -> CaptureResult<()> {
        let params = serde_json::to_string(params).map_err(|e| CaptureError::script(e.to_string()))?;
        let script = format!(
            r#"
            (() => {{
              const result = window.renderFrame({time}, {params});
              if (result && typeof result.catch === "function") {{
                result.catch(err => console.error("renderFrame failed", err));
              }}
              return true;
            }})()
            "#
        );
        self.eval::<bool>(script).await.map(|_| ())
    }

    async fn wait_for_counter_above(&mut self, baseline: u64, timeout: Duration) -> CaptureResult<Option<u64>> {
        let script = format!(
            r#"
            (async () => {{
              const deadline = Date.now() + {ms};
              const read = () => {counter};
              while (read() <= {baseline}) {{
                if (Date.now() > deadline) return -1;
                await new Promise(resolve => setTimeout(resolve, 4));
              }}
              return read();
            }})()
            "#,
            ms = timeout.as_millis(),
            counter = self.counter_expr(),
        );
        let value = self.eval::<f64>(script).await?;
        Ok((value >= 0.0).then_some(value as u64))
    }

    async fn capture_target(&mut self, path: &Path) -> CaptureResult<()> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| CaptureError::screenshot("capture target was not located"))?;
        target
            .save_screenshot(CaptureScreenshotFormat::Png, path)
            .await
            .map_err(|e| CaptureError::screenshot(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> CaptureResult<()> {
        self.target = None;
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {}", e);
            }
        }

        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| CaptureError::Teardown(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit failed: {}", e);
        }
        self.handler_task.abort();
        closed
    }
}

impl Drop for ChromeSurface {
    fn drop(&mut self) {
        // Browser's own Drop kills the child process if close() never ran.
        self.handler_task.abort();
    }
}
