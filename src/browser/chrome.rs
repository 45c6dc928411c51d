//! headless_chrome 引擎实现
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium（连接外部实例时不需要本地安装）。
//! headless_chrome 是同步 API，所有调用都放进 spawn_blocking。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;

use super::engine::{BrowserEngine, BrowserError, BrowserLaunchOptions, BrowserLauncher, BrowserPage};

/// 无事件时 headless_chrome 默认 30s 断开连接，会话可能长时间空闲
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

async fn blocking<T, F>(f: F) -> Result<T, BrowserError>
where
    F: FnOnce() -> Result<T, BrowserError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrowserError::Action(format!("Task join: {}", e)))?
}

/// 启动本地 Chrome 或连接远程调试端点
#[derive(Debug, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(
        &self,
        options: &BrowserLaunchOptions,
    ) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        let headless = options.headless;
        let executable = options.executable.clone();
        let browser = blocking(move || {
            let launch_options = LaunchOptions::default_builder()
                .headless(headless)
                .path(executable)
                .idle_browser_timeout(IDLE_TIMEOUT)
                .build()
                .map_err(|e| BrowserError::LaunchFailure(format!("Invalid launch options: {}", e)))?;
            Browser::new(launch_options)
                .map_err(|e| BrowserError::LaunchFailure(format!("Chrome launch failed: {}", e)))
        })
        .await?;
        tracing::info!(pid = ?browser.get_process_id(), headless, "chrome launched");
        Ok(Arc::new(ChromeEngine::new(browser, None)))
    }

    async fn attach(&self, endpoint: &str) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        let ws_url = endpoint.to_string();
        let browser = blocking(move || {
            Browser::connect(ws_url)
                .map_err(|e| BrowserError::LaunchFailure(format!("Chrome connect failed: {}", e)))
        })
        .await?;
        tracing::info!(endpoint = %endpoint, "attached to running chrome");
        Ok(Arc::new(ChromeEngine::new(browser, Some(endpoint.to_string()))))
    }
}

/// 一个 Chrome 实例；shutdown 时释放 Browser（自己启动的进程随之退出）
pub struct ChromeEngine {
    browser: Arc<RwLock<Option<Browser>>>,
    endpoint: Option<String>,
}

impl ChromeEngine {
    fn new(browser: Browser, endpoint: Option<String>) -> Self {
        Self {
            browser: Arc::new(RwLock::new(Some(browser))),
            endpoint,
        }
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    fn endpoint(&self) -> Option<String> {
        self.endpoint.clone()
    }

    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        let browser_arc = Arc::clone(&self.browser);
        let tab = blocking(move || {
            let guard = browser_arc
                .read()
                .map_err(|e| BrowserError::Crash(e.to_string()))?;
            let browser = guard
                .as_ref()
                .ok_or_else(|| BrowserError::Crash("browser already shut down".to_string()))?;
            browser
                .new_tab()
                .map_err(|e| BrowserError::Crash(format!("Browser tab failed: {}", e)))
        })
        .await?;
        Ok(Arc::new(ChromePage { tab }))
    }

    async fn is_alive(&self) -> bool {
        let browser_arc = Arc::clone(&self.browser);
        blocking(move || {
            let guard = browser_arc
                .read()
                .map_err(|e| BrowserError::Crash(e.to_string()))?;
            Ok(guard
                .as_ref()
                .map(|b| b.get_version().is_ok())
                .unwrap_or(false))
        })
        .await
        .unwrap_or(false)
    }

    async fn shutdown(&self) {
        let browser_arc = Arc::clone(&self.browser);
        let result = blocking(move || {
            let mut guard = browser_arc
                .write()
                .map_err(|e| BrowserError::Crash(e.to_string()))?;
            drop(guard.take());
            Ok(())
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "chrome shutdown failed");
        }
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)
                .map_err(|e| BrowserError::Action(format!("Navigate failed: {}", e)))?;
            tab.wait_until_navigated()
                .map_err(|e| BrowserError::Action(format!("Page load failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn content(&self) -> Result<String, BrowserError> {
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.get_content()
                .map_err(|e| BrowserError::Action(format!("Get content failed: {}", e)))
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let tab = Arc::clone(&self.tab);
        let script = script.to_string();
        blocking(move || {
            let result = tab
                .evaluate(&script, true)
                .map_err(|e| BrowserError::Action(format!("Evaluate failed: {}", e)))?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn close(&self) {
        let tab = Arc::clone(&self.tab);
        if let Err(e) = blocking(move || {
            tab.close(true)
                .map_err(|e| BrowserError::Action(e.to_string()))
        })
        .await
        {
            tracing::debug!(error = %e, "tab close failed");
        }
    }
}
