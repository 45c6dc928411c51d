//! Mock 浏览器引擎（用于测试，无需安装 Chrome）
//!
//! 记录启动/连接次数，可注入启动失败、启动延迟与进程死亡，便于验证单飞与恢复逻辑。
//! 以 `slow://` 开头的 URL 会让导航挂起，用于触发页面操作超时。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::engine::{BrowserEngine, BrowserError, BrowserLaunchOptions, BrowserLauncher, BrowserPage};

/// 可编程的 Mock 启动器
#[derive(Default)]
pub struct MockLauncher {
    launches: AtomicUsize,
    attaches: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicUsize,
    engines: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次启动前等待的时间，用于让并发调用堆积在同一次启动上
    pub fn with_delay(self, delay: Duration) -> Self {
        self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// 实际启动新进程的次数
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// 最近一次成功创建的引擎
    pub fn last_engine(&self) -> Option<Arc<MockEngine>> {
        self.engines.lock().ok().and_then(|e| e.last().cloned())
    }

    async fn start(&self, endpoint: String) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrowserError::LaunchFailure("mock launcher set to fail".to_string()));
        }
        let engine = Arc::new(MockEngine::new(endpoint));
        if let Ok(mut engines) = self.engines.lock() {
            engines.push(Arc::clone(&engine));
        }
        Ok(engine)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(
        &self,
        _options: &BrowserLaunchOptions,
    ) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        self.start(format!("ws://mock/devtools/browser/{}", n)).await
    }

    async fn attach(&self, endpoint: &str) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.start(endpoint.to_string()).await
    }
}

/// Mock 引擎进程
pub struct MockEngine {
    endpoint: String,
    alive: Arc<AtomicBool>,
    pages_opened: AtomicUsize,
    shut_down: AtomicBool,
}

impl MockEngine {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            alive: Arc::new(AtomicBool::new(true)),
            pages_opened: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// 模拟进程崩溃
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    fn endpoint(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }

    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(BrowserError::Crash("mock engine is dead".to_string()));
        }
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockPage::new(Arc::clone(&self.alive))))
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Mock 页面：记住当前 URL，content 返回包含 URL 的简单 HTML；引擎死亡后所有操作报 Crash
pub struct MockPage {
    url: Mutex<String>,
    engine_alive: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl MockPage {
    fn new(engine_alive: Arc<AtomicBool>) -> Self {
        Self {
            url: Mutex::new(String::new()),
            engine_alive,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> Result<(), BrowserError> {
        if self.engine_alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrowserError::Crash("target closed".to_string()))
        }
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.check_alive()?;
        if url.starts_with("slow://") {
            std::future::pending::<()>().await;
        }
        let mut current = self
            .url
            .lock()
            .map_err(|e| BrowserError::Action(e.to_string()))?;
        *current = url.to_string();
        Ok(())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.check_alive()?;
        let url = self
            .url
            .lock()
            .map_err(|e| BrowserError::Action(e.to_string()))?
            .clone();
        Ok(format!(
            "<html><head><title>Mock</title></head><body><p>Mock page at {}</p></body></html>",
            url
        ))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.check_alive()?;
        if script.contains("location.href") {
            let url = self
                .url
                .lock()
                .map_err(|e| BrowserError::Action(e.to_string()))?
                .clone();
            return Ok(Value::String(url));
        }
        Ok(Value::String(format!("evaluated: {}", script)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
