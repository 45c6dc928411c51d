//! 浏览器会话管理器
//!
//! 持有至多一个引擎进程，以及 会话 ID -> 页面 的映射。
//!
//! ## 状态机
//!
//! ```text
//! uninitialized --discover/launch--> launching --ok--> ready --crash--> crashed --recover--> launching
//! ready --最后一个会话关闭 / shutdown--> uninitialized
//! ```
//!
//! ## 并发
//!
//! - 启动与恢复是单飞的：第一个调用者把进行中的 future（`Shared`）放进状态锁，
//!   后来者克隆它并等待同一个结果，因此不会出现两个引擎进程或两次并行恢复。
//! - 页面句柄记录签发时的引擎代（generation）；崩溃、恢复、关闭都会让代号 +1，
//!   所有旧句柄在同一时刻失效。
//! - 锁顺序固定为 core -> sessions；持有 sessions 时不会再获取 core。

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::discovery::discover_endpoint;
use super::engine::{BrowserEngine, BrowserError, BrowserLaunchOptions, BrowserLauncher, BrowserPage};
use crate::config::BrowserSection;

/// 管理器级状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserState {
    Uninitialized,
    Discovering,
    Launching,
    Ready,
    Recovering,
    Crashed,
}

type Transition = Shared<BoxFuture<'static, Result<(), BrowserError>>>;

struct Core {
    state: BrowserState,
    engine: Option<Arc<dyn BrowserEngine>>,
    /// 进行中的启动或恢复
    in_flight: Option<Transition>,
    /// 自上次进入 ready 以来连续失败的恢复次数
    recovery_failures: u32,
}

struct PageEntry {
    page: Arc<dyn BrowserPage>,
    page_id: u64,
    generation: u64,
}

struct ManagerInner {
    launcher: Arc<dyn BrowserLauncher>,
    config: BrowserSection,
    core: Mutex<Core>,
    sessions: Mutex<HashMap<String, PageEntry>>,
    generation: Arc<AtomicU64>,
    next_page_id: AtomicU64,
}

/// 状态快照（供管理接口与日志展示）
#[derive(Debug, Clone, Serialize)]
pub struct BrowserStatus {
    pub state: BrowserState,
    pub endpoint: Option<String>,
    pub sessions: Vec<String>,
    pub generation: u64,
    pub recovery_failures: u32,
}

/// 某会话的页面句柄；引擎崩溃、恢复或关闭后失效
#[derive(Clone)]
pub struct PageHandle {
    session_id: String,
    page_id: u64,
    generation: u64,
    current: Arc<AtomicU64>,
    page: Arc<dyn BrowserPage>,
    timeout: Duration,
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("session_id", &self.session_id)
            .field("page_id", &self.page_id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl PageHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn page_id(&self) -> u64 {
        self.page_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    pub fn same_page(&self, other: &PageHandle) -> bool {
        self.page_id == other.page_id && self.generation == other.generation
    }

    fn check(&self) -> Result<(), BrowserError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(BrowserError::PageInvalidated(self.session_id.clone()))
        }
    }

    /// 超时即放弃等待；底层调用可能仍在阻塞线程上运行，调用方需通过 reset_session 丢弃该页面
    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T, BrowserError>>,
    ) -> Result<T, BrowserError> {
        self.check()?;
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout {
                op: op.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.bounded("navigate", self.page.navigate(url)).await
    }

    pub async fn content(&self) -> Result<String, BrowserError> {
        self.bounded("content", self.page.content()).await
    }

    pub async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.bounded("evaluate", self.page.evaluate(script)).await
    }
}

/// 浏览器会话管理器（廉价 Clone，内部共享同一份状态）
#[derive(Clone)]
pub struct BrowserSessionManager {
    inner: Arc<ManagerInner>,
}

impl BrowserSessionManager {
    pub fn new(config: BrowserSection, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                launcher,
                config,
                core: Mutex::new(Core {
                    state: BrowserState::Uninitialized,
                    engine: None,
                    in_flight: None,
                    recovery_failures: 0,
                }),
                sessions: Mutex::new(HashMap::new()),
                generation: Arc::new(AtomicU64::new(0)),
                next_page_id: AtomicU64::new(1),
            }),
        }
    }

    /// 使用编译期可用的默认启动器（headless_chrome 或占位实现）
    pub fn with_default_launcher(config: BrowserSection) -> Self {
        #[cfg(feature = "browser")]
        let launcher: Arc<dyn BrowserLauncher> = Arc::new(super::chrome::ChromeLauncher::new());
        #[cfg(not(feature = "browser"))]
        let launcher: Arc<dyn BrowserLauncher> = Arc::new(super::engine::DisabledLauncher);
        Self::new(config, launcher)
    }

    pub fn config(&self) -> &BrowserSection {
        &self.inner.config
    }

    pub async fn state(&self) -> BrowserState {
        self.inner.core.lock().await.state
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub async fn status(&self) -> BrowserStatus {
        let core = self.inner.core.lock().await;
        let sessions = self.inner.sessions.lock().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        BrowserStatus {
            state: core.state,
            endpoint: core.engine.as_ref().and_then(|e| e.endpoint()),
            sessions: ids,
            generation: self.inner.generation.load(Ordering::SeqCst),
            recovery_failures: core.recovery_failures,
        }
    }

    /// 探测外部已启动、可通过远程调试端口连接的引擎；不修改状态
    pub async fn discover_browser(&self) -> Option<String> {
        let cfg = &self.inner.config;
        discover_endpoint(&cfg.debug_host, &cfg.debug_ports, cfg.probe_timeout()).await
    }

    /// 启动或连接引擎（单飞）：已 ready 直接返回；已有进行中的启动/恢复则等待同一结果
    pub async fn launch_browser(&self, options: BrowserLaunchOptions) -> Result<(), BrowserError> {
        let transition = {
            let mut core = self.inner.core.lock().await;
            if let Some(t) = core.in_flight.clone() {
                t
            } else if core.state == BrowserState::Ready {
                return Ok(());
            } else {
                core.state = BrowserState::Launching;
                tracing::info!(attach = options.endpoint.is_some(), "launching browser");
                let inner = Arc::clone(&self.inner);
                self.begin(&mut core, false, async move { inner.open_engine(options).await })
            }
        };
        transition.await
    }

    /// ready 时无操作；未初始化则（可选发现后）启动；crashed 则恢复，恢复预算用完时改为一次全新启动
    pub async fn ensure_browser_ready(&self) -> Result<(), BrowserError> {
        let transition = {
            let mut core = self.inner.core.lock().await;
            if let Some(t) = core.in_flight.clone() {
                t
            } else {
                let state = core.state;
                let budget_left = core.recovery_failures < self.inner.config.max_recovery_attempts;
                match state {
                    BrowserState::Ready => return Ok(()),
                    BrowserState::Crashed if budget_left => {
                        drop(core);
                        return self.recover_browser().await;
                    }
                    _ => {
                        if state == BrowserState::Crashed {
                            // 恢复预算已用完：每次调用仍做一次全新启动，成功后预算清零
                            tracing::info!(
                                failures = core.recovery_failures,
                                "recovery budget exhausted, attempting fresh launch"
                            );
                        }
                        let discover = self.inner.config.discover_existing;
                        core.state = if discover {
                            BrowserState::Discovering
                        } else {
                            BrowserState::Launching
                        };
                        let inner = Arc::clone(&self.inner);
                        let options = self.default_options();
                        self.begin(&mut core, false, async move {
                            let options = if discover {
                                inner.discover_into(options).await
                            } else {
                                options
                            };
                            inner.open_engine(options).await
                        })
                    }
                }
            }
        };
        transition.await
    }

    /// 使所有页面句柄失效并尝试一次重启；连续失败超过预算后拒绝恢复
    /// （ensure_browser_ready 此时仍会全新启动，成功即清零预算）
    pub async fn recover_browser(&self) -> Result<(), BrowserError> {
        let transition = {
            let mut core = self.inner.core.lock().await;
            if let Some(t) = core.in_flight.clone() {
                t
            } else {
                let max = self.inner.config.max_recovery_attempts;
                if core.recovery_failures >= max {
                    tracing::error!(
                        failures = core.recovery_failures,
                        "browser recovery budget exhausted"
                    );
                    return Err(BrowserError::Crash(format!(
                        "recovery budget exhausted after {} failed attempts",
                        core.recovery_failures
                    )));
                }
                let old = core.engine.take();
                core.state = BrowserState::Recovering;
                let generation = self.inner.invalidate();
                tracing::warn!(generation, attempt = core.recovery_failures + 1, "recovering browser");

                let inner = Arc::clone(&self.inner);
                let discover = self.inner.config.discover_existing;
                let options = self.default_options();
                self.begin(&mut core, true, async move {
                    if let Some(old) = old {
                        inner.stop_engine(old).await;
                    }
                    let options = if discover {
                        inner.discover_into(options).await
                    } else {
                        options
                    };
                    inner.open_engine(options).await
                })
            }
        };
        self.inner.drop_stale_sessions().await;
        transition.await
    }

    /// 页面操作发现进程已死时调用：ready -> crashed，所有句柄失效
    pub async fn mark_crashed(&self, reason: &str) {
        let old = {
            let mut core = self.inner.core.lock().await;
            if core.in_flight.is_some() || core.state != BrowserState::Ready {
                return;
            }
            core.state = BrowserState::Crashed;
            let generation = self.inner.invalidate();
            tracing::warn!(generation, reason = %reason, "browser marked crashed");
            core.engine.take()
        };
        self.inner.drop_stale_sessions().await;
        if let Some(old) = old {
            self.inner.stop_engine(old).await;
        }
    }

    /// 引擎进程是否仍可响应（探测带超时）
    pub async fn is_responsive(&self) -> bool {
        let engine = self.inner.core.lock().await.engine.clone();
        match engine {
            Some(engine) => tokio::time::timeout(self.inner.config.probe_timeout(), engine.is_alive())
                .await
                .unwrap_or(false),
            None => false,
        }
    }

    /// 返回会话已有的页面，否则新建并登记；不同会话互不影响
    pub async fn get_or_create_page(&self, session_id: &str) -> Result<PageHandle, BrowserError> {
        self.ensure_browser_ready().await?;

        let (engine, generation) = {
            let core = self.inner.core.lock().await;
            match (&core.state, &core.engine) {
                (BrowserState::Ready, Some(engine)) => {
                    (Arc::clone(engine), self.inner.generation.load(Ordering::SeqCst))
                }
                (state, _) => {
                    return Err(BrowserError::Crash(format!(
                        "browser not ready (state {:?})",
                        state
                    )))
                }
            }
        };

        if let Some(entry) = self.inner.sessions.lock().await.get(session_id) {
            if entry.generation == generation {
                return Ok(self.handle(session_id, entry));
            }
        }

        // 新建页面期间不持有 sessions 锁，其他会话的 close / status 不被阻塞
        let timeout = self.inner.config.action_timeout();
        let page = match tokio::time::timeout(timeout, engine.new_page()).await {
            Ok(page) => page?,
            Err(_) => {
                return Err(BrowserError::Timeout {
                    op: "new_page".to_string(),
                    secs: timeout.as_secs(),
                })
            }
        };

        let mut sessions = self.inner.sessions.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            drop(sessions);
            let _ = tokio::time::timeout(self.inner.config.probe_timeout(), page.close()).await;
            return Err(BrowserError::PageInvalidated(session_id.to_string()));
        }
        if let Some(entry) = sessions.get(session_id) {
            if entry.generation == generation {
                // 并发的同会话调用已先登记页面，丢弃本次新建的
                let handle = self.handle(session_id, entry);
                drop(sessions);
                let _ = tokio::time::timeout(self.inner.config.probe_timeout(), page.close()).await;
                return Ok(handle);
            }
        }

        let entry = PageEntry {
            page,
            page_id: self.inner.next_page_id.fetch_add(1, Ordering::SeqCst),
            generation,
        };
        let handle = self.handle(session_id, &entry);
        sessions.insert(session_id.to_string(), entry);
        tracing::debug!(session = %session_id, page_id = handle.page_id, generation, "page created");
        Ok(handle)
    }

    /// 丢弃并关闭某会话卡住的页面（如操作超时），不触发恢复，也不关闭引擎
    pub async fn reset_session(&self, session_id: &str) -> bool {
        let entry = self.inner.sessions.lock().await.remove(session_id);
        match entry {
            Some(entry) => {
                tracing::info!(session = %session_id, "resetting session page");
                self.inner.close_page(entry).await;
                true
            }
            None => false,
        }
    }

    /// 释放一个会话的页面；最后一个会话关闭且配置 close_when_idle 时停止引擎
    pub async fn close(&self, session_id: &str) -> bool {
        let (entry, remaining) = {
            let mut sessions = self.inner.sessions.lock().await;
            let entry = sessions.remove(session_id);
            (entry, sessions.len())
        };
        let Some(entry) = entry else {
            return false;
        };
        self.inner.close_page(entry).await;
        tracing::debug!(session = %session_id, remaining, "session closed");

        if remaining == 0 && self.inner.config.close_when_idle {
            self.teardown_if_idle().await;
        }
        true
    }

    /// 显式全量关闭：关闭所有页面、停止引擎、重置恢复预算
    pub async fn shutdown(&self) {
        let pending = self.inner.core.lock().await.in_flight.clone();
        if let Some(t) = pending {
            let _ = t.await;
        }

        let (engine, pages) = {
            let mut core = self.inner.core.lock().await;
            let mut sessions = self.inner.sessions.lock().await;
            let pages: Vec<PageEntry> = sessions.drain().map(|(_, e)| e).collect();
            self.inner.invalidate();
            core.state = BrowserState::Uninitialized;
            core.recovery_failures = 0;
            (core.engine.take(), pages)
        };

        for entry in pages {
            self.inner.close_page(entry).await;
        }
        if let Some(engine) = engine {
            self.inner.stop_engine(engine).await;
        }
        tracing::info!("browser manager shut down");
    }

    async fn teardown_if_idle(&self) {
        let engine = {
            let mut core = self.inner.core.lock().await;
            let sessions = self.inner.sessions.lock().await;
            if !sessions.is_empty()
                || core.in_flight.is_some()
                || core.state != BrowserState::Ready
            {
                return;
            }
            self.inner.invalidate();
            core.state = BrowserState::Uninitialized;
            core.engine.take()
        };
        if let Some(engine) = engine {
            tracing::info!("no sessions left, stopping browser");
            self.inner.stop_engine(engine).await;
        }
    }

    fn default_options(&self) -> BrowserLaunchOptions {
        BrowserLaunchOptions {
            endpoint: None,
            headless: self.inner.config.headless,
            executable: self.inner.config.executable.clone(),
        }
    }

    fn handle(&self, session_id: &str, entry: &PageEntry) -> PageHandle {
        PageHandle {
            session_id: session_id.to_string(),
            page_id: entry.page_id,
            generation: entry.generation,
            current: Arc::clone(&self.inner.generation),
            page: Arc::clone(&entry.page),
            timeout: self.inner.config.action_timeout(),
        }
    }

    /// 登记一个进行中的状态转换；调用方必须持有 core 锁
    fn begin<F>(&self, core: &mut Core, recovering: bool, work: F) -> Transition
    where
        F: Future<Output = Result<Arc<dyn BrowserEngine>, BrowserError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let transition = async move {
            let result = work.await;
            inner.finish(result, recovering).await
        }
        .boxed()
        .shared();
        core.in_flight = Some(transition.clone());
        transition
    }
}

impl ManagerInner {
    /// 代号 +1，使所有已签发的页面句柄失效
    fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn discover_into(&self, mut options: BrowserLaunchOptions) -> BrowserLaunchOptions {
        if options.endpoint.is_none() {
            options.endpoint =
                discover_endpoint(&self.config.debug_host, &self.config.debug_ports, self.config.probe_timeout())
                    .await;
        }
        let mut core = self.core.lock().await;
        if core.state == BrowserState::Discovering {
            core.state = BrowserState::Launching;
        }
        options
    }

    async fn open_engine(
        &self,
        options: BrowserLaunchOptions,
    ) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        let timeout = self.config.launch_timeout();
        let attempt = async {
            match &options.endpoint {
                Some(endpoint) => self.launcher.attach(endpoint).await,
                None => self.launcher.launch(&options).await,
            }
        };
        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::LaunchFailure(format!(
                "engine did not become ready within {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn finish(
        &self,
        result: Result<Arc<dyn BrowserEngine>, BrowserError>,
        recovering: bool,
    ) -> Result<(), BrowserError> {
        let mut core = self.core.lock().await;
        core.in_flight = None;
        match result {
            Ok(engine) => {
                tracing::info!(
                    endpoint = ?engine.endpoint(),
                    generation = self.generation.load(Ordering::SeqCst),
                    recovered = recovering,
                    "browser ready"
                );
                core.engine = Some(engine);
                core.state = BrowserState::Ready;
                core.recovery_failures = 0;
                Ok(())
            }
            Err(e) => {
                core.engine = None;
                core.state = BrowserState::Crashed;
                if recovering {
                    core.recovery_failures += 1;
                }
                tracing::warn!(error = %e, recovering, "browser launch failed, parked in crashed");
                Err(e)
            }
        }
    }

    async fn drop_stale_sessions(&self) {
        let current = self.generation.load(Ordering::SeqCst);
        self.sessions
            .lock()
            .await
            .retain(|_, entry| entry.generation == current);
    }

    async fn close_page(&self, entry: PageEntry) {
        if entry.generation != self.generation.load(Ordering::SeqCst) {
            return;
        }
        if tokio::time::timeout(self.config.probe_timeout(), entry.page.close())
            .await
            .is_err()
        {
            tracing::debug!(page_id = entry.page_id, "page close timed out");
        }
    }

    async fn stop_engine(&self, engine: Arc<dyn BrowserEngine>) {
        if tokio::time::timeout(self.config.launch_timeout(), engine.shutdown())
            .await
            .is_err()
        {
            tracing::warn!("browser shutdown timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockLauncher;

    fn test_config() -> BrowserSection {
        BrowserSection {
            discover_existing: false,
            launch_timeout_secs: 5,
            action_timeout_secs: 1,
            probe_timeout_ms: 200,
            max_recovery_attempts: 2,
            ..BrowserSection::default()
        }
    }

    fn manager_with(launcher: Arc<MockLauncher>) -> BrowserSessionManager {
        BrowserSessionManager::new(test_config(), launcher)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_launch_starts_one_engine() {
        let launcher = Arc::new(MockLauncher::new().with_delay(Duration::from_millis(50)));
        let manager = manager_with(Arc::clone(&launcher));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move {
                m.launch_browser(BrowserLaunchOptions::default()).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(manager.state().await, BrowserState::Ready);
    }

    #[tokio::test]
    async fn test_same_session_same_page_distinct_sessions_distinct_pages() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        let a1 = manager.get_or_create_page("A").await.unwrap();
        let a2 = manager.get_or_create_page("A").await.unwrap();
        let b = manager.get_or_create_page("B").await.unwrap();

        assert!(a1.same_page(&a2));
        assert!(!a1.same_page(&b));
        assert_eq!(manager.session_count().await, 2);
        assert_eq!(launcher.last_engine().unwrap().pages_opened(), 2);
    }

    #[tokio::test]
    async fn test_sessions_keep_independent_navigation() {
        let manager = manager_with(Arc::new(MockLauncher::new()));
        let a = manager.get_or_create_page("A").await.unwrap();
        let b = manager.get_or_create_page("B").await.unwrap();

        a.navigate("https://a.example").await.unwrap();
        b.navigate("https://b.example").await.unwrap();

        assert!(a.content().await.unwrap().contains("a.example"));
        assert!(b.content().await.unwrap().contains("b.example"));
    }

    #[tokio::test]
    async fn test_recover_invalidates_handles_and_relaunches() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        let a = manager.get_or_create_page("A").await.unwrap();
        let b = manager.get_or_create_page("B").await.unwrap();
        launcher.last_engine().unwrap().kill();

        assert!(!manager.is_responsive().await);
        manager.mark_crashed("test kill").await;
        assert_eq!(manager.state().await, BrowserState::Crashed);
        assert!(!a.is_valid());
        assert!(!b.is_valid());
        assert!(matches!(
            a.navigate("https://x.example").await,
            Err(BrowserError::PageInvalidated(_))
        ));

        manager.recover_browser().await.unwrap();
        assert_eq!(manager.state().await, BrowserState::Ready);
        assert_eq!(launcher.launch_count(), 2);

        let a_new = manager.get_or_create_page("A").await.unwrap();
        assert!(a_new.is_valid());
        assert!(!a_new.same_page(&a));
    }

    #[tokio::test]
    async fn test_recover_from_ready_invalidates_all_handles() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));
        let a = manager.get_or_create_page("A").await.unwrap();
        let first_engine = launcher.last_engine().unwrap();

        manager.recover_browser().await.unwrap();

        assert!(!a.is_valid());
        assert!(first_engine.is_shut_down());
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_launch_failure_parks_in_crashed_then_ensure_recovers() {
        let launcher = Arc::new(MockLauncher::new());
        launcher.set_failing(true);
        let manager = manager_with(Arc::clone(&launcher));

        assert!(matches!(
            manager.ensure_browser_ready().await,
            Err(BrowserError::LaunchFailure(_))
        ));
        assert_eq!(manager.state().await, BrowserState::Crashed);

        launcher.set_failing(false);
        manager.ensure_browser_ready().await.unwrap();
        assert_eq!(manager.state().await, BrowserState::Ready);
    }

    #[tokio::test]
    async fn test_recovery_is_bounded() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));
        manager.ensure_browser_ready().await.unwrap();
        launcher.set_failing(true);

        assert!(manager.recover_browser().await.is_err());
        assert!(manager.recover_browser().await.is_err());
        let launches = launcher.launch_count();

        let err = manager.recover_browser().await.unwrap_err();
        assert!(err.to_string().contains("budget exhausted"));
        assert_eq!(launcher.launch_count(), launches);
        assert_eq!(manager.status().await.recovery_failures, 2);

        manager.shutdown().await;
        launcher.set_failing(false);
        manager.ensure_browser_ready().await.unwrap();
        assert_eq!(manager.state().await, BrowserState::Ready);
    }

    #[tokio::test]
    async fn test_ensure_relaunches_after_recovery_budget_exhausted() {
        let launcher = Arc::new(MockLauncher::new());
        launcher.set_failing(true);
        let manager = manager_with(Arc::clone(&launcher));

        for _ in 0..5 {
            assert!(manager.ensure_browser_ready().await.is_err());
        }
        assert_eq!(manager.state().await, BrowserState::Crashed);
        assert_eq!(manager.status().await.recovery_failures, 2);
        assert!(manager.recover_browser().await.is_err());

        launcher.set_failing(false);
        manager.ensure_browser_ready().await.unwrap();
        assert_eq!(manager.state().await, BrowserState::Ready);
        assert_eq!(manager.status().await.recovery_failures, 0);
        assert!(manager.get_or_create_page("A").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_page_creation_for_one_session_converges() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));
        manager.ensure_browser_ready().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.get_or_create_page("A").await }));
        }
        let mut pages = Vec::new();
        for h in handles {
            pages.push(h.await.unwrap().unwrap());
        }

        let current = manager.get_or_create_page("A").await.unwrap();
        assert!(pages.iter().all(|p| p.same_page(&current)));
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_last_session_stops_engine() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));
        manager.get_or_create_page("A").await.unwrap();
        manager.get_or_create_page("B").await.unwrap();
        let engine = launcher.last_engine().unwrap();

        assert!(manager.close("A").await);
        assert_eq!(manager.state().await, BrowserState::Ready);
        assert!(!engine.is_shut_down());

        assert!(manager.close("B").await);
        assert_eq!(manager.state().await, BrowserState::Uninitialized);
        assert!(engine.is_shut_down());
        assert!(!manager.close("B").await);
    }

    #[tokio::test]
    async fn test_slow_action_times_out_without_crash() {
        let manager = manager_with(Arc::new(MockLauncher::new()));
        let page = manager.get_or_create_page("A").await.unwrap();

        let err = page.navigate("slow://hang").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(manager.is_responsive().await);
        assert_eq!(manager.state().await, BrowserState::Ready);

        assert!(manager.reset_session("A").await);
        let fresh = manager.get_or_create_page("A").await.unwrap();
        assert!(!fresh.same_page(&page));
    }

    #[tokio::test]
    async fn test_launch_with_endpoint_attaches() {
        let launcher = Arc::new(MockLauncher::new());
        let manager = manager_with(Arc::clone(&launcher));

        manager
            .launch_browser(BrowserLaunchOptions::attach("ws://127.0.0.1:9222/devtools/browser/x"))
            .await
            .unwrap();

        assert_eq!(launcher.attach_count(), 1);
        assert_eq!(launcher.launch_count(), 0);
        let status = manager.status().await;
        assert_eq!(status.endpoint.as_deref(), Some("ws://127.0.0.1:9222/devtools/browser/x"));
    }
}
