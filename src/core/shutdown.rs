//! 优雅关闭
//!
//! 监听 Ctrl+C / SIGTERM，取消后台任务（健康检查），按注册顺序执行清理：
//! 关闭所有浏览器会话并停止引擎进程。

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::browser::BrowserSessionManager;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 主流程正常结束
    Completed,
}

/// 关闭信号：一个 CancellationToken 加首个关闭原因
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 后台任务持有的 token（父 token 取消时一并取消）
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭；只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if let Ok(mut guard) = self.reason.lock() {
            if guard.is_none() {
                *guard = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 按注册顺序执行清理，每项带超时
pub struct ShutdownCoordinator {
    manager: ShutdownManager,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(manager: ShutdownManager) -> Self {
        Self {
            manager,
            cleanup_tasks: Vec::new(),
            timeout_secs: 10,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) {
        tracing::info!(tasks = self.cleanup_tasks.len(), reason = ?self.manager.reason(), "running cleanup");

        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!(task = name, "cleanup completed"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "cleanup failed"),
                Err(_) => {
                    tracing::warn!(task = name, secs = self.timeout_secs, "cleanup timed out")
                }
            }
        }
    }

    pub fn manager(&self) -> &ShutdownManager {
        &self.manager
    }
}

/// 关闭所有会话页面并停止引擎
pub struct BrowserCleanup {
    browser: BrowserSessionManager,
}

impl BrowserCleanup {
    pub fn new(browser: BrowserSessionManager) -> Self {
        Self { browser }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for BrowserCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        let sessions = self.browser.session_count().await;
        self.browser.shutdown().await;
        tracing::debug!(sessions, "browser sessions released");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Browser"
    }
}

/// 运行 app 直到结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F>(coordinator: &ShutdownCoordinator, app: F)
where
    F: Future<Output = ()>,
{
    let manager = coordinator.manager().clone();
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => {
            tracing::info!("Application finished normally");
            manager.shutdown(ShutdownReason::Completed);
        }
        _ = manager.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received");
        }
    }

    coordinator.run_cleanup().await;
}
