//! 浏览器引擎抽象
//!
//! 管理器只依赖这三个 trait：Launcher 负责启动或连接引擎，Engine 代表唯一的引擎进程，
//! Page 是某个会话独占的页面。默认实现见 chrome.rs（headless_chrome）。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::ToolhubError;

/// 浏览器层错误（可 Clone，以便单飞 future 的结果在多个等待者间共享）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailure(String),

    #[error("browser crashed: {0}")]
    Crash(String),

    /// 页面句柄所属的引擎代已失效（崩溃、恢复或关闭之后）
    #[error("page handle for session '{0}' is no longer valid")]
    PageInvalidated(String),

    #[error("browser {op} timed out after {secs}s")]
    Timeout { op: String, secs: u64 },

    /// 页面操作本身失败（导航错误、脚本异常、参数缺失等），引擎仍可用
    #[error("{0}")]
    Action(String),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Timeout { .. })
    }
}

impl From<BrowserError> for ToolhubError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::LaunchFailure(msg) => ToolhubError::BrowserLaunchFailure(msg),
            BrowserError::Crash(msg) => ToolhubError::BrowserCrash(msg),
            e @ BrowserError::PageInvalidated(_) => ToolhubError::BrowserCrash(e.to_string()),
            e @ BrowserError::Timeout { .. } => ToolhubError::Timeout(e.to_string()),
            BrowserError::Action(msg) => ToolhubError::ToolExecution(msg),
        }
    }
}

/// launch_browser 的参数；endpoint 存在时连接已有引擎，否则启动新进程
#[derive(Debug, Clone, Default)]
pub struct BrowserLaunchOptions {
    pub endpoint: Option<String>,
    pub headless: bool,
    pub executable: Option<PathBuf>,
}

impl BrowserLaunchOptions {
    pub fn attach(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }
}

/// 单个页面（标签页）
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// 当前页面 HTML
    async fn content(&self) -> Result<String, BrowserError>;

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    async fn close(&self);
}

/// 引擎进程（或已连接的外部实例）
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// 远程调试端点（若已知）
    fn endpoint(&self) -> Option<String>;

    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, BrowserError>;

    /// 进程是否仍可响应
    async fn is_alive(&self) -> bool;

    /// 停止自己启动的进程；外部实例只断开连接
    async fn shutdown(&self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        options: &BrowserLaunchOptions,
    ) -> Result<Arc<dyn BrowserEngine>, BrowserError>;

    async fn attach(&self, endpoint: &str) -> Result<Arc<dyn BrowserEngine>, BrowserError>;
}

/// 未启用 browser feature 时的占位启动器
pub struct DisabledLauncher;

#[async_trait]
impl BrowserLauncher for DisabledLauncher {
    async fn launch(
        &self,
        _options: &BrowserLaunchOptions,
    ) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        Err(BrowserError::LaunchFailure(
            "built without the `browser` feature".to_string(),
        ))
    }

    async fn attach(&self, _endpoint: &str) -> Result<Arc<dyn BrowserEngine>, BrowserError> {
        Err(BrowserError::LaunchFailure(
            "built without the `browser` feature".to_string(),
        ))
    }
}
