//! 浏览器会话管理：唯一引擎进程 + 按会话 ID 复用的页面
//!
//! - **engine**: 引擎 / 启动器 / 页面 trait 与 BrowserError
//! - **discovery**: 通过远程调试端口发现已运行的引擎
//! - **manager**: BrowserSessionManager（单飞启动、恢复、会话映射）
//! - **chrome**: headless_chrome 实现（feature "browser"）
//! - **mock**: 测试用引擎

pub mod discovery;
pub mod engine;
pub mod manager;
pub mod mock;

#[cfg(feature = "browser")]
pub mod chrome;

pub use discovery::discover_endpoint;
pub use engine::{
    BrowserEngine, BrowserError, BrowserLaunchOptions, BrowserLauncher, BrowserPage,
    DisabledLauncher,
};
pub use manager::{BrowserSessionManager, BrowserState, BrowserStatus, PageHandle};
pub use mock::{MockEngine, MockLauncher, MockPage};

#[cfg(feature = "browser")]
pub use chrome::ChromeLauncher;
