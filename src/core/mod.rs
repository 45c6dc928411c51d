//! 核心：错误分类与统一结果、Hub 组装、优雅关闭

pub mod builder;
pub mod error;
pub mod shutdown;

pub use builder::{create_hub_builder, HubBuilder, ToolHub};
pub use error::{ErrorKind, ToolOutcome, ToolhubError};
pub use shutdown::{
    run_with_graceful_shutdown, BrowserCleanup, ShutdownCleanup, ShutdownCoordinator,
    ShutdownManager, ShutdownReason,
};
