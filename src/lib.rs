//! bee-toolhub - 工具执行编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与 ToolOutcome、Hub 组装、优雅关闭
//! - **browser**: 浏览器会话管理（单飞启动、恢复、按会话分配页面）
//! - **mcp**: 外部工具提供者网关（健康探测、目录、代理调用）
//! - **tools**: 工具注册表、执行器、浏览器动作
//! - **coordinator**: 子任务画像选择与依赖排序
//! - **observability**: tracing 初始化

pub mod browser;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod mcp;
pub mod observability;
pub mod tools;

pub use crate::core::{ErrorKind, HubBuilder, ToolHub, ToolOutcome, ToolhubError};
