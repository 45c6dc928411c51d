//! 错误分类与统一结果形状
//!
//! 公共接口从不向调用方抛出未处理的失败：工具调用一律返回 ToolOutcome，
//! 需要 Result 的管理接口使用 ToolhubError。

use serde::Serialize;
use thiserror::Error;

/// 编排核心可能出现的错误（提供者不可用、工具失败、浏览器启动/崩溃、依赖环、超时等）
#[derive(Error, Debug, Clone)]
pub enum ToolhubError {
    /// 健康探测失败：工具被静默剔除，下一次探测重试
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 引擎无法启动或连接，管理器停在 crashed
    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailure(String),

    #[error("Browser crashed: {0}")]
    BrowserCrash(String),

    /// 协调时发现依赖环；计划降级为顺序冲刷，不会因此失败
    #[error("Dependency cycle among subtasks {0:?}")]
    DependencyCycle(Vec<usize>),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ToolhubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolhubError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            ToolhubError::ToolExecution(_) => ErrorKind::ToolExecution,
            ToolhubError::UnknownTool(_) => ErrorKind::UnknownTool,
            ToolhubError::BrowserLaunchFailure(_) => ErrorKind::BrowserLaunchFailure,
            ToolhubError::BrowserCrash(_) => ErrorKind::BrowserCrash,
            ToolhubError::DependencyCycle(_) => ErrorKind::DependencyCycle,
            ToolhubError::Timeout(_) => ErrorKind::Timeout,
            ToolhubError::Config(_) => ErrorKind::Config,
        }
    }
}

/// 错误类别（序列化到 ToolOutcome.kind，供推理循环判断是否值得重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    ToolExecution,
    UnknownTool,
    BrowserLaunchFailure,
    BrowserCrash,
    DependencyCycle,
    Timeout,
    Config,
}

/// 工具调用的统一结果：`{success, output}` 或 `{success: false, error}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            kind: None,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl From<ToolhubError> for ToolOutcome {
    fn from(err: ToolhubError) -> Self {
        ToolOutcome::failure(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_error_keeps_kind() {
        let outcome: ToolOutcome = ToolhubError::UnknownTool("nope".to_string()).into();
        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(ErrorKind::UnknownTool));
        assert!(outcome.error.unwrap().contains("nope"));
    }

    #[test]
    fn test_outcome_serialization_omits_empty_fields() {
        let json = serde_json::to_value(ToolOutcome::success("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "output": "hi"}));

        let json = serde_json::to_value(ToolOutcome::failure(ErrorKind::Timeout, "slow")).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert!(json.get("output").is_none());
    }
}
