//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时转为 ErrorKind::Timeout（浏览器工具超时会重置对应会话的页面）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{ErrorKind, ToolOutcome};
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时并记录审计日志
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；超时返回 Timeout 失败；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> ToolOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let outcome = match timeout(
            self.timeout,
            self.registry.execute(tool_name, args.clone()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                // 被取消的浏览器动作可能留下卡住的页面
                self.registry.abandon_browser_action(tool_name, &args).await;
                ToolOutcome::failure(
                    ErrorKind::Timeout,
                    format!(
                        "Tool {} timed out after {}s",
                        tool_name,
                        self.timeout.as_secs()
                    ),
                )
            }
        };

        let label = match (outcome.success, outcome.kind) {
            (true, _) => "ok",
            (false, Some(ErrorKind::Timeout)) => "timeout",
            (false, _) => "error",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome.success,
            "outcome": label,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        outcome
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserSessionManager, MockLauncher};
    use crate::config::BrowserSection;
    use crate::tools::{EchoTool, NavigateAction, Tool};
    use async_trait::async_trait;
    use serde_json::Value;

    struct SleepTool;

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("woke".to_string())
        }
    }

    #[tokio::test]
    async fn test_executor_passes_outcome_through() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let executor = ToolExecutor::new(Arc::new(registry), 5);
        let outcome = executor
            .execute("echo", serde_json::json!({"text": "ping"}))
            .await;
        assert_eq!(outcome, ToolOutcome::success("ping"));
    }

    #[tokio::test]
    async fn test_executor_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SleepTool);
        let executor = ToolExecutor::new(Arc::new(registry), 1);
        let outcome = executor.execute("sleep", Value::Null).await;
        assert_eq!(outcome.kind, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_executor_timeout_resets_browser_session() {
        let config = BrowserSection {
            discover_existing: false,
            action_timeout_secs: 5,
            probe_timeout_ms: 200,
            ..BrowserSection::default()
        };
        let manager = BrowserSessionManager::new(config.clone(), Arc::new(MockLauncher::new()));
        let mut registry = ToolRegistry::new().with_browser(manager.clone());
        registry.register_browser_action(NavigateAction::from_config(&config));
        let executor = ToolExecutor::new(Arc::new(registry), 1);

        let outcome = executor
            .execute(
                "browser_navigate",
                serde_json::json!({"url": "slow://hang", "session_id": "s"}),
            )
            .await;
        assert_eq!(outcome.kind, Some(ErrorKind::Timeout));
        assert!(manager.status().await.sessions.is_empty());

        let outcome = executor
            .execute(
                "browser_navigate",
                serde_json::json!({"url": "https://docs.example", "session_id": "s"}),
            )
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({"text": "x".repeat(500)});
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
