//! Hub 构建器：由配置组装浏览器管理器、外部工具网关、注册表、执行器与协调器
//!
//! 二进制与嵌入方共用同一套组装逻辑；测试可替换浏览器启动器与提供者传输。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserLauncher, BrowserSessionManager};
use crate::config::AppConfig;
use crate::coordinator::{coordinate_schema_json, TaskCoordinator};
use crate::mcp::{ExternalToolGateway, TransportFactory};
use crate::tools::{
    tool_call_schema_json, ContentAction, EchoTool, EvaluateAction, NavigateAction, ScrollAction,
    ToolExecutor, ToolRegistry,
};

pub struct HubBuilder {
    config: AppConfig,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    transports: Option<Arc<dyn TransportFactory>>,
    browser_actions: bool,
}

impl HubBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            launcher: None,
            transports: None,
            browser_actions: true,
        }
    }

    /// 替换默认的浏览器启动器（默认 ChromeLauncher）
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// 替换默认的提供者传输（默认 HTTP JSON-RPC）
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    /// 是否注册浏览器动作
    pub fn with_browser_actions(mut self, enable: bool) -> Self {
        self.browser_actions = enable;
        self
    }

    pub fn build_browser(&self) -> BrowserSessionManager {
        match &self.launcher {
            Some(launcher) => {
                BrowserSessionManager::new(self.config.browser.clone(), Arc::clone(launcher))
            }
            None => BrowserSessionManager::with_default_launcher(self.config.browser.clone()),
        }
    }

    pub fn build_gateway(&self) -> Arc<ExternalToolGateway> {
        let gateway = match &self.transports {
            Some(factory) => ExternalToolGateway::new(&self.config.gateway, Arc::clone(factory)),
            None => ExternalToolGateway::from_config(&self.config.gateway),
        };
        Arc::new(gateway)
    }

    /// 静态工具：echo 与四个浏览器动作
    pub fn build_tool_registry(
        &self,
        browser: BrowserSessionManager,
        gateway: Arc<ExternalToolGateway>,
    ) -> ToolRegistry {
        let mut tools = ToolRegistry::new()
            .with_gateway(gateway)
            .with_browser(browser);

        tools.register(EchoTool);
        if self.browser_actions {
            let browser = &self.config.browser;
            tools.register_browser_action(NavigateAction::from_config(browser));
            tools.register_browser_action(ContentAction::from_config(browser));
            tools.register_browser_action(EvaluateAction::from_config(browser));
            tools.register_browser_action(ScrollAction);
        }
        tools
    }

    pub fn build(self) -> ToolHub {
        let browser = self.build_browser();
        let gateway = self.build_gateway();
        let registry = Arc::new(self.build_tool_registry(browser.clone(), Arc::clone(&gateway)));

        ToolHub {
            executor: ToolExecutor::new(
                Arc::clone(&registry),
                self.config.tools.tool_timeout_secs,
            ),
            coordinator: TaskCoordinator::new().with_registry(Arc::clone(&registry)),
            registry,
            gateway,
            browser,
            config: self.config,
            background: CancellationToken::new(),
            health_task: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 组装好的编排核心，供推理循环共享
pub struct ToolHub {
    pub config: AppConfig,
    pub browser: BrowserSessionManager,
    pub gateway: Arc<ExternalToolGateway>,
    pub registry: Arc<ToolRegistry>,
    pub executor: ToolExecutor,
    pub coordinator: TaskCoordinator,
    background: CancellationToken,
    health_task: Option<JoinHandle<()>>,
}

impl ToolHub {
    /// 启动后台健康检查（health_interval_secs 为 0 时不启动）；需在 tokio 运行时内调用
    pub fn start_background(&mut self, token: CancellationToken) {
        let interval = self.config.gateway.health_interval_secs;
        if interval == 0 || self.health_task.is_some() {
            return;
        }
        self.background = token.child_token();
        self.health_task = Some(
            self.gateway
                .spawn_health_monitor(Duration::from_secs(interval), self.background.clone()),
        );
        tracing::info!(interval_secs = interval, "provider health monitor started");
    }

    /// 推理循环 system prompt 中的工具与协调 schema 段落
    pub async fn prompt_schema_section(&self) -> String {
        format!(
            "## Available tools\n```json\n{}\n```\n\n## Tool call JSON Schema\n```json\n{}\n```\n\n## Coordination request JSON Schema\n```json\n{}\n```",
            self.registry.to_schema_json().await,
            tool_call_schema_json(),
            coordinate_schema_json()
        )
    }

    /// 停止后台任务并释放浏览器
    pub async fn shutdown(&mut self) {
        self.background.cancel();
        if let Some(task) = self.health_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "health monitor task failed");
            }
        }
        self.browser.shutdown().await;
    }
}

/// 便捷函数：从默认路径加载配置并创建 HubBuilder；加载失败时使用默认配置
pub fn create_hub_builder(config_path: Option<PathBuf>) -> HubBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    HubBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MockLauncher;
    use crate::mcp::MockTransportFactory;

    fn builder() -> HubBuilder {
        let mut config = AppConfig::default();
        config.browser.discover_existing = false;
        HubBuilder::new(config)
            .with_launcher(Arc::new(MockLauncher::new()))
            .with_transport_factory(Arc::new(MockTransportFactory::new()))
    }

    #[tokio::test]
    async fn test_build_registers_static_tools() {
        let hub = builder().build();
        let names = hub.registry.tool_names().await;
        assert_eq!(
            names,
            vec![
                "browser_content",
                "browser_evaluate",
                "browser_navigate",
                "browser_scroll",
                "echo"
            ]
        );
    }

    #[tokio::test]
    async fn test_browser_actions_can_be_disabled() {
        let hub = builder().with_browser_actions(false).build();
        assert_eq!(hub.registry.tool_names().await, vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_background_monitor_stops_on_shutdown() {
        let mut hub = builder().build();
        hub.start_background(CancellationToken::new());
        assert!(hub.health_task.is_some());
        hub.shutdown().await;
        assert!(hub.health_task.is_none());
    }

    #[tokio::test]
    async fn test_prompt_section_lists_tools() {
        let hub = builder().with_browser_actions(false).build();
        let section = hub.prompt_schema_section().await;
        assert!(section.contains("\"echo\""));
        assert!(section.contains("subtasks"));
    }
}
