//! 工具注册表
//!
//! 静态工具（本地 Tool、浏览器动作）在构建时注册；外部提供者的工具在首次 get_all_tools 时
//! 由网关初始化一次后合并进来，之后每次调用都读取网关当前的健康目录。
//! execute 统一返回 ToolOutcome，从不向调用方抛出错误。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::browser::{BrowserError, BrowserSessionManager, PageHandle};
use crate::core::{ErrorKind, ToolOutcome, ToolhubError};
use crate::mcp::ExternalToolGateway;

/// 未指定 session_id 时浏览器动作使用的会话
pub const DEFAULT_SESSION: &str = "default";

fn default_parameters() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        default_parameters()
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 浏览器动作失败的两类原因：参数/策略拒绝（不涉及引擎），或浏览器层错误
#[derive(Debug, Clone)]
pub enum ActionError {
    Rejected(String),
    Browser(BrowserError),
}

impl From<BrowserError> for ActionError {
    fn from(err: BrowserError) -> Self {
        ActionError::Browser(err)
    }
}

/// 需要页面的工具：注册表负责按会话取页面、探测崩溃与恢复，动作只负责在页面上做事
#[async_trait]
pub trait BrowserAction: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value {
        default_parameters()
    }

    /// 取页面之前的参数检查；失败时不会启动浏览器
    fn validate(&self, _args: &Value) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, page: &PageHandle, args: &Value) -> Result<String, ActionError>;
}

/// 工具的执行方式
#[derive(Clone)]
pub enum ToolHandler {
    Local(Arc<dyn Tool>),
    Browser(Arc<dyn BrowserAction>),
    Provider { provider_id: String },
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolHandler::Local(t) => write!(f, "Local({})", t.name()),
            ToolHandler::Browser(a) => write!(f, "Browser({})", a.name()),
            ToolHandler::Provider { provider_id } => write!(f, "Provider({})", provider_id),
        }
    }
}

/// 可调用工具的描述：名称、说明、参数约定（不做校验）与执行方式
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn local(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
            handler: ToolHandler::Local(tool),
        }
    }

    pub fn browser(action: Arc<dyn BrowserAction>) -> Self {
        Self {
            name: action.name().to_string(),
            description: action.description().to_string(),
            parameters: action.parameters_schema(),
            handler: ToolHandler::Browser(action),
        }
    }

    pub fn provider(
        provider_id: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: ToolHandler::Provider {
                provider_id: provider_id.to_string(),
            },
        }
    }

    /// "local" / "browser" / "provider"
    pub fn source(&self) -> &'static str {
        match self.handler {
            ToolHandler::Local(_) => "local",
            ToolHandler::Browser(_) => "browser",
            ToolHandler::Provider { .. } => "provider",
        }
    }
}

/// 工具注册表：静态工具 + 网关动态工具；浏览器动作通过 BrowserSessionManager 取页面
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
    gateway: Option<Arc<ExternalToolGateway>>,
    browser: Option<BrowserSessionManager>,
    gateway_init: OnceCell<()>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gateway(mut self, gateway: Arc<ExternalToolGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_browser(mut self, browser: BrowserSessionManager) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.insert(ToolDescriptor::local(Arc::new(tool)));
    }

    pub fn register_browser_action(&mut self, action: impl BrowserAction + 'static) {
        self.insert(ToolDescriptor::browser(Arc::new(action)));
    }

    fn insert(&mut self, descriptor: ToolDescriptor) {
        if self.tools.contains_key(&descriptor.name) {
            tracing::debug!(tool = %descriptor.name, "static tool re-registered, replacing");
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    /// 静态注册的工具
    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.get(name).cloned()
    }

    pub fn gateway(&self) -> Option<&Arc<ExternalToolGateway>> {
        self.gateway.as_ref()
    }

    pub fn browser(&self) -> Option<&BrowserSessionManager> {
        self.browser.as_ref()
    }

    /// 合并后的工具目录：静态在前，动态覆盖同名静态工具
    ///
    /// 首次调用触发网关初始化，并发的首批调用共享同一次初始化；初始化失败只记日志，返回静态工具。
    pub async fn get_all_tools(&self) -> HashMap<String, ToolDescriptor> {
        let mut all = self.tools.clone();
        let Some(gateway) = &self.gateway else {
            return all;
        };

        self.gateway_init
            .get_or_init(|| async {
                match gateway.initialize().await {
                    Ok(report) => {
                        tracing::info!(healthy = ?report.healthy, unhealthy = ?report.unhealthy, "provider tools loaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "gateway initialization failed, continuing with static tools");
                    }
                }
            })
            .await;

        for descriptor in gateway.catalogue().await {
            if all.contains_key(&descriptor.name) {
                tracing::debug!(tool = %descriptor.name, "provider tool overrides static tool");
            }
            all.insert(descriptor.name.clone(), descriptor);
        }
        all
    }

    /// 按名称执行工具；任何失败都以 ToolOutcome 返回
    pub async fn execute(&self, name: &str, args: Value) -> ToolOutcome {
        let Some(descriptor) = self.get_all_tools().await.remove(name) else {
            return ToolhubError::UnknownTool(name.to_string()).into();
        };

        match descriptor.handler {
            ToolHandler::Local(tool) => match tool.execute(args).await {
                Ok(output) => ToolOutcome::success(output),
                Err(e) => ToolOutcome::failure(ErrorKind::ToolExecution, e),
            },
            ToolHandler::Provider { .. } => match &self.gateway {
                Some(gateway) => gateway.execute_tool(name, args).await,
                None => ToolOutcome::failure(
                    ErrorKind::ProviderUnavailable,
                    "No gateway configured",
                ),
            },
            ToolHandler::Browser(action) => self.execute_browser(action, args).await,
        }
    }

    /// 浏览器动作：失败后探测引擎；无响应则标记崩溃、恢复一次并在新页面上重试一次
    async fn execute_browser(&self, action: Arc<dyn BrowserAction>, args: Value) -> ToolOutcome {
        let Some(browser) = &self.browser else {
            return ToolOutcome::failure(
                ErrorKind::BrowserLaunchFailure,
                "Browser is not configured",
            );
        };
        if let Err(e) = action.validate(&args) {
            return ToolOutcome::failure(ErrorKind::ToolExecution, e);
        }

        let session_id = session_id_of(&args);
        let err = match attempt(browser, action.as_ref(), &session_id, &args).await {
            Ok(output) => return ToolOutcome::success(output),
            Err(ActionError::Rejected(msg)) => {
                return ToolOutcome::failure(ErrorKind::ToolExecution, msg)
            }
            Err(ActionError::Browser(e)) => e,
        };

        if matches!(err, BrowserError::LaunchFailure(_)) {
            return ToolhubError::from(err).into();
        }

        if browser.is_responsive().await {
            match &err {
                BrowserError::PageInvalidated(_) => {
                    tracing::debug!(tool = %action.name(), session = %session_id, "page invalidated, retrying");
                }
                e if e.is_timeout() => {
                    tracing::warn!(tool = %action.name(), session = %session_id, "browser action timed out, resetting page");
                    browser.reset_session(&session_id).await;
                    return ToolhubError::from(err).into();
                }
                _ => return ToolhubError::from(err).into(),
            }
        } else {
            tracing::warn!(tool = %action.name(), error = %err, "browser unresponsive, recovering");
            browser.mark_crashed(&err.to_string()).await;
            if let Err(e) = browser.recover_browser().await {
                return ToolhubError::from(e).into();
            }
        }

        match attempt(browser, action.as_ref(), &session_id, &args).await {
            Ok(output) => ToolOutcome::success(output),
            Err(ActionError::Rejected(msg)) => ToolOutcome::failure(ErrorKind::ToolExecution, msg),
            Err(ActionError::Browser(e)) => {
                if e.is_timeout() {
                    browser.reset_session(&session_id).await;
                }
                ToolhubError::from(e).into()
            }
        }
    }

    /// 外层取消了一次浏览器动作（如执行器超时）时调用：丢弃该会话可能卡住的页面。
    /// 非浏览器工具不做任何事，返回 false。
    pub async fn abandon_browser_action(&self, name: &str, args: &Value) -> bool {
        let Some(browser) = &self.browser else {
            return false;
        };
        match self.tools.get(name).map(|d| &d.handler) {
            Some(ToolHandler::Browser(_)) => {
                let session_id = session_id_of(args);
                tracing::warn!(tool = %name, session = %session_id, "browser action abandoned, resetting page");
                browser.reset_session(&session_id).await
            }
            _ => false,
        }
    }

    /// 合并目录中的工具名（排序）
    pub async fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.get_all_tools().await.into_keys().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub async fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .get_all_tools()
            .await
            .into_values()
            .map(|d| (d.name, d.description))
            .collect();
        list.sort();
        list
    }

    /// 合并目录的 schema JSON（name / description / parameters / source）
    pub async fn to_schema_json(&self) -> String {
        let mut descriptors: Vec<ToolDescriptor> =
            self.get_all_tools().await.into_values().collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        let tools: Vec<Value> = descriptors
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "description": d.description,
                    "parameters": d.parameters,
                    "source": d.source(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

async fn attempt(
    browser: &BrowserSessionManager,
    action: &dyn BrowserAction,
    session_id: &str,
    args: &Value,
) -> Result<String, ActionError> {
    let page = browser.get_or_create_page(session_id).await?;
    action.run(&page, args).await
}

fn session_id_of(args: &Value) -> String {
    args.get("session_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::browser::MockLauncher;
    use crate::config::{BrowserSection, GatewaySection, ProviderEntry};
    use crate::mcp::{MockTransport, MockTransportFactory, RemoteTool};
    use crate::tools::browser::{ContentAction, NavigateAction};
    use crate::tools::EchoTool;

    fn browser_config() -> BrowserSection {
        BrowserSection {
            discover_existing: false,
            launch_timeout_secs: 5,
            action_timeout_secs: 1,
            probe_timeout_ms: 200,
            ..BrowserSection::default()
        }
    }

    fn browser_registry(launcher: Arc<MockLauncher>) -> (ToolRegistry, BrowserSessionManager) {
        let config = browser_config();
        let manager = BrowserSessionManager::new(config.clone(), launcher);
        let mut registry = ToolRegistry::new().with_browser(manager.clone());
        registry.register_browser_action(NavigateAction::from_config(&config));
        registry.register_browser_action(ContentAction::from_config(&config));
        (registry, manager)
    }

    fn gateway_with(factory: Arc<MockTransportFactory>) -> Arc<ExternalToolGateway> {
        let section = GatewaySection {
            probe_timeout_secs: 1,
            call_timeout_secs: 1,
            health_interval_secs: 0,
            providers: vec![ProviderEntry {
                id: "search".to_string(),
                endpoint: "mock://search".to_string(),
            }],
        };
        Arc::new(ExternalToolGateway::new(&section, factory))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_failure() {
        let registry = ToolRegistry::new();
        let outcome = registry.execute("nope", Value::Null).await;
        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(ErrorKind::UnknownTool));
    }

    #[tokio::test]
    async fn test_local_tool_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let outcome = registry
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await;
        assert_eq!(outcome, ToolOutcome::success("hi"));
        assert_eq!(registry.tool_names().await, vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_provider_tool_overrides_static_and_routes_to_gateway() {
        let factory = Arc::new(MockTransportFactory::new());
        factory.register(
            "mock://search",
            MockTransport::new(vec![RemoteTool::new("echo", "remote echo")]),
        );
        let mut registry = ToolRegistry::new().with_gateway(gateway_with(factory));
        registry.register(EchoTool);

        let all = registry.get_all_tools().await;
        assert_eq!(all["echo"].source(), "provider");

        let outcome = registry
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(outcome.success);
        assert!(outcome.output.unwrap().starts_with("echo: "));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_initialize_gateway_once() {
        let factory = Arc::new(MockTransportFactory::new());
        let transport = factory.register(
            "mock://search",
            MockTransport::new(vec![RemoteTool::new("web_search", "Search")])
                .with_delay(Duration::from_millis(50)),
        );
        let registry = Arc::new(ToolRegistry::new().with_gateway(gateway_with(factory)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = Arc::clone(&registry);
            handles.push(tokio::spawn(async move { r.get_all_tools().await.len() }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 1);
        }
        assert_eq!(transport.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_init_failure_falls_back_to_static_tools() {
        let mut registry = ToolRegistry::new()
            .with_gateway(gateway_with(Arc::new(MockTransportFactory::new())));
        registry.register(EchoTool);
        let all = registry.get_all_tools().await;
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("echo"));
    }

    #[tokio::test]
    async fn test_browser_action_uses_session_page() {
        let launcher = Arc::new(MockLauncher::new());
        let (registry, manager) = browser_registry(Arc::clone(&launcher));

        let outcome = registry
            .execute(
                "browser_navigate",
                serde_json::json!({"url": "https://a.example/docs", "session_id": "s1"}),
            )
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert!(outcome.output.unwrap().contains("a.example"));

        let content = registry
            .execute("browser_content", serde_json::json!({"session_id": "s1"}))
            .await;
        assert!(content.output.unwrap().contains("a.example/docs"));
        assert_eq!(manager.status().await.sessions, vec!["s1".to_string()]);
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_crashed_engine_recovers_and_retries_once() {
        let launcher = Arc::new(MockLauncher::new());
        let (registry, _manager) = browser_registry(Arc::clone(&launcher));
        let args = serde_json::json!({"url": "https://a.example"});

        assert!(registry.execute("browser_navigate", args.clone()).await.success);
        launcher.last_engine().unwrap().kill();

        let outcome = registry.execute("browser_navigate", args).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_resets_session_without_recovery() {
        let launcher = Arc::new(MockLauncher::new());
        let (registry, manager) = browser_registry(Arc::clone(&launcher));

        let outcome = registry
            .execute("browser_navigate", serde_json::json!({"url": "slow://hang"}))
            .await;
        assert_eq!(outcome.kind, Some(ErrorKind::Timeout));
        assert_eq!(manager.session_count().await, 0);
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_browser_action_without_manager_fails_cleanly() {
        let mut registry = ToolRegistry::new();
        registry.register_browser_action(NavigateAction::from_config(&BrowserSection::default()));
        let outcome = registry
            .execute("browser_navigate", serde_json::json!({"url": "https://a.example"}))
            .await;
        assert_eq!(outcome.kind, Some(ErrorKind::BrowserLaunchFailure));
    }
}
