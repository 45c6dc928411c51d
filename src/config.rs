//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__BROWSER__HEADLESS=false`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub gateway: GatewaySection,
}

/// [tools] 段：单次工具调用的全局超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [browser] 段：引擎发现、启动、页面操作超时与恢复预算
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Chrome/Chromium 可执行文件，未设置时由 headless_chrome 自动查找
    pub executable: Option<PathBuf>,
    #[serde(default = "default_debug_host")]
    pub debug_host: String,
    /// 探测外部已启动引擎时尝试的远程调试端口
    #[serde(default = "default_debug_ports")]
    pub debug_ports: Vec<u16>,
    /// 启动前是否先尝试连接已有引擎
    #[serde(default = "default_true")]
    pub discover_existing: bool,
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
    /// 单次页面操作（导航、取内容、执行 JS）超时
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// 发现探测与存活探测的超时（毫秒）
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// 连续恢复失败达到该次数后拒绝继续恢复，直到显式 shutdown
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    /// 最后一个会话关闭时是否停止引擎
    #[serde(default = "default_true")]
    pub close_when_idle: bool,
    /// 允许导航的域名；为空表示不限制
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

impl BrowserSection {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            debug_host: default_debug_host(),
            debug_ports: default_debug_ports(),
            discover_existing: true,
            launch_timeout_secs: default_launch_timeout_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_recovery_attempts: default_max_recovery_attempts(),
            close_when_idle: true,
            allowed_domains: Vec::new(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_debug_host() -> String {
    "127.0.0.1".to_string()
}

fn default_debug_ports() -> Vec<u16> {
    vec![9222]
}

fn default_launch_timeout_secs() -> u64 {
    30
}

fn default_action_timeout_secs() -> u64 {
    20
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

fn default_max_recovery_attempts() -> u32 {
    3
}

fn default_max_result_chars() -> usize {
    8000
}

/// [gateway] 段：外部工具提供者（MCP server）的探测与调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// 后台健康检查间隔（秒），0 表示不启动
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            providers: Vec::new(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_health_interval_secs() -> u64 {
    60
}

/// [[gateway.providers]] 条目：提供者 ID 与连接端点
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub endpoint: String,
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
