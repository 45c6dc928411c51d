//! 外部提供者记录与健康状态

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::transport::{ProviderTransport, RemoteTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// 刚配置，尚未探测
    Unknown,
    Healthy,
    Unhealthy,
}

/// 某个提供者当前提供的工具
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderTool {
    pub provider_id: String,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// list_servers 的条目
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub endpoint: String,
    pub health: HealthStatus,
    pub last_probed: Option<DateTime<Utc>>,
    pub tool_count: usize,
    pub last_error: Option<String>,
}

pub struct ExternalProviderRecord {
    pub id: String,
    pub endpoint: String,
    pub health: HealthStatus,
    pub last_probed: Option<DateTime<Utc>>,
    pub tools: Vec<ProviderTool>,
    pub last_error: Option<String>,
    pub(crate) transport: Arc<dyn ProviderTransport>,
}

impl ExternalProviderRecord {
    pub fn new(id: &str, endpoint: &str, transport: Arc<dyn ProviderTransport>) -> Self {
        Self {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            health: HealthStatus::Unknown,
            last_probed: None,
            tools: Vec::new(),
            last_error: None,
            transport,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Healthy
    }

    pub fn offers(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t.name == tool_name)
    }

    /// 写入一次探测结果：成功则填充工具并置为 healthy，失败则清空工具
    pub fn apply_probe(&mut self, result: Result<Vec<RemoteTool>, String>) {
        self.last_probed = Some(Utc::now());
        match result {
            Ok(tools) => {
                if self.health != HealthStatus::Healthy {
                    tracing::info!(provider = %self.id, tools = tools.len(), "provider healthy");
                }
                self.tools = tools
                    .into_iter()
                    .map(|t| ProviderTool {
                        provider_id: self.id.clone(),
                        name: t.name,
                        description: t.description,
                        input_schema: t.input_schema,
                    })
                    .collect();
                self.health = HealthStatus::Healthy;
                self.last_error = None;
            }
            Err(e) => {
                tracing::warn!(provider = %self.id, error = %e, "provider unhealthy, tools withdrawn");
                self.tools.clear();
                self.health = HealthStatus::Unhealthy;
                self.last_error = Some(e);
            }
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            id: self.id.clone(),
            endpoint: self.endpoint.clone(),
            health: self.health,
            last_probed: self.last_probed,
            tool_count: self.tools.len(),
            last_error: self.last_error.clone(),
        }
    }
}
