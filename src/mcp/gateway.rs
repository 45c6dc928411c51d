//! 外部工具网关
//!
//! 管理若干外部提供者（MCP server）：并发探测健康状态、汇总健康提供者的工具、
//! 把调用代理到提供该工具的第一个健康提供者。不健康提供者的工具立即从目录中撤下，
//! 下一次探测成功后重新出现。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::GatewaySection;
use crate::core::{ErrorKind, ToolOutcome, ToolhubError};
use crate::tools::ToolDescriptor;

use super::provider::{ExternalProviderRecord, HealthStatus, ProviderTool, ServerStatus};
use super::transport::{
    normalize_response, HttpTransportFactory, ProviderTransport, RemoteTool, TransportFactory,
};

/// initialize 的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
}

pub struct ExternalToolGateway {
    providers: RwLock<BTreeMap<String, ExternalProviderRecord>>,
    factory: Arc<dyn TransportFactory>,
    probe_timeout: Duration,
    call_timeout: Duration,
}

impl ExternalToolGateway {
    /// 按配置登记提供者（状态 Unknown，未探测）
    pub fn new(config: &GatewaySection, factory: Arc<dyn TransportFactory>) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|p| {
                let transport = factory.create(&p.endpoint);
                (
                    p.id.clone(),
                    ExternalProviderRecord::new(&p.id, &p.endpoint, transport),
                )
            })
            .collect();
        Self {
            providers: RwLock::new(providers),
            factory,
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }

    /// 使用 HTTP JSON-RPC 传输
    pub fn from_config(config: &GatewaySection) -> Self {
        Self::new(config, Arc::new(HttpTransportFactory::new()))
    }

    /// 并发探测所有已配置提供者；仅当存在提供者且全部失败时返回错误
    pub async fn initialize(&self) -> Result<GatewayReport, ToolhubError> {
        let statuses = self.probe(None).await?;
        let mut report = GatewayReport::default();
        for s in &statuses {
            if s.health == HealthStatus::Healthy {
                report.healthy.push(s.id.clone());
            } else {
                report.unhealthy.push(s.id.clone());
            }
        }
        tracing::info!(
            healthy = report.healthy.len(),
            unhealthy = report.unhealthy.len(),
            "gateway initialized"
        );
        if !statuses.is_empty() && report.healthy.is_empty() {
            return Err(ToolhubError::ProviderUnavailable(format!(
                "all {} providers failed: {}",
                statuses.len(),
                report.unhealthy.join(", ")
            )));
        }
        Ok(report)
    }

    pub async fn list_servers(&self) -> Vec<ServerStatus> {
        let providers = self.providers.read().await;
        providers.values().map(|p| p.status()).collect()
    }

    /// 健康提供者的工具；可限定某个提供者
    pub async fn list_tools(&self, provider_id: Option<&str>) -> Vec<ProviderTool> {
        let providers = self.providers.read().await;
        providers
            .values()
            .filter(|p| p.is_healthy())
            .filter(|p| provider_id.map_or(true, |id| p.id == id))
            .flat_map(|p| p.tools.iter().cloned())
            .collect()
    }

    /// 代理调用到第一个提供该工具的健康提供者；找不到时不发起任何网络请求
    pub async fn execute_tool(&self, name: &str, args: Value) -> ToolOutcome {
        let target = {
            let providers = self.providers.read().await;
            providers
                .values()
                .find(|p| p.is_healthy() && p.offers(name))
                .map(|p| (p.id.clone(), Arc::clone(&p.transport)))
        };
        let Some((provider_id, transport)) = target else {
            return ToolOutcome::failure(
                ErrorKind::ProviderUnavailable,
                format!("No healthy provider offers tool: {}", name),
            );
        };

        match tokio::time::timeout(self.call_timeout, transport.call_tool(name, args)).await {
            Ok(Ok(value)) => normalize_response(value),
            Ok(Err(e)) => {
                tracing::warn!(provider = %provider_id, tool = %name, error = %e, "provider call failed");
                ToolOutcome::failure(ErrorKind::ToolExecution, format!("{}: {}", provider_id, e))
            }
            Err(_) => {
                tracing::warn!(provider = %provider_id, tool = %name, "provider call timed out");
                ToolOutcome::failure(
                    ErrorKind::Timeout,
                    format!(
                        "{} timed out after {}s calling {}",
                        provider_id,
                        self.call_timeout.as_secs(),
                        name
                    ),
                )
            }
        }
    }

    /// 重新探测一个（未知 ID 报错）或全部提供者
    pub async fn health_check(
        &self,
        provider_id: Option<&str>,
    ) -> Result<Vec<ServerStatus>, ToolhubError> {
        self.probe(provider_id).await
    }

    /// 新增或更新提供者；状态重置为 Unknown，工具清空，等待下次探测
    pub async fn configure(&self, provider_id: &str, endpoint: &str) -> ServerStatus {
        let transport = self.factory.create(endpoint);
        let record = ExternalProviderRecord::new(provider_id, endpoint, transport);
        let status = record.status();
        let mut providers = self.providers.write().await;
        if providers.insert(provider_id.to_string(), record).is_some() {
            tracing::info!(provider = %provider_id, endpoint = %endpoint, "provider reconfigured");
        } else {
            tracing::info!(provider = %provider_id, endpoint = %endpoint, "provider added");
        }
        status
    }

    /// 健康提供者的工具描述；同名工具只保留 ID 序最前的提供者（与 execute_tool 的选择一致）
    pub async fn catalogue(&self) -> Vec<ToolDescriptor> {
        let mut seen = HashSet::new();
        self.list_tools(None)
            .await
            .into_iter()
            .filter(|t| seen.insert(t.name.clone()))
            .map(|t| ToolDescriptor::provider(&t.provider_id, t.name, t.description, t.input_schema))
            .collect()
    }

    /// 后台定期重新探测全部提供者，直到 token 被取消
    pub fn spawn_health_monitor(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即完成，初始探测交给 initialize
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = gateway.health_check(None).await {
                            tracing::warn!(error = %e, "periodic health check failed");
                        }
                    }
                }
            }
        })
    }

    /// 网络 I/O 期间不持有写锁；探测期间端点被 configure 改掉的结果直接丢弃
    async fn probe(&self, only: Option<&str>) -> Result<Vec<ServerStatus>, ToolhubError> {
        let targets: Vec<(String, String, Arc<dyn ProviderTransport>)> = {
            let providers = self.providers.read().await;
            providers
                .values()
                .filter(|p| only.map_or(true, |id| p.id == id))
                .map(|p| (p.id.clone(), p.endpoint.clone(), Arc::clone(&p.transport)))
                .collect()
        };
        if let Some(id) = only {
            if targets.is_empty() {
                return Err(ToolhubError::ProviderUnavailable(format!(
                    "Unknown provider: {}",
                    id
                )));
            }
        }

        let probe_timeout = self.probe_timeout;
        let probes = targets.into_iter().map(|(id, endpoint, transport)| async move {
            let result: Result<Vec<RemoteTool>, String> =
                match tokio::time::timeout(probe_timeout, transport.list_tools()).await {
                    Ok(r) => r,
                    Err(_) => Err(format!("probe timed out after {}s", probe_timeout.as_secs())),
                };
            (id, endpoint, result)
        });
        let results = join_all(probes).await;

        let mut providers = self.providers.write().await;
        let mut statuses = Vec::with_capacity(results.len());
        for (id, endpoint, result) in results {
            let Some(record) = providers.get_mut(&id) else {
                continue;
            };
            if record.endpoint != endpoint {
                tracing::debug!(provider = %id, "endpoint changed during probe, result discarded");
                continue;
            }
            record.apply_probe(result);
            statuses.push(record.status());
        }
        Ok(statuses)
    }
}
