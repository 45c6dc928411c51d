//! Mock 提供者传输（用于测试）
//!
//! MockTransport 记录 list_tools / call_tool 调用次数，可随时切换健康状态；
//! MockTransportFactory 按端点返回预先登记的 MockTransport，未登记的端点始终不可达。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::transport::{ProviderTransport, RemoteTool, TransportFactory};

pub struct MockTransport {
    tools: Mutex<Vec<RemoteTool>>,
    healthy: AtomicBool,
    delay: Option<Duration>,
    list_calls: AtomicUsize,
    call_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(tools: Vec<RemoteTool>) -> Self {
        Self {
            tools: Mutex::new(tools),
            healthy: AtomicBool::new(true),
            delay: None,
            list_calls: AtomicUsize::new(0),
            call_calls: AtomicUsize::new(0),
        }
    }

    /// 每次 list_tools 前等待，用于并发初始化测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unreachable() -> Self {
        let t = Self::new(vec![]);
        t.set_healthy(false);
        t
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_tools(&self, tools: Vec<RemoteTool>) {
        if let Ok(mut guard) = self.tools.lock() {
            *guard = tools;
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn call_calls(&self) -> usize {
        self.call_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderTransport for MockTransport {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, String> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        self.tools
            .lock()
            .map(|t| t.clone())
            .map_err(|e| e.to_string())
    }

    /// 名为 "fail" 的工具返回 isError；其余回显名称与参数
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, String> {
        self.call_calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        if name == "fail" {
            return Ok(serde_json::json!({
                "content": [{"type": "text", "text": "mock failure"}],
                "isError": true
            }));
        }
        Ok(serde_json::json!({
            "content": [{"type": "text", "text": format!("{}: {}", name, args)}]
        }))
    }
}

#[derive(Default)]
pub struct MockTransportFactory {
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记端点对应的传输，返回同一个 Arc 以便测试中切换状态
    pub fn register(&self, endpoint: &str, transport: MockTransport) -> Arc<MockTransport> {
        let transport = Arc::new(transport);
        if let Ok(mut map) = self.transports.lock() {
            map.insert(endpoint.to_string(), Arc::clone(&transport));
        }
        transport
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, endpoint: &str) -> Arc<dyn ProviderTransport> {
        let found = self
            .transports
            .lock()
            .ok()
            .and_then(|map| map.get(endpoint).cloned());
        match found {
            Some(t) => t,
            None => Arc::new(MockTransport::unreachable()),
        }
    }
}
