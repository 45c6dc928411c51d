//! 提供者传输层
//!
//! 网关只把提供者看作「带参数调用，返回成功输出或错误」。默认实现是 HTTP 上的 JSON-RPC 2.0
//! （MCP 的 `tools/list` / `tools/call`）；其他传输只需实现 ProviderTransport。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ErrorKind, ToolOutcome};

pub const JSONRPC_VERSION: &str = "2.0";

/// 提供者在 tools/list 中声明的工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_schema(),
        }
    }
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, String>;

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, String>;
}

/// 由端点字符串创建传输（configure 时调用）
pub trait TransportFactory: Send + Sync {
    fn create(&self, endpoint: &str) -> Arc<dyn ProviderTransport>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// HTTP POST + JSON-RPC 2.0；超时由网关统一施加
pub struct HttpJsonRpcTransport {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl HttpJsonRpcTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, String> {
        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", method, e))?;
        if !resp.status().is_success() {
            return Err(format!("{} returned HTTP {}", method, resp.status()));
        }
        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| format!("{} invalid response: {}", method, e))?;
        if let Some(err) = body.error {
            return Err(format!("{} error {}: {}", method, err.code, err.message));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ProviderTransport for HttpJsonRpcTransport {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, String> {
        let result = self.rpc("tools/list", serde_json::json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools).map_err(|e| format!("tools/list invalid tools: {}", e))
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, String> {
        self.rpc(
            "tools/call",
            serde_json::json!({ "name": name, "arguments": args }),
        )
        .await
    }
}

/// 所有提供者共享一个 reqwest::Client
#[derive(Default)]
pub struct HttpTransportFactory {
    client: reqwest::Client,
}

impl HttpTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self, endpoint: &str) -> Arc<dyn ProviderTransport> {
        Arc::new(HttpJsonRpcTransport::new(self.client.clone(), endpoint))
    }
}

/// 将提供者的原始返回归一化为 ToolOutcome
///
/// - MCP 形状 `{content: [{type: "text", text}], isError}`：拼接文本
/// - `{success, output, error}`：按字段映射
/// - 字符串原样返回，其余 JSON 序列化为紧凑文本
pub fn normalize_response(value: Value) -> ToolOutcome {
    if let Some(content) = value.get("content").and_then(|c| c.as_array()) {
        let text = content
            .iter()
            .map(|part| match part.get("text").and_then(|t| t.as_str()) {
                Some(t) => t.to_string(),
                None => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let is_error = value
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        return if is_error {
            ToolOutcome::failure(ErrorKind::ToolExecution, text)
        } else {
            ToolOutcome::success(text)
        };
    }

    if let Some(success) = value.get("success").and_then(|v| v.as_bool()) {
        return if success {
            let output = match value.get("output") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            ToolOutcome::success(output)
        } else {
            let error = value
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("provider reported failure");
            ToolOutcome::failure(ErrorKind::ToolExecution, error)
        };
    }

    match value {
        Value::String(s) => ToolOutcome::success(s),
        Value::Null => ToolOutcome::success(""),
        other => ToolOutcome::success(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_mcp_content() {
        let outcome = normalize_response(json!({
            "content": [{"type": "text", "text": "line 1"}, {"type": "text", "text": "line 2"}]
        }));
        assert_eq!(outcome, ToolOutcome::success("line 1\nline 2"));
    }

    #[test]
    fn test_normalize_mcp_error() {
        let outcome = normalize_response(json!({
            "content": [{"type": "text", "text": "bad input"}],
            "isError": true
        }));
        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(ErrorKind::ToolExecution));
        assert_eq!(outcome.error.as_deref(), Some("bad input"));
    }

    #[test]
    fn test_normalize_success_shape_and_plain_values() {
        assert_eq!(
            normalize_response(json!({"success": false, "error": "quota"})).error.as_deref(),
            Some("quota")
        );
        assert_eq!(normalize_response(json!("plain")), ToolOutcome::success("plain"));
        assert_eq!(
            normalize_response(json!({"rows": 3})),
            ToolOutcome::success("{\"rows\":3}")
        );
    }

    #[test]
    fn test_remote_tool_defaults_schema() {
        let tool: RemoteTool = serde_json::from_value(json!({"name": "lookup"})).unwrap();
        assert_eq!(tool.name, "lookup");
        assert!(tool.description.is_empty());
        assert_eq!(tool.input_schema["type"], "object");
    }
}
