//! 外部引擎发现：探测远程调试端口上的 /json/version
//!
//! 纯探测，不修改管理器状态。

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
    #[serde(rename = "Browser", default)]
    browser: Option<String>,
}

/// 依次探测 `http://{host}:{port}/json/version`，返回第一个可用的 WebSocket 调试端点
pub async fn discover_endpoint(host: &str, ports: &[u16], timeout: Duration) -> Option<String> {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "discovery client build failed");
            return None;
        }
    };

    for port in ports {
        let url = format!("http://{}:{}/json/version", host, port);
        let resp = match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(url = %url, status = %resp.status(), "debug endpoint rejected probe");
                continue;
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "no debug endpoint");
                continue;
            }
        };
        match resp.json::<VersionInfo>().await {
            Ok(VersionInfo {
                web_socket_debugger_url: Some(ws),
                browser,
            }) => {
                tracing::info!(endpoint = %ws, browser = ?browser, "discovered running browser");
                return Some(ws);
            }
            Ok(_) => tracing::debug!(url = %url, "version info without webSocketDebuggerUrl"),
            Err(e) => tracing::debug!(url = %url, error = %e, "invalid version info"),
        }
    }
    None
}
