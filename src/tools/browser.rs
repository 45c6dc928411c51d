//! 浏览器动作：在会话页面上导航、取可读文本、执行 JS、滚动
//!
//! 页面由 ToolRegistry 按 `session_id` 从 BrowserSessionManager 取得，动作本身不管理引擎。
//! 导航受域名白名单约束（空列表表示不限制），输出按 max_result_chars 截断。

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::PageHandle;
use crate::config::BrowserSection;
use crate::tools::{ActionError, BrowserAction};

const TEXT_WIDTH: usize = 120;
const SCROLL_STEP: i64 = 500;

fn session_param() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "Browser session id; each session keeps its own page (default: \"default\")"
    })
}

/// 从 URL 提取域名（小写）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

fn html_to_text(html: String) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_else(|_| html)
}

/// browser_navigate：打开 URL，返回页面可读文本
pub struct NavigateAction {
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl NavigateAction {
    pub fn new(allowed_domains: Vec<String>, max_result_chars: usize) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            allowed_domains,
            max_result_chars,
        }
    }

    pub fn from_config(config: &BrowserSection) -> Self {
        Self::new(config.allowed_domains.clone(), config.max_result_chars)
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        if self.allowed_domains.is_empty() {
            return Ok(());
        }
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }
}

fn url_arg(args: &Value) -> Result<&str, String> {
    let url = args
        .get("url")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim();
    if url.is_empty() {
        return Err("Missing url".to_string());
    }
    Ok(url)
}

#[async_trait]
impl BrowserAction for NavigateAction {
    fn name(&self) -> &str {
        "browser_navigate"
    }

    fn description(&self) -> &str {
        "Open a URL in the session's browser page and return its readable text. Args: {\"url\": \"https://...\", \"session_id\": \"optional\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Absolute URL to open"},
                "session_id": session_param()
            },
            "required": ["url"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        self.is_allowed(url_arg(args)?)
    }

    async fn run(&self, page: &PageHandle, args: &Value) -> Result<String, ActionError> {
        let url = url_arg(args).map_err(ActionError::Rejected)?;
        tracing::info!(url = %url, session = %page.session_id(), "browser navigate");
        page.navigate(url).await?;
        let html = page.content().await?;
        Ok(truncate(
            format!("URL: {}\n\n{}", url, html_to_text(html)),
            self.max_result_chars,
        ))
    }
}

/// browser_content：当前页面文本，可用 CSS selector 只取某个元素
pub struct ContentAction {
    max_result_chars: usize,
}

impl ContentAction {
    pub fn new(max_result_chars: usize) -> Self {
        Self { max_result_chars }
    }

    pub fn from_config(config: &BrowserSection) -> Self {
        Self::new(config.max_result_chars)
    }
}

#[async_trait]
impl BrowserAction for ContentAction {
    fn name(&self) -> &str {
        "browser_content"
    }

    fn description(&self) -> &str {
        "Return the readable text of the session's current page. Args: {\"selector\": \"optional CSS\", \"session_id\": \"optional\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "selector": {"type": "string", "description": "Only return text inside the first matching element"},
                "session_id": session_param()
            },
            "required": []
        })
    }

    async fn run(&self, page: &PageHandle, args: &Value) -> Result<String, ActionError> {
        let selector = args.get("selector").and_then(|v| v.as_str());
        let text = match selector {
            Some(sel) => {
                let quoted = serde_json::to_string(sel)
                    .map_err(|e| ActionError::Rejected(format!("Invalid selector: {}", e)))?;
                let script = format!(
                    "(() => {{ const el = document.querySelector({}); return el ? el.innerText : null; }})()",
                    quoted
                );
                match page.evaluate(&script).await? {
                    Value::String(s) => s,
                    Value::Null => {
                        return Err(ActionError::Rejected(format!("Element not found: {}", sel)))
                    }
                    other => other.to_string(),
                }
            }
            None => html_to_text(page.content().await?),
        };
        Ok(truncate(text, self.max_result_chars))
    }
}

/// browser_evaluate：执行 JS 表达式，返回 JSON 结果
pub struct EvaluateAction {
    max_result_chars: usize,
}

impl EvaluateAction {
    pub fn new(max_result_chars: usize) -> Self {
        Self { max_result_chars }
    }

    pub fn from_config(config: &BrowserSection) -> Self {
        Self::new(config.max_result_chars)
    }
}

#[async_trait]
impl BrowserAction for EvaluateAction {
    fn name(&self) -> &str {
        "browser_evaluate"
    }

    fn description(&self) -> &str {
        "Evaluate a JavaScript expression in the session's page and return the JSON result. Args: {\"script\": \"document.title\", \"session_id\": \"optional\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "script": {"type": "string"},
                "session_id": session_param()
            },
            "required": ["script"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        match args.get("script").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("Missing script".to_string()),
        }
    }

    async fn run(&self, page: &PageHandle, args: &Value) -> Result<String, ActionError> {
        let script = args
            .get("script")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ActionError::Rejected("Missing script".to_string()))?;
        let value = page.evaluate(script).await?;
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(truncate(text, self.max_result_chars))
    }
}

/// browser_scroll：按方向滚动一屏
#[derive(Default)]
pub struct ScrollAction;

#[async_trait]
impl BrowserAction for ScrollAction {
    fn name(&self) -> &str {
        "browser_scroll"
    }

    fn description(&self) -> &str {
        "Scroll the session's page. Args: {\"direction\": \"down\" | \"up\", \"session_id\": \"optional\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "direction": {"type": "string", "enum": ["down", "up"]},
                "session_id": session_param()
            },
            "required": []
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        match args.get("direction").and_then(|v| v.as_str()) {
            None | Some("down") | Some("up") => Ok(()),
            Some(other) => Err(format!("Unknown direction: {}", other)),
        }
    }

    async fn run(&self, page: &PageHandle, args: &Value) -> Result<String, ActionError> {
        let direction = args
            .get("direction")
            .and_then(|v| v.as_str())
            .unwrap_or("down");
        let amount = if direction == "up" { -SCROLL_STEP } else { SCROLL_STEP };
        page.evaluate(&format!("window.scrollBy(0, {})", amount)).await?;
        Ok(format!("Scrolled {}", direction))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::browser::{BrowserSessionManager, MockLauncher};

    fn manager() -> BrowserSessionManager {
        let config = BrowserSection {
            discover_existing: false,
            action_timeout_secs: 1,
            ..BrowserSection::default()
        };
        BrowserSessionManager::new(config, Arc::new(MockLauncher::new()))
    }

    #[test]
    fn test_allowlist() {
        let open = NavigateAction::new(vec![], 100);
        assert!(open.validate(&serde_json::json!({"url": "https://anything.test"})).is_ok());
        assert!(open.validate(&serde_json::json!({})).is_err());

        let limited = NavigateAction::new(vec!["Docs.RS".to_string()], 100);
        assert!(limited
            .validate(&serde_json::json!({"url": "https://docs.rs/tokio"}))
            .is_ok());
        let err = limited
            .validate(&serde_json::json!({"url": "http://evil.test:8080/x"}))
            .unwrap_err();
        assert!(err.contains("evil.test"));
    }

    #[test]
    fn test_truncate_marks_cut() {
        assert_eq!(truncate("abc".to_string(), 5), "abc");
        assert_eq!(truncate("abcdef".to_string(), 3), "abc\n...[truncated]");
    }

    #[tokio::test]
    async fn test_navigate_returns_readable_text() {
        let manager = manager();
        let page = manager.get_or_create_page("s").await.unwrap();
        let out = NavigateAction::new(vec![], 8000)
            .run(&page, &serde_json::json!({"url": "https://a.example"}))
            .await
            .unwrap();
        assert!(out.starts_with("URL: https://a.example"));
        assert!(out.contains("Mock page at https://a.example"));
        assert!(!out.contains("<p>"));
    }

    #[tokio::test]
    async fn test_evaluate_and_scroll() {
        let manager = manager();
        let page = manager.get_or_create_page("s").await.unwrap();
        page.navigate("https://b.example").await.unwrap();

        let href = EvaluateAction::new(100)
            .run(&page, &serde_json::json!({"script": "location.href"}))
            .await
            .unwrap();
        assert_eq!(href, "https://b.example");

        let scrolled = ScrollAction
            .run(&page, &serde_json::json!({"direction": "up"}))
            .await
            .unwrap();
        assert_eq!(scrolled, "Scrolled up");
        assert!(ScrollAction
            .validate(&serde_json::json!({"direction": "sideways"}))
            .is_err());
    }
}
