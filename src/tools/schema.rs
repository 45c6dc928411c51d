//! 工具调用 JSON Schema 生成（schemars）
//!
//! 推理循环按此格式提交工具调用，浏览器动作额外读取 args.session_id。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 工具调用请求格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 合并目录中的工具名，如 echo、browser_navigate 或某个提供者的工具
    pub tool: String,
    /// 工具参数，依工具而定；浏览器动作可带 session_id 选择独立页面
    pub args: Value,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_schema_lists_fields() {
        let schema: Value = serde_json::from_str(&tool_call_schema_json()).unwrap();
        let props = &schema["properties"];
        assert!(props.get("tool").is_some());
        assert!(props.get("args").is_some());
    }
}
