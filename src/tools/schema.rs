//! 工具调用 JSON Schema 生成
//!
//! 用 schemars 生成「合法 tool call」的 JSON 结构并注入 system prompt，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// 工具调用请求格式：与 ReAct 解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名：web_search、execute_code、search_wikipedia、create_plot 之一
    pub tool: String,
    /// 工具参数，依工具不同而不同（query、code、title 等）
    pub args: HashMap<String, serde_json::Value>,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
