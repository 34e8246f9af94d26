//! Planner：意图规划与 Tool Call 解析
//!
//! 调用 LLM 得到回复或 JSON Tool Call；parse_llm_output 从文本中提取 JSON 并解析为
//! 单个 ToolCall、一批 ToolCall（JSON 数组，可并发执行）或直接回复。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "web_search", "args": {"query": "..."}}）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Planner 输出
#[derive(Debug, Clone)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
    /// 一批相互独立的工具调用，可并发执行
    ToolBatch(Vec<ToolCall>),
}

/// 解析 LLM 输出：含有效 JSON 且 tool 非空则为 ToolCall / ToolBatch，否则为 Response。
/// JSON 块无法解析时返回 JsonParseError，由循环回写纠正提示后重试。
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    // 尝试提取 JSON 块（```json ... ```、纯对象或纯数组）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if trimmed.starts_with('[') {
        trimmed
    } else if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    if json_str.starts_with('[') {
        let mut calls: Vec<ToolCall> = serde_json::from_str(json_str)
            .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;
        calls.retain(|c| !c.tool.is_empty());
        return Ok(match calls.len() {
            0 => PlannerOutput::Response(trimmed.to_string()),
            1 => PlannerOutput::ToolCall(calls.remove(0)),
            _ => PlannerOutput::ToolBatch(calls),
        });
    }

    let parsed: ToolCall = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    if parsed.tool.is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

/// Planner：持有 LLM 与基础 system prompt，拼 system + messages 后调用 LLM
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 后端名（日志与 CLI 展示用）
    pub fn backend_name(&self) -> &str {
        self.llm.name()
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 使用动态拼接的 system（含主题上下文、降级通告等）调用 LLM
    pub async fn plan_with_system(
        &self,
        messages: &[Message],
        system: &str,
    ) -> Result<String, AgentError> {
        let mut full_messages = vec![Message::system(system.to_string())];
        full_messages.extend(messages.to_vec());
        self.llm
            .complete(&full_messages)
            .await
            .map_err(AgentError::LlmError)
    }
}
