//! 会话记录：消息与工具调用记录
//!
//! Transcript 只追加不修改：user / assistant / tool（工具观察结果）三类消息按完成顺序排列，
//! assistant 消息可携带本轮发出的 ToolInvocation 记录（由 Gateway 产出，记录后不可变）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色；System 仅用于拼装 LLM 请求，不进入会话记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 一次工具调用的结果状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationStatus {
    Ok,
    Failed,
}

/// 一次工具调用记录：名称、参数（对编排器不透明）、结果或失败文本、状态
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: Value,
    pub output: String,
    pub status: InvocationStatus,
}

impl ToolInvocation {
    pub fn is_failed(&self) -> bool {
        self.status == InvocationStatus::Failed
    }
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 本条 assistant 消息发出的工具调用；其余角色恒为空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            invocations: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            invocations: Vec::new(),
        }
    }

    pub fn assistant_with_invocations(
        content: impl Into<String>,
        invocations: Vec<ToolInvocation>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            invocations,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            invocations: Vec::new(),
        }
    }

    /// 工具观察结果（capability-result）
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            invocations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::assistant("ok").role, Role::Assistant);
        assert_eq!(Message::tool("obs").role, Role::Tool);
        assert!(Message::user("hi").invocations.is_empty());
    }

    #[test]
    fn test_assistant_with_invocations() {
        let inv = ToolInvocation {
            tool: "web_search".to_string(),
            args: serde_json::json!({"query": "dark matter"}),
            output: "results".to_string(),
            status: InvocationStatus::Ok,
        };
        let msg = Message::assistant_with_invocations("calling search", vec![inv]);
        assert_eq!(msg.invocations.len(), 1);
        assert!(!msg.invocations[0].is_failed());
    }
}
