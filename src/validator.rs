//! 回答完整性校验
//!
//! 对推理引擎的最终自然语言输出做纯文本启发式判断：空回答或含失败措辞则视为未完成，
//! 由 Conversation Engine 决定是否追加纠正消息再跑一轮。接受误判（措辞碰巧出现在正确答案里）。

use std::fmt;

/// 未完成的原因，用于生成针对性的纠正消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    EmptyResponse,
    ToolFailure,
}

impl CompletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionReason::EmptyResponse => "empty_response",
            CompletionReason::ToolFailure => "tool_failure",
        }
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 提取不到回答时使用的占位文本
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response generated.";

/// 出现即判定为「工具失败式回答」的措辞（小写匹配）
const FAILURE_PHRASES: &[&str] = &[
    "i was unable to",
    "i couldn't complete",
    "the tool failed",
    "error occurred",
    "i apologize, but i cannot",
];

/// 判断回答是否完整：(true, None) 表示完整；否则给出原因。
/// 规则按序：空/占位 -> EmptyResponse；含失败措辞 -> ToolFailure；其余完整。
pub fn is_response_complete(response: &str) -> (bool, Option<CompletionReason>) {
    let trimmed = response.trim();
    if trimmed.is_empty() || trimmed == NO_RESPONSE_PLACEHOLDER {
        return (false, Some(CompletionReason::EmptyResponse));
    }
    let lower = trimmed.to_lowercase();
    if FAILURE_PHRASES.iter().any(|p| lower.contains(p)) {
        return (false, Some(CompletionReason::ToolFailure));
    }
    (true, None)
}
