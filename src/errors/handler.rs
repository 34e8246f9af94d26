//! 降级追踪器
//!
//! 记录失败的工具与错误日志，生成面向用户的降级通知与按类别的错误汇总。
//! 失败集与日志属于编排器实例（跨会话共享），由 RwLock 保护；仅显式 reset 清空。

use std::collections::HashSet;

use tokio::sync::RwLock;

use crate::errors::{
    classify_error, fallback_suggestion, is_transient_error, ErrorCategory, ErrorSummary,
};

/// 单条错误记录：哪个工具、归为哪类、原始消息、是否瞬态；按发生顺序追加
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub tool: String,
    pub category: ErrorCategory,
    pub message: String,
    pub transient: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    failed_tools: HashSet<String>,
    error_log: Vec<ErrorRecord>,
}

/// 降级追踪器：已知工具全集 + 失败集 + 错误日志
pub struct ErrorHandler {
    known_tools: Vec<String>,
    state: RwLock<TrackerState>,
}

impl ErrorHandler {
    /// known_tools 为注册的全部工具名，用于计算「仍可用集合」
    pub fn new(known_tools: Vec<String>) -> Self {
        Self {
            known_tools,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// 记录一次工具失败：分类、追加日志、加入失败集；返回分类结果
    pub async fn record_failure(&self, tool: &str, message: &str) -> ErrorCategory {
        let category = classify_error(message);
        let transient = is_transient_error(category);
        tracing::warn!(
            tool = %tool,
            category = %category,
            transient,
            severity = ?category.severity(),
            "tool failure recorded"
        );
        let mut state = self.state.write().await;
        state.error_log.push(ErrorRecord {
            tool: tool.to_string(),
            category,
            message: message.to_string(),
            transient,
        });
        state.failed_tools.insert(tool.to_string());
        category
    }

    /// 记录失败并返回带回退建议的用户可读消息（作为 Observation 回灌给模型）
    pub async fn handle_tool_error(&self, tool: &str, message: &str) -> String {
        let category = self.record_failure(tool, message).await;
        let suggestion = fallback_suggestion(tool, category);
        format!(
            "Tool '{}' failed: {}\nSuggestion: {}",
            tool, message, suggestion
        )
    }

    /// 生成降级通知：无失败返回空串；全部失败提示仅剩内置知识；
    /// 否则列出不可用工具，并为仍可用集合能覆盖的回退各补一句说明
    pub async fn degradation_notice(&self) -> String {
        let state = self.state.read().await;
        if state.failed_tools.is_empty() {
            return String::new();
        }
        let working: Vec<&String> = self
            .known_tools
            .iter()
            .filter(|t| !state.failed_tools.contains(*t))
            .collect();
        if working.is_empty() {
            return "All tools are currently unavailable. \
                    I can only provide information from my training data."
                .to_string();
        }

        let mut failed: Vec<&String> = state.failed_tools.iter().collect();
        failed.sort();
        let names = failed
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let verb = if failed.len() == 1 { "is" } else { "are" };
        let mut parts = vec![format!("Note: {} {} currently unavailable.", names, verb)];

        if state.failed_tools.contains("web_search")
            && working.iter().any(|t| t.as_str() == "search_wikipedia")
        {
            parts.push("Using Wikipedia for fact lookup instead of web search.".to_string());
        }
        if state.failed_tools.contains("create_plot") {
            parts.push(
                "Unable to generate visualizations. Providing numerical results only.".to_string(),
            );
        }
        parts.join(" ")
    }

    /// 按类别聚合错误计数；无错误时为空表
    pub async fn error_summary(&self) -> ErrorSummary {
        let state = self.state.read().await;
        let mut summary = ErrorSummary::new();
        for record in &state.error_log {
            *summary.entry(record.category).or_insert(0) += 1;
        }
        summary
    }

    /// 失败工具集快照（副本，修改不影响内部状态）
    pub async fn failed_tools(&self) -> HashSet<String> {
        self.state.read().await.failed_tools.clone()
    }

    /// 错误日志快照
    pub async fn error_log(&self) -> Vec<ErrorRecord> {
        self.state.read().await.error_log.clone()
    }

    /// 清空失败集与错误日志；不影响任何会话
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.failed_tools.clear();
        state.error_log.clear();
        tracing::info!("failed tool set and error log cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kosmo_tools() -> Vec<String> {
        vec![
            "web_search".to_string(),
            "execute_code".to_string(),
            "search_wikipedia".to_string(),
            "create_plot".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_record_failure_populates_set_and_log() {
        let handler = ErrorHandler::new(kosmo_tools());
        let category = handler
            .record_failure("web_search", "Rate limit exceeded")
            .await;
        assert_eq!(category, ErrorCategory::RateLimit);

        let failed = handler.failed_tools().await;
        assert!(failed.contains("web_search"));
        assert_eq!(failed.len(), 1);

        let log = handler.error_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].tool, "web_search");
        assert_eq!(log[0].category, ErrorCategory::RateLimit);
        assert!(log[0].transient);
        assert_eq!(log[0].message, "Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_handle_tool_error_contains_original_message() {
        let handler = ErrorHandler::new(kosmo_tools());
        let msg = handler
            .handle_tool_error("web_search", "Invalid API key")
            .await;
        assert!(msg.contains("web_search"));
        assert!(msg.contains("Invalid API key"));
        assert!(msg.contains("TAVILY_API_KEY"));
        assert_eq!(handler.error_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_notice_empty_without_failures() {
        let handler = ErrorHandler::new(kosmo_tools());
        assert_eq!(handler.degradation_notice().await, "");
    }

    #[tokio::test]
    async fn test_notice_singular_verb() {
        let handler = ErrorHandler::new(kosmo_tools());
        handler.record_failure("create_plot", "runtime error").await;
        let notice = handler.degradation_notice().await;
        assert!(notice.contains("create_plot is currently unavailable"));
        assert!(notice.contains("numerical results only"));
    }

    #[tokio::test]
    async fn test_notice_plural_verb_and_wikipedia_fallback() {
        let handler = ErrorHandler::new(kosmo_tools());
        handler.record_failure("web_search", "401").await;
        handler.record_failure("create_plot", "runtime error").await;
        let notice = handler.degradation_notice().await;
        assert!(notice.contains("are currently unavailable"));
        assert!(notice.contains("create_plot, web_search"));
        assert!(notice.contains("Using Wikipedia for fact lookup"));
    }

    #[tokio::test]
    async fn test_notice_all_tools_failed() {
        let handler = ErrorHandler::new(kosmo_tools());
        for tool in kosmo_tools() {
            handler.record_failure(&tool, "connection error").await;
        }
        let notice = handler.degradation_notice().await;
        assert!(notice.contains("All tools are currently unavailable"));
        assert!(notice.contains("training data"));
    }

    #[tokio::test]
    async fn test_error_summary_counts_by_category() {
        let handler = ErrorHandler::new(kosmo_tools());
        handler.record_failure("web_search", "rate limit").await;
        handler
            .record_failure("search_wikipedia", "429 too many requests")
            .await;
        handler.record_failure("execute_code", "syntax error").await;

        let summary = handler.error_summary().await;
        assert_eq!(summary.get(&ErrorCategory::RateLimit), Some(&2));
        assert_eq!(summary.get(&ErrorCategory::Execution), Some(&1));
        assert_eq!(summary.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_set_and_summary() {
        let handler = ErrorHandler::new(kosmo_tools());
        handler.record_failure("web_search", "timeout").await;
        handler.reset().await;
        assert!(handler.failed_tools().await.is_empty());
        assert!(handler.error_summary().await.is_empty());
        assert_eq!(handler.degradation_notice().await, "");
    }

    #[tokio::test]
    async fn test_failed_tools_returns_copy() {
        let handler = ErrorHandler::new(kosmo_tools());
        handler.record_failure("web_search", "timeout").await;
        let mut snapshot = handler.failed_tools().await;
        snapshot.insert("execute_code".to_string());
        assert_eq!(handler.failed_tools().await.len(), 1);
    }
}
