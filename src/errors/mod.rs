//! 错误分类与重试策略
//!
//! 软失败走文本分类：classify_error 按固定优先级在消息中做大小写不敏感的子串匹配，
//! 得到 ErrorCategory；RetryPolicy 据类别与次数决定是否等待重试（线性退避）。
//! 硬失败走类型化的 AgentError（thiserror），两条通道互不混用。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod handler;

pub use handler::{ErrorHandler, ErrorRecord};

/// Agent 运行过程中的硬失败（LLM 调用、工具执行、解析、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool execution timed out after {0}s")]
    ToolTimeout(u64),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled by caller")]
    Cancelled,
}

/// 软失败分类（与原始错误字符串解耦，序列化为 snake_case）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ApiError,
    NetworkError,
    RateLimit,
    Timeout,
    Authentication,
    Validation,
    Execution,
    NotFound,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ApiError => "api_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Execution => "execution",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// 类别的严重级别：认证失败必须人工介入，视为 Critical；
    /// 瞬态类别等待后可自愈，视为 Recoverable；其余为 Warning。
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorCategory::Authentication => ErrorSeverity::Critical,
            ErrorCategory::RateLimit | ErrorCategory::Timeout | ErrorCategory::NetworkError => {
                ErrorSeverity::Recoverable
            }
            _ => ErrorSeverity::Warning,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Warning,
    Recoverable,
    Critical,
}

/// 分类模式表：按声明顺序逐类别匹配，先命中者胜。
/// 顺序即优先级，例如 "connection timeout" 同时含 timeout 与 connection，归入 Timeout。
const ERROR_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::RateLimit,
        &["rate limit", "too many requests", "quota exceeded", "429"],
    ),
    (
        ErrorCategory::Timeout,
        &["timeout", "timed out", "connection timeout"],
    ),
    (
        ErrorCategory::NetworkError,
        &[
            "connection error",
            "network error",
            "unreachable",
            "connection refused",
            "dns resolution",
        ],
    ),
    (
        ErrorCategory::Authentication,
        &[
            "api key not found",
            "unauthorized",
            "authentication failed",
            "invalid api key",
            "403",
            "401",
        ],
    ),
    (
        ErrorCategory::NotFound,
        &["not found", "404", "no results", "does not exist"],
    ),
    (
        ErrorCategory::Execution,
        &[
            "syntax error",
            "execution error",
            "runtime error",
            "name error",
            "type error",
        ],
    ),
];

/// 将失败消息分类：大小写不敏感的纯子串匹配，无锚定，无副作用；全不命中返回 Unknown
pub fn classify_error(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    for (category, patterns) in ERROR_PATTERNS {
        if patterns.iter().any(|p| lower.contains(p)) {
            return *category;
        }
    }
    ErrorCategory::Unknown
}

/// 是否值得等待后重试：仅外部可自愈的三类为真；认证、校验、执行类失败是确定性的，重试只会浪费时间预算
pub fn is_transient_error(category: ErrorCategory) -> bool {
    matches!(
        category,
        ErrorCategory::RateLimit | ErrorCategory::Timeout | ErrorCategory::NetworkError
    )
}

/// (工具, 类别) -> 面向操作者的回退建议；未收录的组合返回通用建议
pub fn fallback_suggestion(tool: &str, category: ErrorCategory) -> &'static str {
    match (tool, category) {
        ("web_search", ErrorCategory::Authentication) => {
            "Check the TAVILY_API_KEY environment variable."
        }
        ("web_search", ErrorCategory::RateLimit) => {
            "Wait a moment before searching again, or use search_wikipedia for factual lookups."
        }
        ("web_search", ErrorCategory::NetworkError) => {
            "Check your internet connection. Falling back to search_wikipedia or built-in knowledge."
        }
        ("execute_code", ErrorCategory::Execution) => {
            "Check the code for syntax errors. Try simplifying the calculation."
        }
        ("execute_code", ErrorCategory::Timeout) => {
            "The computation took too long. Try reducing the complexity."
        }
        ("search_wikipedia", ErrorCategory::NotFound) => {
            "Try a different search term, or use web_search for recent topics."
        }
        ("search_wikipedia", ErrorCategory::NetworkError) => "Check your internet connection.",
        ("create_plot", ErrorCategory::Execution) => {
            "Check the plotting code. Describe the data in text instead."
        }
        _ => "Try an alternative approach or rephrase your query.",
    }
}

/// 重试预算：最大尝试次数与线性退避基数。
/// Gateway 与 Conversation Engine 各持一份（双层重试），预算由配置独立给定。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn is_transient(&self, category: ErrorCategory) -> bool {
        is_transient_error(category)
    }

    /// 线性退避：base_delay * attempt（attempt 从 1 起）
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// 按类别聚合错误计数（ErrorHandler::error_summary 的载体）
pub type ErrorSummary = HashMap<ErrorCategory, usize>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(
            classify_error("Rate limit exceeded"),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            classify_error("HTTP 429: too many requests"),
            ErrorCategory::RateLimit
        );
        assert_eq!(classify_error("Quota exceeded"), ErrorCategory::RateLimit);
    }

    #[test]
    fn test_classify_timeout() {
        assert_eq!(classify_error("Request timed out"), ErrorCategory::Timeout);
        assert_eq!(
            classify_error("connection timeout after 30s"),
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn test_classify_network() {
        assert_eq!(
            classify_error("Connection error: host unreachable"),
            ErrorCategory::NetworkError
        );
        assert_eq!(
            classify_error("DNS resolution failed"),
            ErrorCategory::NetworkError
        );
    }

    #[test]
    fn test_classify_authentication() {
        assert_eq!(
            classify_error("Invalid API key"),
            ErrorCategory::Authentication
        );
        assert_eq!(classify_error("Error 401"), ErrorCategory::Authentication);
        assert_eq!(
            classify_error("403 Forbidden"),
            ErrorCategory::Authentication
        );
        assert_eq!(
            classify_error("API key not found in environment"),
            ErrorCategory::Authentication
        );
    }

    #[test]
    fn test_classify_not_found() {
        assert_eq!(classify_error("Page not found"), ErrorCategory::NotFound);
        assert_eq!(
            classify_error("No results for query"),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn test_classify_execution() {
        assert_eq!(
            classify_error("SyntaxError: invalid syntax"),
            ErrorCategory::Unknown,
            "patterns are substring based, 'syntaxerror' has no space"
        );
        assert_eq!(
            classify_error("syntax error on line 3"),
            ErrorCategory::Execution
        );
        assert_eq!(
            classify_error("Runtime error: division by zero"),
            ErrorCategory::Execution
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            classify_error("something completely different"),
            ErrorCategory::Unknown
        );
        assert_eq!(classify_error(""), ErrorCategory::Unknown);
    }

    #[test]
    fn test_classify_case_insensitive() {
        assert_eq!(
            classify_error("RATE LIMIT EXCEEDED"),
            ErrorCategory::RateLimit
        );
        assert_eq!(classify_error("TiMeD OuT"), ErrorCategory::Timeout);
    }

    #[test]
    fn test_classify_priority_order() {
        // 同时命中 RateLimit 与 Timeout 时，先声明的 RateLimit 胜出
        assert_eq!(
            classify_error("rate limit hit, request timed out"),
            ErrorCategory::RateLimit
        );
        // Timeout 优先于 NetworkError
        assert_eq!(
            classify_error("connection timeout"),
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn test_transient_categories() {
        assert!(is_transient_error(ErrorCategory::RateLimit));
        assert!(is_transient_error(ErrorCategory::Timeout));
        assert!(is_transient_error(ErrorCategory::NetworkError));
        assert!(!is_transient_error(ErrorCategory::Authentication));
        assert!(!is_transient_error(ErrorCategory::Execution));
        assert!(!is_transient_error(ErrorCategory::NotFound));
        assert!(!is_transient_error(ErrorCategory::ApiError));
        assert!(!is_transient_error(ErrorCategory::Validation));
        assert!(!is_transient_error(ErrorCategory::Unknown));
    }

    #[test]
    fn test_severity() {
        assert_eq!(
            ErrorCategory::Authentication.severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            ErrorCategory::RateLimit.severity(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(ErrorCategory::Execution.severity(), ErrorSeverity::Warning);
        assert_eq!(ErrorCategory::Unknown.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_retry_policy_linear_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_policy_fractional_base() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_secs(1));
    }

    #[test]
    fn test_fallback_suggestion_known_pairs() {
        assert!(
            fallback_suggestion("web_search", ErrorCategory::Authentication)
                .contains("TAVILY_API_KEY")
        );
        assert!(
            fallback_suggestion("search_wikipedia", ErrorCategory::NotFound)
                .contains("web_search")
        );
        assert!(
            fallback_suggestion("execute_code", ErrorCategory::Timeout).contains("complexity")
        );
    }

    #[test]
    fn test_fallback_suggestion_default() {
        assert_eq!(
            fallback_suggestion("create_plot", ErrorCategory::RateLimit),
            "Try an alternative approach or rephrase your query."
        );
        assert_eq!(
            fallback_suggestion("nonexistent", ErrorCategory::Unknown),
            "Try an alternative approach or rephrase your query."
        );
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
        assert_eq!(ErrorCategory::NetworkError.to_string(), "network_error");
        assert_eq!(ErrorCategory::ApiError.to_string(), "api_error");
    }

    #[test]
    fn test_agent_error_display() {
        let e = AgentError::LlmError("connection refused".to_string());
        assert_eq!(classify_error(&e.to_string()), ErrorCategory::NetworkError);
        let t = AgentError::ToolTimeout(30);
        assert_eq!(classify_error(&t.to_string()), ErrorCategory::Timeout);
    }
}
