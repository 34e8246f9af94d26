//! Mock LLM 客户端（用于测试与无 API key 的离线运行）
//!
//! 按脚本逐条返回预设输出（Ok 为模型文本，Err 为模拟的后端错误）；
//! 脚本耗尽后返回默认应答。记录调用次数，供测试断言重试行为。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

/// Mock 客户端：脚本驱动，计数调用
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    default_response: String,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            default_response:
                "This is a mock response. Configure an OpenAI-compatible API key to get real answers."
                    .to_string(),
        }
    }

    /// 预设一串输出，依次弹出
    pub fn with_script(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            default_response: "Mock script exhausted.".to_string(),
        }
    }

    /// 固定返回同一段文本
    pub fn with_default(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            default_response: response.to_string(),
        }
    }

    /// 已被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.pop_front()
        };
        next.unwrap_or_else(|| Ok(self.default_response.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_plays_in_order_then_default() {
        let mock = MockLlmClient::with_script(vec![
            Ok("first".to_string()),
            Err("rate limit".to_string()),
        ]);
        assert_eq!(mock.complete(&[]).await, Ok("first".to_string()));
        assert_eq!(mock.complete(&[]).await, Err("rate limit".to_string()));
        assert_eq!(mock.complete(&[]).await, Ok("Mock script exhausted.".to_string()));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_default_response() {
        let mock = MockLlmClient::with_default("canned");
        assert_eq!(mock.complete(&[]).await, Ok("canned".to_string()));
        assert_eq!(mock.calls(), 1);
    }
}
