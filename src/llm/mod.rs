//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

use std::sync::Arc;

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

use crate::config::LlmSection;

/// 按配置构建 LLM 客户端；provider 为 mock 或 API key 缺失时回退到 Mock
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    if cfg.provider == "mock" {
        return Arc::new(MockLlmClient::new());
    }
    match std::env::var(&cfg.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Arc::new(OpenAiClient::new(
            cfg.base_url.as_deref(),
            &cfg.model,
            Some(&key),
            cfg.temperature,
            cfg.max_tokens,
            cfg.request_timeout_secs,
        )),
        _ => {
            tracing::warn!(
                env = %cfg.api_key_env,
                "API key not set, falling back to the mock LLM client"
            );
            Arc::new(MockLlmClient::new())
        }
    }
}
