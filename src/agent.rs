//! 编排引擎
//!
//! KosmoAgent 把各协作者接成一条查询管线：会话定位与记账 -> 动态系统提示
//! （主题上下文 + 降级通告）-> ReAct 回合 -> 完成度校验。回合结果不完整时
//! 带纠正指令重试，硬错误按分类决定重试或格式化为带补救建议的错误文本；
//! 完成的回答在降级状态下追加通告。query 永不向调用方抛错，
//! query_cancellable 仅以 Cancelled 作为 Err。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::{
    classify_error, is_transient_error, AgentError, ErrorCategory, ErrorHandler, RetryPolicy,
};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::Message;
use crate::prompts::{build_system_prompt, enhance_system_prompt};
use crate::react::{run_episode, Episode, Planner};
use crate::session::{SessionMeta, SessionStore};
use crate::tools::{create_default_tools, ToolGateway, ToolRegistry};
use crate::validator::{is_response_complete, CompletionReason, NO_RESPONSE_PLACEHOLDER};

/// 查询被取消时 query 返回的文本
pub const CANCELLED_RESPONSE: &str = "Request cancelled.";

/// 耗尽所有尝试后的错误文本：原始消息 + 按类别的补救建议
pub fn format_error_response(message: &str, category: ErrorCategory) -> String {
    let mut out = format!(
        "I encountered an error while processing your request: {}\n",
        message
    );
    match category {
        ErrorCategory::Authentication => out.push_str(
            "\nPlease check that your API keys are correctly configured in the environment.",
        ),
        ErrorCategory::NetworkError => {
            out.push_str("\nPlease check your internet connection and try again.")
        }
        ErrorCategory::RateLimit => {
            out.push_str("\nThe service is rate-limited. Please wait a moment and try again.")
        }
        _ => out.push_str("\nPlease try rephrasing your question or try again later."),
    }
    out
}

/// 编排引擎：多会话、回合级重试与降级通告
pub struct KosmoAgent {
    planner: Planner,
    gateway: ToolGateway,
    tracker: ErrorHandler,
    sessions: SessionStore,
    policy: RetryPolicy,
    max_iterations: usize,
    graceful_degradation: bool,
    enable_memory: bool,
    use_topic_prompts: bool,
}

impl KosmoAgent {
    /// 按配置构建：LLM 后端 + 内置四个工具
    pub fn from_config(cfg: &AppConfig) -> Self {
        let llm = create_llm_from_config(&cfg.llm);
        Self::new(llm, cfg)
    }

    /// 注入自定义 LLM（测试用 Mock），工具仍按配置构建
    pub fn new(llm: Arc<dyn LlmClient>, cfg: &AppConfig) -> Self {
        Self::with_registry(llm, create_default_tools(&cfg.tools), cfg)
    }

    /// 注入自定义 LLM 与工具注册表
    pub fn with_registry(
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        cfg: &AppConfig,
    ) -> Self {
        let descriptions = registry.tool_descriptions();
        let schema = registry.to_schema_json();
        let known_tools = registry.tool_names();
        let policy = RetryPolicy::new(
            cfg.agent.max_retries,
            Duration::from_secs_f64(cfg.agent.retry_delay_secs),
        );
        Self {
            planner: Planner::new(llm, build_system_prompt(&descriptions, &schema)),
            gateway: ToolGateway::new(
                registry,
                cfg.tools.timeout_secs,
                policy.clone(),
                cfg.agent.with_tool_retry,
                cfg.tools.max_concurrency,
            ),
            tracker: ErrorHandler::new(known_tools),
            sessions: SessionStore::new(),
            policy,
            max_iterations: cfg.agent.max_iterations,
            graceful_degradation: cfg.agent.graceful_degradation,
            enable_memory: cfg.agent.enable_memory,
            use_topic_prompts: cfg.agent.use_topic_prompts,
        }
    }

    /// 处理一条查询；永不返回错误，失败也以可读文本给出
    pub async fn query(&self, input: &str, session_id: Option<&str>) -> String {
        let cancel = CancellationToken::new();
        match self.query_cancellable(input, session_id, &cancel).await {
            Ok(response) => response,
            Err(AgentError::Cancelled) => CANCELLED_RESPONSE.to_string(),
            // query_cancellable 的 Err 仅为 Cancelled，此分支满足类型完备
            Err(e) => {
                let message = e.to_string();
                format_error_response(&message, classify_error(&message))
            }
        }
    }

    /// 可取消的查询处理；Err 仅为 Cancelled
    pub async fn query_cancellable(
        &self,
        input: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let (_, session) = self.sessions.resolve(session_id).await;
        // 整个查询期间持有会话锁：同一会话的查询串行，不同会话互不阻塞
        let mut session = session.lock().await;
        session.begin_query();
        session.transcript.push(Message::user(input.to_string()));
        let query_start = session.transcript.len() - 1;

        let max_rounds = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let system = self.system_prompt_for(input).await;
            let history: Vec<Message> = if self.enable_memory {
                session.transcript.clone()
            } else {
                session.transcript[query_start..].to_vec()
            };
            let episode = Episode {
                planner: &self.planner,
                gateway: &self.gateway,
                tracker: &self.tracker,
                cancel,
                max_iterations: self.max_iterations,
            };

            match run_episode(&episode, &history, &system).await {
                Ok(result) => {
                    session.transcript.extend(result.messages);
                    let response = result
                        .final_answer
                        .unwrap_or_else(|| NO_RESPONSE_PLACEHOLDER.to_string());
                    let (complete, reason) = is_response_complete(&response);
                    if complete {
                        let (prompt_tokens, completion_tokens, total_tokens) =
                            self.planner.token_usage();
                        tracing::debug!(
                            prompt_tokens,
                            completion_tokens,
                            total_tokens,
                            "cumulative token usage"
                        );
                        return Ok(self.decorate_response(response).await);
                    }
                    if attempt >= max_rounds {
                        tracing::warn!(
                            attempts = attempt,
                            reason = reason.map(|r| r.as_str()).unwrap_or("unknown"),
                            "retry budget exhausted, returning best effort"
                        );
                        return Ok(self.decorate_response(response).await);
                    }
                    tracing::info!(
                        attempt,
                        reason = reason.map(|r| r.as_str()).unwrap_or("unknown"),
                        "incomplete response, retrying with corrective instruction"
                    );
                    let instruction = self.retry_instruction(reason).await;
                    session.transcript.push(Message::user(instruction));
                    // 回答不完整不是故障信号，等固定基数即可；线性退避只用于瞬态硬错误
                    self.wait(self.policy.base_delay, cancel).await?;
                    attempt += 1;
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    let message = e.to_string();
                    let category = classify_error(&message);
                    if is_transient_error(category) && attempt < max_rounds {
                        tracing::warn!(
                            attempt,
                            category = %category,
                            error = %message,
                            "transient failure, retrying round"
                        );
                        self.wait(self.policy.delay(attempt), cancel).await?;
                        attempt += 1;
                        continue;
                    }
                    tracing::error!(category = %category, error = %message, "query failed");
                    return Ok(format_error_response(&message, category));
                }
            }
        }
    }

    /// 本回合的完整系统提示：基础 + 主题上下文 + 降级通告
    async fn system_prompt_for(&self, query: &str) -> String {
        let mut system = self.planner.base_system_prompt().to_string();
        if self.use_topic_prompts {
            system = enhance_system_prompt(&system, query);
        }
        if self.graceful_degradation {
            let notice = self.tracker.degradation_notice().await;
            if !notice.is_empty() {
                system.push_str("\n\n");
                system.push_str(&notice);
            }
        }
        system
    }

    /// 按失败原因生成纠正指令
    async fn retry_instruction(&self, reason: Option<CompletionReason>) -> String {
        let mut msg = String::from("Please try again to complete the previous request.");
        match reason {
            Some(CompletionReason::ToolFailure) => {
                let failed = self.tracker.failed_tools().await;
                if failed.is_empty() {
                    msg.push_str(" If a tool failed, try an alternative approach.");
                } else {
                    let mut names: Vec<String> = failed.into_iter().collect();
                    names.sort();
                    msg.push_str(&format!(
                        " The following tools have failed: {}. Please try an alternative approach using different tools or provide the best answer you can with available information.",
                        names.join(", ")
                    ));
                }
            }
            Some(CompletionReason::EmptyResponse) => {
                msg.push_str(" Please provide a complete answer.");
            }
            None => {
                msg.push_str(" Try an alternative approach if needed.");
            }
        }
        msg
    }

    /// 降级状态下把通告追加到回答末尾；回答已含通告时不重复
    async fn decorate_response(&self, response: String) -> String {
        if !self.graceful_degradation {
            return response;
        }
        let notice = self.tracker.degradation_notice().await;
        if notice.is_empty() || response.contains(&notice) {
            return response;
        }
        format!("{}\n\n---\n{}", response, notice)
    }

    /// 可取消的回合级等待
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), AgentError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    pub async fn new_session(&self) -> String {
        self.sessions.new_session().await
    }

    pub async fn set_session(&self, id: &str) {
        self.sessions.set_current(id).await;
    }

    pub async fn current_session(&self) -> String {
        self.sessions.current().await
    }

    /// 会话元数据；从未接受过查询的 id 返回 None
    pub async fn session_info(&self, id: Option<&str>) -> Option<SessionMeta> {
        self.sessions.info(id).await
    }

    /// 所有会话元数据的深拷贝快照
    pub async fn list_sessions(&self) -> HashMap<String, SessionMeta> {
        self.sessions.list().await
    }

    /// 清空当前会话的对话记录，保留元数据
    pub async fn clear_memory(&self) {
        let id = self.sessions.current().await;
        self.sessions.clear_transcript(&id).await;
    }

    pub async fn failed_tools(&self) -> HashSet<String> {
        self.tracker.failed_tools().await
    }

    pub async fn reset_failed_tools(&self) {
        self.tracker.reset().await;
    }

    pub async fn error_summary(&self) -> HashMap<ErrorCategory, usize> {
        self.tracker.error_summary().await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.gateway.tool_names()
    }

    pub fn backend_name(&self) -> &str {
        self.planner.backend_name()
    }
}
