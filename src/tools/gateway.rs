//! 能力网关
//!
//! 对单次工具调用加超时与重试：硬失败（Err/超时）先分类，仅瞬态类别等待线性退避后重试，
//! 重试耗尽返回 "Error after N attempts: ..." 的失败记录；结果文本「看起来失败」且属瞬态措辞时
//! 同样重试，确定性的空结果（如 no results found）不重试。每次调用输出结构化审计日志（JSON）。
//! 网关自身不记录降级状态，失败记录由调用方转交 ErrorHandler。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::errors::{classify_error, AgentError, RetryPolicy};
use crate::memory::{InvocationStatus, ToolInvocation};
use crate::tools::ToolRegistry;

/// 「结果看起来失败」的指示词：执行机械上成功但文本表明逻辑失败
pub const INCOMPLETE_INDICATORS: &[&str] = &[
    "error:",
    "failed to",
    "could not",
    "unable to",
    "no results found",
    "api key not found",
    "rate limit",
    "timeout",
    "connection error",
];

/// 指示词中值得重试的瞬态子集；"no results found" 之类是确定性结果，重试不会改变
const TRANSIENT_RESULT_INDICATORS: &[&str] =
    &["rate limit", "timeout", "connection error", "api error"];

/// 结果文本是否像失败（空文本也算）
pub fn looks_incomplete(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_lowercase();
    INCOMPLETE_INDICATORS.iter().any(|p| lower.contains(p))
}

fn transient_result(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRANSIENT_RESULT_INDICATORS.iter().any(|p| lower.contains(p))
}

/// 能力网关：注册表 + 单次调用超时 + 重试策略 + 并发许可
pub struct ToolGateway {
    registry: ToolRegistry,
    timeout: Duration,
    policy: RetryPolicy,
    with_retry: bool,
    semaphore: Arc<Semaphore>,
}

impl ToolGateway {
    pub fn new(
        registry: ToolRegistry,
        timeout_secs: u64,
        policy: RetryPolicy,
        with_retry: bool,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            policy,
            with_retry,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }

    pub fn to_schema_json(&self) -> String {
        self.registry.to_schema_json()
    }

    /// 单次执行：并发许可 + 超时 + JSON 审计日志；超时与工具 Err 转为 AgentError
    async fn execute_once(&self, tool_name: &str, args: Value) -> Result<String, AgentError> {
        let _permit = self.semaphore.acquire().await.ok();
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(self.timeout.as_secs())),
        }
    }

    /// 调用一个能力并返回调用记录；仅取消会作为 Err 向上抛。
    /// 硬失败重试耗尽（或类别非瞬态）时记录 status=Failed，输出带尝试次数前缀与原始消息。
    pub async fn invoke(
        &self,
        tool: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolInvocation, AgentError> {
        let max_attempts = if self.with_retry {
            self.policy.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            // 在途执行同样要与取消令牌竞争，否则取消要等到调用结束或超时才生效
            let executed = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                executed = self.execute_once(tool, args.clone()) => executed,
            };
            match executed {
                Ok(text) => {
                    if attempt < max_attempts && looks_incomplete(&text) && transient_result(&text)
                    {
                        tracing::debug!(
                            tool = %tool,
                            attempt,
                            "result text looks transient, retrying"
                        );
                        self.backoff(attempt, cancel).await?;
                        attempt += 1;
                        continue;
                    }
                    return Ok(ToolInvocation {
                        tool: tool.to_string(),
                        args,
                        output: text,
                        status: InvocationStatus::Ok,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    let category = classify_error(&message);
                    if attempt < max_attempts && self.policy.is_transient(category) {
                        tracing::warn!(
                            tool = %tool,
                            attempt,
                            category = %category,
                            error = %message,
                            "transient tool failure, retrying"
                        );
                        self.backoff(attempt, cancel).await?;
                        attempt += 1;
                        continue;
                    }
                    return Ok(ToolInvocation {
                        tool: tool.to_string(),
                        args,
                        output: format!("Error after {} attempts: {}", attempt, message),
                        status: InvocationStatus::Failed,
                    });
                }
            }
        }
    }

    /// 并发调用一批独立能力；join_all 保证结果按请求顺序返回，并发度由许可数限制
    pub async fn invoke_many(
        &self,
        calls: Vec<(String, Value)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolInvocation>, AgentError> {
        let futures: Vec<_> = calls
            .iter()
            .map(|(tool, args)| self.invoke(tool, args.clone(), cancel))
            .collect();
        let results = join_all(futures).await;
        results.into_iter().collect()
    }

    /// 可取消的退避等待：取消令牌触发时立即返回 Cancelled
    async fn backoff(&self, attempt: u32, cancel: &CancellationToken) -> Result<(), AgentError> {
        let delay = self.policy.delay(attempt);
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
