//! ReAct 回合循环
//!
//! Plan -> Act (Tool) -> Observe -> 下一轮 Plan，直到模型给出直接回复或达到步数上限。
//! 工具失败已在网关内重试过，这里只把带建议的失败观察回写给模型，让其改用其他工具；
//! 未注册的工具名不执行也不计入降级，仅回写纠正观察。硬错误（LLM 失败、取消）向上抛，
//! 由编排层决定回合级重试或格式化错误。

use tokio_util::sync::CancellationToken;

use crate::errors::{AgentError, ErrorHandler};
use crate::memory::Message;
use crate::react::planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
use crate::tools::ToolGateway;

/// 模型输出无法解析为 JSON 时回写的纠正提示
const JSON_RETRY_PROMPT: &str = "Your previous reply was not valid JSON. To call a tool, reply with exactly one JSON object like {\"tool\": \"tool_name\", \"args\": {...}} and nothing else. To answer directly, reply in plain text.";

/// 一个回合的协作者集合
pub struct Episode<'a> {
    pub planner: &'a Planner,
    pub gateway: &'a ToolGateway,
    pub tracker: &'a ErrorHandler,
    pub cancel: &'a CancellationToken,
    pub max_iterations: usize,
}

/// 回合结果：本回合新产生的消息与最终回复（若有）
#[derive(Debug)]
pub struct EpisodeResult {
    pub messages: Vec<Message>,
    pub final_answer: Option<String>,
}

/// 执行一个回合：history 为进入回合前的对话，system 为本回合的完整系统提示。
/// 返回的 messages 仅含本回合新增部分，由编排层决定写入会话。
pub async fn run_episode(
    episode: &Episode<'_>,
    history: &[Message],
    system: &str,
) -> Result<EpisodeResult, AgentError> {
    let mut produced: Vec<Message> = Vec::new();
    let mut step = 0usize;

    loop {
        if episode.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if step >= episode.max_iterations {
            // 直接回复会在 Response 分支立即返回；走到这里 produced 里全是
            // 协议消息（工具调用 JSON、观察、纠正提示），不能当回复交给用户
            tracing::warn!(max_iterations = episode.max_iterations, "episode hit the iteration cap");
            return Ok(EpisodeResult {
                final_answer: None,
                messages: produced,
            });
        }

        let mut messages = history.to_vec();
        messages.extend(produced.iter().cloned());
        let output = tokio::select! {
            _ = episode.cancel.cancelled() => return Err(AgentError::Cancelled),
            output = episode.planner.plan_with_system(&messages, system) => output?,
        };

        match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(resp)) => {
                produced.push(Message::assistant(resp.clone()));
                return Ok(EpisodeResult {
                    messages: produced,
                    final_answer: Some(resp),
                });
            }
            Ok(PlannerOutput::ToolCall(call)) => {
                run_calls(episode, &mut produced, &output, vec![call]).await?;
            }
            Ok(PlannerOutput::ToolBatch(calls)) => {
                run_calls(episode, &mut produced, &output, calls).await?;
            }
            Err(AgentError::JsonParseError(detail)) => {
                tracing::debug!(error = %detail, "unparseable model output, re-prompting");
                produced.push(Message::assistant(output.clone()));
                produced.push(Message::user(JSON_RETRY_PROMPT.to_string()));
            }
            Err(e) => return Err(e),
        }

        step += 1;
    }
}

/// 执行一批工具调用并把观察回写到 produced
async fn run_calls(
    episode: &Episode<'_>,
    produced: &mut Vec<Message>,
    raw_output: &str,
    calls: Vec<ToolCall>,
) -> Result<(), AgentError> {
    // 未注册的工具名：不执行、不计入降级，回写观察让模型自行纠正
    if let Some(unknown) = calls.iter().find(|c| !episode.gateway.contains(&c.tool)) {
        tracing::warn!(tool = %unknown.tool, "model requested an unregistered tool");
        produced.push(Message::assistant(raw_output.to_string()));
        produced.push(Message::tool(format!(
            "Error: unknown tool '{}'. Available tools: {}",
            unknown.tool,
            episode.gateway.tool_names().join(", ")
        )));
        return Ok(());
    }

    let pairs: Vec<(String, serde_json::Value)> = calls
        .iter()
        .map(|c| (c.tool.clone(), c.args.clone()))
        .collect();
    let invocations = if pairs.len() == 1 {
        let (tool, args) = &pairs[0];
        vec![episode.gateway.invoke(tool, args.clone(), episode.cancel).await?]
    } else {
        episode.gateway.invoke_many(pairs, episode.cancel).await?
    };

    produced.push(Message::assistant_with_invocations(
        raw_output.to_string(),
        invocations.clone(),
    ));
    for invocation in &invocations {
        let observation = if invocation.is_failed() {
            episode
                .tracker
                .handle_tool_error(&invocation.tool, &invocation.output)
                .await
        } else {
            invocation.output.clone()
        };
        produced.push(Message::tool(format!(
            "Observation from {}: {}",
            invocation.tool, observation
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RetryPolicy;
    use crate::llm::{LlmClient, MockLlmClient};
    use crate::memory::Role;
    use crate::tools::{Tool, ToolGateway, ToolRegistry};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedTool {
        tool_name: &'static str,
        result: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            self.tool_name
        }

        fn description(&self) -> &str {
            "test double"
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            self.result.map(String::from).map_err(String::from)
        }
    }

    fn gateway_with(tool: FixedTool) -> ToolGateway {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        ToolGateway::new(
            registry,
            5,
            RetryPolicy::new(1, Duration::from_millis(1)),
            true,
            4,
        )
    }

    async fn run(
        llm: Arc<dyn LlmClient>,
        gateway: &ToolGateway,
        tracker: &ErrorHandler,
        max_iterations: usize,
    ) -> EpisodeResult {
        let planner = Planner::new(llm, "You are a test assistant.");
        let cancel = CancellationToken::new();
        let episode = Episode {
            planner: &planner,
            gateway,
            tracker,
            cancel: &cancel,
            max_iterations,
        };
        run_episode(&episode, &[Message::user("question".to_string())], "system")
            .await
            .expect("episode")
    }

    #[tokio::test]
    async fn test_tool_call_then_final_answer() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            Ok(r#"{"tool": "lookup", "args": {"query": "q"}}"#.to_string()),
            Ok("The answer is 42.".to_string()),
        ]));
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("found it"),
        });
        let tracker = ErrorHandler::new(vec!["lookup".to_string()]);
        let result = run(llm.clone(), &gateway, &tracker, 5).await;

        assert_eq!(result.final_answer.as_deref(), Some("The answer is 42."));
        assert_eq!(result.messages.len(), 3);
        assert!(matches!(result.messages[1].role, Role::Tool));
        assert_eq!(result.messages[1].content, "Observation from lookup: found it");
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_tool_observation_carries_suggestion() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            Ok(r#"{"tool": "lookup", "args": {}}"#.to_string()),
            Ok("I could not find it.".to_string()),
        ]));
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Err("invalid api key"),
        });
        let tracker = ErrorHandler::new(vec!["lookup".to_string()]);
        let result = run(llm, &gateway, &tracker, 5).await;

        let observation = &result.messages[1].content;
        assert!(observation.contains("Observation from lookup:"));
        assert!(observation.contains("Suggestion:"));
        assert!(tracker.failed_tools().await.contains("lookup"));
    }

    #[tokio::test]
    async fn test_unknown_tool_not_tracked() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            Ok(r#"{"tool": "teleport", "args": {}}"#.to_string()),
            Ok("Done without tools.".to_string()),
        ]));
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("unused"),
        });
        let tracker = ErrorHandler::new(vec!["lookup".to_string()]);
        let result = run(llm, &gateway, &tracker, 5).await;

        assert_eq!(result.final_answer.as_deref(), Some("Done without tools."));
        let observation = &result.messages[1].content;
        assert!(observation.contains("unknown tool 'teleport'"));
        assert!(observation.contains("lookup"));
        assert!(tracker.failed_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_triggers_reprompt() {
        let llm = Arc::new(MockLlmClient::with_script(vec![
            Ok(r#"{"tool": "lookup", "args":"#.to_string()),
            Ok("Recovered answer.".to_string()),
        ]));
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("unused"),
        });
        let tracker = ErrorHandler::new(vec!["lookup".to_string()]);
        let result = run(llm.clone(), &gateway, &tracker, 5).await;

        assert_eq!(result.final_answer.as_deref(), Some("Recovered answer."));
        assert!(result
            .messages
            .iter()
            .any(|m| matches!(m.role, Role::User) && m.content.contains("not valid JSON")));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_iteration_cap_yields_no_final_answer() {
        // 模型永远只发工具调用，步数上限后没有可交给用户的回复，
        // 尤其不能把工具调用 JSON 当回复
        let llm = Arc::new(MockLlmClient::with_default(
            r#"{"tool": "lookup", "args": {}}"#,
        ));
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("partial data"),
        });
        let tracker = ErrorHandler::new(vec!["lookup".to_string()]);
        let result = run(llm.clone(), &gateway, &tracker, 2).await;

        assert_eq!(llm.calls(), 2);
        assert_eq!(result.messages.len(), 4);
        assert!(result.final_answer.is_none());
    }

    #[tokio::test]
    async fn test_llm_error_bubbles_up() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_script(vec![Err(
            "connection refused".to_string(),
        )]));
        let planner = Planner::new(llm, "system");
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("unused"),
        });
        let tracker = ErrorHandler::new(vec![]);
        let cancel = CancellationToken::new();
        let episode = Episode {
            planner: &planner,
            gateway: &gateway,
            tracker: &tracker,
            cancel: &cancel,
            max_iterations: 5,
        };
        let err = run_episode(&episode, &[], "system")
            .await
            .expect_err("llm failure");
        assert!(matches!(err, AgentError::LlmError(_)));
    }

    #[tokio::test]
    async fn test_cancelled_episode_returns_cancelled() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
        let planner = Planner::new(llm, "system");
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("unused"),
        });
        let tracker = ErrorHandler::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let episode = Episode {
            planner: &planner,
            gateway: &gateway,
            tracker: &tracker,
            cancel: &cancel,
            max_iterations: 5,
        };
        let err = run_episode(&episode, &[], "system")
            .await
            .expect_err("cancelled");
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_during_llm_call_returns_promptly() {
        struct SlowLlm;

        #[async_trait]
        impl LlmClient for SlowLlm {
            async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_string())
            }

            fn name(&self) -> &str {
                "slow"
            }
        }

        let planner = Planner::new(Arc::new(SlowLlm), "system");
        let gateway = gateway_with(FixedTool {
            tool_name: "lookup",
            result: Ok("unused"),
        });
        let tracker = ErrorHandler::new(vec![]);
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            });
        }
        let episode = Episode {
            planner: &planner,
            gateway: &gateway,
            tracker: &tracker,
            cancel: &cancel,
            max_iterations: 5,
        };
        let start = std::time::Instant::now();
        let err = run_episode(&episode, &[Message::user("question".to_string())], "system")
            .await
            .expect_err("cancelled");
        assert!(matches!(err, AgentError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
