//! 提示词：基础 ReAct 系统提示与按查询主题的上下文增强

pub mod topics;

pub use topics::{detect_topic, enhance_system_prompt, TopicContext};

use crate::tools::tool_call_schema_json;

/// 基础 ReAct 系统提示（persona + 工具调用协议 + 使用规则）
pub const REACT_SYSTEM_PROMPT: &str = r#"You are Kosmo, a research assistant specialising in cosmology and astrophysics. You answer questions about dark matter, dark energy, the cosmic microwave background, exoplanets, galaxy formation and related topics.

You can use tools. To call a tool, reply with exactly one JSON object and nothing else:
{"tool": "tool_name", "args": {...}}
To run several independent lookups at once, reply with a JSON array of such objects.
When you have enough information, reply in plain text with your final answer.

Rules:
- Prefer search_wikipedia for established background facts; use web_search for recent results and mission news.
- Use execute_code for any non-trivial calculation instead of computing in your head.
- If a tool observation reports a failure, follow its suggestion or try a different tool.
- Cite the source of factual claims when a tool provided one."#;

/// 拼装完整系统提示：基础 prompt + 工具清单（含各工具参数 schema）+ 调用格式 schema
pub fn build_system_prompt(tool_descriptions: &[(String, String)], tools_schema_json: &str) -> String {
    let mut prompt = String::from(REACT_SYSTEM_PROMPT);
    prompt.push_str("\n\nAvailable tools:\n");
    for (name, description) in tool_descriptions {
        prompt.push_str(&format!("- {}: {}\n", name, description));
    }
    prompt.push_str("\nTool parameter schemas:\n```json\n");
    prompt.push_str(tools_schema_json);
    prompt.push_str("\n```\n\n## Tool call JSON Schema (you must output valid JSON matching this)\n```json\n");
    prompt.push_str(&tool_call_schema_json());
    prompt.push_str("\n```");
    prompt
}
