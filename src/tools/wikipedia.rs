//! Wikipedia 检索工具
//!
//! REST summary 端点取条目摘要；404 时回退到 search API 给出相近条目建议；
//! 消歧义页返回提示文本而非摘要。摘要超过 max_chars 截断。
//! web_search 降级后该工具作为事实检索的替代来源。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

const SUMMARY_ENDPOINT: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const SEARCH_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const USER_AGENT: &str = "Kosmo/1.0 (Cosmology Research Agent)";

/// Wikipedia 工具：条目摘要 + 未命中时的标题建议
pub struct WikipediaTool {
    client: Client,
    max_chars: usize,
}

/// 超长摘要截断（按字符数）
fn truncate_extract(extract: &str, max_chars: usize) -> String {
    if extract.chars().count() > max_chars {
        extract.chars().take(max_chars).collect::<String>() + "..."
    } else {
        extract.to_string()
    }
}

impl WikipediaTool {
    pub fn new(timeout_secs: u64, max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, max_chars }
    }

    async fn summary(&self, query: &str) -> Result<String, String> {
        let title = query.replace(' ', "_");
        let url = format!("{}/{}", SUMMARY_ENDPOINT, title);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if resp.status().as_u16() == 404 {
            return self.suggest(query).await;
        }
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response: {}", e))?;

        let extract = payload
            .get("extract")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if payload.get("type").and_then(|v| v.as_str()) == Some("disambiguation") {
            return Ok(format!(
                "'{}' may refer to multiple topics:\n{}\n\nTry a more specific title.",
                query, extract
            ));
        }
        if extract.is_empty() {
            return self.suggest(query).await;
        }

        let page_title = payload
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or(query);
        let page_url = payload
            .pointer("/content_urls/desktop/page")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("https://en.wikipedia.org/wiki/{}", title));
        Ok(format!(
            "**{}**\n\n{}\n\nSource: {}",
            page_title,
            truncate_extract(&extract, self.max_chars),
            page_url
        ))
    }

    /// 未命中的回退：全文搜索给出相近标题
    async fn suggest(&self, query: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "5"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response: {}", e))?;

        let titles: Vec<String> = payload
            .pointer("/query/search")
            .and_then(|v| v.as_array())
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| h.get("title").and_then(|t| t.as_str()))
                    .map(|t| t.to_string())
                    .collect()
            })
            .unwrap_or_default();
        if titles.is_empty() {
            return Ok(format!("No results found for query: {}", query));
        }
        Ok(format!(
            "No exact page found for '{}'. Did you mean one of: {}?",
            query,
            titles.join(", ")
        ))
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "search_wikipedia"
    }

    fn description(&self) -> &str {
        "Look up a topic on Wikipedia for established background knowledge (definitions, discoveries, missions). Args: {\"query\": \"Dark matter\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The article title or topic to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "wikipedia lookup");
        self.summary(query).await
    }
}
