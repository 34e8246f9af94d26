//! Web 搜索工具（Tavily）
//!
//! POST https://api.tavily.com/search，API key 取自 TAVILY_API_KEY 环境变量；
//! 返回编号的 标题/摘要/链接 列表；无命中返回 "No results found for query: {q}"。
//! 缺少 key、HTTP 非 2xx、请求失败均走 Err，由网关分类后决定是否重试。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const API_KEY_ENV: &str = "TAVILY_API_KEY";

/// Web 搜索工具：优先检索配置中的站点（arxiv、NASA 等），摘要由 Tavily 生成
pub struct WebSearchTool {
    client: Client,
    max_results: usize,
    include_domains: Vec<String>,
}

impl WebSearchTool {
    pub fn new(timeout_secs: u64, max_results: usize, include_domains: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_results,
            include_domains,
        }
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<String, String> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            format!("Error: {} not found in environment variables.", API_KEY_ENV)
        })?;

        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "search_depth": "advanced",
            "max_results": max_results,
            "include_domains": self.include_domains,
        });
        let resp = self
            .client
            .post(TAVILY_ENDPOINT)
            .json(&body)
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

        let results = payload
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(format_results(query, &results, max_results))
    }
}

/// 将 Tavily 结果数组渲染为编号列表；空数组渲染为确定性的无结果文本
fn format_results(query: &str, results: &[Value], max_results: usize) -> String {
    if results.is_empty() {
        return format!("No results found for query: {}", query);
    }
    let mut out = format!("Search results for '{}':\n", query);
    for (i, r) in results.iter().take(max_results).enumerate() {
        let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled");
        let content = r.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
        out.push_str(&format!("\n{}. {}\n{}\n{}\n", i + 1, title, content, url));
    }
    out.trim_end().to_string()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information on cosmology and astrophysics (recent papers, observations, mission news). Args: {\"query\": \"...\", \"max_results\": 3}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return"
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
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.max_results)
            .max(1);
        tracing::info!(query = %query, max_results, "web search");
        self.search(query, max_results).await
    }
}
