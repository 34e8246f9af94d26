//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KOSMO__*` 覆盖（双下划线表示嵌套，
//! 如 `KOSMO__LLM__MODEL=gpt-4o`）。所有字段带默认值，配置文件缺失也能运行。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [llm] 段：后端选择与请求参数
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai（任意兼容端点）或 mock（离线）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点；None 用官方端点
    pub base_url: Option<String>,
    /// 存放 API key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 单次 LLM 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.1
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// [agent] 段：回合与重试预算、行为开关
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单回合内最大 ReAct 步数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 回合级与工具级共用的最大尝试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试等待基数（秒）：硬错误线性退避，回答不完整时等固定基数
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,
    /// 是否在网关内对单次工具调用重试（关闭后每次调用只执行一次）
    #[serde(default = "default_enabled")]
    pub with_tool_retry: bool,
    /// 是否在回复后追加降级通告
    #[serde(default = "default_enabled")]
    pub graceful_degradation: bool,
    /// 是否把会话历史全部提供给模型（关闭后只提供当前查询）
    #[serde(default = "default_enabled")]
    pub enable_memory: bool,
    /// 是否按查询主题增强系统提示
    #[serde(default = "default_enabled")]
    pub use_topic_prompts: bool,
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            with_tool_retry: default_enabled(),
            graceful_degradation: default_enabled(),
            enable_memory: default_enabled(),
            use_topic_prompts: default_enabled(),
        }
    }
}

/// [tools] 段：网关超时、并发上限与各工具参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），网关层统一施加
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// 并发执行的工具调用上限
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// 图片等产物的输出目录
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    #[serde(default)]
    pub web_search: WebSearchSection,
    #[serde(default)]
    pub wikipedia: WikipediaSection,
    #[serde(default)]
    pub code: CodeSection,
    #[serde(default)]
    pub plot: PlotSection,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_output_dir() -> String {
    "outputs".to_string()
}

fn default_python_bin() -> String {
    "python3".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            output_dir: default_output_dir(),
            python_bin: default_python_bin(),
            web_search: WebSearchSection::default(),
            wikipedia: WikipediaSection::default(),
            code: CodeSection::default(),
            plot: PlotSection::default(),
        }
    }
}

/// [tools.web_search] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSection {
    #[serde(default = "default_web_search_max_results")]
    pub max_results: usize,
    #[serde(default = "default_web_search_timeout_secs")]
    pub timeout_secs: u64,
    /// 优先检索的站点
    #[serde(default = "default_include_domains")]
    pub include_domains: Vec<String>,
}

fn default_web_search_max_results() -> usize {
    5
}

fn default_web_search_timeout_secs() -> u64 {
    15
}

fn default_include_domains() -> Vec<String> {
    vec![
        "arxiv.org".into(),
        "nasa.gov".into(),
        "esa.int".into(),
        "en.wikipedia.org".into(),
        "space.com".into(),
    ]
}

impl Default for WebSearchSection {
    fn default() -> Self {
        Self {
            max_results: default_web_search_max_results(),
            timeout_secs: default_web_search_timeout_secs(),
            include_domains: default_include_domains(),
        }
    }
}

/// [tools.wikipedia] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WikipediaSection {
    #[serde(default = "default_wikipedia_timeout_secs")]
    pub timeout_secs: u64,
    /// 摘要截断长度（字符）
    #[serde(default = "default_wikipedia_max_chars")]
    pub max_chars: usize,
}

fn default_wikipedia_timeout_secs() -> u64 {
    10
}

fn default_wikipedia_max_chars() -> usize {
    1500
}

impl Default for WikipediaSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_wikipedia_timeout_secs(),
            max_chars: default_wikipedia_max_chars(),
        }
    }
}

/// [tools.code] 段
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CodeSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// [tools.plot] 段
#[derive(Debug, Clone, Deserialize)]
pub struct PlotSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlotSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmSection::default(),
            agent: AgentSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 KOSMO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 KOSMO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KOSMO")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
