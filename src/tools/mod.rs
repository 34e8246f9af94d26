//! 工具箱：内置四个研究工具（web_search、execute_code、search_wikipedia、create_plot）、
//! 注册表与能力网关

pub mod code_exec;
pub mod gateway;
pub mod plotter;
pub mod registry;
pub mod schema;
pub mod web_search;
pub mod wikipedia;

pub use code_exec::CodeExecTool;
pub use gateway::ToolGateway;
pub use plotter::PlotTool;
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use web_search::WebSearchTool;
pub use wikipedia::WikipediaTool;

use crate::config::ToolsSection;

/// 按配置构建内置四个工具的注册表
pub fn create_default_tools(cfg: &ToolsSection) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(WebSearchTool::new(
        cfg.web_search.timeout_secs,
        cfg.web_search.max_results,
        cfg.web_search.include_domains.clone(),
    ));
    registry.register(CodeExecTool::new(
        cfg.python_bin.clone(),
        cfg.code.timeout_secs,
    ));
    registry.register(WikipediaTool::new(
        cfg.wikipedia.timeout_secs,
        cfg.wikipedia.max_chars,
    ));
    registry.register(PlotTool::new(
        cfg.python_bin.clone(),
        std::path::PathBuf::from(&cfg.output_dir),
        cfg.plot.timeout_secs,
    ));
    registry
}
