//! Kosmo - 宇宙学研究智能体
//!
//! 模块划分：
//! - **agent**: 编排引擎（查询管线、回合级重试、降级通告）
//! - **cli**: 命令行界面（单次查询与交互 REPL）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **errors**: 错误分类、重试策略与降级跟踪
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话消息与工具调用记录
//! - **observability**: tracing 初始化
//! - **prompts**: 系统提示与主题上下文
//! - **react**: Planner 与 ReAct 回合循环
//! - **session**: 多会话存储与记账
//! - **tools**: 工具箱（web_search、execute_code、search_wikipedia、create_plot）与能力网关
//! - **validator**: 回答完成度校验

pub mod agent;
pub mod cli;
pub mod config;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod react;
pub mod session;
pub mod tools;
pub mod validator;

pub use agent::KosmoAgent;
