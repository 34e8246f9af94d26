//! 认知层：Planner 与 ReAct 回合循环

pub mod loop_;
pub mod planner;

pub use loop_::{run_episode, Episode, EpisodeResult};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
