//! 命令行界面
//!
//! 单次查询模式（位置参数或 -q/--query）与交互 REPL。REPL 内 Ctrl-C 通过取消令牌
//! 中止当前查询而不退出进程；会话与降级状态可用内置命令查看和重置。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::agent::{KosmoAgent, CANCELLED_RESPONSE};
use crate::config::{load_config, AppConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 解析后的命令行参数
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub query: Option<String>,
    pub quiet: bool,
    pub show_version: bool,
}

/// 手动解析：-q/--query 取下一个参数，--quiet 不打印横幅，--version 打印版本后退出，
/// 其余位置参数拼接为一条单次查询
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-q" | "--query" => {
                if let Some(q) = iter.next() {
                    parsed.query = Some(q);
                }
            }
            "--quiet" => parsed.quiet = true,
            "-V" | "--version" => parsed.show_version = true,
            _ => positional.push(arg),
        }
    }
    if parsed.query.is_none() && !positional.is_empty() {
        parsed.query = Some(positional.join(" "));
    }
    parsed
}

/// CLI 入口：加载配置、建输出目录、构建 Agent，然后按参数走单次查询或 REPL
pub async fn run() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1));
    if args.show_version {
        println!("kosmo {}", VERSION);
        return Ok(());
    }

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });
    std::fs::create_dir_all(&cfg.tools.output_dir)
        .with_context(|| format!("Failed to create output directory {}", cfg.tools.output_dir))?;

    let agent = Arc::new(KosmoAgent::from_config(&cfg));

    match args.query {
        Some(query) => {
            let answer = run_query(&agent, &query).await;
            println!("{}", answer);
            Ok(())
        }
        None => repl(agent, args.quiet).await,
    }
}

/// 跑一条查询；Ctrl-C 触发取消令牌，等查询自行退出后返回取消文本
async fn run_query(agent: &KosmoAgent, query: &str) -> String {
    let cancel = CancellationToken::new();
    let fut = agent.query_cancellable(query, None, &cancel);
    tokio::pin!(fut);
    loop {
        tokio::select! {
            result = &mut fut => {
                return match result {
                    Ok(answer) => answer,
                    Err(_) => CANCELLED_RESPONSE.to_string(),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCancelling...");
                cancel.cancel();
            }
        }
    }
}

async fn repl(agent: Arc<KosmoAgent>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        print_banner(&agent);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("kosmo> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "quit" | "exit" => break,
            "help" => print_help(),
            "clear" => {
                agent.clear_memory().await;
                println!("Conversation cleared.");
            }
            "new" => {
                let id = agent.new_session().await;
                println!("Started session {}", id);
            }
            "sessions" => print_sessions(&agent).await,
            "errors" => print_errors(&agent).await,
            "reset" => {
                agent.reset_failed_tools().await;
                println!("Failed tool state cleared.");
            }
            _ => {
                let answer = run_query(&agent, input).await;
                println!("\n{}\n", answer);
            }
        }
    }
    println!("Bye.");
    Ok(())
}

fn print_banner(agent: &KosmoAgent) {
    println!("Kosmo {} - cosmology research assistant", VERSION);
    println!(
        "Backend: {} | Tools: {}",
        agent.backend_name(),
        agent.tool_names().join(", ")
    );
    println!("Type 'help' for commands, 'quit' to leave.\n");
}

fn print_help() {
    println!("Commands:");
    println!("  help      show this help");
    println!("  clear     clear the current conversation (keeps session metadata)");
    println!("  new       start a fresh session");
    println!("  sessions  list sessions and query counts");
    println!("  errors    show failed tools and error counts by category");
    println!("  reset     clear the failed tool state");
    println!("  quit      leave (also: exit)");
    println!("Anything else is sent to the agent as a question.");
}

async fn print_sessions(agent: &KosmoAgent) {
    let sessions = agent.list_sessions().await;
    if sessions.is_empty() {
        println!("No sessions with queries yet.");
        return;
    }
    let current = agent.current_session().await;
    let mut rows: Vec<_> = sessions.into_iter().collect();
    rows.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));
    for (id, meta) in rows {
        let marker = if id == current { "*" } else { " " };
        println!(
            "{} {}  queries: {}  created: {}",
            marker,
            id,
            meta.query_count,
            meta.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

async fn print_errors(agent: &KosmoAgent) {
    let failed = agent.failed_tools().await;
    let summary = agent.error_summary().await;
    if failed.is_empty() && summary.is_empty() {
        println!("No tool failures recorded.");
        return;
    }
    let mut names: Vec<_> = failed.into_iter().collect();
    names.sort();
    println!("Failed tools: {}", names.join(", "));
    let mut counts: Vec<_> = summary.into_iter().collect();
    counts.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (category, count) in counts {
        println!("  {}: {}", category, count);
    }
}
