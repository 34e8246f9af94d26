//! Kosmo - 宇宙学研究助手
//!
//! 入口：初始化日志，进入 CLI（单次查询或交互 REPL）。

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kosmo::observability::init();

    kosmo::cli::run().await.context("CLI run failed")?;

    Ok(())
}
