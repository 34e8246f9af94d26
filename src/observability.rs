//! 可观测性
//!
//! tracing 初始化：RUST_LOG 可覆盖级别，默认 info；日志写 stderr，stdout 留给回答文本。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
