//! 绘图工具（matplotlib）
//!
//! python 子进程 + Agg 后端渲染模型生成的绘图代码，图片写入输出目录
//! outputs/plot_{8位十六进制}.png；代码未创建任何 figure 时返回提示文本。
//! 与代码执行工具共用禁止子串检查。

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::code_exec::forbidden_pattern;
use crate::tools::Tool;

const SAVED_MARKER: &str = "KOSMO_PLOT_SAVED";
const NO_FIGURE_MARKER: &str = "KOSMO_NO_FIGURE";

/// 生成一次性的图片文件名：plot_ + uuid 前 8 个十六进制字符 + .png
fn fresh_plot_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("plot_{}.png", &id[..8])
}

/// 绘图工具：matplotlib 脚本渲染为 PNG 文件
pub struct PlotTool {
    python_bin: String,
    output_dir: PathBuf,
    timeout_secs: u64,
}

impl PlotTool {
    pub fn new(python_bin: String, output_dir: PathBuf, timeout_secs: u64) -> Self {
        Self {
            python_bin,
            output_dir,
            timeout_secs,
        }
    }

    async fn render(&self, code: &str) -> Result<String, String> {
        if let Some(pattern) = forbidden_pattern(code) {
            return Err(format!("Forbidden pattern: {}", pattern));
        }
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| format!("Failed to create output directory: {}", e))?;
        let path = self.output_dir.join(fresh_plot_name());

        // Agg 后端：无显示环境也能渲染；保存与否由 get_fignums 判定
        let script = format!(
            r#"import matplotlib
matplotlib.use('Agg')
import matplotlib.pyplot as plt
import numpy as np
import math

{code}

if plt.get_fignums():
    plt.savefig(r'{path}', dpi=150, bbox_inches='tight')
    print('{saved}')
else:
    print('{no_figure}')
"#,
            code = code,
            path = path.display(),
            saved = SAVED_MARKER,
            no_figure = NO_FIGURE_MARKER,
        );

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            Command::new(&self.python_bin).arg("-c").arg(&script).output(),
        )
        .await
        .map_err(|_| format!("Execution timed out after {}s", self.timeout_secs))?
        .map_err(|e| format!("Failed to start {}: {}", self.python_bin, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(format!("Execution Error: {}", stderr.trim()));
        }
        if stdout.contains(SAVED_MARKER) {
            return Ok(format!("Plot saved successfully: {}", path.display()));
        }
        if stdout.contains(NO_FIGURE_MARKER) {
            return Ok(
                "No figure was created. Use matplotlib plotting commands (plt.plot, plt.hist, ...) to draw one."
                    .to_string(),
            );
        }
        Err(format!("Unexpected plot output: {}", stdout.trim()))
    }
}

#[async_trait]
impl Tool for PlotTool {
    fn name(&self) -> &str {
        "create_plot"
    }

    fn description(&self) -> &str {
        "Create a plot with matplotlib (pyplot is imported as plt, numpy as np) and save it as a PNG file. Do not call plt.savefig or plt.show yourself. Args: {\"code\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python plotting code using matplotlib.pyplot as plt"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if code.is_empty() {
            return Err("Missing code".to_string());
        }
        tracing::info!(code_len = code.len(), "plot rendering");
        self.render(code).await
    }
}
