//! Python 代码执行工具
//!
//! 通过 python 子进程运行模型生成的计算代码；前置代码预导入 numpy/sympy 并注入
//! 常用天体物理常数（G、c、M_sun 等）；禁止文件与系统访问相关子串；带超时。
//! stdout 以 "Output:\n..." 返回，非零退出码以 "Execution Error: {stderr}" 报错。

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::Tool;

/// 禁止出现在用户代码中的子串（文件与系统访问）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "import os",
    "import subprocess",
    "import sys",
    "import shutil",
    "from os",
    "from subprocess",
    "from sys",
    "open(",
    "__import__",
    "eval(",
    "exec(",
];

/// 注入到每段用户代码前的前置代码：常用库与 SI 单位的天体物理常数
const PREAMBLE: &str = r#"import math
import numpy as np
try:
    import sympy as sp
except ImportError:
    sp = None

G = 6.674e-11        # gravitational constant, m^3 kg^-1 s^-2
c = 2.998e8          # speed of light, m/s
M_sun = 1.989e30     # solar mass, kg
M_earth = 5.972e24   # Earth mass, kg
R_earth = 6.371e6    # Earth radius, m
AU = 1.496e11        # astronomical unit, m
pc = 3.086e16        # parsec, m
h = 6.626e-34        # Planck constant, J s
k_B = 1.381e-23      # Boltzmann constant, J/K
"#;

/// 检查代码是否含禁止子串；命中返回该子串
pub(crate) fn forbidden_pattern(code: &str) -> Option<&'static str> {
    let lower = code.to_lowercase();
    FORBIDDEN_SUBSTR
        .iter()
        .find(|forbidden| lower.contains(*forbidden))
        .copied()
}

/// 代码执行工具：python -c 运行前置代码 + 用户代码
pub struct CodeExecTool {
    python_bin: String,
    timeout_secs: u64,
}

impl CodeExecTool {
    pub fn new(python_bin: String, timeout_secs: u64) -> Self {
        Self {
            python_bin,
            timeout_secs,
        }
    }

    async fn run(&self, code: &str) -> Result<String, String> {
        if let Some(pattern) = forbidden_pattern(code) {
            return Err(format!("Forbidden pattern: {}", pattern));
        }
        let script = format!("{}\n{}", PREAMBLE, code);

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
        if stdout.trim().is_empty() {
            return Ok(
                "Code executed successfully with no output. Use print() to display results."
                    .to_string(),
            );
        }
        Ok(format!("Output:\n{}", stdout.trim()))
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute Python code for calculations and data analysis. numpy and sympy are pre-imported, with astrophysical constants available (G, c, M_sun, M_earth, R_earth, AU, pc, h, k_B). Use print() for results. Args: {\"code\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute"
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
        tracing::info!(code_len = code.len(), "code execution");
        self.run(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_patterns_detected() {
        assert_eq!(forbidden_pattern("import os\nprint(1)"), Some("import os"));
        assert_eq!(
            forbidden_pattern("data = open('/etc/passwd')"),
            Some("open(")
        );
        assert_eq!(forbidden_pattern("__import__('os')"), Some("__import__"));
        assert!(forbidden_pattern("print(G * M_sun / c**2)").is_none());
    }

    #[test]
    fn test_preamble_defines_constants() {
        for name in ["G =", "c =", "M_sun =", "AU =", "pc =", "h =", "k_B ="] {
            assert!(PREAMBLE.contains(name), "missing constant: {}", name);
        }
    }

    #[tokio::test]
    async fn test_missing_code_is_error() {
        let tool = CodeExecTool::new("python3".to_string(), 5);
        let err = tool
            .execute(serde_json::json!({}))
            .await
            .expect_err("missing code");
        assert_eq!(err, "Missing code");
    }

    #[tokio::test]
    async fn test_forbidden_code_rejected_before_execution() {
        let tool = CodeExecTool::new("definitely-not-a-python".to_string(), 5);
        let err = tool
            .execute(serde_json::json!({"code": "import subprocess"}))
            .await
            .expect_err("forbidden");
        assert!(err.contains("Forbidden pattern"));
    }
}
