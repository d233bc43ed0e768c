//! 沙箱：编码子智能体的文件读写与命令执行
//!
//! 所有路径按词法归一化后必须落在 root 之下（禁止绝对路径与 ../ 逃逸）；命令经 sh -c 在 root 中执行，
//! 带超时并拒绝危险子串。每个操作返回带 status 标记的结果，不向工具边界外抛错。

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::core::AgentError;

/// 禁止的命令子串
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "sudo ",
    "curl | sh",
    "wget | sh",
    "chmod 777 /",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:",
];

const MAX_OUTPUT_CHARS: usize = 8000;

/// 沙箱操作结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SandboxResult {
    Success {
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    Error {
        error: String,
    },
}

impl SandboxResult {
    fn ok(output: impl Into<String>) -> Self {
        SandboxResult::Success {
            output: output.into(),
            stderr: None,
        }
    }

    fn err(error: impl Into<String>) -> Self {
        SandboxResult::Error {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SandboxResult::Success { .. })
    }
}

/// 绑定根目录的沙箱
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    command_timeout: Duration,
}

impl Sandbox {
    pub fn new(root: impl AsRef<Path>, command_timeout_secs: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            command_timeout: Duration::from_secs(command_timeout_secs),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 词法归一化相对路径，确认其不离开 root
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(AgentError::ToolExecution("Empty path".to_string()));
        }
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for comp in Path::new(trimmed).components() {
            match comp {
                Component::Normal(p) => parts.push(p),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(AgentError::PathEscape(trimmed.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AgentError::PathEscape(trimmed.to_string()));
                }
            }
        }
        if parts.is_empty() {
            return Err(AgentError::ToolExecution(format!("Not a file path: {}", trimmed)));
        }
        Ok(parts.iter().fold(self.root.clone(), |acc, p| acc.join(p)))
    }

    pub async fn write(&self, path: &str, content: &str) -> SandboxResult {
        let full = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return SandboxResult::err(e.to_string()),
        };
        if let Some(parent) = full.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return SandboxResult::err(format!("Create dir failed: {}", e));
            }
        }
        tracing::info!(path = %path, bytes = content.len(), "sandbox write");
        match tokio::fs::write(&full, content).await {
            Ok(()) => SandboxResult::ok(format!("Wrote {} bytes to {}", content.len(), path)),
            Err(e) => SandboxResult::err(format!("Write failed: {}", e)),
        }
    }

    pub async fn read(&self, path: &str) -> SandboxResult {
        let full = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return SandboxResult::err(e.to_string()),
        };
        tracing::info!(path = %path, "sandbox read");
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => SandboxResult::ok(truncate(&content)),
            Err(e) => SandboxResult::err(format!("Read failed: {}", e)),
        }
    }

    /// 在 root 中执行 shell 命令；非零退出码视为失败
    pub async fn run(&self, command: &str) -> SandboxResult {
        let command = command.trim();
        if command.is_empty() {
            return SandboxResult::err("Empty command");
        }
        let lower = command.to_lowercase();
        if let Some(bad) = FORBIDDEN_SUBSTR.iter().find(|f| lower.contains(*f)) {
            return SandboxResult::err(format!("Forbidden pattern: {}", bad));
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            return SandboxResult::err(format!("Create sandbox failed: {}", e));
        }

        tracing::info!(command = %command, "sandbox run");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.root).kill_on_drop(true);

        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Err(_) => {
                return SandboxResult::err(format!(
                    "Command timed out after {}s",
                    self.command_timeout.as_secs()
                ))
            }
            Ok(Err(e)) => return SandboxResult::err(format!("Execution failed: {}", e)),
            Ok(Ok(o)) => o,
        };

        let stdout = truncate(&String::from_utf8_lossy(&output.stdout));
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            return SandboxResult::err(format!(
                "Exit {:?}\nstdout: {}\nstderr: {}",
                output.status.code(),
                stdout.trim(),
                stderr.trim()
            ));
        }
        SandboxResult::Success {
            output: stdout,
            stderr: (!stderr.trim().is_empty()).then_some(stderr),
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_OUTPUT_CHARS {
        s.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n...[truncated]"
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_rejects_escape() {
        let sb = Sandbox::new("/tmp/sb", 5);
        assert!(matches!(sb.resolve("../etc/passwd"), Err(AgentError::PathEscape(_))));
        assert!(matches!(sb.resolve("/etc/passwd"), Err(AgentError::PathEscape(_))));
        assert_eq!(
            sb.resolve("./src/../main.py").unwrap(),
            PathBuf::from("/tmp/sb/main.py")
        );
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let sb = Sandbox::new(dir.path(), 5);
        assert!(sb.write("pkg/hello.txt", "hi").await.is_success());
        assert_eq!(
            sb.read("pkg/hello.txt").await,
            SandboxResult::Success {
                output: "hi".to_string(),
                stderr: None
            }
        );
        assert!(!sb.read("missing.txt").await.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_in_root() {
        let dir = TempDir::new().unwrap();
        let sb = Sandbox::new(dir.path(), 5);
        sb.write("a.txt", "x").await;
        match sb.run("ls").await {
            SandboxResult::Success { output, .. } => assert!(output.contains("a.txt")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!sb.run("exit 3").await.is_success());
        assert!(!sb.run("sudo ls").await.is_success());
    }

    #[test]
    fn test_result_json_shape() {
        let v = serde_json::to_value(SandboxResult::err("boom")).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["error"], "boom");
    }
}
