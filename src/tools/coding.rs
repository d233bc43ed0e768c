//! 编码子智能体：规划一次、执行一次、自动通过
//!
//! 在沙箱目录内用 write_file / read_file / run_command 三个工具完成编码任务，
//! 最终回答附带各步骤成功 / 失败计数。步骤执行共享一个时间预算，超出预算的步骤记为失败，
//! 计数照常返回。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::phases::call_model;
use crate::phases::parse::Parsed;
use crate::phases::planner::{parse_plan, Step};
use crate::phases::prompts::PromptKind;
use crate::tools::sandbox::{Sandbox, SandboxResult};

const DEFAULT_STEP_BUDGET: Duration = Duration::from_secs(120);

pub struct CodingAgent {
    llm: Arc<dyn LlmClient>,
    sandbox: Sandbox,
    timeout: Duration,
    step_budget: Duration,
}

impl CodingAgent {
    pub fn new(llm: Arc<dyn LlmClient>, sandbox: Sandbox, timeout: Duration) -> Self {
        Self {
            llm,
            sandbox,
            timeout,
            step_budget: DEFAULT_STEP_BUDGET,
        }
    }

    /// 全部步骤执行的总时长上限
    pub fn with_step_budget(mut self, budget: Duration) -> Self {
        self.step_budget = budget;
        self
    }

    /// 一次 run 的最长耗时：规划与总结两次模型调用加步骤预算
    pub fn max_duration(&self) -> Duration {
        self.timeout * 2 + self.step_budget
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// 执行一次完整子流程；只有规划阶段的模型失败会返回 Err
    pub async fn run(&self, user_input: &str) -> Result<String, AgentError> {
        tracing::info!("coding agent invoked");
        let raw = call_model(
            self.llm.as_ref(),
            &PromptKind::CodingPlan.messages(format!("User input:\n{}", user_input)),
            self.timeout,
        )
        .await?;
        let steps = match parse_plan(&raw) {
            Parsed::Ok(plan) => plan.steps,
            Parsed::Err { reason, .. } => {
                tracing::warn!(reason = %reason, "coding plan parse failed");
                Vec::new()
            }
        };

        let mut observations = Vec::with_capacity(steps.len());
        let (mut succeeded, mut failed) = (0usize, 0usize);
        let deadline = Instant::now() + self.step_budget;
        for step in &steps {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = if remaining.is_zero() {
                SandboxResult::Error {
                    error: "Coding time budget exhausted; step skipped.".to_string(),
                }
            } else {
                match tokio::time::timeout(remaining, self.dispatch(step)).await {
                    Ok(r) => r,
                    Err(_) => {
                        tracing::warn!(step = %step.id, "coding step exceeded the time budget");
                        SandboxResult::Error {
                            error: "Step stopped: coding time budget exhausted.".to_string(),
                        }
                    }
                }
            };
            if result.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }
            observations.push(serde_json::json!({
                "id": step.id,
                "tool": step.tool,
                "observation": result,
            }));
        }

        let context = serde_json::json!({
            "task": user_input,
            "observations": observations,
        });
        let draft = match call_model(
            self.llm.as_ref(),
            &PromptKind::CodingDraft.messages(format!("Context JSON:\n{}", context)),
            self.timeout,
        )
        .await
        {
            Ok(d) if !d.trim().is_empty() => d.trim().to_string(),
            Ok(_) => "The coding task produced no summary.".to_string(),
            Err(e) => format!("The coding task ran but its summary failed: {}", e),
        };

        Ok(format!(
            "{}\n\n[coding steps: {} succeeded, {} failed]",
            draft, succeeded, failed
        ))
    }

    async fn dispatch(&self, step: &Step) -> SandboxResult {
        let arg = |key: &str| {
            step.args
                .get(key)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        };
        match step.tool.as_deref() {
            Some("write_file") => self.sandbox.write(&arg("path"), &arg("content")).await,
            Some("read_file") => self.sandbox.read(&arg("path")).await,
            Some("run_command") => self.sandbox.run(&arg("command")).await,
            Some(other) => SandboxResult::Error {
                error: format!("Tool '{}' not found.", other),
            },
            None => SandboxResult::Error {
                error: "Step has no tool.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_plan_execute_and_tally() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .push(
                    PromptKind::CodingPlan,
                    r#"{"steps": [
                        {"id": 1, "tool": "write_file", "args": {"path": "hello.txt", "content": "hi"}},
                        {"id": 2, "tool": "read_file", "args": {"path": "hello.txt"}},
                        {"id": 3, "tool": "delete_everything", "args": {}}
                    ]}"#,
                )
                .push(PromptKind::CodingDraft, "Wrote and read hello.txt."),
        );
        let agent = CodingAgent::new(llm.clone(), Sandbox::new(dir.path(), 5), Duration::from_secs(5));

        let out = agent.run("create hello.txt").await.unwrap();
        assert!(out.starts_with("Wrote and read hello.txt."));
        assert!(out.ends_with("[coding steps: 2 succeeded, 1 failed]"));
        assert_eq!(std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(), "hi");

        let draft_prompt = &llm.user_prompts_for(PromptKind::CodingDraft)[0];
        assert!(draft_prompt.contains("not found"));
    }

    #[tokio::test]
    async fn test_planner_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new());
        let agent = CodingAgent::new(llm, Sandbox::new(dir.path(), 5), Duration::from_secs(5));
        assert!(agent.run("anything").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_budget_overrun_still_reports_tally() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .push(
                    PromptKind::CodingPlan,
                    r#"{"steps": [
                        {"id": 1, "tool": "run_command", "args": {"command": "sleep 3 && echo done"}},
                        {"id": 2, "tool": "write_file", "args": {"path": "late.txt", "content": "x"}}
                    ]}"#,
                )
                .push(PromptKind::CodingDraft, "The command did not finish."),
        );
        let agent = CodingAgent::new(llm.clone(), Sandbox::new(dir.path(), 60), Duration::from_secs(5))
            .with_step_budget(Duration::from_secs(1));
        assert_eq!(agent.max_duration(), Duration::from_secs(11));

        let out = agent.run("run the slow script").await.unwrap();
        assert!(out.ends_with("[coding steps: 0 succeeded, 2 failed]"));
        assert!(!dir.path().join("late.txt").exists());
        let draft_prompt = &llm.user_prompts_for(PromptKind::CodingDraft)[0];
        assert!(draft_prompt.contains("budget exhausted"));
    }
}
