//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时（可按工具覆盖），对每次调用施加超时与 panic 隔离，
//! 超时或 panic 转为 error 标记；每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ObservationResult, ToolRegistry};

/// 工具执行器：超时 + 失败隔离 + 审计
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    overrides: HashMap<String, Duration>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            overrides: HashMap::new(),
        }
    }

    /// 为单个工具设置独立超时
    pub fn with_tool_timeout(mut self, tool: &str, timeout: Duration) -> Self {
        self.overrides.insert(tool.to_string(), timeout);
        self
    }

    pub fn timeout_for(&self, tool: &str) -> Duration {
        self.overrides.get(tool).copied().unwrap_or(self.timeout)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一个步骤的工具；不存在的工具直接返回 NoTool，不计入审计
    pub async fn execute(&self, tool: Option<&str>, args: &Map<String, Value>) -> ObservationResult {
        let Some(tool_name) = tool else {
            return ObservationResult::NoTool;
        };
        let start = Instant::now();
        let fut = AssertUnwindSafe(self.registry.invoke(tool_name, args)).catch_unwind();
        let result = match timeout(self.timeout_for(tool_name), fut).await {
            Ok(Ok(obs)) => obs,
            Ok(Err(_)) => ObservationResult::Error(
                AgentError::ToolExecution(format!("tool_error: {} panicked", tool_name)).to_string(),
            ),
            Err(_) => ObservationResult::Error(AgentError::ToolTimeout(tool_name.to_string()).to_string()),
        };

        let outcome = match &result {
            ObservationResult::Output(_) => "ok",
            ObservationResult::Error(_) => "error",
            ObservationResult::NoTool => "no_tool",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::LocalDocumentStore;
    use crate::phases::prompts::PromptKind;
    use crate::tools::web_search::{SearchHit, SearchProvider};
    use crate::tools::{CodingAgent, Sandbox, ToolOutput};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct SlowSearch;

    #[async_trait]
    impl SearchProvider for SlowSearch {
        async fn search(&self, _q: &str, _n: usize) -> Result<Vec<SearchHit>, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    struct PanickySearch;

    #[async_trait]
    impl SearchProvider for PanickySearch {
        async fn search(&self, _q: &str, _n: usize) -> Result<Vec<SearchHit>, String> {
            panic!("provider bug")
        }
    }

    fn query() -> Map<String, Value> {
        serde_json::json!({"query": "rust"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let reg = ToolRegistry::new(Arc::new(SlowSearch), Arc::new(LocalDocumentStore::default()));
        let exec = ToolExecutor::new(Arc::new(reg), 1);
        let obs = exec.execute(Some("web_search"), &query()).await;
        assert!(obs.is_error());
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let reg = ToolRegistry::new(Arc::new(PanickySearch), Arc::new(LocalDocumentStore::default()));
        let exec = ToolExecutor::new(Arc::new(reg), 5);
        let obs = exec.execute(Some("web_search"), &query()).await;
        assert!(obs.is_error());
        assert_eq!(exec.execute(None, &Map::new()).await, ObservationResult::NoTool);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_coding_tool_outlives_global_timeout() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .push(
                    PromptKind::CodingPlan,
                    r#"{"steps": [{"id": 1, "tool": "run_command", "args": {"command": "sleep 3 && echo done"}}]}"#,
                )
                .push(PromptKind::CodingDraft, "The script was too slow."),
        );
        let coding = CodingAgent::new(llm, Sandbox::new(dir.path(), 60), Duration::from_secs(2))
            .with_step_budget(Duration::from_secs(2));
        let budget = coding.max_duration();
        let reg = ToolRegistry::new(Arc::new(SlowSearch), Arc::new(LocalDocumentStore::default()))
            .with_coding(Arc::new(coding));
        let exec = ToolExecutor::new(Arc::new(reg), 1).with_tool_timeout("coding_agent_tool", budget);
        assert_eq!(exec.timeout_for("coding_agent_tool"), Duration::from_secs(6));
        assert_eq!(exec.timeout_for("web_search"), Duration::from_secs(1));

        let args = serde_json::json!({"user_input": "run the slow script"})
            .as_object()
            .cloned()
            .unwrap();
        match exec.execute(Some("coding_agent_tool"), &args).await {
            ObservationResult::Output(ToolOutput::Coding { response }) => {
                assert!(response.ends_with("[coding steps: 0 succeeded, 1 failed]"));
            }
            other => panic!("unexpected observation: {:?}", other),
        }
    }
}
