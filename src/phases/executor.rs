//! Executor：按序执行计划步骤并起草回答
//!
//! 每一步在工具执行器的失败边界内运行，恰好产生一条 Observation；随后用计划、观测与原始输入做一次起草调用。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::phases::call_model;
use crate::phases::planner::Plan;
use crate::phases::prompts::PromptKind;
use crate::tools::{ObservationResult, ToolExecutor};

/// 单步观测
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub id: String,
    pub tool: Option<String>,
    pub args: Map<String, Value>,
    #[serde(rename = "observation")]
    pub result: ObservationResult,
}

pub struct Executor {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    timeout: Duration,
}

impl Executor {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolExecutor>, timeout: Duration) -> Self {
        Self {
            llm,
            tools,
            timeout,
        }
    }

    /// 依次执行所有步骤；单步失败不影响后续步骤
    pub async fn observe(&self, plan: &Plan, log: &mut Vec<String>) -> Vec<Observation> {
        let tool_steps: Vec<&str> = plan
            .steps
            .iter()
            .filter_map(|s| s.tool.as_deref())
            .collect();
        if tool_steps.is_empty() {
            log.push("Executor: No tools to run. Answering from general knowledge.".to_string());
        } else {
            log.push(format!("Executor: Running tool(s): {}", tool_steps.join(", ")));
        }

        let mut observations = Vec::with_capacity(plan.len());
        for step in &plan.steps {
            let result = self.tools.execute(step.tool.as_deref(), &step.args).await;
            match (&result, step.tool.as_deref()) {
                (ObservationResult::Error(e), Some(tool)) => {
                    log.push(format!("Executor: Step {} ({}) failed: {}", step.id, tool, e));
                }
                (ObservationResult::NoTool, Some(tool)) => {
                    log.push(format!("Executor: Step {} uses unknown tool '{}', skipped.", step.id, tool));
                }
                _ => {}
            }
            observations.push(Observation {
                id: step.id.clone(),
                tool: step.tool.clone(),
                args: step.args.clone(),
                result,
            });
        }
        observations
    }

    /// 基于计划与观测起草回答
    pub async fn draft(
        &self,
        user_input: &str,
        plan: &Plan,
        observations: &[Observation],
    ) -> Result<String, AgentError> {
        let context = serde_json::json!({
            "plan": plan.steps,
            "observations": observations,
            "user_input": user_input,
        });
        let prompt = format!("Context JSON:\n{}\n\nDraft the answer now.", context);
        let draft = call_model(self.llm.as_ref(), &PromptKind::Draft.messages(prompt), self.timeout).await?;
        Ok(draft.trim().to_string())
    }
}
