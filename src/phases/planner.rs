//! Planner：意图提炼与计划生成
//!
//! 附件文件存在时直接生成单步 rag_search 计划；否则检索记忆、结合最近历史提炼任务，
//! 再按工具目录请求 `{"steps": [...]}`。解析失败一律得到空计划，由执行阶段继续起草。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{AgentError, TurnInput};
use crate::llm::LlmClient;
use crate::memory::{render_recent, MemoryStore, Message};
use crate::phases::parse::{parse_json_value, Parsed};
use crate::phases::prompts::PromptKind;
use crate::phases::call_model;

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub thought: String,
    /// None 表示该步不调用工具
    pub tool: Option<String>,
    pub args: Map<String, Value>,
    pub output_key: Option<String>,
}

impl Step {
    /// 宽松地从模型输出的单个 JSON 对象构造；id 缺失时用序号
    fn from_value(index: usize, v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => (index + 1).to_string(),
        };
        let thought = obj
            .get("thought")
            .or_else(|| obj.get("rationale"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tool = obj
            .get("tool")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("null") && !t.eq_ignore_ascii_case("none"))
            .map(str::to_string);
        let args = obj
            .get("args")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let output_key = obj
            .get("output_key")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            id,
            thought,
            tool,
            args,
            output_key,
        })
    }
}

/// 有序步骤；每次规划整体替换
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 附件文件的固定计划：在该文件中检索用户原话
    pub fn file_lookup(user_input: &str, file: &str) -> Self {
        let mut args = Map::new();
        args.insert("query".to_string(), Value::String(user_input.to_string()));
        args.insert("source_file".to_string(), Value::String(file.to_string()));
        Self {
            steps: vec![Step {
                id: "1".to_string(),
                thought: format!("The user attached '{}'; answer from its content.", file),
                tool: Some("rag_search".to_string()),
                args,
                output_key: Some("file_answer".to_string()),
            }],
        }
    }
}

/// 解析计划：只接受带 `steps` 数组的对象；重复 id 时整体按序号重编
pub fn parse_plan(raw: &str) -> Parsed<Plan> {
    let value = match parse_json_value(raw) {
        Parsed::Ok(v) => v,
        Parsed::Err { reason, raw } => return Parsed::Err { reason, raw },
    };
    let Some(items) = value.get("steps").and_then(Value::as_array) else {
        return Parsed::Err {
            reason: "missing 'steps' array".to_string(),
            raw: raw.to_string(),
        };
    };

    let mut steps: Vec<Step> = items
        .iter()
        .enumerate()
        .filter_map(|(i, v)| Step::from_value(i, v))
        .collect();
    let mut seen = HashSet::new();
    if !steps.iter().all(|s| seen.insert(s.id.clone())) {
        for (i, step) in steps.iter_mut().enumerate() {
            step.id = (i + 1).to_string();
        }
    }
    Parsed::Ok(Plan { steps })
}

/// 仅用于生成 prompt 中的 JSON Schema
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanSchema {
    steps: Vec<StepSchema>,
}

/// One step of the plan.
#[allow(dead_code)]
#[derive(JsonSchema)]
struct StepSchema {
    /// Unique step number.
    id: u32,
    /// Why this step is needed.
    thought: String,
    /// Tool name from the catalog, or null for no tool.
    tool: Option<String>,
    /// Tool arguments.
    args: Map<String, Value>,
    /// Label for this step's result.
    output_key: Option<String>,
}

/// 计划格式的 JSON Schema 文本
pub fn plan_schema() -> String {
    let schema = schemars::schema_for!(PlanSchema);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// Planner：持有模型与记忆，生成计划
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn MemoryStore>,
    memory_k: usize,
    history_turns: usize,
    timeout: Duration,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn MemoryStore>,
        memory_k: usize,
        history_turns: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            memory,
            memory_k,
            history_turns,
            timeout,
        }
    }

    /// 生成计划；模型或解析失败时返回空计划并写日志
    pub async fn plan(
        &self,
        input: &TurnInput,
        catalog: &[(String, String)],
        feedback: Option<&str>,
        log: &mut Vec<String>,
    ) -> Plan {
        if let Some(file) = input.attached_file.as_deref() {
            log.push(format!(
                "Planner: File '{}' attached, searching it directly.",
                file
            ));
            return Plan::file_lookup(&input.user_input, file);
        }

        let memory = match self.memory.query(&input.user_input, self.memory_k).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "planner memory recall failed");
                Vec::new()
            }
        };
        let mem_text = if memory.is_empty() {
            "<none>".to_string()
        } else {
            memory.join("\n")
        };

        let task = match self.distill(input, &mem_text, feedback).await {
            Ok(t) if !t.trim().is_empty() => {
                log.push(format!("Planner: Distilled user intent to: '{}'", t.trim()));
                t.trim().to_string()
            }
            Ok(_) => input.user_input.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "intent distillation failed");
                log.push(format!("Planner: Intent distillation failed ({}), using raw input.", e));
                input.user_input.clone()
            }
        };

        let plan = match self.request_plan(&task, &mem_text, catalog).await {
            Ok(Parsed::Ok(plan)) => plan,
            Ok(Parsed::Err { reason, raw }) => {
                let err = AgentError::PlanParse { reason, raw };
                tracing::warn!(error = %err, "plan parse failed");
                log.push(format!("Planner: {}; continuing with an empty plan.", err));
                Plan::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "planner model call failed");
                log.push(format!("Planner: {}; continuing with an empty plan.", e));
                Plan::default()
            }
        };
        log.push(format!("Planner: Generated a plan with {} step(s).", plan.len()));
        plan
    }

    async fn distill(
        &self,
        input: &TurnInput,
        mem_text: &str,
        feedback: Option<&str>,
    ) -> Result<String, AgentError> {
        let history = render_recent(&input.history, self.history_turns);
        let mut prompt = format!(
            "Recent conversation:\n{}\n\nRelevant memory:\n{}\n\nUser input:\n{}",
            if history.is_empty() { "<none>" } else { history.as_str() },
            mem_text,
            input.user_input
        );
        if let Some(fb) = feedback.filter(|f| !f.trim().is_empty()) {
            prompt.push_str(&format!("\n\nVerifier feedback on the previous attempt:\n{}", fb));
        }
        call_model(self.llm.as_ref(), &PromptKind::Distill.messages(prompt), self.timeout).await
    }

    async fn request_plan(
        &self,
        task: &str,
        mem_text: &str,
        catalog: &[(String, String)],
    ) -> Result<Parsed<Plan>, AgentError> {
        let tool_list = catalog
            .iter()
            .map(|(name, desc)| format!("- {}: {}", name, desc))
            .collect::<Vec<_>>()
            .join("\n");
        let system = format!(
            "{}\n\nAvailable tools:\n{}\n\nJSON Schema of the response:\n{}",
            PromptKind::Plan.system_prompt(),
            tool_list,
            plan_schema()
        );
        let user = format!(
            "Relevant memory (may be empty):\n{}\n\nUser task:\n{}\n\nRespond with ONLY JSON in the format: {{\"steps\": [...]}}",
            mem_text, task
        );
        let messages = vec![Message::system(system), Message::user(user)];
        let raw = call_model(self.llm.as_ref(), &messages, self.timeout).await?;
        Ok(parse_plan(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lenient_step_fields() {
        let raw = r#"Plan:
{"steps": [
  {"id": 1, "rationale": "look it up", "tool": "web_search", "args": {"query": "rust"}, "output_key": "hits"},
  {"id": "b", "thought": "answer", "tool": "", "args": null}
]}"#;
        let plan = parse_plan(raw).ok().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].id, "1");
        assert_eq!(plan.steps[0].thought, "look it up");
        assert_eq!(plan.steps[0].tool.as_deref(), Some("web_search"));
        assert_eq!(plan.steps[1].tool, None);
        assert!(plan.steps[1].args.is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_renumbered() {
        let plan = parse_plan(r#"{"steps": [{"id": 1}, {"id": 1}, {"id": 7}]}"#).ok().unwrap();
        let ids: Vec<_> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_invalid_plans_are_errors() {
        assert!(!parse_plan("I cannot plan this").is_ok());
        assert!(!parse_plan(r#"{"plan": []}"#).is_ok());
        assert!(!parse_plan(r#"{"steps": "none"}"#).is_ok());
    }

    #[test]
    fn test_bare_step_array_is_rejected() {
        let raw = r#"[{"id": 1, "tool": "calculator", "args": {"expression": "1+1"}}]"#;
        match parse_plan(raw) {
            Parsed::Err { reason, .. } => assert!(reason.contains("steps")),
            Parsed::Ok(plan) => panic!("bare array parsed as plan: {:?}", plan),
        }
    }

    #[test]
    fn test_file_lookup_plan() {
        let plan = Plan::file_lookup("what is this about", "notes.txt");
        assert_eq!(plan.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.tool.as_deref(), Some("rag_search"));
        assert_eq!(step.args["query"], "what is this about");
        assert_eq!(step.args["source_file"], "notes.txt");
    }

    #[test]
    fn test_schema_mentions_steps() {
        let schema = plan_schema();
        assert!(schema.contains("steps"));
        assert!(schema.contains("output_key"));
    }
}
