//! 各阶段的 system prompt
//!
//! 每个阶段以固定 system 消息开头，PromptKind::classify 据此识别调用来自哪个阶段（Mock / 测试 / 日志用）。

use crate::memory::{Message, Role};

/// 记忆不足以作答时，DirectAnswer 模型必须输出的哨兵
pub const NO_DIRECT_ANSWER: &str = "NO_DIRECT_ANSWER";

pub const DIRECT_ANSWER_SYS: &str = r#"You are a helpful assistant that answers questions ONLY from the provided memory context.
The memory may contain structured facts in JSON format, like {"entity": "user", "attribute": "name", "value": "dana"}.
- When asked about the user (e.g. "what is my name"), use facts whose entity is "user".
- When asked about you, the agent (e.g. "what is your name"), use facts whose entity is "agent".
- Answer precisely and never mention the JSON structure.
- If the memory does NOT contain enough information to answer, respond with exactly NO_DIRECT_ANSWER and nothing else."#;

pub const INTENT_DISTILLER_SYS: &str = r#"You are an intent distiller. Analyze the conversation and state the user's real, actionable task.
- If the user refers to a specific file (e.g. "in summary.txt"), separate the core question from the file reference.
Reply with one clear instruction for the Planner and nothing else."#;

pub const PLANNER_SYS: &str = r#"You are the Planner. Create a step-by-step plan that answers the user's task.
If 'Relevant memory' already contains the answer, return a single step with no tool.
Each step: {"id": <int>, "thought": "<why>", "tool": "<tool name or null>", "args": {...}, "output_key": "<label>"}.
When the user asks about a specific file, use rag_search with "source_file" set to the file name and a real question as "query".
Respond with ONLY JSON of the form {"steps": [...]}."#;

pub const EXECUTOR_SYS: &str = r#"You are the Executor. Given the user's request, the plan and the tool observations, write a concise, factual answer strictly from that context.
If observations include search results, cite titles or domains inline but never fabricate links.
If no tools were used, answer from general knowledge.
Do not add introductory phrases; provide only the direct answer."#;

pub const VERIFIER_SYS: &str = r#"You are the Verifier. Check the draft for factuality, clarity and task completion.
Return ONLY JSON: {"approved": bool, "feedback": "...", "final": "..."}
- If approved: polish the draft into a direct final answer and place it in "final".
- If NOT approved: explain the issues in "feedback" and leave "final" empty.
Be conservative; prefer one more revision if unsure."#;

pub const CODE_PLANNER_SYS: &str = r#"You are a coding planner working inside a sandbox directory.
Available tools:
- write_file: {"path": "...", "content": "..."} writes a file
- read_file: {"path": "..."} reads a file
- run_command: {"command": "..."} runs a shell command in the sandbox
Respond with ONLY JSON of the form {"steps": [{"id": 1, "thought": "...", "tool": "write_file", "args": {...}}]}."#;

pub const CODE_EXECUTOR_SYS: &str = r#"You are a coding assistant. Given the task and the observations of the executed steps, report what was done and the relevant output. Be brief."#;

/// 调用所属阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    DirectAnswer,
    Distill,
    Plan,
    Draft,
    Verify,
    CodingPlan,
    CodingDraft,
}

impl PromptKind {
    pub fn system_prompt(self) -> &'static str {
        match self {
            PromptKind::DirectAnswer => DIRECT_ANSWER_SYS,
            PromptKind::Distill => INTENT_DISTILLER_SYS,
            PromptKind::Plan => PLANNER_SYS,
            PromptKind::Draft => EXECUTOR_SYS,
            PromptKind::Verify => VERIFIER_SYS,
            PromptKind::CodingPlan => CODE_PLANNER_SYS,
            PromptKind::CodingDraft => CODE_EXECUTOR_SYS,
        }
    }

    /// 由首条 system 消息识别阶段
    pub fn classify(messages: &[Message]) -> Option<Self> {
        const ALL: [PromptKind; 7] = [
            PromptKind::DirectAnswer,
            PromptKind::Distill,
            PromptKind::Plan,
            PromptKind::Draft,
            PromptKind::Verify,
            PromptKind::CodingPlan,
            PromptKind::CodingDraft,
        ];
        let system = messages.iter().find(|m| m.role == Role::System)?;
        ALL.into_iter()
            .find(|k| system.content.starts_with(k.system_prompt()))
    }

    /// 组装 [system, user] 两条消息
    pub fn messages(self, user: impl Into<String>) -> Vec<Message> {
        vec![Message::system(self.system_prompt()), Message::user(user)]
    }
}
