//! Mock LLM 客户端（用于离线运行与测试，无需 API）
//!
//! - MockLlmClient：按阶段给出固定回复，让编排器在无 Key 时也能跑通整条流程
//! - ScriptedLlmClient：按阶段排队预设回复并记录每次调用，供测试断言调用次数与 prompt 内容

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};
use crate::phases::prompts::{PromptKind, NO_DIRECT_ANSWER};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// 从校验 prompt 中取出草稿段落（"Draft:" 与 "Observations:" 之间）
fn draft_section(prompt: &str) -> String {
    let Some(start) = prompt.find("Draft:\n") else {
        return prompt.to_string();
    };
    let rest = &prompt[start + "Draft:\n".len()..];
    let end = rest.find("\n\nObservations:").unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Mock 客户端：直答阶段总是放行，规划为空，校验总是通过
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let reply = match PromptKind::classify(messages) {
            Some(PromptKind::DirectAnswer) => NO_DIRECT_ANSWER.to_string(),
            Some(PromptKind::Plan) | Some(PromptKind::CodingPlan) => r#"{"steps": []}"#.to_string(),
            Some(PromptKind::Verify) => serde_json::json!({
                "approved": true,
                "feedback": "",
                "final": draft_section(last_user(messages)),
            })
            .to_string(),
            _ => format!("Echo from Mock: {}", last_user(messages)),
        };
        Ok(reply)
    }
}

/// 测试用脚本化客户端：每个阶段一条回复队列，队列耗尽后使用该阶段的默认回复
#[derive(Default)]
pub struct ScriptedLlmClient {
    queues: Mutex<HashMap<PromptKind, VecDeque<Result<String, LlmError>>>>,
    defaults: Mutex<HashMap<PromptKind, Result<String, LlmError>>>,
    calls: Mutex<Vec<(Option<PromptKind>, Vec<Message>)>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某阶段追加一条回复
    pub fn push(self, kind: PromptKind, reply: impl Into<String>) -> Self {
        self.enqueue(kind, Ok(reply.into()));
        self
    }

    /// 为某阶段追加一次失败
    pub fn push_err(self, kind: PromptKind, err: LlmError) -> Self {
        self.enqueue(kind, Err(err));
        self
    }

    /// 某阶段队列耗尽后的回复
    pub fn default_reply(self, kind: PromptKind, reply: impl Into<String>) -> Self {
        if let Ok(mut d) = self.defaults.lock() {
            d.insert(kind, Ok(reply.into()));
        }
        self
    }

    /// 某阶段队列耗尽后一律失败
    pub fn default_err(self, kind: PromptKind, err: LlmError) -> Self {
        if let Ok(mut d) = self.defaults.lock() {
            d.insert(kind, Err(err));
        }
        self
    }

    fn enqueue(&self, kind: PromptKind, reply: Result<String, LlmError>) {
        if let Ok(mut q) = self.queues.lock() {
            q.entry(kind).or_default().push_back(reply);
        }
    }

    /// 某阶段被调用的次数
    pub fn calls_for(&self, kind: PromptKind) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(k, _)| *k == Some(kind)).count())
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 某阶段每次调用的最后一条 user 消息
    pub fn user_prompts_for(&self, kind: PromptKind) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| {
                c.iter()
                    .filter(|(k, _)| *k == Some(kind))
                    .map(|(_, m)| last_user(m).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let kind = PromptKind::classify(messages);
        if let Ok(mut c) = self.calls.lock() {
            c.push((kind, messages.to_vec()));
        }
        let Some(kind) = kind else {
            return Err(LlmError::Unavailable("unscripted prompt".to_string()));
        };
        let queued = self
            .queues
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&kind).and_then(|v| v.pop_front()));
        if let Some(reply) = queued {
            return reply;
        }
        self.defaults
            .lock()
            .ok()
            .and_then(|d| d.get(&kind).cloned())
            .unwrap_or_else(|| Err(LlmError::Unavailable(format!("no script for {kind:?}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_declines_direct_answer() {
        let out = MockLlmClient
            .complete(&PromptKind::DirectAnswer.messages("what is my name"))
            .await
            .unwrap();
        assert_eq!(out, NO_DIRECT_ANSWER);
    }

    #[tokio::test]
    async fn test_scripted_queue_then_default() {
        let llm = ScriptedLlmClient::new()
            .push(PromptKind::Draft, "first")
            .default_reply(PromptKind::Draft, "fallback");
        let msgs = PromptKind::Draft.messages("x");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "first");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "fallback");
        assert_eq!(llm.calls_for(PromptKind::Draft), 2);
        assert!(llm
            .complete(&PromptKind::Verify.messages("x"))
            .await
            .is_err());
    }
}
