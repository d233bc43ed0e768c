//! DirectAnswer：仅凭长期记忆作答
//!
//! 用原始输入与字面量 "fact:" 各检索一次并去重合并；没有记忆时不调用模型直接进入规划。
//! 模型回复中只要出现 NO_DIRECT_ANSWER 即视为放弃。

use std::sync::Arc;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::MemoryStore;
use crate::phases::call_model;
use crate::phases::prompts::{PromptKind, NO_DIRECT_ANSWER};

/// 直答结果
#[derive(Debug, Clone, PartialEq)]
pub enum DirectOutcome {
    Answered(String),
    Declined,
}

pub struct DirectAnswerer {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn MemoryStore>,
    k: usize,
    timeout: Duration,
}

impl DirectAnswerer {
    pub fn new(llm: Arc<dyn LlmClient>, memory: Arc<dyn MemoryStore>, k: usize, timeout: Duration) -> Self {
        Self {
            llm,
            memory,
            k,
            timeout,
        }
    }

    async fn recall(&self, user_input: &str) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();
        for lookup in [user_input, "fact:"] {
            match self.memory.query(lookup, self.k).await {
                Ok(items) => {
                    for item in items {
                        if !merged.contains(&item) {
                            merged.push(item);
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, lookup = %lookup, "memory recall failed"),
            }
        }
        merged
    }

    /// 模型调用失败时返回 Err，由编排器结束本轮
    pub async fn attempt(&self, user_input: &str, log: &mut Vec<String>) -> Result<DirectOutcome, AgentError> {
        let memory = self.recall(user_input).await;
        if memory.is_empty() {
            log.push("DirectAnswer: No relevant memory, moving to planning.".to_string());
            return Ok(DirectOutcome::Declined);
        }

        let prompt = format!(
            "Memory:\n{}\n\nUser input:\n{}",
            memory.join("\n"),
            user_input
        );
        let reply = call_model(self.llm.as_ref(), &PromptKind::DirectAnswer.messages(prompt), self.timeout).await?;
        let reply = reply.trim();
        if reply.is_empty() || reply.contains(NO_DIRECT_ANSWER) {
            log.push(format!(
                "DirectAnswer: {} memory item(s) not enough to answer, moving to planning.",
                memory.len()
            ));
            Ok(DirectOutcome::Declined)
        } else {
            log.push("DirectAnswer: Answered from memory.".to_string());
            Ok(DirectOutcome::Answered(reply.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{InMemoryStore, MemoryKind, MemoryRecord};

    #[tokio::test]
    async fn test_merges_input_and_fact_lookups() {
        let memory = Arc::new(InMemoryStore::default());
        memory
            .add(&MemoryRecord::new(MemoryKind::User, "what is my name"))
            .await
            .unwrap();
        memory
            .add(&MemoryRecord::new(
                MemoryKind::Fact,
                r#"{"entity":"user","attribute":"name","value":"dana"}"#,
            ))
            .await
            .unwrap();
        let llm = Arc::new(ScriptedLlmClient::new().push(PromptKind::DirectAnswer, "Your name is Dana."));
        let direct = DirectAnswerer::new(llm.clone(), memory, 5, Duration::from_secs(5));

        let mut log = Vec::new();
        let outcome = direct.attempt("what is my name", &mut log).await.unwrap();
        assert_eq!(outcome, DirectOutcome::Answered("Your name is Dana.".to_string()));

        let prompt = &llm.user_prompts_for(PromptKind::DirectAnswer)[0];
        assert!(prompt.contains("user: what is my name"));
        assert!(prompt.contains("\"value\":\"dana\""));
        assert_eq!(prompt.matches("fact: ").count(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_anywhere_declines() {
        let memory = Arc::new(InMemoryStore::default());
        memory
            .add(&MemoryRecord::new(MemoryKind::Agent, "weather is sunny"))
            .await
            .unwrap();
        let llm = Arc::new(
            ScriptedLlmClient::new().push(PromptKind::DirectAnswer, "Sorry. NO_DIRECT_ANSWER"),
        );
        let direct = DirectAnswerer::new(llm, memory, 5, Duration::from_secs(5));
        let outcome = direct.attempt("weather tomorrow", &mut Vec::new()).await.unwrap();
        assert_eq!(outcome, DirectOutcome::Declined);
    }
}
