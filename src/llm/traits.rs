//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Groq / Cerebras / DeepSeek / Mock）实现 LlmClient：complete（非流式，完整缓冲）。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型边界上的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 传输或鉴权失败
    #[error("{0}")]
    Unavailable(String),

    /// 单次调用超过配置的超时
    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// LLM 客户端 trait：给定消息列表返回完整文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
