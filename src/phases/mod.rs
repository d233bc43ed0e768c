//! 编排各阶段：直答、规划、执行起草、校验，以及共用的 prompt 与 JSON 解析

pub mod direct;
pub mod executor;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod verifier;

use std::time::Duration;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

pub use direct::{DirectAnswerer, DirectOutcome};
pub use executor::{Executor, Observation};
pub use planner::{Plan, Planner, Step};
pub use prompts::{PromptKind, NO_DIRECT_ANSWER};
pub use verifier::{Verdict, Verifier};

/// 带超时的模型调用；超时视为模型不可用
pub async fn call_model(
    llm: &dyn LlmClient,
    messages: &[Message],
    timeout: Duration,
) -> Result<String, AgentError> {
    match tokio::time::timeout(timeout, llm.complete(messages)).await {
        Ok(result) => result.map_err(AgentError::from),
        Err(_) => Err(AgentError::ModelUnavailable(LlmError::Timeout(timeout.as_secs()))),
    }
}
