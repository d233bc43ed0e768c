//! LLM 层：客户端抽象与实现（OpenAI 兼容服务商 / Mock / 脚本化测试客户端）

pub mod mock;
pub mod openai;
pub mod providers;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use providers::{create_llm_from_config, provider_spec, ProviderSpec};
pub use traits::{LlmClient, LlmError};
