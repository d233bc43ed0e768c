//! OpenAI 兼容服务商：Groq、Cerebras、DeepSeek、OpenAI
//!
//! 各家均提供 OpenAI 兼容接口，只是 Base URL、默认模型与 API Key 环境变量不同。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const CEREBRAS_BASE_URL: &str = "https://api.cerebras.ai/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 服务商描述：默认端点、默认模型、读取的 Key 环境变量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub base_url: Option<&'static str>,
    pub default_model: &'static str,
    pub api_key_env: &'static str,
}

const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "groq",
        base_url: Some(GROQ_BASE_URL),
        default_model: "qwen/qwen3-32b",
        api_key_env: "GROQ_API_KEY",
    },
    ProviderSpec {
        name: "cerebras",
        base_url: Some(CEREBRAS_BASE_URL),
        default_model: "llama-3.3-70b",
        api_key_env: "CEREBRAS_API_KEY",
    },
    ProviderSpec {
        name: "deepseek",
        base_url: Some(DEEPSEEK_BASE_URL),
        default_model: "deepseek-chat",
        api_key_env: "DEEPSEEK_API_KEY",
    },
    ProviderSpec {
        name: "openai",
        base_url: None,
        default_model: "gpt-4o-mini",
        api_key_env: "OPENAI_API_KEY",
    },
];

/// 按名称查找服务商（大小写不敏感）
pub fn provider_spec(name: &str) -> Option<ProviderSpec> {
    let name = name.trim().to_lowercase();
    PROVIDERS.iter().copied().find(|p| p.name == name)
}

/// 根据配置与环境变量选择 LLM 后端；找不到 API Key 时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let Some(spec) = provider_spec(&cfg.llm.provider) else {
        tracing::warn!(provider = %cfg.llm.provider, "Unknown LLM provider, using Mock LLM");
        return Arc::new(MockLlmClient);
    };

    let Ok(api_key) = std::env::var(spec.api_key_env) else {
        tracing::warn!(env = spec.api_key_env, "No API key set, using Mock LLM");
        return Arc::new(MockLlmClient);
    };

    let model = cfg
        .llm
        .model
        .clone()
        .unwrap_or_else(|| spec.default_model.to_string());
    let base_url = cfg.llm.base_url.as_deref().or(spec.base_url);

    tracing::info!(provider = spec.name, model = %model, "Using OpenAI-compatible LLM");
    Arc::new(
        OpenAiClient::new(base_url, &model, Some(api_key.as_str()))
            .with_temperature(cfg.llm.temperature),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_lookup_is_case_insensitive() {
        let spec = provider_spec(" Groq ").unwrap();
        assert_eq!(spec.base_url, Some(GROQ_BASE_URL));
        assert_eq!(spec.api_key_env, "GROQ_API_KEY");
        assert!(provider_spec("anthropic").is_none());
    }

    #[test]
    fn test_openai_uses_default_endpoint() {
        let spec = provider_spec("openai").unwrap();
        assert!(spec.base_url.is_none());
    }
}
