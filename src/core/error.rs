//! Agent 错误类型
//!
//! 与编排器的阶段内恢复配合：除 DirectAnswer 阶段首次模型调用外，所有错误都在阶段内被记录并降级处理。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误（模型、工具、解析、记忆写入、路径逃逸等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型调用失败（网络、鉴权、超时）
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 规划输出不是合法 JSON 或缺少 steps 数组
    #[error("Plan parse error: {reason}")]
    PlanParse { reason: String, raw: String },

    /// 校验输出不是合法 JSON
    #[error("Verify parse error: {reason}")]
    VerifyParse { reason: String, raw: String },

    #[error("Memory write failed: {0}")]
    MemoryWrite(String),

    #[error("Memory query failed: {0}")]
    MemoryQuery(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),
}
