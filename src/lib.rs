//! Pilot - Rust 对话式任务编排智能体
//!
//! 每轮对话依次经过：记忆直答 → 规划 → 工具执行与起草 → 校验（可反思重规划）→ 写入长期记忆。
//!
//! 模块划分：
//! - **agent**: 运行时装配（配置 → 模型、记忆、文档库、工具、编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、轮次状态、五阶段编排器、会话监管
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容服务商 / Mock / 脚本化）
//! - **memory**: 对话历史、长期记忆（进程内 / SQLite）、事实抽取、文档检索
//! - **phases**: 各阶段逻辑与 prompt
//! - **tools**: 工具注册表与执行器（web_search、calculator、rag_search、coding_agent_tool）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod phases;
pub mod tools;

pub use agent::Agent;
pub use core::{AgentError, TurnInput, TurnOutput};
