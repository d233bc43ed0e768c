//! 核心编排层：错误、轮次状态、会话监管、五阶段状态机

pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{reflection_policy, Orchestrator, Reflection, INTERRUPTED_ANSWER, MODEL_ERROR_ANSWER};
pub use session_supervisor::{SessionSupervisor, TurnHandle};
pub use state::{Phase, Turn, TurnInput, TurnOutput};
