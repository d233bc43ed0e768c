//! Turn 状态：一次调用的输入、阶段、反思计数与日志
//!
//! Turn 由编排器在入口创建，各阶段依次修改，终态时投影为 TurnOutput 返回；不跨调用共享。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::HistoryTurn;
use crate::phases::{Observation, Plan};

/// 编排阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    DirectAnswer,
    Plan,
    Execute,
    Verify,
    Finalize,
    MemoryWrite,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::DirectAnswer => "DIRECT_ANSWER",
            Phase::Plan => "PLAN",
            Phase::Execute => "EXECUTE",
            Phase::Verify => "VERIFY",
            Phase::Finalize => "FINALIZE",
            Phase::MemoryWrite => "MEMORY_WRITE",
            Phase::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// 调用方提供的输入
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TurnInput {
    pub user_input: String,
    /// 历史对话，最近的在最后
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    /// 附件文件名（已导入文档库）
    #[serde(default)]
    pub attached_file: Option<String>,
}

impl TurnInput {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.attached_file = Some(file.into());
        self
    }
}

/// 单次调用的可变状态
#[derive(Debug)]
pub struct Turn {
    pub input: TurnInput,
    pub phase: Phase,
    pub reflections: u32,
    pub log: Vec<String>,
    pub plan: Plan,
    pub observations: Vec<Observation>,
    pub draft: Option<String>,
    pub feedback: Option<String>,
    pub final_answer: Option<String>,
}

impl Turn {
    pub fn new(input: TurnInput) -> Self {
        Self {
            input,
            phase: Phase::DirectAnswer,
            reflections: 0,
            log: Vec::new(),
            plan: Plan::default(),
            observations: Vec::new(),
            draft: None,
            feedback: None,
            final_answer: None,
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(phase = %self.phase, "{}", line);
        self.log.push(line);
    }
}

/// 返回给调用方的结果：总是包含 final 与 log
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutput {
    #[serde(rename = "final")]
    pub final_answer: String,
    pub log: Vec<String>,
    pub reflections: u32,
    pub interrupted: bool,
}

impl From<Turn> for TurnOutput {
    fn from(turn: Turn) -> Self {
        Self {
            final_answer: turn.final_answer.unwrap_or_default(),
            log: turn.log,
            reflections: turn.reflections,
            interrupted: false,
        }
    }
}
