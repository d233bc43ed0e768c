//! 编排器：五阶段状态机
//!
//! DIRECT_ANSWER → PLAN → EXECUTE → VERIFY → (PLAN | FINALIZE) → MEMORY_WRITE。
//! 只有直答阶段的模型失败会提前结束本轮；其余阶段的失败在阶段内降级，由反思策略决定何时停止。
//! 每个阶段结束后检查中断标记，被中断的轮次不写入记忆。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AgentSection;
use crate::core::state::{Phase, Turn, TurnInput, TurnOutput};
use crate::llm::LlmClient;
use crate::memory::{extract_facts, MemoryKind, MemoryRecord, MemoryStore};
use crate::phases::{DirectAnswerer, DirectOutcome, Executor, Planner, Verdict, Verifier};
use crate::tools::ToolExecutor;

/// 直答阶段模型不可用时返回给用户的通用提示
pub const MODEL_ERROR_ANSWER: &str = "Sorry, I couldn't reach the language model. Please try again.";

/// 被中断的轮次返回的占位回答
pub const INTERRUPTED_ANSWER: &str = "[Turn interrupted]";

/// 反思策略的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    Approved,
    GiveUp,
    Replan,
}

/// 反思策略：已有最终答案则通过；已重新规划次数达到上限则放弃；否则重新规划
pub fn reflection_policy(final_set: bool, reflections: u32, max_reflections: u32) -> Reflection {
    if final_set {
        Reflection::Approved
    } else if reflections >= max_reflections {
        Reflection::GiveUp
    } else {
        Reflection::Replan
    }
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn MemoryStore>,
    tools: Arc<ToolExecutor>,
    direct: DirectAnswerer,
    planner: Planner,
    executor: Executor,
    verifier: Verifier,
    max_reflections: u32,
    placeholder_answer: String,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn MemoryStore>,
        tools: Arc<ToolExecutor>,
        settings: &AgentSection,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            direct: DirectAnswerer::new(llm.clone(), memory.clone(), settings.direct_answer_k, llm_timeout),
            planner: Planner::new(
                llm.clone(),
                memory.clone(),
                settings.planner_memory_k,
                settings.history_turns,
                llm_timeout,
            ),
            executor: Executor::new(llm.clone(), tools.clone(), llm_timeout),
            verifier: Verifier::new(llm.clone(), llm_timeout),
            llm,
            memory,
            tools,
            max_reflections: settings.max_reflections,
            placeholder_answer: settings.placeholder_answer.clone(),
        }
    }

    /// 运行一轮，不可中断
    pub async fn run(&self, input: TurnInput) -> TurnOutput {
        self.run_with_cancel(input, &CancellationToken::new()).await
    }

    /// 运行一轮；cancel 被触发后在下一个阶段边界放弃
    pub async fn run_with_cancel(&self, input: TurnInput, cancel: &CancellationToken) -> TurnOutput {
        let mut turn = Turn::new(input);
        tracing::info!(input_len = turn.input.user_input.len(), file = ?turn.input.attached_file, "turn started");

        loop {
            // 记忆已写入的轮次照常返回
            if turn.phase != Phase::Done && cancel.is_cancelled() {
                return self.interrupted(turn);
            }
            tracing::debug!(phase = %turn.phase, reflections = turn.reflections, "phase");
            let next = match turn.phase {
                Phase::DirectAnswer => match self.direct.attempt(&turn.input.user_input, &mut turn.log).await {
                    Ok(DirectOutcome::Answered(answer)) => {
                        turn.final_answer = Some(answer);
                        Phase::MemoryWrite
                    }
                    Ok(DirectOutcome::Declined) => Phase::Plan,
                    Err(e) => {
                        tracing::error!(error = %e, "direct answer model call failed");
                        turn.log(format!("DirectAnswer: {}", e));
                        turn.final_answer = Some(MODEL_ERROR_ANSWER.to_string());
                        return self.finish(turn);
                    }
                },
                Phase::Plan => {
                    let catalog = self.tools.registry().describe();
                    turn.plan = self
                        .planner
                        .plan(&turn.input, &catalog, turn.feedback.as_deref(), &mut turn.log)
                        .await;
                    Phase::Execute
                }
                Phase::Execute => {
                    turn.observations = self.executor.observe(&turn.plan, &mut turn.log).await;
                    turn.draft = match self
                        .executor
                        .draft(&turn.input.user_input, &turn.plan, &turn.observations)
                        .await
                    {
                        Ok(d) if !d.is_empty() => Some(d),
                        Ok(_) => None,
                        Err(e) => {
                            tracing::warn!(error = %e, "draft model call failed");
                            turn.log(format!("Executor: Drafting failed: {}", e));
                            None
                        }
                    };
                    Phase::Verify
                }
                Phase::Verify => self.verify(&mut turn).await,
                Phase::Finalize => {
                    let answer = turn
                        .draft
                        .clone()
                        .unwrap_or_else(|| self.placeholder_answer.clone());
                    turn.log("Finalizer: Reflection budget exhausted, returning the last draft.");
                    turn.final_answer = Some(answer);
                    Phase::MemoryWrite
                }
                Phase::MemoryWrite => {
                    self.write_memory(&mut turn).await;
                    Phase::Done
                }
                Phase::Done => return self.finish(turn),
            };
            turn.phase = next;
        }
    }

    async fn verify(&self, turn: &mut Turn) -> Phase {
        let draft = turn.draft.clone().unwrap_or_default();
        let verdict = self
            .verifier
            .verify(&turn.input.user_input, &draft, &turn.observations, &mut turn.log)
            .await;
        match verdict {
            Verdict::Approved { final_answer } => {
                turn.log("Verifier: Draft approved.");
                turn.final_answer = Some(final_answer);
            }
            Verdict::Rejected { feedback } => {
                let preview: String = feedback.chars().take(50).collect();
                turn.log(format!("Verifier: Draft not approved. Feedback: '{}...'", preview));
                let record = MemoryRecord::new(MemoryKind::Feedback, format!("verifier_feedback: {}", feedback));
                if let Err(e) = self.memory.add(&record).await {
                    tracing::warn!(error = %e, "feedback write failed");
                }
                turn.feedback = Some(feedback);
            }
        }

        match reflection_policy(turn.final_answer.is_some(), turn.reflections, self.max_reflections) {
            Reflection::Approved => Phase::MemoryWrite,
            Reflection::GiveUp => Phase::Finalize,
            Reflection::Replan => {
                turn.reflections += 1;
                turn.log(format!(
                    "Reflection {}/{}: Replanning.",
                    turn.reflections, self.max_reflections
                ));
                Phase::Plan
            }
        }
    }

    async fn write_memory(&self, turn: &mut Turn) {
        turn.log("Memory: Saving final answer and user query to long-term memory.");
        let mut records = Vec::new();
        if !turn.input.user_input.trim().is_empty() {
            records.push(MemoryRecord::new(MemoryKind::User, turn.input.user_input.clone()));
        }
        if let Some(answer) = turn.final_answer.as_deref().filter(|a| !a.trim().is_empty()) {
            records.push(MemoryRecord::new(MemoryKind::Agent, answer));
        }
        let facts = extract_facts(&turn.input.user_input);
        for fact in &facts {
            records.push(MemoryRecord::fact(fact));
        }
        if !facts.is_empty() {
            turn.log(format!("Memory: Extracted {} fact(s).", facts.len()));
        }

        for record in &records {
            if let Err(e) = self.memory.add(record).await {
                tracing::warn!(error = %e, kind = %record.kind, "memory write failed");
            }
        }
    }

    fn interrupted(&self, mut turn: Turn) -> TurnOutput {
        tracing::info!(phase = %turn.phase, "turn interrupted");
        turn.log(format!("Turn interrupted before {}.", turn.phase));
        let mut out = TurnOutput::from(turn);
        out.final_answer = INTERRUPTED_ANSWER.to_string();
        out.interrupted = true;
        out
    }

    fn finish(&self, turn: Turn) -> TurnOutput {
        let (prompt, completion, total) = self.llm.token_usage();
        tracing::info!(
            reflections = turn.reflections,
            prompt_tokens = prompt,
            completion_tokens = completion,
            total_tokens = total,
            "turn finished"
        );
        TurnOutput::from(turn)
    }
}
