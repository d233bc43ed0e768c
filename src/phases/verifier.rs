//! Verifier：草稿校验与反思
//!
//! 要求模型返回 `{"approved": bool, "feedback": str, "final": str}`；只有 approved 且 final 非空才算通过。
//! 解析或调用失败都视为未通过，并给出通用反馈，让反思策略决定是否重试。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::phases::call_model;
use crate::phases::executor::Observation;
use crate::phases::parse::{parse_json, Parsed};
use crate::phases::prompts::PromptKind;

/// 解析失败时的反馈
pub const GENERIC_FEEDBACK: &str = "needs another pass";

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    approved: bool,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default, rename = "final")]
    final_answer: Option<String>,
}

/// 校验结论
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Approved { final_answer: String },
    Rejected { feedback: String },
}

/// 解析校验输出
pub fn parse_verdict(raw: &str) -> Result<Verdict, AgentError> {
    match parse_json::<RawVerdict>(raw) {
        Parsed::Ok(v) => {
            let final_answer = v.final_answer.unwrap_or_default();
            if v.approved && !final_answer.trim().is_empty() {
                Ok(Verdict::Approved {
                    final_answer: final_answer.trim().to_string(),
                })
            } else {
                let feedback = v
                    .feedback
                    .filter(|f| !f.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_FEEDBACK.to_string());
                Ok(Verdict::Rejected { feedback })
            }
        }
        Parsed::Err { reason, raw } => Err(AgentError::VerifyParse { reason, raw }),
    }
}

pub struct Verifier {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 校验草稿；任何失败都降级为 Rejected
    pub async fn verify(
        &self,
        user_input: &str,
        draft: &str,
        observations: &[Observation],
        log: &mut Vec<String>,
    ) -> Verdict {
        let obs = serde_json::to_string(observations).unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "User input:\n{}\n\nDraft:\n{}\n\nObservations:\n{}",
            user_input, draft, obs
        );
        let verdict = match call_model(self.llm.as_ref(), &PromptKind::Verify.messages(prompt), self.timeout).await {
            Ok(raw) => parse_verdict(&raw),
            Err(e) => Err(e),
        };
        match verdict {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "verification failed");
                log.push(format!("Verifier: {}", e));
                Verdict::Rejected {
                    feedback: GENERIC_FEEDBACK.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approved_requires_final() {
        assert_eq!(
            parse_verdict(r#"{"approved": true, "feedback": "", "final": "Paris."}"#).unwrap(),
            Verdict::Approved {
                final_answer: "Paris.".to_string()
            }
        );
        assert_eq!(
            parse_verdict(r#"{"approved": true, "final": "  "}"#).unwrap(),
            Verdict::Rejected {
                feedback: GENERIC_FEEDBACK.to_string()
            }
        );
    }

    #[test]
    fn test_rejected_keeps_feedback() {
        let v = parse_verdict("```json\n{\"approved\": false, \"feedback\": \"cite a source\"}\n```").unwrap();
        assert_eq!(
            v,
            Verdict::Rejected {
                feedback: "cite a source".to_string()
            }
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            parse_verdict("looks good to me"),
            Err(AgentError::VerifyParse { .. })
        ));
    }
}
