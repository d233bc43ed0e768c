//! 短期记忆：消息与对话历史
//!
//! Message 是与模型交互的最小单元；ConversationHistory 保留最近 N 轮 (user, agent) 对，供意图提炼与 REPL 使用。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一轮历史对话
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub user: String,
    pub agent: String,
}

impl HistoryTurn {
    pub fn new(user: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            agent: agent.into(),
        }
    }
}

/// 将最近 n 轮历史渲染为纯文本（最旧在前）
pub fn render_recent(history: &[HistoryTurn], n: usize) -> String {
    let start = history.len().saturating_sub(n);
    history[start..]
        .iter()
        .map(|t| format!("User: {}\nAgent: {}", t.user, t.agent))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 滚动对话历史：超过 max_turns 时丢弃最旧的一轮
#[derive(Clone, Debug)]
pub struct ConversationHistory {
    turns: VecDeque<HistoryTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, turn: HistoryTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<HistoryTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_prunes_oldest() {
        let mut h = ConversationHistory::new(2);
        h.push(HistoryTurn::new("a", "1"));
        h.push(HistoryTurn::new("b", "2"));
        h.push(HistoryTurn::new("c", "3"));
        let turns = h.to_vec();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "b");
    }

    #[test]
    fn test_render_recent_takes_tail() {
        let history = vec![
            HistoryTurn::new("first", "x"),
            HistoryTurn::new("second", "y"),
            HistoryTurn::new("third", "z"),
        ];
        let text = render_recent(&history, 2);
        assert!(!text.contains("first"));
        assert!(text.starts_with("User: second"));
        assert!(text.ends_with("Agent: z"));
    }
}
