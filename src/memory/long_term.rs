//! 长期记忆：只追加的相似度文本库
//!
//! 记录以 `"{kind}: {text}"` 形式落库，因此用 `"fact:"` 检索即可召回结构化事实。
//! 不提供更新/删除：同一实体的新事实直接追加，检索时由相关度与新旧决定先后。

use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::facts::Fact;
use crate::memory::tokenizer::{overlap, token_set};

/// 记忆种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    User,
    Agent,
    Fact,
    Feedback,
}

impl MemoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::User => "user",
            MemoryKind::Agent => "agent",
            MemoryKind::Fact => "fact",
            MemoryKind::Feedback => "feedback",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条不可变的记忆记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryRecord {
    pub kind: MemoryKind,
    pub text: String,
}

impl MemoryRecord {
    pub fn new(kind: MemoryKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn fact(fact: &Fact) -> Self {
        Self::new(MemoryKind::Fact, fact.to_json())
    }

    /// 落库文本
    pub fn rendered(&self) -> String {
        format!("{}: {}", self.kind, self.text)
    }
}

/// 长期记忆 trait：相似度检索与追加写入；实现方负责串行化自身写入
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 按相似度返回至多 k 条文本（最相关在前）
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, AgentError>;

    /// 追加一条记录
    async fn add(&self, record: &MemoryRecord) -> Result<(), AgentError>;
}

/// 按词重叠排序：分数高者在前，同分时较新的在前
pub(crate) fn rank_by_overlap<'a>(
    query: &str,
    docs: impl Iterator<Item = &'a str>,
    k: usize,
) -> Vec<String> {
    let query_tokens = token_set(query);
    if query_tokens.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(usize, usize, &str)> = docs
        .enumerate()
        .map(|(i, text)| (overlap(&query_tokens, &token_set(text)), i, text))
        .filter(|(s, _, _)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    scored
        .into_iter()
        .take(k)
        .map(|(_, _, t)| t.to_string())
        .collect()
}

/// 进程内实现：关键词重叠检索，超过 max_entries 时丢弃最旧记录
pub struct InMemoryStore {
    store: RwLock<Vec<String>>,
    max_entries: usize,
}

impl InMemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前全部记录（最旧在前）
    pub fn snapshot(&self) -> Vec<String> {
        self.store.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, AgentError> {
        let store = self
            .store
            .read()
            .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
        Ok(rank_by_overlap(text, store.iter().map(String::as_str), k))
    }

    async fn add(&self, record: &MemoryRecord) -> Result<(), AgentError> {
        if record.text.trim().is_empty() {
            return Ok(());
        }
        let mut store = self
            .store
            .write()
            .map_err(|e| AgentError::MemoryWrite(e.to_string()))?;
        store.push(record.rendered());
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
        Ok(())
    }
}
