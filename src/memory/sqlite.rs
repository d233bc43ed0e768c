//! SQLite 长期记忆：只追加表，跨进程持久化
//!
//! 每条记录带 kind 与创建时间；检索时在最近 max_entries 条记录上做关键词重叠排序。
//! 连接由 Mutex 串行化，阻塞操作放在 spawn_blocking 中执行。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::core::AgentError;
use crate::memory::long_term::{rank_by_overlap, MemoryRecord, MemoryStore};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
"#;

pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    max_entries: usize,
}

impl SqliteMemoryStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>, max_entries: usize) -> Result<Self, AgentError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::Config(format!("Failed to create memory dir: {}", e)))?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| AgentError::Config(format!("Failed to open SQLite database: {}", e)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AgentError::Config(format!("Failed to run schema: {}", e)))?;
        tracing::info!(path = %path.display(), "memory store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            max_entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 记录总数
    pub fn count(&self) -> Result<usize, AgentError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, AgentError> {
        let conn = self.conn.clone();
        let limit = self.max_entries as i64;
        let query = text.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT kind, text FROM memories ORDER BY id DESC LIMIT ?1")
                .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok(format!(
                        "{}: {}",
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?
                    ))
                })
                .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
            let mut docs = rows
                .collect::<Result<Vec<String>, _>>()
                .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;
            // 查询按 id 倒序取最近记录；恢复为最旧在前，与同分时新记录优先的排序约定一致
            docs.reverse();
            Ok::<_, AgentError>(rank_by_overlap(&query, docs.iter().map(String::as_str), k))
        })
        .await
        .map_err(|e| AgentError::MemoryQuery(format!("Task join error: {}", e)))?
    }

    async fn add(&self, record: &MemoryRecord) -> Result<(), AgentError> {
        if record.text.trim().is_empty() {
            return Ok(());
        }
        let conn = self.conn.clone();
        let kind = record.kind.as_str().to_string();
        let text = record.text.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| AgentError::MemoryWrite(e.to_string()))?;
            conn.execute(
                "INSERT INTO memories (kind, text, created_at) VALUES (?1, ?2, ?3)",
                params![kind, text, Utc::now().to_rfc3339()],
            )
            .map_err(|e| AgentError::MemoryWrite(e.to_string()))?;
            Ok::<_, AgentError>(())
        })
        .await
        .map_err(|e| AgentError::MemoryWrite(format!("Task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mem.db");
        {
            let store = SqliteMemoryStore::open(&path, 100).unwrap();
            store
                .add(&MemoryRecord::new(
                    MemoryKind::Fact,
                    r#"{"entity":"agent","attribute":"name","value":"nova"}"#,
                ))
                .await
                .unwrap();
            store
                .add(&MemoryRecord::new(MemoryKind::User, "hello there"))
                .await
                .unwrap();
        }

        let store = SqliteMemoryStore::open(&path, 100).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        let hits = store.query("fact:", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("\"value\":\"nova\""));
    }

    #[tokio::test]
    async fn test_query_without_overlap_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SqliteMemoryStore::open(dir.path().join("mem.db"), 100).unwrap();
        store
            .add(&MemoryRecord::new(MemoryKind::Agent, "paris is the capital"))
            .await
            .unwrap();
        assert!(store.query("quantum chromodynamics", 5).await.unwrap().is_empty());
    }
}
