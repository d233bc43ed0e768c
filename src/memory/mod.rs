//! 记忆层：消息与对话历史、长期记忆（进程内 / SQLite）、事实抽取、文档检索、分词

pub mod conversation;
pub mod facts;
pub mod long_term;
pub mod rag;
pub mod sqlite;
pub mod tokenizer;

pub use conversation::{render_recent, ConversationHistory, HistoryTurn, Message, Role};
pub use facts::{extract_facts, Fact};
pub use long_term::{InMemoryStore, MemoryKind, MemoryRecord, MemoryStore};
pub use rag::{DocumentStore, LocalDocumentStore};
pub use sqlite::SqliteMemoryStore;
