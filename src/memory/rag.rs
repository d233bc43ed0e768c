//! 文档检索：分块、导入与关键词检索
//!
//! LocalDocumentStore 将纯文本文档按分隔符切块（默认 500 字符、重叠 50），检索时按词重叠打分，
//! 可按来源文件名过滤。ingest_path 遍历文件或目录导入 .txt / .md 文档。

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::core::AgentError;
use crate::memory::tokenizer::{overlap, token_set};

/// 可导入的文档后缀
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// 文档块
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// 来源文件名（不含目录）
    pub source: String,
    /// 在原文档中的字符偏移
    pub offset: usize,
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<&'static str>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: vec!["\n\n", "\n", "。", ". ", "！", "？", "! ", "? ", " "],
        }
    }
}

/// 文档分块器（UTF-8 安全，优先在分隔符处断开）
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn chunk(&self, source: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let target_end = (start + size).min(total);
            let mut end = target_end;

            if target_end < total {
                let window: String = chars[start..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = window.rfind(sep) {
                        let cut = window[..pos].chars().count() + sep.chars().count();
                        if cut > 0 {
                            end = start + cut;
                            break;
                        }
                    }
                }
            }
            if end <= start {
                end = (start + 1).min(total);
            }

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(Chunk {
                    id: format!("{}#{}", source, chunks.len()),
                    text: trimmed.to_string(),
                    source: source.to_string(),
                    offset: start,
                });
            }
            if end >= total {
                break;
            }

            let overlap = self.config.chunk_overlap.min(end - start);
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }
}

/// 文档检索 trait
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 返回至多 k 段最相关的文本；source_filter 为文件名时只在该文件中检索
    async fn query(
        &self,
        text: &str,
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<String>, AgentError>;
}

/// 只取文件名部分并小写，用于来源过滤
fn source_key(name: &str) -> String {
    Path::new(name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// 进程内文档库
#[derive(Default)]
pub struct LocalDocumentStore {
    chunker: Chunker,
    chunks: RwLock<Vec<Chunk>>,
}

impl LocalDocumentStore {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            chunker: Chunker::new(config),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// 导入一段文本；同名来源先移除旧块。返回块数
    pub fn ingest_text(&self, source: &str, text: &str) -> Result<usize, AgentError> {
        let source = Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.to_string());
        let new_chunks = self.chunker.chunk(&source, text);
        let n = new_chunks.len();
        let mut chunks = self
            .chunks
            .write()
            .map_err(|e| AgentError::MemoryWrite(e.to_string()))?;
        let key = source_key(&source);
        chunks.retain(|c| source_key(&c.source) != key);
        chunks.extend(new_chunks);
        tracing::info!(source = %source, chunks = n, "document ingested");
        Ok(n)
    }

    /// 导入文件或目录（递归）中的受支持文档；返回 (文件路径, 块数) 列表
    pub fn ingest_path(&self, path: &Path) -> Result<Vec<(PathBuf, usize)>, AgentError> {
        let mut report = Vec::new();
        for file in supported_files(path)? {
            let text = std::fs::read_to_string(&file).map_err(|e| {
                AgentError::ToolExecution(format!("Read {} failed: {}", file.display(), e))
            })?;
            let n = self.ingest_text(&file.to_string_lossy(), &text)?;
            report.push((file, n));
        }
        Ok(report)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已导入的来源文件名（去重，按导入顺序）
    pub fn sources(&self) -> Vec<String> {
        let chunks = match self.chunks.read() {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let mut out: Vec<String> = Vec::new();
        for c in chunks.iter() {
            if !out.contains(&c.source) {
                out.push(c.source.clone());
            }
        }
        out
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn query(
        &self,
        text: &str,
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<String>, AgentError> {
        let query_tokens = token_set(text);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let filter = source_filter
            .map(source_key)
            .filter(|f| !f.is_empty());
        let chunks = self
            .chunks
            .read()
            .map_err(|e| AgentError::MemoryQuery(e.to_string()))?;

        let mut scored: Vec<(usize, usize, &Chunk)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| filter.as_ref().map_or(true, |f| source_key(&c.source) == *f))
            .map(|(i, c)| (overlap(&query_tokens, &token_set(&c.text)), i, c))
            .filter(|(score, _, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, _, c)| c.text.clone())
            .collect())
    }
}

/// 列出路径下所有受支持的文档文件
pub fn supported_files(path: &Path) -> Result<Vec<PathBuf>, AgentError> {
    if !path.exists() {
        return Err(AgentError::ToolExecution(format!(
            "Path not found: {}",
            path.display()
        )));
    }
    let files = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .map(|x| SUPPORTED_EXTENSIONS.contains(&x.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chunking_respects_size_and_overlap() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 40,
            chunk_overlap: 10,
            ..Default::default()
        });
        let text = "Rust is fast. Rust is safe. Rust has no garbage collector. Cargo builds crates.";
        let chunks = chunker.chunk("notes.txt", text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 40);
            assert_eq!(c.source, "notes.txt");
        }
    }

    #[test]
    fn test_chunking_cjk_is_utf8_safe() {
        let chunker = Chunker::new(ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 2,
            ..Default::default()
        });
        let chunks = chunker.chunk("doc", "这是第一段话。这是第二句话。这是第三句话。");
        assert!(!chunks.is_empty());
    }

    #[tokio::test]
    async fn test_query_with_source_filter() {
        let store = LocalDocumentStore::default();
        store
            .ingest_text("/tmp/poems.txt", "The poem is called Ozymandias.")
            .unwrap();
        store
            .ingest_text("summary.txt", "The summary mentions a poem about rivers.")
            .unwrap();

        let all = store.query("poem", 3, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let only = store.query("poem", 3, Some("summary.txt")).await.unwrap();
        assert_eq!(only, vec!["The summary mentions a poem about rivers.".to_string()]);
        assert_eq!(store.sources(), vec!["poems.txt", "summary.txt"]);
    }

    #[test]
    fn test_ingest_directory_skips_unsupported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "# Title\nbody").unwrap();
        std::fs::write(dir.path().join("b.bin"), "xx").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), "nested text").unwrap();

        let store = LocalDocumentStore::default();
        let report = store.ingest_path(dir.path()).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(store.sources().len(), 2);
    }

    #[test]
    fn test_reingest_replaces_source() {
        let store = LocalDocumentStore::default();
        store.ingest_text("a.txt", "first version").unwrap();
        store.ingest_text("a.txt", "second version").unwrap();
        assert_eq!(store.len(), 1);
    }
}
