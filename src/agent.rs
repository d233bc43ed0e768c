//! Agent 运行时
//!
//! 从配置装配模型、长期记忆、文档库、工具与编排器；run_turn 对单条输入跑完整五阶段流程，
//! 并通过 SessionSupervisor 登记轮次以支持按 id 中断。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::{Orchestrator, SessionSupervisor, TurnHandle, TurnInput, TurnOutput};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::rag::{supported_files, ChunkingConfig};
use crate::memory::{InMemoryStore, LocalDocumentStore, MemoryStore, SqliteMemoryStore};
use crate::tools::{CodingAgent, DuckDuckGoHtml, Sandbox, SearchProvider, ToolExecutor, ToolRegistry};

const CODING_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// 按配置创建长期记忆后端
pub fn build_memory_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn MemoryStore>> {
    match cfg.memory.backend.trim().to_lowercase().as_str() {
        "sqlite" => {
            let path = cfg.memory_path();
            let store = SqliteMemoryStore::open(&path, cfg.memory.max_entries)
                .with_context(|| format!("opening memory store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemoryStore::new(cfg.memory.max_entries))),
        other => {
            tracing::warn!(backend = %other, "Unknown memory backend, using in-memory store");
            Ok(Arc::new(InMemoryStore::new(cfg.memory.max_entries)))
        }
    }
}

fn chunking(cfg: &AppConfig) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: cfg.tools.rag.chunk_size,
        chunk_overlap: cfg.tools.rag.chunk_overlap,
        ..Default::default()
    }
}

/// 把文件或目录中的文档复制到文档目录，返回 (目标路径, 块数)
pub fn ingest_documents(cfg: &AppConfig, path: &Path) -> anyhow::Result<Vec<(PathBuf, usize)>> {
    let docs_dir = cfg.docs_dir();
    std::fs::create_dir_all(&docs_dir)
        .with_context(|| format!("creating docs dir {}", docs_dir.display()))?;
    let files = supported_files(path)?;
    if files.is_empty() {
        anyhow::bail!("no .txt or .md documents found under {}", path.display());
    }

    let store = LocalDocumentStore::new(chunking(cfg));
    let mut report = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .context("document path has no file name")?;
        let target = docs_dir.join(name);
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        std::fs::write(&target, &text).with_context(|| format!("writing {}", target.display()))?;
        let chunks = store.ingest_text(&target.to_string_lossy(), &text)?;
        report.push((target, chunks));
    }
    Ok(report)
}

/// 组装好的 Agent：可跨轮次、跨会话共享
pub struct Agent {
    orchestrator: Orchestrator,
    supervisor: SessionSupervisor,
    docs: Arc<LocalDocumentStore>,
}

impl Agent {
    /// 按配置创建全部组件；文档目录存在时预先导入
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let workspace = cfg.workspace();
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("creating workspace {}", workspace.display()))?;

        let llm = create_llm_from_config(cfg);
        let memory = build_memory_store(cfg)?;
        let search: Arc<dyn SearchProvider> = Arc::new(DuckDuckGoHtml::new(
            cfg.tools.web_search.endpoint.clone(),
            cfg.tools.web_search.timeout_secs,
        ));
        let agent = Self::with_components(cfg, llm, memory, search);

        let docs_dir = cfg.docs_dir();
        if docs_dir.exists() {
            let loaded = agent.docs.ingest_path(&docs_dir)?;
            tracing::info!(dir = %docs_dir.display(), files = loaded.len(), "documents loaded");
        }
        Ok(agent)
    }

    /// 使用外部提供的模型、记忆与搜索后端装配（记忆的生命周期由调用方持有）
    pub fn with_components(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn MemoryStore>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        let docs = Arc::new(LocalDocumentStore::new(chunking(cfg)));
        let coding = CodingAgent::new(
            llm.clone(),
            Sandbox::new(cfg.sandbox_dir(), cfg.tools.coding.command_timeout_secs),
            cfg.llm_timeout(),
        )
        .with_step_budget(Duration::from_secs(cfg.tools.coding.step_budget_secs));
        let coding_timeout = coding.max_duration() + CODING_TIMEOUT_SLACK;
        let registry = ToolRegistry::new(search, docs.clone())
            .with_coding(Arc::new(coding))
            .with_enabled(&cfg.tools.enabled)
            .with_limits(cfg.tools.web_search.max_results, cfg.tools.rag.k);
        let tools = Arc::new(
            ToolExecutor::new(Arc::new(registry), cfg.tools.tool_timeout_secs)
                .with_tool_timeout("coding_agent_tool", coding_timeout),
        );
        let orchestrator = Orchestrator::new(llm, memory, tools, &cfg.agent, cfg.llm_timeout());

        Self {
            orchestrator,
            supervisor: SessionSupervisor::new(),
            docs,
        }
    }

    pub fn documents(&self) -> &LocalDocumentStore {
        &self.docs
    }

    /// 导入附件并返回其文件名，作为 TurnInput::attached_file
    pub fn attach_file(&self, path: &Path) -> anyhow::Result<String> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading attachment {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("attachment path has no file name")?;
        self.docs.ingest_text(&name, &text)?;
        Ok(name)
    }

    /// 登记一个轮次，句柄中的 id 可用于 interrupt
    pub fn begin_turn(&self) -> TurnHandle {
        self.supervisor.begin()
    }

    /// 运行已登记的轮次，结束后注销
    pub async fn run_registered(&self, handle: TurnHandle, input: TurnInput) -> TurnOutput {
        let out = self.orchestrator.run_with_cancel(input, &handle.token).await;
        self.supervisor.finish(handle.id);
        out
    }

    pub async fn run_turn(&self, input: TurnInput) -> TurnOutput {
        let handle = self.begin_turn();
        self.run_registered(handle, input).await
    }

    pub fn interrupt(&self, id: Uuid) -> bool {
        self.supervisor.interrupt(id)
    }

    pub fn shutdown(&self) {
        self.supervisor.cancel_all();
    }
}
