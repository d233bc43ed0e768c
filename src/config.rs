//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PILOT__*` 覆盖（双下划线表示嵌套，如 `PILOT__LLM__PROVIDER=groq`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、工作目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 数据根目录（记忆库、文档、沙箱），未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端选择、模型、温度与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：groq / cerebras / deepseek / openai
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 未设置时使用 provider 的默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "groq".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            temperature: 0.0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [agent] 段：反思上限、记忆检索条数、历史轮数
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Verify 拒绝后最多重新规划的次数
    #[serde(default = "default_max_reflections")]
    pub max_reflections: u32,
    /// DirectAnswer 阶段每次检索的条数（原始输入与 "fact:" 各一次）
    #[serde(default = "default_direct_answer_k")]
    pub direct_answer_k: usize,
    /// Planner 检索的记忆条数
    #[serde(default = "default_planner_memory_k")]
    pub planner_memory_k: usize,
    /// 意图提炼时带入的最近对话轮数
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// 放弃且无草稿时的占位回答
    #[serde(default = "default_placeholder_answer")]
    pub placeholder_answer: String,
}

fn default_max_reflections() -> u32 {
    2
}

fn default_direct_answer_k() -> usize {
    5
}

fn default_planner_memory_k() -> usize {
    4
}

fn default_history_turns() -> usize {
    5
}

fn default_placeholder_answer() -> String {
    "[Agent had no result]".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_reflections: default_max_reflections(),
            direct_answer_k: default_direct_answer_k(),
            planner_memory_k: default_planner_memory_k(),
            history_turns: default_history_turns(),
            placeholder_answer: default_placeholder_answer(),
        }
    }
}

/// [memory] 段：长期记忆后端
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// sqlite（持久化）或 memory（进程内）
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// SQLite 文件路径，未设置时为 <workspace>/agent_memory.db
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_memory_backend() -> String {
    "sqlite".to_string()
}

fn default_max_entries() -> usize {
    5000
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            max_entries: default_max_entries(),
        }
    }
}

/// [tools] 段：工具超时、启用列表与各工具参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 启用的工具名；默认全部内置工具
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub web_search: WebSearchSection,
    #[serde(default)]
    pub rag: RagSection,
    #[serde(default)]
    pub coding: CodingSection,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_enabled_tools() -> Vec<String> {
    vec![
        "web_search".into(),
        "calculator".into(),
        "rag_search".into(),
        "coding_agent_tool".into(),
    ]
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            enabled: default_enabled_tools(),
            web_search: WebSearchSection::default(),
            rag: RagSection::default(),
            coding: CodingSection::default(),
        }
    }
}

/// [tools.web_search] 段：搜索端点、超时、默认结果数
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSection {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_results() -> usize {
    3
}

impl Default for WebSearchSection {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

/// [tools.rag] 段：检索条数与分块参数
#[derive(Debug, Clone, Deserialize)]
pub struct RagSection {
    #[serde(default = "default_rag_k")]
    pub k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// 启动时预先导入的文档目录，未设置时为 <workspace>/docs
    pub docs_dir: Option<PathBuf>,
}

fn default_rag_k() -> usize {
    3
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            k: default_rag_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            docs_dir: None,
        }
    }
}

/// [tools.coding] 段：编码子智能体的沙箱目录与命令超时
#[derive(Debug, Clone, Deserialize)]
pub struct CodingSection {
    /// 未设置时为 <workspace>/sandbox
    pub sandbox_dir: Option<PathBuf>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// 一次编码任务中全部步骤的总执行时长（秒）
    #[serde(default = "default_step_budget_secs")]
    pub step_budget_secs: u64,
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_step_budget_secs() -> u64 {
    120
}

impl Default for CodingSection {
    fn default() -> Self {
        Self {
            sandbox_dir: None,
            command_timeout_secs: default_command_timeout_secs(),
            step_budget_secs: default_step_budget_secs(),
        }
    }
}

impl AppConfig {
    /// 工作目录：配置 > 当前目录下的 workspace
    pub fn workspace(&self) -> PathBuf {
        self.app.workspace_root.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("workspace")
        })
    }

    pub fn memory_path(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| self.workspace().join("agent_memory.db"))
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.tools
            .coding
            .sandbox_dir
            .clone()
            .unwrap_or_else(|| self.workspace().join("sandbox"))
    }

    /// 文档目录：ingest 子命令写入、chat 启动时导入
    pub fn docs_dir(&self) -> PathBuf {
        self.tools
            .rag
            .docs_dir
            .clone()
            .unwrap_or_else(|| self.workspace().join("docs"))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeouts.request)
    }
}

/// 从 config 目录加载配置，环境变量 PILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_reflections, 2);
        assert_eq!(cfg.agent.direct_answer_k, 5);
        assert_eq!(cfg.agent.planner_memory_k, 4);
        assert_eq!(cfg.agent.history_turns, 5);
        assert_eq!(cfg.tools.enabled.len(), 4);
        assert_eq!(cfg.tools.web_search.max_results, 3);
        assert_eq!(cfg.tools.rag.chunk_size, 500);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pilot.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_reflections = 4\n\n[llm]\nprovider = \"cerebras\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.agent.max_reflections, 4);
        assert_eq!(cfg.agent.planner_memory_k, 4);
        assert_eq!(cfg.llm.provider, "cerebras");
    }
}
