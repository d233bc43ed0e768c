//! 工具注册表
//!
//! 内置工具以枚举表示，参数与结果均为强类型；按名查找返回 Found / NotFound。
//! invoke 永不向外抛错：未知工具得到 no_tool 标记，工具失败得到 error 标记。

use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::memory::DocumentStore;
use crate::tools::calculator::{self, CalcReport};
use crate::tools::coding::CodingAgent;
use crate::tools::web_search::{SearchHit, SearchProvider};

/// rag_search 没有命中时的明确提示
pub const NO_RELEVANT_INFO: &str = "No relevant info found in the uploaded file.";

const MAX_SEARCH_RESULTS: usize = 10;

/// 内置工具
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    WebSearch,
    Calculator,
    RagSearch,
    CodingAgent,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 4] = [
        BuiltinTool::WebSearch,
        BuiltinTool::Calculator,
        BuiltinTool::RagSearch,
        BuiltinTool::CodingAgent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinTool::WebSearch => "web_search",
            BuiltinTool::Calculator => "calculator",
            BuiltinTool::RagSearch => "rag_search",
            BuiltinTool::CodingAgent => "coding_agent_tool",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name.trim())
    }

    /// 工具描述（供规划器理解功能与参数）
    pub fn description(self) -> &'static str {
        match self {
            BuiltinTool::WebSearch => "Search the web for general information, current events, or real-world people and places. Args: {\"query\": \"...\", \"max_results\": 3}",
            BuiltinTool::Calculator => "Evaluate arithmetic expressions. Args: {\"expression\": \"2+2*3\"}",
            BuiltinTool::RagSearch => "Answer questions about facts or entities found in uploaded documents. Args: {\"query\": \"a real question\", \"source_file\": \"optional file name\"}",
            BuiltinTool::CodingAgent => "Delegate a coding task to a sub-agent that can write files, read files and run shell commands in a sandbox. Args: {\"user_input\": \"the coding task\"}",
        }
    }
}

/// 查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(BuiltinTool),
    NotFound,
}

/// 强类型的工具调用
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    WebSearch {
        query: String,
        max_results: usize,
    },
    Calculator {
        expression: String,
    },
    RagSearch {
        query: String,
        source_file: Option<String>,
    },
    CodingAgent {
        user_input: String,
    },
}

fn arg_string(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn arg_usize(args: &Map<String, Value>, key: &str) -> Option<usize> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ToolCall {
    /// 由工具与原始参数构造；缺失的字符串参数视为空串
    pub fn from_args(tool: BuiltinTool, args: &Map<String, Value>, default_max_results: usize) -> Self {
        match tool {
            BuiltinTool::WebSearch => ToolCall::WebSearch {
                query: arg_string(args, "query").unwrap_or_default(),
                max_results: arg_usize(args, "max_results")
                    .unwrap_or(default_max_results)
                    .clamp(1, MAX_SEARCH_RESULTS),
            },
            BuiltinTool::Calculator => ToolCall::Calculator {
                expression: arg_string(args, "expression").unwrap_or_default(),
            },
            BuiltinTool::RagSearch => ToolCall::RagSearch {
                query: arg_string(args, "query").unwrap_or_default(),
                source_file: arg_string(args, "source_file").filter(|s| !s.trim().is_empty()),
            },
            BuiltinTool::CodingAgent => ToolCall::CodingAgent {
                user_input: arg_string(args, "user_input")
                    .or_else(|| arg_string(args, "task"))
                    .unwrap_or_default(),
            },
        }
    }

    pub fn tool(&self) -> BuiltinTool {
        match self {
            ToolCall::WebSearch { .. } => BuiltinTool::WebSearch,
            ToolCall::Calculator { .. } => BuiltinTool::Calculator,
            ToolCall::RagSearch { .. } => BuiltinTool::RagSearch,
            ToolCall::CodingAgent { .. } => BuiltinTool::CodingAgent,
        }
    }
}

/// 工具成功时的结构化结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Search { results: Vec<SearchHit> },
    Calculator(CalcReport),
    Passages { results: String },
    Coding { response: String },
}

/// 一个步骤的观测结果
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationResult {
    Output(ToolOutput),
    Error(String),
    NoTool,
}

impl ObservationResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ObservationResult::Error(_))
    }
}

impl Serialize for ObservationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ObservationResult::Output(out) => out.serialize(serializer),
            ObservationResult::Error(e) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", e)?;
                map.end()
            }
            ObservationResult::NoTool => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("note", "no_tool")?;
                map.end()
            }
        }
    }
}

/// 工具注册表：固定的内置工具集合及其后端
pub struct ToolRegistry {
    enabled: Vec<BuiltinTool>,
    search: Arc<dyn SearchProvider>,
    docs: Arc<dyn DocumentStore>,
    coding: Option<Arc<CodingAgent>>,
    search_max_results: usize,
    rag_k: usize,
}

impl ToolRegistry {
    pub fn new(search: Arc<dyn SearchProvider>, docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            enabled: BuiltinTool::ALL.to_vec(),
            search,
            docs,
            coding: None,
            search_max_results: 3,
            rag_k: 3,
        }
    }

    pub fn with_coding(mut self, agent: Arc<CodingAgent>) -> Self {
        self.coding = Some(agent);
        self
    }

    /// 仅启用给定名称的工具；未知名称忽略并告警
    pub fn with_enabled(mut self, names: &[String]) -> Self {
        self.enabled = names
            .iter()
            .filter_map(|n| {
                let tool = BuiltinTool::from_name(n);
                if tool.is_none() {
                    tracing::warn!(tool = %n, "unknown tool in config, ignored");
                }
                tool
            })
            .collect();
        self
    }

    pub fn with_limits(mut self, search_max_results: usize, rag_k: usize) -> Self {
        self.search_max_results = search_max_results.max(1);
        self.rag_k = rag_k.max(1);
        self
    }

    fn available(&self, tool: BuiltinTool) -> bool {
        self.enabled.contains(&tool) && (tool != BuiltinTool::CodingAgent || self.coding.is_some())
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        match BuiltinTool::from_name(name) {
            Some(tool) if self.available(tool) => Lookup::Found(tool),
            _ => Lookup::NotFound,
        }
    }

    /// (name, description) 列表，用于规划器的工具目录
    pub fn describe(&self) -> Vec<(String, String)> {
        BuiltinTool::ALL
            .into_iter()
            .filter(|t| self.available(*t))
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.describe().into_iter().map(|(n, _)| n).collect()
    }

    /// 按名调用；未注册的工具返回 NoTool
    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> ObservationResult {
        match self.lookup(name) {
            Lookup::Found(tool) => {
                let call = ToolCall::from_args(tool, args, self.search_max_results);
                self.call(call).await
            }
            Lookup::NotFound => ObservationResult::NoTool,
        }
    }

    pub async fn call(&self, call: ToolCall) -> ObservationResult {
        match call {
            ToolCall::WebSearch { query, max_results } => {
                match self.search.search(&query, max_results).await {
                    Ok(results) => ObservationResult::Output(ToolOutput::Search { results }),
                    Err(e) => ObservationResult::Error(format!("search_failed: {}", e)),
                }
            }
            ToolCall::Calculator { expression } => {
                ObservationResult::Output(ToolOutput::Calculator(calculator::evaluate(&expression)))
            }
            ToolCall::RagSearch { query, source_file } => {
                match self.docs.query(&query, self.rag_k, source_file.as_deref()).await {
                    Ok(passages) if passages.is_empty() => ObservationResult::Output(ToolOutput::Passages {
                        results: NO_RELEVANT_INFO.to_string(),
                    }),
                    Ok(passages) => ObservationResult::Output(ToolOutput::Passages {
                        results: passages.join("\n---\n"),
                    }),
                    Err(e) => ObservationResult::Error(format!("rag_search_failed: {}", e)),
                }
            }
            ToolCall::CodingAgent { user_input } => match &self.coding {
                Some(agent) => match agent.run(&user_input).await {
                    Ok(response) => ObservationResult::Output(ToolOutput::Coding { response }),
                    Err(e) => ObservationResult::Error(format!("coding_agent_failed: {}", e)),
                },
                None => ObservationResult::NoTool,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LocalDocumentStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingSearch;

    #[async_trait]
    impl SearchProvider for FailingSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>, String> {
            Err("network down".to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let docs = LocalDocumentStore::default();
        docs.ingest_text("poem.txt", "The poem is called Ozymandias.").unwrap();
        ToolRegistry::new(Arc::new(FailingSearch), Arc::new(docs))
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_describe_skips_coding_without_agent() {
        let names = registry().tool_names();
        assert_eq!(names, vec!["web_search", "calculator", "rag_search"]);
        assert_eq!(registry().lookup("coding_agent_tool"), Lookup::NotFound);
        assert_eq!(registry().lookup("calculator"), Lookup::Found(BuiltinTool::Calculator));
    }

    #[test]
    fn test_enabled_filter() {
        let reg = registry().with_enabled(&["calculator".to_string(), "bogus".to_string()]);
        assert_eq!(reg.tool_names(), vec!["calculator"]);
        assert_eq!(reg.lookup("web_search"), Lookup::NotFound);
    }

    #[test]
    fn test_typed_args_are_lenient() {
        let call = ToolCall::from_args(
            BuiltinTool::WebSearch,
            &args(json!({"query": "rust", "max_results": "50"})),
            3,
        );
        assert_eq!(
            call,
            ToolCall::WebSearch {
                query: "rust".to_string(),
                max_results: MAX_SEARCH_RESULTS
            }
        );
    }

    #[tokio::test]
    async fn test_invoke_fails_closed() {
        let reg = registry();
        let unknown = reg.invoke("python_repl", &Map::new()).await;
        assert_eq!(serde_json::to_value(&unknown).unwrap(), json!({"note": "no_tool"}));

        let failed = reg.invoke("web_search", &args(json!({"query": "x"}))).await;
        assert!(failed.is_error());
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"error": "search_failed: network down"})
        );
    }

    #[tokio::test]
    async fn test_calculator_and_rag() {
        let reg = registry();
        let calc = reg.invoke("calculator", &args(json!({"expression": "2+2*3"}))).await;
        assert_eq!(serde_json::to_value(&calc).unwrap(), json!({"ok": true, "result": 8}));

        let hit = reg
            .invoke("rag_search", &args(json!({"query": "poem name", "source_file": "poem.txt"})))
            .await;
        assert_eq!(
            serde_json::to_value(&hit).unwrap(),
            json!({"results": "The poem is called Ozymandias."})
        );

        let miss = reg.invoke("rag_search", &args(json!({"query": "weather"}))).await;
        assert_eq!(
            serde_json::to_value(&miss).unwrap(),
            json!({"results": NO_RELEVANT_INFO})
        );
    }
}
