pub mod calculator;
pub mod coding;
pub mod executor;
pub mod registry;
pub mod sandbox;
pub mod web_search;

pub use calculator::CalcReport;
pub use coding::CodingAgent;
pub use executor::ToolExecutor;
pub use registry::{BuiltinTool, Lookup, ObservationResult, ToolCall, ToolOutput, ToolRegistry};
pub use sandbox::{Sandbox, SandboxResult};
pub use web_search::{DuckDuckGoHtml, SearchHit, SearchProvider};
