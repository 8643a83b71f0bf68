//! 错误类型
//!
//! - AgentError：终止一次运行或一次顶层调用的错误（Reasoner 失败、委派深度、规划失败等）
//! - PlanError：规划阶段错误，解析失败时不接受部分计划
//! - CapabilityError：能力内部错误，只在执行器内部流转，最终转为 CapabilityResult 的文本

use thiserror::Error;

/// Agent 运行过程中不可在循环内恢复的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Reasoner error: {0}")]
    Reasoner(String),

    #[error("Delegation depth limit reached ({depth} > {limit})")]
    DelegationDepthExceeded { depth: usize, limit: usize },

    /// Worker 的能力集已被释放（构建器生命周期结束后仍调用 delegate）
    #[error("Worker capabilities are no longer available")]
    WorkerUnavailable,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Config error: {0}")]
    Config(String),
}

/// 规划错误：与执行期错误区分，出现时不执行任何步骤
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Plan parse error: {reason}")]
    Parse { reason: String, raw: String },

    #[error("Planner reasoner error: {0}")]
    Reasoner(String),
}

/// 能力内部错误；Display 文本即为回灌给 Agent 的 Observation
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Invalid input for {capability}: {detail}")]
    InvalidInput { capability: String, detail: String },

    #[error("Search failed for query '{query}': {detail}")]
    Search { query: String, detail: String },

    #[error("Error fetching transcript from '{source_ref}': {detail}")]
    Transcript { source_ref: String, detail: String },

    #[error("Error accessing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path escape attempt: '{0}' is outside the workspace")]
    PathEscape(String),

    #[error("Capability {0} timed out")]
    Timeout(String),

    #[error("Capability {0} crashed while running")]
    Panicked(String),

    #[error("Unknown capability '{name}'. Available capabilities: {available}")]
    Unknown { name: String, available: String },

    #[error("Delegation failed: {0}")]
    Delegation(String),
}

impl CapabilityError {
    pub fn invalid_input(capability: &str, detail: impl Into<String>) -> Self {
        Self::InvalidInput {
            capability: capability.to_string(),
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
