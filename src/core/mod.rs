//! 核心编排层：错误类型、恢复策略、产物台账、编排状态、控制器与构建器

pub mod builder;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod recovery;
pub mod state;

pub use builder::{create_builder, HarvestBuilder, Harvester};
pub use controller::{Controller, StepExecutor};
pub use error::{AgentError, CapabilityError, PlanError};
pub use ledger::ArtifactLedger;
pub use recovery::{OutcomeJudge, RetryPolicy, StepDecision, Verdict};
pub use state::{OrchestrationOutcome, OrchestrationReport, StepReport, StepStatus};
