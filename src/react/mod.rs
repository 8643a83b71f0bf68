//! 认知层：ReAct 输出解析、Scratchpad、提示模板、主循环、过程事件与 Planner

pub mod decision;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompt;
pub mod scratchpad;

pub use decision::{parse_decision, Decision};
pub use events::{AgentEvent, EventSender};
pub use loop_::{ReactAgent, RunOutcome, RunReport, NO_OUTPUT_SENTINEL};
pub use planner::{parse_plan, Plan, Planner, Step};
pub use prompt::ReactTemplate;
pub use scratchpad::{Scratchpad, ScratchpadEntry};
