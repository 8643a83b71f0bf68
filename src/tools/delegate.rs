//! 委派桥：把"启动一个全新 Worker 运行"暴露为能力 delegate
//!
//! DelegationBridge 只持有 Weak<CapabilityExecutor>：Worker 能力集里本身含有 delegate，
//! 用 Arc::new_cyclic 构建时靠 Weak 打断引用环。每次委派都是全新的 ReactAgent 运行（空 Scratchpad），
//! 同步执行到结束，不重试；层级超过 max_delegation_depth 时直接拒绝。

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::core::{AgentError, CapabilityError, StepExecutor};
use crate::llm::Reasoner;
use crate::react::{EventSender, ReactAgent, ReactTemplate};
use crate::tools::schema::clean_text_input;
use crate::tools::{Capability, CapabilityExecutor, InputShape, InvocationContext};

/// 控制器发起的 Worker 运行所在层级
pub const TOP_LEVEL_DEPTH: usize = 1;

#[derive(Clone)]
pub struct DelegationBridge {
    reasoner: Arc<dyn Reasoner>,
    executor: Weak<CapabilityExecutor>,
    template: Arc<ReactTemplate>,
    max_iterations: usize,
    max_depth: usize,
    events: Option<EventSender>,
}

impl DelegationBridge {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        executor: Weak<CapabilityExecutor>,
        template: Arc<ReactTemplate>,
        max_iterations: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            reasoner,
            executor,
            template,
            max_iterations,
            max_depth,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Option<EventSender>) -> Self {
        self.events = tx;
        self
    }

    /// 在 depth 层启动一次全新运行，返回其最终文本（预算耗尽时为哨兵文本）
    pub async fn delegate(&self, instruction: &str, depth: usize) -> Result<String, AgentError> {
        if depth > self.max_depth {
            tracing::warn!(depth, limit = self.max_depth, "delegation refused");
            return Err(AgentError::DelegationDepthExceeded {
                depth,
                limit: self.max_depth,
            });
        }
        let executor = self.executor.upgrade().ok_or(AgentError::WorkerUnavailable)?;

        tracing::info!(depth, "delegating to worker");
        let agent = ReactAgent::new(
            self.reasoner.clone(),
            executor,
            self.template.clone(),
            self.max_iterations,
        )
        .with_events(self.events.clone());
        let report = agent.run(instruction, depth).await?;
        Ok(report.final_text().to_string())
    }
}

#[async_trait]
impl StepExecutor for DelegationBridge {
    async fn execute(&self, instruction: &str) -> Result<String, AgentError> {
        self.delegate(instruction, TOP_LEVEL_DEPTH).await
    }
}

/// delegate：把完整指令交给一个没有记忆的 Worker，返回其最终答复
pub struct DelegateCapability {
    bridge: DelegationBridge,
}

impl DelegateCapability {
    pub fn new(bridge: DelegationBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Capability for DelegateCapability {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Delegates a sub-task to a worker agent and returns the worker's result. \
         The worker has no memory, so the instruction must contain everything it needs."
    }

    fn input_shape(&self) -> InputShape {
        InputShape::FreeText {
            hint: "the complete instruction for the worker",
        }
    }

    fn timeout_exempt(&self) -> bool {
        true
    }

    async fn invoke(&self, raw_input: &str, ctx: &InvocationContext) -> Result<String, CapabilityError> {
        let instruction = clean_text_input(raw_input);
        if instruction.is_empty() {
            return Err(CapabilityError::invalid_input(self.name(), "instruction must not be empty"));
        }
        self.bridge
            .delegate(instruction, ctx.depth + 1)
            .await
            .map_err(|e| CapabilityError::Delegation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedReasoner;
    use crate::react::NO_OUTPUT_SENTINEL;
    use crate::tools::CapabilityRegistry;

    fn build(reasoner: Arc<ScriptedReasoner>, max_iterations: usize, max_depth: usize) -> (Arc<CapabilityExecutor>, DelegationBridge) {
        let template = Arc::new(ReactTemplate::default());
        let executor = Arc::new_cyclic(|weak: &Weak<CapabilityExecutor>| {
            let mut registry = CapabilityRegistry::new();
            registry.register(DelegateCapability::new(DelegationBridge::new(
                reasoner.clone(),
                weak.clone(),
                template.clone(),
                max_iterations,
                max_depth,
            )));
            CapabilityExecutor::new(registry, 5)
        });
        let bridge = DelegationBridge::new(reasoner, Arc::downgrade(&executor), template, max_iterations, max_depth);
        (executor, bridge)
    }

    #[tokio::test]
    async fn test_delegations_share_no_scratchpad() {
        let reasoner = Arc::new(ScriptedReasoner::new([
            "Thought: first\nAction: nothing-here\nAction Input: SECRET-ONE",
            "Final Answer: one",
            "Final Answer: two",
        ]));
        let (_executor, bridge) = build(reasoner.clone(), 5, 2);

        assert_eq!(bridge.execute("first task").await.unwrap(), "one");
        assert_eq!(bridge.execute("second task").await.unwrap(), "two");

        let contexts = reasoner.contexts();
        assert_eq!(contexts.len(), 3);
        assert!(contexts[1].contains("SECRET-ONE"));
        assert!(!contexts[2].contains("SECRET-ONE"));
        assert!(!contexts[2].contains("first task"));
    }

    #[tokio::test]
    async fn test_depth_guard_refuses_without_calling_reasoner() {
        let reasoner = Arc::new(ScriptedReasoner::repeating("Final Answer: should not run"));
        let (_executor, bridge) = build(reasoner.clone(), 3, 2);

        let err = bridge.delegate("too deep", 3).await.unwrap_err();
        assert!(matches!(err, AgentError::DelegationDepthExceeded { depth: 3, limit: 2 }));
        assert_eq!(reasoner.calls(), 0);
    }

    #[tokio::test]
    async fn test_recursive_delegate_stops_at_limit() {
        // 每一层都试图再委派；第 2 层的 delegate 被拒绝，错误作为观察返回
        let reasoner = Arc::new(ScriptedReasoner::new([
            "Action: delegate\nAction Input: go deeper",
            "Action: delegate\nAction Input: go deeper still",
            "Final Answer: inner done",
            "Final Answer: outer done",
        ]));
        let (_executor, bridge) = build(reasoner.clone(), 5, 2);

        assert_eq!(bridge.execute("start").await.unwrap(), "outer done");
        let contexts = reasoner.contexts();
        assert_eq!(contexts.len(), 4);
        assert!(contexts[2].contains("Delegation depth limit reached (3 > 2)"));
        assert!(contexts[3].contains("Observation: inner done"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_sentinel() {
        let reasoner = Arc::new(ScriptedReasoner::repeating("Action: missing\nAction Input: x"));
        let (_executor, bridge) = build(reasoner.clone(), 3, 2);
        assert_eq!(bridge.execute("never ends").await.unwrap(), NO_OUTPUT_SENTINEL);
        assert_eq!(reasoner.calls(), 3);
    }

    #[tokio::test]
    async fn test_dropped_executor_is_reported() {
        let reasoner = Arc::new(ScriptedReasoner::repeating("Final Answer: x"));
        let (executor, bridge) = build(reasoner, 3, 2);
        drop(executor);
        assert!(matches!(bridge.execute("task").await, Err(AgentError::WorkerUnavailable)));
    }

    #[tokio::test]
    async fn test_empty_instruction_is_invalid_input() {
        let reasoner = Arc::new(ScriptedReasoner::repeating("Final Answer: x"));
        let (executor, _bridge) = build(reasoner, 3, 2);
        let result = executor.invoke("delegate", "   ", &InvocationContext { depth: 1 }).await;
        assert!(result.is_error);
        assert!(result.text.contains("delegate"));
    }
}
