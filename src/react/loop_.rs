//! ReAct 主循环
//!
//! Thought -> Action -> Observation，直到 Reasoner 给出 Final Answer 或用完 max_iterations。
//! 每次 run 都新建 Scratchpad；能力错误、未知能力、格式错误都只变成 Observation，
//! 只有 Reasoner 本身失败才会以 AgentError 结束运行。

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::core::AgentError;
use crate::llm::Reasoner;
use crate::react::events::{preview, send_event, AgentEvent, EventSender, PREVIEW_CHARS};
use crate::react::{parse_decision, Decision, ReactTemplate, Scratchpad, ScratchpadEntry};
use crate::tools::{CapabilityExecutor, InvocationContext};

/// 用完迭代预算仍未给出最终答复时返回的文本
pub const NO_OUTPUT_SENTINEL: &str = "Worker agent finished without specific output.";

/// 一次运行的终态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum RunOutcome {
    Finished(String),
    BudgetExhausted,
}

/// 一次运行的结果：终态、实际调用 Reasoner 的次数与完整 Scratchpad
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub depth: usize,
    pub outcome: RunOutcome,
    pub iterations: usize,
    pub scratchpad: Vec<ScratchpadEntry>,
}

impl RunReport {
    /// 最终答复；预算耗尽时为 NO_OUTPUT_SENTINEL
    pub fn final_text(&self) -> &str {
        match &self.outcome {
            RunOutcome::Finished(text) => text,
            RunOutcome::BudgetExhausted => NO_OUTPUT_SENTINEL,
        }
    }
}

/// 一个 Agent 实例：Reasoner + 能力集 + 模板 + 迭代预算；自身不保存任何运行间状态
pub struct ReactAgent {
    reasoner: Arc<dyn Reasoner>,
    executor: Arc<CapabilityExecutor>,
    template: Arc<ReactTemplate>,
    max_iterations: usize,
    events: Option<EventSender>,
}

impl ReactAgent {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        executor: Arc<CapabilityExecutor>,
        template: Arc<ReactTemplate>,
        max_iterations: usize,
    ) -> Self {
        Self {
            reasoner,
            executor,
            template,
            max_iterations,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Option<EventSender>) -> Self {
        self.events = tx;
        self
    }

    /// 执行一次完整运行；depth 为本次运行所处的委派层级
    pub async fn run(&self, instruction: &str, depth: usize) -> Result<RunReport, AgentError> {
        let run_id = Uuid::new_v4();
        let rid = run_id.to_string();
        let mut scratchpad = Scratchpad::new();

        tracing::info!(run_id = %run_id, depth, max_iterations = self.max_iterations, "run started");
        send_event(
            &self.events,
            AgentEvent::RunStarted {
                run_id: rid.clone(),
                depth,
                instruction: preview(instruction, PREVIEW_CHARS),
            },
        );

        for iteration in 1..=self.max_iterations {
            send_event(
                &self.events,
                AgentEvent::Thinking {
                    run_id: rid.clone(),
                    iteration,
                    max_iterations: self.max_iterations,
                },
            );

            let context = self
                .template
                .render(self.executor.registry(), instruction, &scratchpad.render());
            let output = self.reasoner.complete(&context).await.map_err(|e| {
                tracing::error!(run_id = %run_id, iteration, error = %e, "reasoner failed");
                AgentError::Reasoner(e)
            })?;

            match parse_decision(&output) {
                Decision::Finish { text, .. } => {
                    tracing::info!(run_id = %run_id, depth, iterations = iteration, "run finished");
                    return Ok(self.finish(run_id, depth, RunOutcome::Finished(text), iteration, scratchpad));
                }
                Decision::Act {
                    thought,
                    capability,
                    raw_input,
                } => {
                    tracing::debug!(run_id = %run_id, iteration, capability = %capability, "act");
                    send_event(
                        &self.events,
                        AgentEvent::CapabilityCall {
                            run_id: rid.clone(),
                            capability: capability.clone(),
                            input: preview(&raw_input, PREVIEW_CHARS),
                        },
                    );

                    let (observation, is_error) = if self.executor.contains(&capability) {
                        let result = self
                            .executor
                            .invoke(&capability, &raw_input, &InvocationContext { depth })
                            .await;
                        (result.text, result.is_error)
                    } else {
                        tracing::warn!(run_id = %run_id, capability = %capability, "unknown capability requested");
                        (
                            format!(
                                "{} is not a valid tool, try one of [{}].",
                                capability,
                                self.executor.names().join(", ")
                            ),
                            true,
                        )
                    };

                    send_event(
                        &self.events,
                        AgentEvent::Observation {
                            run_id: rid.clone(),
                            capability: capability.clone(),
                            preview: preview(&observation, PREVIEW_CHARS),
                            is_error,
                        },
                    );
                    scratchpad.push(ScratchpadEntry {
                        thought,
                        action: capability,
                        action_input: raw_input,
                        observation,
                    });
                }
                Decision::Malformed { raw, reason } => {
                    tracing::debug!(run_id = %run_id, iteration, reason = %reason, "malformed decision");
                    send_event(
                        &self.events,
                        AgentEvent::MalformedDecision {
                            run_id: rid.clone(),
                            reason: reason.clone(),
                        },
                    );
                    scratchpad.push(ScratchpadEntry {
                        thought: raw,
                        action: String::new(),
                        action_input: String::new(),
                        observation: format!(
                            "Invalid Format: {}. Reply with 'Action:' followed by 'Action Input:', or with 'Final Answer:'.",
                            reason
                        ),
                    });
                }
            }
        }

        tracing::warn!(run_id = %run_id, depth, max_iterations = self.max_iterations, "iteration budget exhausted");
        Ok(self.finish(run_id, depth, RunOutcome::BudgetExhausted, self.max_iterations, scratchpad))
    }

    fn finish(
        &self,
        run_id: Uuid,
        depth: usize,
        outcome: RunOutcome,
        iterations: usize,
        scratchpad: Scratchpad,
    ) -> RunReport {
        let (prompt_tokens, completion_tokens, total_tokens) = self.reasoner.token_usage();
        tracing::debug!(run_id = %run_id, prompt_tokens, completion_tokens, total_tokens, "token usage");
        send_event(
            &self.events,
            AgentEvent::RunFinished {
                run_id: run_id.to_string(),
                outcome: match outcome {
                    RunOutcome::Finished(_) => "finished".to_string(),
                    RunOutcome::BudgetExhausted => "budget_exhausted".to_string(),
                },
                iterations,
            },
        );
        RunReport {
            run_id,
            depth,
            outcome,
            iterations,
            scratchpad: scratchpad.into_entries(),
        }
    }
}
