//! 编排控制器（Manager 层）
//!
//! 顺序遍历计划：每步合成一条自包含的委派指令交给 StepExecutor，按 OutcomeJudge 判定结果，
//! 失败则在 RetryPolicy 允许的次数内重新委派（附带续做说明），次数用尽记为 Failed。
//! 步骤开始前检查它是否依赖已失败的步骤：不依赖则照常执行，依赖则该步记为 Skipped 并中止整个编排。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::ControllerSection;
use crate::core::ledger::ArtifactLedger;
use crate::core::recovery::{OutcomeJudge, RetryPolicy, StepDecision, Verdict, FAILURE_STATUS};
use crate::core::state::{OrchestrationOutcome, OrchestrationReport, StepReport, StepStatus};
use crate::core::AgentError;
use crate::react::events::{preview, send_event, AgentEvent, EventSender, PREVIEW_CHARS};
use crate::react::{Plan, Step};

/// 执行一条步骤指令：实现方为委派桥，测试中为桩
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, instruction: &str) -> Result<String, AgentError>;
}

pub struct Controller {
    executor: Arc<dyn StepExecutor>,
    policy: RetryPolicy,
    judge: OutcomeJudge,
    ledger: ArtifactLedger,
    carry_output_chars: usize,
    events: Option<EventSender>,
}

impl Controller {
    pub fn new(executor: Arc<dyn StepExecutor>, cfg: &ControllerSection, ledger: ArtifactLedger) -> Self {
        Self {
            executor,
            policy: RetryPolicy::new(cfg.max_attempts),
            judge: OutcomeJudge::new(&cfg.failure_markers),
            ledger,
            carry_output_chars: cfg.carry_output_chars,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Option<EventSender>) -> Self {
        self.events = tx;
        self
    }

    /// 遍历整份计划，总是返回报告（完成或中止），不返回错误
    pub async fn walk(&self, plan: &Plan) -> OrchestrationReport {
        let started_at = Utc::now();
        let steps = plan.steps();
        let mut reports: Vec<StepReport> = steps
            .iter()
            .map(|s| StepReport::pending(s.ordinal, &s.instruction))
            .collect();
        let mut ledger = self.ledger.clone();

        for (idx, step) in steps.iter().enumerate() {
            if let Some((blocking_step, reason)) = blocking_failure(steps, &reports, idx) {
                tracing::warn!(step = step.ordinal, blocking_step, reason = %reason, "step blocked by failed dependency");
                reports[idx].status = StepStatus::Skipped(format!("depends on failed step {}", blocking_step));
                send_event(
                    &self.events,
                    AgentEvent::Halted {
                        blocking_step,
                        blocked_step: step.ordinal,
                        reason: reason.clone(),
                    },
                );
                return OrchestrationReport {
                    goal: plan.goal().to_string(),
                    outcome: OrchestrationOutcome::Halted {
                        blocking_step,
                        blocked_step: step.ordinal,
                        reason,
                    },
                    steps: reports,
                    started_at,
                    finished_at: Utc::now(),
                };
            }

            reports[idx].status = StepStatus::InProgress;
            let mut attempt = 1;
            let mut previous: Option<String> = None;
            loop {
                ledger.refresh();
                let instruction = self.brief(plan, step, &reports, &ledger, previous.as_deref());
                tracing::info!(step = step.ordinal, attempt, "delegating step");
                send_event(
                    &self.events,
                    AgentEvent::StepStarted {
                        step: step.ordinal,
                        total: steps.len(),
                        attempt,
                        instruction: preview(&step.instruction, PREVIEW_CHARS),
                    },
                );

                let (verdict, output) = match self.executor.execute(&instruction).await {
                    Ok(text) => (self.judge.judge(&text), text),
                    Err(e) => {
                        tracing::error!(step = step.ordinal, attempt, error = %e, "delegation failed");
                        (Verdict::Failure(format!("delegation error: {}", e)), format!("Error: {}", e))
                    }
                };
                reports[idx].attempts = attempt;
                reports[idx].output = Some(output.clone());

                let decision = self.policy.decide(attempt, &verdict, &reports[idx].failures);
                if let Verdict::Failure(reason) = verdict {
                    reports[idx].failures.push(reason);
                }
                match decision {
                    StepDecision::Advance => {
                        reports[idx].status = StepStatus::Completed;
                        break;
                    }
                    StepDecision::Retry { next_attempt } => {
                        tracing::warn!(
                            step = step.ordinal,
                            attempt,
                            reason = %reports[idx].failures.last().map(String::as_str).unwrap_or_default(),
                            "attempt failed, retrying"
                        );
                        attempt = next_attempt;
                        previous = Some(output);
                    }
                    StepDecision::GiveUp { reason } => {
                        tracing::warn!(step = step.ordinal, attempts = attempt, reason = %reason, "step failed");
                        reports[idx].status = StepStatus::Failed(reason);
                        break;
                    }
                }
            }

            send_event(
                &self.events,
                AgentEvent::StepFinished {
                    step: step.ordinal,
                    status: reports[idx].status.label().to_string(),
                    attempts: reports[idx].attempts,
                },
            );
        }

        // 走完计划：剩下的 Failed 步骤都没有被后续步骤依赖
        let completed = reports.iter().filter(|r| r.status == StepStatus::Completed).count();
        let failed = reports.len() - completed;
        tracing::info!(completed, failed, "plan completed");
        send_event(&self.events, AgentEvent::PlanCompleted { completed, failed });

        OrchestrationReport {
            goal: plan.goal().to_string(),
            outcome: OrchestrationOutcome::PlanCompleted,
            steps: reports,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// 合成委派指令：步骤位置与总目标、无记忆提示、工作区约定、所依赖步骤的结果、重试说明
    fn brief(
        &self,
        plan: &Plan,
        step: &Step,
        reports: &[StepReport],
        ledger: &ArtifactLedger,
        previous: Option<&str>,
    ) -> String {
        let mut sections = vec![
            format!(
                "You are carrying out step {} of {} of a larger plan.\nOverall goal: {}",
                step.ordinal,
                plan.len(),
                plan.goal().trim()
            ),
            format!("Your task:\n{}", step.instruction),
            "You have no memory of earlier steps or earlier attempts. Everything you need to know is written here; \
             follow the conventions below exactly and do not invent your own file names or paths."
                .to_string(),
            format!("Workspace conventions:\n{}", ledger.conventions()),
        ];

        let carried: Vec<String> = plan
            .steps()
            .iter()
            .zip(reports)
            .filter(|(earlier, report)| report.status == StepStatus::Completed && step.depends_on(earlier))
            .filter_map(|(earlier, report)| {
                report.output.as_deref().map(|out| {
                    format!(
                        "Step {} ({}):\n{}",
                        earlier.ordinal,
                        earlier.instruction,
                        preview(out.trim(), self.carry_output_chars)
                    )
                })
            })
            .collect();
        if !carried.is_empty() {
            sections.push(format!(
                "Results of earlier steps this step builds on:\n{}",
                carried.join("\n\n")
            ));
        }

        if let Some(report) = previous {
            sections.push(RetryPolicy::retry_briefing(report));
        }

        sections.push(
            format!(
                "When you are done, give a Final Answer that states exactly what you did and which files you wrote. \
                 If you could not complete the task, start the Final Answer with '{}' followed by the reason.",
                FAILURE_STATUS
            ),
        );
        sections.join("\n\n")
    }
}

/// 第一个已失败且被 steps[idx] 依赖的更早步骤
fn blocking_failure(steps: &[Step], reports: &[StepReport], idx: usize) -> Option<(usize, String)> {
    steps[..idx]
        .iter()
        .zip(&reports[..idx])
        .find_map(|(earlier, report)| match &report.status {
            StepStatus::Failed(reason) if steps[idx].depends_on(earlier) => Some((earlier.ordinal, reason.clone())),
            _ => None,
        })
}
