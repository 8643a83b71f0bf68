//! 编排状态与报告
//!
//! StepStatus：Pending -> InProgress -> {Completed | Failed}，被已失败步骤阻塞的步骤为 Skipped；
//! OrchestrationReport 是顶层调用方拿到的唯一结果：计划走完，或在某步骤被阻塞时中止。

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed(String),
    Skipped(String),
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// 单个步骤的执行记录
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub ordinal: usize,
    pub instruction: String,
    pub status: StepStatus,
    /// 实际委派次数（含首次）
    pub attempts: usize,
    /// 最后一次尝试返回的文本
    pub output: Option<String>,
    /// 每次失败尝试的原因，按尝试顺序
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl StepReport {
    pub fn pending(ordinal: usize, instruction: &str) -> Self {
        Self {
            ordinal,
            instruction: instruction.to_string(),
            status: StepStatus::Pending,
            attempts: 0,
            output: None,
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    PlanCompleted,
    /// blocked_step 依赖已失败的 blocking_step
    Halted {
        blocking_step: usize,
        blocked_step: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationReport {
    pub goal: String,
    pub outcome: OrchestrationOutcome,
    pub steps: Vec<StepReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OrchestrationReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == OrchestrationOutcome::PlanCompleted
    }

    pub fn count(&self, label: &str) -> usize {
        self.steps.iter().filter(|s| s.status.label() == label).count()
    }

    /// 人类可读摘要：每步一行，末尾为总体结论
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .steps
            .iter()
            .map(|s| {
                let detail = match &s.status {
                    StepStatus::Failed(r) | StepStatus::Skipped(r) => format!(" ({})", r),
                    _ => String::new(),
                };
                format!(
                    "[{}] step {} after {} attempt(s){}: {}",
                    s.status.label(),
                    s.ordinal,
                    s.attempts,
                    detail,
                    s.instruction
                )
            })
            .collect();
        lines.push(match &self.outcome {
            OrchestrationOutcome::PlanCompleted => format!(
                "Plan completed: {} completed, {} failed ({}s)",
                self.count("completed"),
                self.count("failed"),
                (self.finished_at - self.started_at).num_seconds()
            ),
            OrchestrationOutcome::Halted {
                blocking_step,
                blocked_step,
                reason,
            } => format!(
                "Halted before step {}: it depends on step {}, which failed: {}",
                blocked_step, blocking_step, reason
            ),
        });
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: OrchestrationOutcome, statuses: Vec<StepStatus>) -> OrchestrationReport {
        let now = Utc::now();
        OrchestrationReport {
            goal: "g".to_string(),
            outcome,
            steps: statuses
                .into_iter()
                .enumerate()
                .map(|(i, status)| StepReport {
                    status,
                    attempts: 1,
                    ..StepReport::pending(i + 1, "do it")
                })
                .collect(),
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(StepStatus::Failed("timeout".to_string())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timeout");
        assert_eq!(StepStatus::InProgress.label(), "in_progress");
    }

    #[test]
    fn test_summary_for_halt() {
        let r = report(
            OrchestrationOutcome::Halted {
                blocking_step: 1,
                blocked_step: 3,
                reason: "no urls".to_string(),
            },
            vec![
                StepStatus::Failed("no urls".to_string()),
                StepStatus::Completed,
                StepStatus::Skipped("depends on failed step 1".to_string()),
            ],
        );
        assert!(!r.is_completed());
        let text = r.summary();
        assert!(text.contains("[failed] step 1"));
        assert!(text.ends_with("Halted before step 3: it depends on step 1, which failed: no urls"));
    }

    #[test]
    fn test_counts() {
        let r = report(
            OrchestrationOutcome::PlanCompleted,
            vec![StepStatus::Completed, StepStatus::Failed("x".to_string())],
        );
        assert!(r.is_completed());
        assert_eq!(r.count("completed"), 1);
        assert_eq!(r.count("failed"), 1);
        assert_eq!(r.steps[1].status.label(), "failed");
        assert!(r.summary().ends_with("1 completed, 1 failed (0s)"));
    }
}
