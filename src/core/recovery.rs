//! 步骤级恢复策略
//!
//! OutcomeJudge 根据 Worker 返回的文本判断一次尝试是否成功（哨兵文本、失败状态行或以失败措辞开头即失败）；
//! RetryPolicy 把判定映射为 StepDecision：前进、重试（附带续做说明）或放弃。

use crate::react::{events::preview, NO_OUTPUT_SENTINEL};

/// 失败原因中引用 Worker 报告的最大字符数
const REASON_PREVIEW_CHARS: usize = 160;

/// 委派指令要求 Worker 失败时以此开头作答
pub const FAILURE_STATUS: &str = "TASK FAILED:";

/// 报告中任意一行以这些片段开头（小写比较）即为显式失败
const FAILURE_STATUS_LINES: &[&str] = &["task failed", "status: failed"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure(String),
}

/// 依据文本判定一次委派是否完成
#[derive(Debug, Clone)]
pub struct OutcomeJudge {
    markers: Vec<String>,
}

impl OutcomeJudge {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// 失败判定只看报告的开头与显式状态行；正文中顺带提到的跳过、找不到等措辞不算失败
    pub fn judge(&self, text: &str) -> Verdict {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Verdict::Failure("worker returned no output".to_string());
        }
        if trimmed == NO_OUTPUT_SENTINEL {
            return Verdict::Failure("worker ran out of iterations before finishing".to_string());
        }
        if let Some(line) = trimmed.lines().map(str::trim_start).find(|l| {
            let l = l.to_lowercase();
            FAILURE_STATUS_LINES.iter().any(|p| l.starts_with(*p))
        }) {
            return Verdict::Failure(format!(
                "worker reported failure: {}",
                preview(line.trim(), REASON_PREVIEW_CHARS)
            ));
        }
        let lower = trimmed.to_lowercase();
        let opening = lower.trim_start_matches(|c: char| !c.is_alphanumeric());
        match self.markers.iter().find(|m| opening.starts_with(m.as_str())) {
            Some(marker) => Verdict::Failure(format!(
                "worker reported failure ('{}'): {}",
                marker,
                preview(trimmed, REASON_PREVIEW_CHARS)
            )),
            None => Verdict::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDecision {
    Advance,
    Retry { next_attempt: usize },
    GiveUp { reason: String },
}

/// 每步最多委派 max_attempts 次（含首次），每次都是全新的 Worker 运行
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// attempt 为刚结束的尝试序号（从 1 开始）；earlier 为此前各次失败的原因，放弃时一并写入
    pub fn decide(&self, attempt: usize, verdict: &Verdict, earlier: &[String]) -> StepDecision {
        match verdict {
            Verdict::Success => StepDecision::Advance,
            Verdict::Failure(_) if attempt < self.max_attempts => StepDecision::Retry {
                next_attempt: attempt + 1,
            },
            Verdict::Failure(reason) if earlier.is_empty() => StepDecision::GiveUp {
                reason: format!("failed after {} attempt(s): {}", attempt, reason),
            },
            Verdict::Failure(reason) => {
                let history: Vec<String> = earlier
                    .iter()
                    .chain(std::iter::once(reason))
                    .enumerate()
                    .map(|(i, r)| format!("attempt {}: {}", i + 1, r))
                    .collect();
                StepDecision::GiveUp {
                    reason: format!("failed after {} attempt(s): {}", attempt, history.join("; ")),
                }
            }
        }
    }

    /// 重试说明：引用上次报告并要求从中断处继续
    pub fn retry_briefing(previous_report: &str) -> String {
        format!(
            "A previous attempt at this step stopped before finishing. Its report was:\n\
             \"\"\"\n{}\n\"\"\"\n\
             Continue from where it stopped. Check the workspace first (for example with list-directory) \
             and only do the work that is still missing; do not redo or duplicate finished work.",
            previous_report.trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerSection;

    fn judge() -> OutcomeJudge {
        OutcomeJudge::new(ControllerSection::default().failure_markers)
    }

    #[test]
    fn test_sentinel_and_failure_text_are_failures() {
        let j = judge();
        assert!(matches!(j.judge(NO_OUTPUT_SENTINEL), Verdict::Failure(_)));
        assert!(matches!(j.judge("  "), Verdict::Failure(_)));
        assert!(matches!(
            j.judge("I was UNABLE TO fetch the transcript."),
            Verdict::Failure(r) if r.contains("unable to")
        ));
        assert_eq!(j.judge("Saved transcript_1.txt and appended a row."), Verdict::Success);
    }

    #[test]
    fn test_success_report_mentioning_a_skip_is_success() {
        let j = judge();
        assert_eq!(
            j.judge(
                "Saved transcript_1.txt and transcript_2.txt and added both rows to dataset.csv. \
                 Skipped one video whose captions could not be found."
            ),
            Verdict::Success
        );
        assert_eq!(j.judge("Done. One download was incomplete and was skipped."), Verdict::Success);
    }

    #[test]
    fn test_explicit_status_line_is_failure() {
        let j = judge();
        assert!(matches!(
            j.judge("Searched twice.\nTASK FAILED: no tutorial had captions"),
            Verdict::Failure(r) if r.contains("no tutorial had captions")
        ));
        assert!(matches!(j.judge("**Could not** open urls.txt"), Verdict::Failure(_)));
    }

    #[test]
    fn test_custom_markers() {
        let j = OutcomeJudge::new(["NOPE", " "]);
        assert!(matches!(j.judge("nope, sorry"), Verdict::Failure(_)));
        assert_eq!(j.judge("could not care less"), Verdict::Success);
    }

    #[test]
    fn test_policy_counts_total_attempts() {
        let p = RetryPolicy::new(3);
        let fail = Verdict::Failure("x".to_string());
        assert_eq!(p.decide(1, &fail, &[]), StepDecision::Retry { next_attempt: 2 });
        assert_eq!(p.decide(2, &fail, &[]), StepDecision::Retry { next_attempt: 3 });
        assert!(matches!(p.decide(3, &fail, &[]), StepDecision::GiveUp { reason } if reason.contains("3 attempt")));
        assert_eq!(p.decide(3, &Verdict::Success, &[]), StepDecision::Advance);
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[test]
    fn test_give_up_reason_accumulates_attempts() {
        let p = RetryPolicy::new(2);
        let earlier = vec!["worker returned no output".to_string()];
        match p.decide(2, &Verdict::Failure("search was blocked".to_string()), &earlier) {
            StepDecision::GiveUp { reason } => assert_eq!(
                reason,
                "failed after 2 attempt(s): attempt 1: worker returned no output; attempt 2: search was blocked"
            ),
            other => panic!("expected GiveUp, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_briefing_quotes_previous_report() {
        let text = RetryPolicy::retry_briefing("Saved 3 of 5 transcripts.\n");
        assert!(text.contains("\"\"\"\nSaved 3 of 5 transcripts.\n\"\"\""));
        assert!(text.contains("Continue from where it stopped"));
    }
}
