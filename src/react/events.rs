//! 过程事件：规划、步骤、每轮思考、能力调用与观察（可序列化为 JSON 行）

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

pub type EventSender = UnboundedSender<AgentEvent>;

/// 事件中文本预览的最大字符数
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 计划已生成
    PlanReady { goal: String, steps: Vec<String> },
    /// 控制器开始某步骤的一次尝试
    StepStarted {
        step: usize,
        total: usize,
        attempt: usize,
        instruction: String,
    },
    /// 某步骤定案
    StepFinished {
        step: usize,
        status: String,
        attempts: usize,
    },
    /// 一次 ReAct 运行开始
    RunStarted {
        run_id: String,
        depth: usize,
        instruction: String,
    },
    /// 正在调用 Reasoner
    Thinking {
        run_id: String,
        iteration: usize,
        max_iterations: usize,
    },
    CapabilityCall {
        run_id: String,
        capability: String,
        input: String,
    },
    Observation {
        run_id: String,
        capability: String,
        preview: String,
        is_error: bool,
    },
    MalformedDecision { run_id: String, reason: String },
    /// 一次运行结束（finished / budget_exhausted）
    RunFinished {
        run_id: String,
        outcome: String,
        iterations: usize,
    },
    /// 依赖失败步骤，编排中止
    Halted {
        blocking_step: usize,
        blocked_step: usize,
        reason: String,
    },
    /// 计划走完；failed 为未被依赖、被越过的失败步骤数
    PlanCompleted { completed: usize, failed: usize },
}

pub fn send_event(tx: &Option<EventSender>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 截取前 max 个字符，超出时追加 ...
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = AgentEvent::Halted {
            blocking_step: 1,
            blocked_step: 3,
            reason: "no urls".to_string(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "halted");
        assert_eq!(json["blocking_step"], 1);
    }

    #[test]
    fn test_send_event_without_channel_is_noop() {
        send_event(&None, AgentEvent::PlanCompleted { completed: 1, failed: 0 });
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        send_event(&Some(tx), AgentEvent::PlanCompleted { completed: 2, failed: 1 });
        assert!(matches!(rx.try_recv(), Ok(AgentEvent::PlanCompleted { completed: 2, .. })));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }
}
