//! Mock / 脚本化 Reasoner（用于测试与无 API Key 的本地运行）
//!
//! - MockReasoner：无模型时的占位实现，规划请求返回固定两步计划，ReAct 请求直接给出失败说明
//! - ScriptedReasoner：按顺序返回预设回复，并记录每次收到的上下文，便于断言

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::Reasoner;

/// 无模型占位：不做任何实际工作，如实说明无法完成
#[derive(Debug, Default)]
pub struct MockReasoner;

#[async_trait]
impl Reasoner for MockReasoner {
    async fn complete(&self, context: &str) -> Result<String, String> {
        if context.trim_end().ends_with("Plan:") {
            return Ok("1. Describe the goal in one sentence.\n2. Report that no model is configured.".to_string());
        }
        Ok("Thought: No language model is configured.\n\
            Final Answer: Unable to act on this instruction because the mock reasoner is in use."
            .to_string())
    }
}

/// 脚本化 Reasoner：依次弹出预设回复；脚本耗尽后返回 fallback（若有），否则报错
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    responses: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// 永远返回同一段文本（如永不 Final Answer 的动作）
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            fallback: Some(response.into()),
            ..Self::default()
        }
    }

    /// 至今收到的全部上下文（按调用顺序）
    pub fn contexts(&self) -> Vec<String> {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn complete(&self, context: &str) -> Result<String, String> {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(context.to_string());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or_else(|| "scripted reasoner has no more responses".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_pops_in_order_then_fails() {
        let r = ScriptedReasoner::new(["a", "b"]);
        assert_eq!(r.complete("1").await.unwrap(), "a");
        assert_eq!(r.complete("2").await.unwrap(), "b");
        assert!(r.complete("3").await.is_err());
        assert_eq!(r.contexts(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_repeating_never_runs_out() {
        let r = ScriptedReasoner::repeating("x");
        for _ in 0..5 {
            assert_eq!(r.complete("ctx").await.unwrap(), "x");
        }
        assert_eq!(r.calls(), 5);
    }

    #[tokio::test]
    async fn test_mock_answers_plan_requests_with_numbered_list() {
        let out = MockReasoner.complete("Goal: x\nPlan:").await.unwrap();
        assert!(out.starts_with("1. "));
    }
}
