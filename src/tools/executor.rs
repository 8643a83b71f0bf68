//! 能力执行器
//!
//! 持有 CapabilityRegistry 与全局超时，invoke(name, raw_input) 在超时内调用能力，
//! 并捕获 panic；任何内部错误都转为 CapabilityResult 文本，绝不向外抛出。每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::time::timeout;

use crate::core::CapabilityError;
use crate::tools::{CapabilityRegistry, CapabilityResult, InvocationContext};

/// 审计日志中输入预览的最大字符数
const INPUT_PREVIEW_CHARS: usize = 200;

/// 能力执行器：对每次调用施加超时与 panic 隔离，结果统一为 CapabilityResult
pub struct CapabilityExecutor {
    registry: CapabilityRegistry,
    timeout: Duration,
}

impl CapabilityExecutor {
    pub fn new(registry: CapabilityRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// 执行指定能力；未知名称、超时、panic、能力返回的错误都转为失败文本
    pub async fn invoke(&self, name: &str, raw_input: &str, ctx: &InvocationContext) -> CapabilityResult {
        let Some(capability) = self.registry.get(name) else {
            return Err(CapabilityError::Unknown {
                name: name.to_string(),
                available: self.names().join(", "),
            })
            .into();
        };

        let start = Instant::now();
        let guarded = AssertUnwindSafe(capability.invoke(raw_input, ctx)).catch_unwind();
        let result = if capability.timeout_exempt() {
            Ok(guarded.await)
        } else {
            timeout(self.timeout, guarded).await
        };

        let (outcome, result): (&str, Result<String, CapabilityError>) = match result {
            Ok(Ok(Ok(text))) => ("ok", Ok(text)),
            Ok(Ok(Err(e))) => ("error", Err(e)),
            Ok(Err(_)) => ("panic", Err(CapabilityError::Panicked(name.to_string()))),
            Err(_) => ("timeout", Err(CapabilityError::Timeout(name.to_string()))),
        };

        let audit = serde_json::json!({
            "event": "capability_audit",
            "capability": name,
            "depth": ctx.depth,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "input_preview": input_preview(raw_input),
        });
        tracing::info!(audit = %audit, "capability");

        result.into()
    }
}

fn input_preview(raw: &str) -> String {
    if raw.chars().count() > INPUT_PREVIEW_CHARS {
        format!("{}...", raw.chars().take(INPUT_PREVIEW_CHARS).collect::<String>())
    } else {
        raw.to_string()
    }
}
