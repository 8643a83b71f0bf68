//! 能力注册表
//!
//! 所有能力实现 Capability trait（name / description / input_shape / invoke），由 CapabilityRegistry
//! 在配置阶段按名注册；CapabilityExecutor 在调用时加超时、捕获 panic 并统一转为 CapabilityResult。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::CapabilityError;

/// 能力输入形态：自由文本，或带固定字段的 JSON 对象（附 JSON Schema）
#[derive(Debug, Clone)]
pub enum InputShape {
    FreeText { hint: &'static str },
    Json(Value),
}

impl InputShape {
    /// 供 prompt 使用的一行描述
    pub fn describe(&self) -> String {
        match self {
            InputShape::FreeText { hint } => format!("plain text ({hint})"),
            InputShape::Json(schema) => format!("a single JSON object matching {}", compact_schema(schema)),
        }
    }
}

/// 只保留 properties 的字段名与类型，避免把整份 schema 塞进 prompt
fn compact_schema(schema: &Value) -> String {
    let Some(props) = schema.get("properties").and_then(|p| p.as_object()) else {
        return schema.to_string();
    };
    let fields: Vec<String> = props
        .iter()
        .map(|(k, v)| {
            let ty = v.get("type").and_then(|t| t.as_str()).unwrap_or("any");
            format!("\"{k}\": {ty}")
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

/// 单次调用的上下文：调用方所在运行的委派深度（控制器发起的 Worker 运行为 1）
#[derive(Debug, Clone, Copy, Default)]
pub struct InvocationContext {
    pub depth: usize,
}

/// 能力调用结果：成功与失败都只有文本，失败时 is_error 为 true
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityResult {
    pub text: String,
    pub is_error: bool,
}

impl CapabilityResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

impl From<Result<String, CapabilityError>> for CapabilityResult {
    fn from(result: Result<String, CapabilityError>) -> Self {
        match result {
            Ok(text) => Self::success(text),
            Err(e) => Self::failure(format!("Error: {e}")),
        }
    }
}

/// 能力 trait：名称（Action 中使用）、描述、输入形态、异步调用
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    /// 能力描述（供 Reasoner 理解用途）
    fn description(&self) -> &str;

    fn input_shape(&self) -> InputShape {
        InputShape::FreeText { hint: "any text" }
    }

    /// 为 true 时执行器不施加全局超时（delegate 的耗时取决于整段子运行）
    fn timeout_exempt(&self) -> bool {
        false
    }

    async fn invoke(&self, raw_input: &str, ctx: &InvocationContext) -> Result<String, CapabilityError>;
}

/// 能力注册表：按名称存储 Arc<dyn Capability>；BTreeMap 保证 prompt 中的顺序稳定
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Capability + 'static) {
        self.register_arc(Arc::new(capability));
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::warn!(capability = %name, "capability registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    /// 生成 prompt 中的能力列表段落：每行 `name: description Input: ...`
    pub fn describe(&self) -> String {
        self.capabilities
            .values()
            .map(|c| {
                format!(
                    "{}: {} Input: {}.",
                    c.name(),
                    c.description(),
                    c.input_shape().describe()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl Capability for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase the input."
        }

        async fn invoke(&self, raw_input: &str, _ctx: &InvocationContext) -> Result<String, CapabilityError> {
            Ok(raw_input.to_uppercase())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Upper);
        registry.register(Upper);
        assert!(registry.contains("upper"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["upper".to_string()]);
    }

    #[test]
    fn test_describe_includes_input_shape() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Upper);
        let text = registry.describe();
        assert!(text.starts_with("upper: Uppercase the input."));
        assert!(text.contains("plain text"));
    }

    #[test]
    fn test_error_result_text() {
        let result: CapabilityResult = Err(CapabilityError::Timeout("search".into())).into();
        assert!(result.is_error);
        assert_eq!(result.text, "Error: Capability search timed out");
    }
}
