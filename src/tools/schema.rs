//! 能力输入的 JSON Schema 生成与解析（schemars 自动生成 Schema）
//!
//! JSON 形态的能力用 input_schema::<T>() 声明输入；parse_json_input 容忍 Agent 常见的包裹格式
//! （```json 代码块、首尾引号、前后多余文字），再按 T 严格反序列化。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::CapabilityError;

/// 返回 T 的 JSON Schema（serde_json::Value）
pub fn input_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// 从 Agent 编写的原始输入中提取 JSON 对象并反序列化为 T
pub fn parse_json_input<T: DeserializeOwned>(capability: &str, raw: &str) -> Result<T, CapabilityError> {
    let json_str = extract_json_object(raw).ok_or_else(|| {
        CapabilityError::invalid_input(capability, format!("expected a JSON object, got: {}", raw.trim()))
    })?;
    serde_json::from_str(json_str)
        .map_err(|e| CapabilityError::invalid_input(capability, format!("{e}: {json_str}")))
}

/// 尝试提取 JSON 块（```json ... ``` 或首个 '{' 到最后一个 '}'）
fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let body = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        trimmed
    };
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// 自由文本输入的常规清理：去掉首尾空白、成对引号与反引号
pub fn clean_text_input(raw: &str) -> &str {
    raw.trim().trim_matches('`').trim_matches('"').trim_matches('\'').trim()
}
