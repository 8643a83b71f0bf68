//! ReAct 输出解析
//!
//! 把 Reasoner 的一段输出解析为 Decision：
//! ```text
//! Thought: ...
//! Action: search
//! Action Input: AI tutorials
//! ```
//! 或 `Final Answer: ...`。模型自行编造的 `Observation:` 及其后内容先被丢弃；
//! 其余无法识别的输出一律为 Malformed，由循环作为观察回灌，不会中止运行。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

const FINAL_ANSWER: &str = "Final Answer:";

/// 一次 Reasoner 输出的解析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// 调用能力
    Act {
        thought: String,
        capability: String,
        raw_input: String,
    },
    /// 给出最终答复
    Finish { thought: String, text: String },
    /// 无法解析；reason 会写进下一轮的 Observation
    Malformed { raw: String, reason: String },
}

fn observation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*Observation\s*:").expect("observation regex"))
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:[ \t]*(.*)")
            .expect("action regex")
    })
}

fn action_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Action\s*\d*\s*:").expect("action-only regex"))
}

/// 丢弃模型自己续写的 Observation（相当于 stop sequence）
pub fn strip_hallucinated_observation(output: &str) -> &str {
    match observation_re().find(output) {
        Some(m) => &output[..m.start()],
        None => output,
    }
}

/// 提取 Thought：`Thought:` 之后（或开头）到第一个 Action / Final Answer 之前的文本
fn extract_thought(text: &str) -> String {
    let end = [text.find(FINAL_ANSWER), action_only_re().find(text).map(|m| m.start())]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(text.len());
    let head = &text[..end];
    let head = match head.find("Thought:") {
        Some(i) => &head[i + "Thought:".len()..],
        None => head,
    };
    head.trim().to_string()
}

/// 能力名常被包在 `**`、反引号、引号或方括号里
fn clean_capability_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c: char| matches!(c, '*' | '`' | '"' | '\'' | '[' | ']'))
        .trim()
        .to_string()
}

/// 去掉收尾的 ``` 代码块标记
fn clean_trailing_backticks(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_suffix("```")
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn malformed(raw: &str, reason: &str) -> Decision {
    Decision::Malformed {
        raw: raw.trim().to_string(),
        reason: reason.to_string(),
    }
}

/// 解析一次 Reasoner 输出
pub fn parse_decision(output: &str) -> Decision {
    let text = strip_hallucinated_observation(output);
    let thought = extract_thought(text);
    let action = action_re().captures(text);
    let has_final = text.contains(FINAL_ANSWER);

    match (action, has_final) {
        (Some(_), true) => malformed(
            output,
            "Both 'Action' and 'Final Answer' were given; reply with exactly one of them",
        ),
        (None, true) => {
            let answer = text.rsplit(FINAL_ANSWER).next().unwrap_or_default();
            let answer = clean_trailing_backticks(answer);
            if answer.is_empty() {
                malformed(output, "'Final Answer:' must be followed by the answer text")
            } else {
                Decision::Finish { thought, text: answer }
            }
        }
        (Some(caps), false) => {
            let capability = clean_capability_name(caps.get(1).map_or("", |m| m.as_str()));
            let raw_input = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            if capability.is_empty() {
                malformed(output, "'Action:' must name a capability")
            } else {
                Decision::Act {
                    thought,
                    capability,
                    raw_input,
                }
            }
        }
        (None, false) if action_only_re().is_match(text) => {
            malformed(output, "Found 'Action:' but no 'Action Input:' right after it")
        }
        (None, false) => malformed(output, "Found neither 'Action:' nor 'Final Answer:'"),
    }
}
