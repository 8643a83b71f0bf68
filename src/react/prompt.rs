//! ReAct 提示模板
//!
//! 占位符：{capabilities}（名称 + 描述 + 输入形态）、{capability_names}、{input}、{scratchpad}。
//! 可通过 [agent].prompt_file 覆盖内置模板，覆盖模板缺少占位符时拒绝加载。

use std::path::Path;

use crate::core::AgentError;
use crate::tools::CapabilityRegistry;

const DEFAULT_TEMPLATE: &str = "Answer the following questions as best you can. You have access to the following tools:

{capabilities}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{capability_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Never write an Observation yourself; stop after Action Input and wait for it.
If you could not finish the task, say so plainly in the Final Answer.

Begin!

Question: {input}
{scratchpad}";

const PLACEHOLDERS: [&str; 4] = ["{capabilities}", "{capability_names}", "{input}", "{scratchpad}"];

#[derive(Debug, Clone)]
pub struct ReactTemplate {
    text: String,
}

impl Default for ReactTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl ReactTemplate {
    pub fn from_text(text: impl Into<String>) -> Result<Self, AgentError> {
        let text = text.into();
        let missing: Vec<&str> = PLACEHOLDERS
            .iter()
            .copied()
            .filter(|p| !text.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::Config(format!(
                "prompt template is missing placeholders: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { text })
    }

    /// 从文件加载；None 时用内置模板
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| AgentError::Config(format!("cannot read prompt file {}: {}", p.display(), e)))?;
                Self::from_text(text)
            }
        }
    }

    /// 渲染完整上下文
    pub fn render(&self, capabilities: &CapabilityRegistry, input: &str, scratchpad: &str) -> String {
        // {scratchpad} 最后替换：观察文本可能含任意花括号
        self.text
            .replace("{capabilities}", &capabilities.describe())
            .replace("{capability_names}", &capabilities.names().join(", "))
            .replace("{input}", input)
            .replace("{scratchpad}", scratchpad)
    }
}
