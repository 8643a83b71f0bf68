//! 单次运行的 Scratchpad：按顺序记录 (thought, action, action_input, observation)
//!
//! 每次运行新建一个，运行结束即丢弃；渲染为 Reasoner 可以续写的 ReAct 文本。

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScratchpadEntry {
    pub thought: String,
    /// 格式错误的轮次 action 为空，thought 保存原始输出
    pub action: String,
    pub action_input: String,
    pub observation: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ScratchpadEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<ScratchpadEntry> {
        self.entries
    }

    /// 渲染为 ReAct 记录，末尾以 "Thought: " 结束，供 Reasoner 续写
    pub fn render(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            if e.action.is_empty() {
                out.push_str(&format!("{}\nObservation: {}\n", e.thought, e.observation));
            } else {
                out.push_str(&format!(
                    "Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n",
                    e.thought, e.action, e.action_input, e.observation
                ));
            }
        }
        out.push_str("Thought: ");
        out
    }
}
