//! Reasoner 抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 脚本化测试桩）实现 Reasoner：输入一段完整上下文文本，返回模型续写文本。
//! 循环引擎、规划器只依赖此 trait，与具体模型无关。

use async_trait::async_trait;

/// Reasoner trait：context -> text，单次、非流式
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// 对完整上下文做一次补全；失败返回人类可读的错误描述
    async fn complete(&self, context: &str) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
