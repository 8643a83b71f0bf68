//! Reasoner 层：模型调用抽象与实现（OpenAI 兼容 / Mock / 脚本化）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockReasoner, ScriptedReasoner};
pub use openai::{create_reasoner_from_config, OpenAiClient, TokenUsage, OPENROUTER_BASE_URL};
pub use traits::Reasoner;
