//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；默认走 OpenRouter。
//! 上下文作为单条 user 消息发送，超时由 request_timeout 控制。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::llm::{MockReasoner, Reasoner};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时取首条 choice 的 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, request_timeout_secs: u64) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            usage: TokenUsage::new(),
        }
    }

    async fn request(&self, context: &str) -> Result<String, String> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(context.to_string())
            .build()
            .map_err(|e| e.to_string())?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(message)])
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Reasoner for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, context: &str) -> Result<String, String> {
        tokio::time::timeout(self.request_timeout, self.request(context))
            .await
            .map_err(|_| format!("request timed out after {}s", self.request_timeout.as_secs()))?
    }
}

/// 按配置创建 Reasoner：openrouter 读 OPENROUTER_API_KEY，openai 读 OPENAI_API_KEY；
/// 无 Key 或 provider=mock 时退回 MockReasoner
pub fn create_reasoner_from_config(cfg: &AppConfig) -> Arc<dyn Reasoner> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.request_timeout_secs;

    match provider.as_str() {
        "openrouter" => match std::env::var("OPENROUTER_API_KEY") {
            Ok(key) => {
                let base = cfg.llm.base_url.as_deref().unwrap_or(OPENROUTER_BASE_URL);
                tracing::info!(model = %cfg.llm.model, base = %base, "Using OpenRouter reasoner");
                Arc::new(OpenAiClient::new(Some(base), &cfg.llm.model, &key, timeout))
            }
            Err(_) => {
                tracing::warn!("OPENROUTER_API_KEY not set, using mock reasoner");
                Arc::new(MockReasoner)
            }
        },
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => {
                tracing::info!(model = %cfg.llm.model, "Using OpenAI reasoner");
                Arc::new(OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    &cfg.llm.model,
                    &key,
                    timeout,
                ))
            }
            Err(_) => {
                tracing::warn!("OPENAI_API_KEY not set, using mock reasoner");
                Arc::new(MockReasoner)
            }
        },
        "mock" => Arc::new(MockReasoner),
        other => {
            tracing::warn!(provider = %other, "Unknown reasoner provider, using mock reasoner");
            Arc::new(MockReasoner)
        }
    }
}
