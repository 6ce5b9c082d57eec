use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use super::catalog::ModelInfo;
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::stream::StreamChunk;
use crate::models::tool::Tool;

/// The canonical, pull-based response sequence every provider produces
pub type ChunkStream = BoxStream<'static, ProviderResult<StreamChunk>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub info: ModelInfo,
}

impl ModelDescriptor {
    pub fn new<S: Into<String>>(id: S, info: ModelInfo) -> Self {
        Self {
            id: id.into(),
            info,
        }
    }
}

/// Base trait for AI providers (OpenAI, Anthropic, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifier used in configuration, e.g. "openrouter"
    fn name(&self) -> &'static str;

    /// The model this provider was configured for
    fn get_model(&self) -> ModelDescriptor;

    /// Start generating the next assistant message.
    ///
    /// Validation and conversion to the native request happen here, so a conversation the
    /// backend cannot represent fails before any request is sent. The network call itself
    /// is made lazily when the returned stream is first polled.
    fn create_message(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<ChunkStream>;

    /// Whether `complete_prompt` is implemented
    fn supports_completion(&self) -> bool {
        false
    }

    /// Single-shot, non-chat completion of a prompt
    async fn complete_prompt(&self, _prompt: &str) -> ProviderResult<String> {
        Err(ProviderError::Unsupported(format!(
            "{} does not support single prompt completion",
            self.name()
        )))
    }
}
