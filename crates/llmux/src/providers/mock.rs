use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};

use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::stream::{StopReason, StreamChunk};
use crate::models::tool::Tool;
use crate::providers::base::{ChunkStream, ModelDescriptor, Provider};
use crate::providers::catalog::OPENAI_COMPATIBLE_DEFAULTS;

/// A mock provider that replays pre-configured chunk sequences for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Vec<StreamChunk>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    /// One response per message, each a single text chunk ending the turn
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|text| {
                    vec![
                        StreamChunk::text(*text),
                        StreamChunk::Done {
                            stop_reason: StopReason::EndTurn,
                        },
                    ]
                })
                .collect(),
        )
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn get_model(&self) -> ModelDescriptor {
        ModelDescriptor::new("mock", OPENAI_COMPATIBLE_DEFAULTS)
    }

    fn create_message(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> ProviderResult<ChunkStream> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ProviderError::Protocol(
                "mock provider has no responses left".to_string(),
            ));
        }
        Ok(stream::iter(responses.remove(0).into_iter().map(Ok)).boxed())
    }
}
