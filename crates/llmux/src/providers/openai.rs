//! Handler for every backend that speaks the OpenAI chat completions api.
//!
//! OpenAI itself, OpenRouter, Ollama, LM Studio, DeepSeek, Together, Qwen, Mistral,
//! Requesty and LiteLLM differ only in their [`OpenAiProviderConfig`].
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::base::{ChunkStream, ModelDescriptor, Provider};
use super::configs::{OpenAiProviderConfig, SystemPromptRole};
use super::formats::openai::{
    messages_to_openai_spec, openai_response_to_message, tools_to_openai_spec, OpenAiContent,
    OpenAiDecoder, OpenAiMessage, OpenAiRequest, OpenAiResponse, StreamOptions,
};
use super::retry::RetryPolicy;
use super::stream::stream_request;
use super::utils::{header_map, validate_conversation, Endpoint};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    /// Configuration id this handler was created for, e.g. "deepseek"
    name: &'static str,
    client: Client,
    config: OpenAiProviderConfig,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            name: "openai",
            client,
            config,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> ProviderResult<Endpoint> {
        let bearer = self
            .config
            .api_key
            .as_ref()
            .map(|key| ("Authorization".to_string(), format!("Bearer {}", key)));
        let headers = header_map(bearer.into_iter().chain(self.config.headers.iter().cloned()))?;
        Ok(Endpoint::new(
            self.client.clone(),
            format!("{}/chat/completions", self.config.host),
            headers,
        ))
    }

    fn request(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        stream: bool,
    ) -> ProviderResult<OpenAiRequest> {
        validate_conversation(messages, &self.config.model)?;

        let mut openai_messages = Vec::new();
        if !system.is_empty() {
            let content = system.to_string();
            openai_messages.push(match self.config.system_role {
                SystemPromptRole::System => OpenAiMessage::System { content },
                SystemPromptRole::Developer => OpenAiMessage::Developer { content },
                SystemPromptRole::User => OpenAiMessage::User {
                    content: OpenAiContent::Text(content),
                },
            });
        }
        openai_messages.extend(messages_to_openai_spec(messages)?);

        // reasoning models take max_completion_tokens and only their default temperature
        let reasoning_model = self.config.system_role != SystemPromptRole::System;
        let (max_tokens, max_completion_tokens, temperature) = if reasoning_model {
            (None, self.config.max_tokens, None)
        } else {
            (self.config.max_tokens, None, self.config.temperature)
        };

        Ok(OpenAiRequest {
            model: self.config.model.id.clone(),
            messages: openai_messages,
            tools: tools_to_openai_spec(tools)?,
            max_tokens,
            max_completion_tokens,
            temperature,
            stream,
            stream_options: (stream && self.config.include_usage).then_some(StreamOptions {
                include_usage: true,
            }),
            include_reasoning: self.config.include_reasoning.then_some(true),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn get_model(&self) -> ModelDescriptor {
        self.config.model.clone()
    }

    fn create_message(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<ChunkStream> {
        let request = self.request(system, messages, tools, true)?;
        Ok(stream_request::<_, OpenAiDecoder>(
            self.endpoint()?,
            request,
            self.config.model.info,
            self.retry.clone(),
        ))
    }

    fn supports_completion(&self) -> bool {
        true
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let request = self.request("", &[Message::user().with_text(prompt)], &[], false)?;
        let endpoint = self.endpoint()?;

        let (endpoint, request) = (&endpoint, &request);
        let response = self
            .retry
            .run(move || async move {
                let response = endpoint.post(request).await?;
                Ok::<_, ProviderError>(response.json::<OpenAiResponse>().await?)
            })
            .await?;

        Ok(openai_response_to_message(response)?.message.text())
    }
}
