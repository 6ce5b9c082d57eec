use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::base::{ChunkStream, ModelDescriptor, Provider};
use super::configs::AnthropicProviderConfig;
use super::formats::anthropic::{
    anthropic_response_to_message, messages_to_anthropic_spec, tools_to_anthropic_spec,
    AnthropicDecoder, AnthropicRequest, AnthropicResponse,
};
use super::retry::RetryPolicy;
use super::stream::stream_request;
use super::utils::{header_map, validate_conversation, Endpoint};
use crate::errors::{ConversionError, ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Used when neither the configuration nor the model table sets an output limit
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Build a messages api request, shared with the Vertex AI handler
pub(crate) fn anthropic_request(
    model: &ModelDescriptor,
    system: &str,
    messages: &[Message],
    tools: &[Tool],
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> Result<AnthropicRequest, ConversionError> {
    validate_conversation(messages, model)?;
    Ok(AnthropicRequest {
        model: Some(model.id.clone()),
        anthropic_version: None,
        max_tokens: max_tokens
            .or(model.info.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.to_string()),
        messages: messages_to_anthropic_spec(messages)?,
        tools: tools_to_anthropic_spec(tools)?,
        temperature,
        stream: true,
    })
}

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
    retry: RetryPolicy,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> ProviderResult<Endpoint> {
        let headers = header_map([
            ("x-api-key", self.config.api_key.as_str()),
            ("anthropic-version", ANTHROPIC_API_VERSION),
        ])?;
        Ok(Endpoint::new(
            self.client.clone(),
            format!("{}/v1/messages", self.config.host),
            headers,
        ))
    }

    fn request(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<AnthropicRequest, ConversionError> {
        anthropic_request(
            &self.config.model,
            system,
            messages,
            tools,
            self.config.max_tokens,
            self.config.temperature,
        )
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        let request = self.request(system, messages, tools)?;
        Ok(stream_request::<_, AnthropicDecoder>(
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
        let mut request = self.request("", &[Message::user().with_text(prompt)], &[])?;
        request.stream = false;
        let endpoint = self.endpoint()?;

        let (endpoint, request) = (&endpoint, &request);
        let response = self
            .retry
            .run(move || async move {
                let response = endpoint.post(request).await?;
                Ok::<_, ProviderError>(response.json::<AnthropicResponse>().await?)
            })
            .await?;

        Ok(anthropic_response_to_message(response)?.message.text())
    }
}
