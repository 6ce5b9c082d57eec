use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::base::{ChunkStream, ModelDescriptor, Provider};
use super::configs::GeminiProviderConfig;
use super::formats::gemini::{
    gemini_response_to_message, messages_to_gemini_spec, tools_to_gemini_spec, GeminiDecoder,
    GeminiRequest, GeminiResponse,
};
use super::retry::RetryPolicy;
use super::stream::stream_request;
use super::utils::{header_map, validate_conversation, Endpoint};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
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

    /// The key goes in a header rather than the `key` query parameter so urls can be logged
    fn endpoint(&self, method: &str) -> ProviderResult<Endpoint> {
        let url = format!(
            "{}/v1beta/models/{}:{}",
            self.config.host, self.config.model.id, method
        );
        let headers = header_map([("x-goog-api-key", self.config.api_key.as_str())])?;
        Ok(Endpoint::new(self.client.clone(), url, headers))
    }

    fn request(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<GeminiRequest> {
        validate_conversation(messages, &self.config.model)?;

        let mut request = GeminiRequest::new(
            system,
            messages_to_gemini_spec(messages)?,
            tools_to_gemini_spec(tools)?,
        );
        request.generation_config.max_output_tokens =
            self.config.max_tokens.or(self.config.model.info.max_tokens);
        request.generation_config.temperature = self.config.temperature;
        Ok(request)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
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
        Ok(stream_request::<_, GeminiDecoder>(
            self.endpoint("streamGenerateContent?alt=sse")?,
            request,
            self.config.model.info,
            self.retry.clone(),
        ))
    }

    fn supports_completion(&self) -> bool {
        true
    }

    async fn complete_prompt(&self, prompt: &str) -> ProviderResult<String> {
        let request = self.request("", &[Message::user().with_text(prompt)], &[])?;
        let endpoint = self.endpoint("generateContent")?;

        let (endpoint, request) = (&endpoint, &request);
        let response = self
            .retry
            .run(move || async move {
                let response = endpoint.post(request).await?;
                Ok::<_, ProviderError>(response.json::<GeminiResponse>().await?)
            })
            .await?;

        Ok(gemini_response_to_message(response)?.message.text())
    }
}
