use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::base::{ChunkStream, ModelDescriptor, Provider};
use super::configs::GrokProviderConfig;
use super::formats::grok::{
    grok_response_to_message, messages_to_grok_spec, tools_to_grok_spec, GrokDecoder,
    GrokRequest, GrokResponse, GROK_GENERATE_PATH,
};
use super::retry::RetryPolicy;
use super::stream::json_request;
use super::utils::{header_map, validate_conversation, Endpoint};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// xAI Grok. The whole reply comes back in one response, which is replayed as a
/// canonical chunk stream.
pub struct GrokProvider {
    client: Client,
    config: GrokProviderConfig,
    retry: RetryPolicy,
}

impl GrokProvider {
    pub fn new(config: GrokProviderConfig) -> ProviderResult<Self> {
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

    fn endpoint(&self) -> ProviderResult<Endpoint> {
        let headers = header_map([(
            "authorization",
            format!("Bearer {}", self.config.api_key),
        )])?;
        Ok(Endpoint::new(
            self.client.clone(),
            format!("{}{}", self.config.host, GROK_GENERATE_PATH),
            headers,
        ))
    }

    fn request(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<GrokRequest> {
        validate_conversation(messages, &self.config.model)?;
        Ok(GrokRequest {
            model: self.config.model.id.clone(),
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: messages_to_grok_spec(messages)?,
            tools: tools_to_grok_spec(tools)?,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        })
    }
}

#[async_trait]
impl Provider for GrokProvider {
    fn name(&self) -> &'static str {
        "grok"
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
        Ok(json_request::<_, GrokDecoder>(
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
        let request = self.request("", &[Message::user().with_text(prompt)], &[])?;
        let endpoint = self.endpoint()?;

        let (endpoint, request) = (&endpoint, &request);
        let response = self
            .retry
            .run(move || async move {
                let response = endpoint.post(request).await?;
                Ok::<_, ProviderError>(response.json::<GrokResponse>().await?)
            })
            .await?;

        Ok(grok_response_to_message(response)?.message.text())
    }
}
