//! Claude models served through Google Cloud Vertex AI.
//!
//! The request body is the Anthropic messages format, except that the model is part of
//! the url and the api version travels in the body.
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::anthropic::anthropic_request;
use super::base::{ChunkStream, ModelDescriptor, Provider};
use super::configs::VertexProviderConfig;
use super::formats::anthropic::{
    anthropic_response_to_message, AnthropicDecoder, AnthropicRequest, AnthropicResponse,
};
use super::retry::RetryPolicy;
use super::stream::stream_request;
use super::utils::{header_map, Endpoint};
use crate::errors::{ConversionError, ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub const VERTEX_ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

pub struct VertexProvider {
    client: Client,
    config: VertexProviderConfig,
    retry: RetryPolicy,
}

impl VertexProvider {
    pub fn new(config: VertexProviderConfig) -> ProviderResult<Self> {
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

    /// `method` is `streamRawPredict` or `rawPredict`
    fn endpoint(&self, method: &str) -> ProviderResult<Endpoint> {
        let url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/anthropic/models/{}:{}",
            self.config.host,
            self.config.project_id,
            self.config.region,
            self.config.model.id,
            method
        );
        let headers = header_map([(
            "authorization",
            format!("Bearer {}", self.config.access_token),
        )])?;
        Ok(Endpoint::new(self.client.clone(), url, headers))
    }

    fn request(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<AnthropicRequest, ConversionError> {
        let mut request = anthropic_request(
            &self.config.model,
            system,
            messages,
            tools,
            self.config.max_tokens,
            self.config.temperature,
        )?;
        request.model = None;
        request.anthropic_version = Some(VERTEX_ANTHROPIC_VERSION.to_string());
        Ok(request)
    }
}

#[async_trait]
impl Provider for VertexProvider {
    fn name(&self) -> &'static str {
        "vertex"
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
            self.endpoint("streamRawPredict")?,
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
        let endpoint = self.endpoint("rawPredict")?;

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stream::StopReason;
    use crate::providers::catalog;
    use crate::providers::stream::collect_message;
    use indoc::indoc;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str =
        "/v1/projects/my-project/locations/us-east5/publishers/anthropic/models/claude-3-7-sonnet@20250219";

    fn config(host: String) -> VertexProviderConfig {
        VertexProviderConfig {
            host,
            project_id: "my-project".to_string(),
            region: "us-east5".to_string(),
            access_token: "ya29.token".to_string(),
            model: ModelDescriptor::new(
                catalog::VERTEX_DEFAULT_MODEL,
                catalog::lookup(catalog::VERTEX_MODELS, catalog::VERTEX_DEFAULT_MODEL).unwrap(),
            ),
            max_tokens: Some(1024),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_stream_raw_predict() {
        let body = indoc! {r#"
            event: message_start
            data: {"type": "message_start", "message": {"usage": {"input_tokens": 5, "output_tokens": 1}}}

            event: content_block_delta
            data: {"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}

            event: message_delta
            data: {"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}

            event: message_stop
            data: {"type": "message_stop"}

        "#};
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:streamRawPredict", MODEL_PATH)))
            .and(header("authorization", "Bearer ya29.token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let provider = VertexProvider::new(config(mock_server.uri())).unwrap();
        let completed = collect_message(
            provider
                .create_message("Be brief.", &[Message::user().with_text("Hi")], &[])
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(completed.message, Message::assistant().with_text("Hello"));
        assert_eq!(completed.stop_reason, StopReason::EndTurn);

        let requests = mock_server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["anthropic_version"], VERTEX_ANTHROPIC_VERSION);
        assert_eq!(sent["max_tokens"], 1024);
        assert!(sent.get("model").is_none());
    }

    #[tokio::test]
    async fn test_complete_prompt_uses_raw_predict() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:rawPredict", MODEL_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "42"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 1}
            })))
            .mount(&mock_server)
            .await;

        let provider = VertexProvider::new(config(mock_server.uri())).unwrap();
        let text = provider.complete_prompt("6 * 7?").await.unwrap();
        assert_eq!(text, "42");
    }

    #[tokio::test]
    async fn test_expired_token_is_authentication_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Request had invalid authentication credentials."}
            })))
            .mount(&mock_server)
            .await;

        let provider = VertexProvider::new(config(mock_server.uri())).unwrap();
        let err = provider.complete_prompt("Hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(_)));
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
    }
}
