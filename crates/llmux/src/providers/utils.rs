use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

use super::base::ModelDescriptor;
use crate::errors::{ConversionError, ProviderError, ProviderResult};
use crate::models::content::{ContentBlock, ImageSource};
use crate::models::message::Message;
use crate::models::tool::Tool;

lazy_static! {
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap();
}

/// Function names chat completions backends accept
pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// An id for a tool invocation the backend did not assign one to, unique within a response
pub fn generate_tool_id(prefix: &str, index: usize) -> String {
    format!("{}-tool-{}-{}", prefix, index, nanoid::nanoid!(10))
}

/// Check a conversation before it is converted for a particular model.
///
/// Enforces the tool id invariants (ids are unique, results only reference earlier
/// invocations), rejects image content for models without vision and rejects blocks
/// of unknown type.
pub fn validate_conversation(
    messages: &[Message],
    model: &ModelDescriptor,
) -> Result<(), ConversionError> {
    let mut tool_use_ids = HashSet::new();

    for message in messages {
        for block in &message.content {
            if block.has_image() && !model.info.supports_images {
                return Err(ConversionError::ImagesNotSupported(model.id.clone()));
            }
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    if !tool_use_ids.insert(id.as_str()) {
                        return Err(ConversionError::DuplicateToolUseId(id.clone()));
                    }
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    if !tool_use_ids.contains(tool_use_id.as_str()) {
                        return Err(ConversionError::UnknownToolUseId(tool_use_id.clone()));
                    }
                }
                ContentBlock::Unsupported { kind } => {
                    return Err(ConversionError::UnsupportedContentType(kind.clone()));
                }
                ContentBlock::Text { .. } | ContentBlock::Image { .. } => {}
            }
        }
    }

    Ok(())
}

/// Unpack a base64 image source, any other source type is rejected
pub fn base64_image(source: &ImageSource) -> Result<(&str, &str), ConversionError> {
    match source {
        ImageSource::Base64 { media_type, data } => Ok((media_type, data)),
        other => Err(ConversionError::UnsupportedImageSource(other.kind().to_string())),
    }
}

/// Reject tool sets with repeated names, every backend requires them to be unique
pub fn check_tool_names(tools: &[Tool]) -> Result<(), ConversionError> {
    let mut tool_names = HashSet::new();
    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ConversionError::DuplicateToolName(tool.name.clone()));
        }
    }
    Ok(())
}

pub fn check_openai_context_length_error(error: &Value) -> Option<ProviderError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ProviderError::ContextLengthExceeded(message))
    } else {
        None
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pull a human readable message out of the error bodies the backends send
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            let error = value.get("error").unwrap_or(&value);
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string())
        }
        Err(_) => body.to_string(),
    }
}

/// Map a backend status code onto the error taxonomy
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    let message = error_message(body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            message,
            retry_after: retry_after(headers),
        },
        // 529 is Anthropic's "overloaded"
        status if status.is_server_error() || status.as_u16() == 529 => ProviderError::Server {
            status: status.as_u16(),
            message,
            retry_after: retry_after(headers),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(message),
        StatusCode::NOT_FOUND => ProviderError::Unsupported(message),
        _ => {
            let context_error = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|value| value.get("error").and_then(check_openai_context_length_error));
            match context_error {
                Some(err) => err,
                None if message.contains("prompt is too long") => {
                    ProviderError::ContextLengthExceeded(message)
                }
                None => ProviderError::InvalidRequest(format!("{} - {}", status, message)),
            }
        }
    }
}

/// Pass successful responses through, turn everything else into a classified error
pub async fn handle_response_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &headers, &body))
}

/// Build a header map, invalid names or values are configuration errors
pub fn header_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> ProviderResult<HeaderMap>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|err| {
            ProviderError::Configuration(format!("Invalid header name {}: {}", name.as_ref(), err))
        })?;
        let value = HeaderValue::from_str(value.as_ref()).map_err(|err| {
            ProviderError::Configuration(format!("Invalid value for header {}: {}", name, err))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// A backend url together with the client and headers every request to it carries
#[derive(Debug, Clone)]
pub struct Endpoint {
    client: Client,
    url: String,
    headers: HeaderMap,
}

impl Endpoint {
    pub fn new<S: Into<String>>(client: Client, url: S, headers: HeaderMap) -> Self {
        Self {
            client,
            url: url.into(),
            headers,
        }
    }

    /// POST a JSON body, non-success statuses come back as classified errors
    pub async fn post<T: Serialize + ?Sized>(&self, body: &T) -> ProviderResult<Response> {
        tracing::debug!(url = %self.url, "sending request");
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;
        handle_response_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::ToolResultContent;
    use crate::providers::catalog::OPENAI_COMPATIBLE_DEFAULTS;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn text_only_model() -> ModelDescriptor {
        ModelDescriptor::new(
            "text-only",
            crate::providers::catalog::ModelInfo {
                supports_images: false,
                ..OPENAI_COMPATIBLE_DEFAULTS
            },
        )
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
        assert!(!is_valid_function_name("fs.read"));
        assert!(!is_valid_function_name(""));
        assert!(!is_valid_function_name(&"a".repeat(65)));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_tool_id("gemini", 0);
        let b = generate_tool_id("gemini", 0);
        assert!(a.starts_with("gemini-tool-0-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_conversation_tool_ids() {
        let model = ModelDescriptor::new("any", OPENAI_COMPATIBLE_DEFAULTS);
        let ok = vec![
            Message::assistant().with_tool_use("1", "lookup", json!({})),
            Message::user().with_tool_result("1", ToolResultContent::Text("found".into())),
        ];
        assert!(validate_conversation(&ok, &model).is_ok());

        let dangling =
            vec![Message::user().with_tool_result("9", ToolResultContent::Text("x".into()))];
        assert_eq!(
            validate_conversation(&dangling, &model),
            Err(ConversionError::UnknownToolUseId("9".to_string()))
        );

        let duplicate = vec![
            Message::assistant().with_tool_use("1", "lookup", json!({})),
            Message::assistant().with_tool_use("1", "lookup", json!({})),
        ];
        assert_eq!(
            validate_conversation(&duplicate, &model),
            Err(ConversionError::DuplicateToolUseId("1".to_string()))
        );
    }

    #[test]
    fn test_validate_conversation_images() {
        let messages = vec![Message::user().with_image("aGk=", "image/png")];
        assert_eq!(
            validate_conversation(&messages, &text_only_model()),
            Err(ConversionError::ImagesNotSupported("text-only".to_string()))
        );

        let model = ModelDescriptor::new("vision", OPENAI_COMPATIBLE_DEFAULTS);
        assert!(validate_conversation(&messages, &model).is_ok());
    }

    #[test]
    fn test_validate_conversation_unknown_block() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "audio", "data": "..."}]
        }))
        .unwrap();
        let model = ModelDescriptor::new("any", OPENAI_COMPATIBLE_DEFAULTS);
        assert_eq!(
            validate_conversation(&[message], &model),
            Err(ConversionError::UnsupportedContentType("audio".to_string()))
        );
    }

    #[test]
    fn test_check_tool_names() {
        let tool = Tool::new("test_tool", "Test tool", json!({"type": "object"}));
        assert!(check_tool_names(&[tool.clone()]).is_ok());
        assert_eq!(
            check_tool_names(&[tool.clone(), tool]),
            Err(ConversionError::DuplicateToolName("test_tool".to_string()))
        );
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });

        let result = check_openai_context_length_error(&error);
        assert_eq!(
            result.unwrap().to_string(),
            "Context length exceeded. Message: This message is too long"
        );

        let error = json!({
            "code": "other_error",
            "message": "Some other error"
        });
        assert!(check_openai_context_length_error(&error).is_none());
    }

    #[test]
    fn test_header_map() {
        let headers = header_map([("x-api-key", "secret"), ("X-Title", "llmux")]).unwrap();
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers["x-title"], "llmux");

        let err = header_map([("x-api-key", "line\nbreak")]).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_classify_status() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            r#"{"error": {"message": "slow down"}}"#,
        );
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(err.to_string(), "Rate limited: slow down");

        let err = classify_status(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "nope");
        assert!(matches!(err, ProviderError::Authentication(_)));

        let err = classify_status(
            StatusCode::from_u16(529).unwrap(),
            &HeaderMap::new(),
            r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#,
        );
        assert!(err.is_transient());

        let err = classify_status(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            r#"{"error": {"code": "context_length_exceeded", "message": "too long"}}"#,
        );
        assert!(matches!(err, ProviderError::ContextLengthExceeded(_)));

        let err = classify_status(StatusCode::BAD_REQUEST, &HeaderMap::new(), "bad field");
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }
}
