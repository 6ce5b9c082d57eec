use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::{ConversionError, ProviderError, ProviderResult};
use crate::models::content::{ContentBlock, ImageSource, ToolResultBlock, ToolResultContent};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::stream::{CompletedMessage, StopReason, StreamChunk, Usage};
use crate::models::tool::Tool;
use crate::providers::stream::{Decoded, StreamDecoder};
use crate::providers::utils::{
    base64_image, check_openai_context_length_error, check_tool_names, generate_tool_id,
    is_valid_function_name,
};

pub const TOOL_IMAGE_PLACEHOLDER: &str =
    "This tool result included an image that is uploaded in the next message.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Reasoning models reject `max_tokens`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// OpenRouter only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_reasoning: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON encoded arguments
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum OpenAiMessage {
    System {
        content: String,
    },
    Developer {
        content: String,
    },
    User {
        content: OpenAiContent,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<OpenAiToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: OpenAiContent,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// DeepSeek reports cache hits on its own field
    #[serde(default)]
    pub prompt_cache_hit_tokens: Option<u32>,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        let cache_read_tokens = usage
            .prompt_cache_hit_tokens
            .or(usage.prompt_tokens_details.and_then(|d| d.cached_tokens));
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_write_tokens: None,
            cache_read_tokens,
            total_cost: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiResponse {
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
    #[serde(default)]
    pub error: Option<Value>,
}

fn image_part(source: &ImageSource) -> Result<OpenAiContentPart, ConversionError> {
    let (media_type, data) = base64_image(source)?;
    Ok(OpenAiContentPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{};base64,{}", media_type, data),
        },
    })
}

fn image_from_url(url: &str) -> ImageSource {
    url.strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(media_type, data)| ImageSource::Base64 {
            media_type: media_type.to_string(),
            data: data.to_string(),
        })
        .unwrap_or_else(|| ImageSource::Url {
            url: url.to_string(),
        })
}

/// Tool result content, with images replaced by a placeholder and returned separately
fn tool_result_to_openai(
    content: &ToolResultContent,
) -> Result<(OpenAiContent, Vec<OpenAiContentPart>), ConversionError> {
    if let ToolResultContent::Text(text) = content {
        if !text.is_empty() {
            return Ok((OpenAiContent::Text(text.clone()), Vec::new()));
        }
    }

    let mut parts = Vec::new();
    let mut images = Vec::new();
    for block in content.blocks() {
        match block {
            ToolResultBlock::Text { text } => parts.push(OpenAiContentPart::Text { text }),
            ToolResultBlock::Image { source } => {
                parts.push(OpenAiContentPart::Text {
                    text: TOOL_IMAGE_PLACEHOLDER.to_string(),
                });
                images.push(image_part(&source)?);
            }
        }
    }
    Ok((OpenAiContent::Parts(parts), images))
}

fn user_content(parts: Vec<OpenAiContentPart>) -> OpenAiContent {
    match parts.as_slice() {
        [OpenAiContentPart::Text { text }] => OpenAiContent::Text(text.clone()),
        _ => OpenAiContent::Parts(parts),
    }
}

/// Convert canonical messages to the chat completions message list, without the
/// system prompt.
///
/// Tool results of a user message become `tool` messages ahead of the rest of its
/// content. Chat completions has no way to flag a failed tool call, so error results
/// are sent as their plain content.
pub fn messages_to_openai_spec(messages: &[Message]) -> Result<Vec<OpenAiMessage>, ConversionError> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message.role {
            Role::User => {
                let mut tool_messages = Vec::new();
                let mut tool_images = Vec::new();
                let mut parts = Vec::new();

                for block in &message.content {
                    match block {
                        ContentBlock::Text { text } => {
                            parts.push(OpenAiContentPart::Text { text: text.clone() })
                        }
                        ContentBlock::Image { source } => parts.push(image_part(source)?),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => {
                            let (content, images) = tool_result_to_openai(content)?;
                            tool_messages.push(OpenAiMessage::Tool {
                                tool_call_id: tool_use_id.clone(),
                                content,
                            });
                            tool_images.extend(images);
                        }
                        ContentBlock::ToolUse { .. } => {
                            return Err(ConversionError::UnsupportedContentType(
                                "tool_use in a user message".to_string(),
                            ))
                        }
                        ContentBlock::Unsupported { kind } => {
                            return Err(ConversionError::UnsupportedContentType(kind.clone()))
                        }
                    }
                }

                messages_spec.extend(tool_messages);
                if !tool_images.is_empty() {
                    messages_spec.push(OpenAiMessage::User {
                        content: OpenAiContent::Parts(tool_images),
                    });
                }
                if !parts.is_empty() {
                    messages_spec.push(OpenAiMessage::User {
                        content: user_content(parts),
                    });
                }
            }
            Role::Assistant => {
                let mut text = Vec::new();
                let mut tool_calls = Vec::new();

                for block in &message.content {
                    match block {
                        ContentBlock::Text { text: t } => text.push(t.as_str()),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(OpenAiToolCall {
                                id: id.clone(),
                                kind: function_type(),
                                function: OpenAiFunctionCall {
                                    name: function_name(name)?,
                                    arguments: input.to_string(),
                                },
                            })
                        }
                        other => {
                            return Err(ConversionError::UnsupportedContentType(format!(
                                "{} in an assistant message",
                                other.kind()
                            )))
                        }
                    }
                }

                let content = if text.is_empty() {
                    None
                } else {
                    Some(text.join(""))
                };
                if content.is_some() || !tool_calls.is_empty() {
                    messages_spec.push(OpenAiMessage::Assistant {
                        content,
                        tool_calls,
                    });
                }
            }
        }
    }

    Ok(messages_spec)
}

fn blocks_from_parts(content: &OpenAiContent) -> Vec<ContentBlock> {
    match content {
        OpenAiContent::Text(text) => vec![ContentBlock::text(text.clone())],
        OpenAiContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                OpenAiContentPart::Text { text } => ContentBlock::text(text.clone()),
                OpenAiContentPart::ImageUrl { image_url } => ContentBlock::Image {
                    source: image_from_url(&image_url.url),
                },
            })
            .collect(),
    }
}

fn tool_content_from_openai(content: &OpenAiContent) -> ToolResultContent {
    match content {
        OpenAiContent::Text(text) => ToolResultContent::Text(text.clone()),
        OpenAiContent::Parts(parts) => ToolResultContent::Blocks(
            parts
                .iter()
                .map(|part| match part {
                    OpenAiContentPart::Text { text } => ToolResultBlock::Text { text: text.clone() },
                    OpenAiContentPart::ImageUrl { image_url } => ToolResultBlock::Image {
                        source: image_from_url(&image_url.url),
                    },
                })
                .collect(),
        ),
    }
}

fn tool_use_from_openai(call: &OpenAiToolCall) -> Result<ContentBlock, ConversionError> {
    let arguments = call.function.arguments.trim();
    let input = if arguments.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments).map_err(|err| {
            ConversionError::MalformedResponse(format!(
                "Could not interpret tool use parameters for id {}: {}",
                call.id, err
            ))
        })?
    };
    Ok(ContentBlock::tool_use(
        call.id.clone(),
        call.function.name.clone(),
        input,
    ))
}

/// Map a chat completions message list back to canonical messages.
///
/// `tool` messages and the user message that follows them fold into one user message.
/// System and developer messages carry the system prompt and are skipped.
pub fn messages_from_openai_spec(
    messages: &[OpenAiMessage],
) -> Result<Vec<Message>, ConversionError> {
    let mut result: Vec<Message> = Vec::new();
    let mut pending_tool_results = false;

    for message in messages {
        match message {
            OpenAiMessage::System { .. } | OpenAiMessage::Developer { .. } => {}
            OpenAiMessage::Tool {
                tool_call_id,
                content,
            } => {
                let block = ContentBlock::tool_result(
                    tool_call_id.clone(),
                    tool_content_from_openai(content),
                );
                match result.last_mut() {
                    Some(last) if pending_tool_results => last.content.push(block),
                    _ => result.push(Message::user().with_content(block)),
                }
                pending_tool_results = true;
            }
            OpenAiMessage::User { content } => {
                let blocks = blocks_from_parts(content);
                match result.last_mut() {
                    Some(last) if pending_tool_results => last.content.extend(blocks),
                    _ => result.push(Message::new(Role::User, blocks)),
                }
                pending_tool_results = false;
            }
            OpenAiMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut message = Message::assistant();
                if let Some(text) = content {
                    message = message.with_text(text.clone());
                }
                for call in tool_calls {
                    message = message.with_content(tool_use_from_openai(call)?);
                }
                result.push(message);
                pending_tool_results = false;
            }
        }
    }

    Ok(result)
}

/// Names are sent as given, so a `ToolUse` from the backend always matches a declared tool
fn function_name(name: &str) -> Result<String, ConversionError> {
    if is_valid_function_name(name) {
        Ok(name.to_string())
    } else {
        Err(ConversionError::InvalidToolName(name.to_string()))
    }
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<OpenAiTool>, ConversionError> {
    check_tool_names(tools)?;
    tools
        .iter()
        .map(|tool| {
            Ok(OpenAiTool {
                kind: "function",
                function: OpenAiFunction {
                    name: function_name(&tool.name)?,
                    description: tool.description.clone(),
                    parameters: tool.object_schema()?,
                },
            })
        })
        .collect()
}

pub fn map_openai_stop_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        _ => StopReason::Unknown,
    }
}

fn response_error(error: &Value) -> ProviderError {
    check_openai_context_length_error(error).unwrap_or_else(|| {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        match error.get("code").and_then(Value::as_u64) {
            Some(429) => ProviderError::RateLimited {
                message,
                retry_after: None,
            },
            Some(code) if code >= 500 => ProviderError::Server {
                status: code as u16,
                message,
                retry_after: None,
            },
            _ => ProviderError::Protocol(message),
        }
    })
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: OpenAiResponse) -> ProviderResult<CompletedMessage> {
    if let Some(error) = &response.error {
        return Err(response_error(error));
    }

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        ConversionError::MalformedResponse("response contains no choices".to_string())
    })?;

    let mut message = Message::assistant();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        message = message.with_text(text);
    }
    for call in choice.message.tool_calls.unwrap_or_default() {
        message = message.with_content(tool_use_from_openai(&call)?);
    }

    Ok(CompletedMessage {
        message,
        usage: response.usage.map(Usage::from),
        stop_reason: choice
            .finish_reason
            .as_deref()
            .map(map_openai_stop_reason)
            .unwrap_or(StopReason::Unknown),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamToolCall {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<StreamFunction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// DeepSeek
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// OpenRouter
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Option<StreamDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Tool call fragments only carry id and name on the first delta of each index
#[derive(Debug, Default)]
pub struct OpenAiDecoder {
    tool_calls: HashMap<usize, (String, String)>,
}

impl StreamDecoder for OpenAiDecoder {
    type Event = OpenAiStreamChunk;

    fn decode(&mut self, chunk: OpenAiStreamChunk) -> ProviderResult<Vec<Decoded>> {
        if let Some(error) = &chunk.error {
            return Err(response_error(error));
        }

        let mut decoded = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta.unwrap_or_default();

            for reasoning in [delta.reasoning_content, delta.reasoning].into_iter().flatten() {
                if !reasoning.is_empty() {
                    decoded.push(Decoded::Chunk(StreamChunk::reasoning(reasoning)));
                }
            }
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                decoded.push(Decoded::Chunk(StreamChunk::text(text)));
            }

            for call in delta.tool_calls.unwrap_or_default() {
                let function = call.function.unwrap_or(StreamFunction {
                    name: None,
                    arguments: None,
                });
                let arguments = function.arguments.unwrap_or_default();
                let first = !self.tool_calls.contains_key(&call.index);
                let (id, name) = self
                    .tool_calls
                    .entry(call.index)
                    .or_insert_with(|| {
                        (
                            call.id
                                .filter(|id| !id.is_empty())
                                .unwrap_or_else(|| generate_tool_id("openai", call.index)),
                            function.name.unwrap_or_default(),
                        )
                    })
                    .clone();
                if first || !arguments.is_empty() {
                    decoded.push(Decoded::Chunk(StreamChunk::ToolUseDelta {
                        id,
                        name,
                        partial_input: arguments,
                    }));
                }
            }

            if let Some(reason) = choice.finish_reason {
                decoded.push(Decoded::Stop(map_openai_stop_reason(&reason)));
            }
        }

        if let Some(usage) = chunk.usage {
            decoded.push(Decoded::Usage(usage.into()));
        }

        Ok(decoded)
    }
}
