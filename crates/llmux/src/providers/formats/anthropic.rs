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
use crate::providers::utils::{base64_image, check_tool_names};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicRequest {
    /// Vertex AI takes the model from the url and rejects it in the body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: Role,
    pub content: Vec<AnthropicBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicImageSource {
    Base64 { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicToolResultBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicToolResultContent {
    Text(String),
    Blocks(Vec<AnthropicToolResultBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: AnthropicToolResultContent,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u32>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_write_tokens: usage.cache_creation_input_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            total_cost: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub content: Vec<AnthropicBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

fn image_to_anthropic(source: &ImageSource) -> Result<AnthropicImageSource, ConversionError> {
    let (media_type, data) = base64_image(source)?;
    Ok(AnthropicImageSource::Base64 {
        media_type: media_type.to_string(),
        data: data.to_string(),
    })
}

fn image_from_anthropic(source: AnthropicImageSource) -> ImageSource {
    match source {
        AnthropicImageSource::Base64 { media_type, data } => ImageSource::Base64 { media_type, data },
    }
}

fn tool_result_to_anthropic(
    content: &ToolResultContent,
) -> Result<AnthropicToolResultContent, ConversionError> {
    match content {
        ToolResultContent::Text(text) if !text.is_empty() => {
            Ok(AnthropicToolResultContent::Text(text.clone()))
        }
        _ => content
            .blocks()
            .iter()
            .map(|block| match block {
                ToolResultBlock::Text { text } => {
                    Ok(AnthropicToolResultBlock::Text { text: text.clone() })
                }
                ToolResultBlock::Image { source } => Ok(AnthropicToolResultBlock::Image {
                    source: image_to_anthropic(source)?,
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AnthropicToolResultContent::Blocks),
    }
}

/// Convert canonical messages to Anthropic's messages api format
pub fn messages_to_anthropic_spec(
    messages: &[Message],
) -> Result<Vec<AnthropicMessage>, ConversionError> {
    let mut anthropic_messages = Vec::new();

    for message in messages {
        let mut content = Vec::new();
        for block in &message.content {
            content.push(match block {
                ContentBlock::Text { text } => AnthropicBlock::Text { text: text.clone() },
                ContentBlock::Image { source } => AnthropicBlock::Image {
                    source: image_to_anthropic(source)?,
                },
                ContentBlock::ToolUse { id, name, input } => AnthropicBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => AnthropicBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: tool_result_to_anthropic(content)?,
                    is_error: *is_error,
                },
                ContentBlock::Unsupported { kind } => {
                    return Err(ConversionError::UnsupportedContentType(kind.clone()))
                }
            });
        }

        anthropic_messages.push(AnthropicMessage {
            role: message.role,
            content,
        });
    }

    Ok(anthropic_messages)
}

/// Map native messages back to the canonical model. Thinking blocks have no canonical
/// counterpart and are dropped.
pub fn messages_from_anthropic_spec(
    messages: &[AnthropicMessage],
) -> Result<Vec<Message>, ConversionError> {
    Ok(messages
        .iter()
        .map(|message| Message::new(message.role, blocks_from_anthropic(message.content.clone())))
        .collect())
}

fn blocks_from_anthropic(blocks: Vec<AnthropicBlock>) -> Vec<ContentBlock> {
    blocks
        .into_iter()
        .filter_map(|block| match block {
            AnthropicBlock::Text { text } => Some(ContentBlock::Text { text }),
            AnthropicBlock::Image { source } => Some(ContentBlock::Image {
                source: image_from_anthropic(source),
            }),
            AnthropicBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::ToolUse { id, name, input })
            }
            AnthropicBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(ContentBlock::ToolResult {
                tool_use_id,
                content: match content {
                    AnthropicToolResultContent::Text(text) => ToolResultContent::Text(text),
                    AnthropicToolResultContent::Blocks(blocks) => ToolResultContent::Blocks(
                        blocks
                            .into_iter()
                            .map(|block| match block {
                                AnthropicToolResultBlock::Text { text } => {
                                    ToolResultBlock::Text { text }
                                }
                                AnthropicToolResultBlock::Image { source } => {
                                    ToolResultBlock::Image {
                                        source: image_from_anthropic(source),
                                    }
                                }
                            })
                            .collect(),
                    ),
                },
                is_error,
            }),
            AnthropicBlock::Thinking { .. } => None,
        })
        .collect()
}

pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Result<Vec<AnthropicTool>, ConversionError> {
    check_tool_names(tools)?;
    tools
        .iter()
        .map(|tool| {
            Ok(AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.object_schema()?,
            })
        })
        .collect()
}

pub fn map_anthropic_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" => StopReason::EndTurn,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Unknown,
    }
}

pub fn anthropic_response_to_message(
    response: AnthropicResponse,
) -> Result<CompletedMessage, ConversionError> {
    let content = blocks_from_anthropic(response.content);
    Ok(CompletedMessage {
        message: Message::new(Role::Assistant, content),
        usage: Some(response.usage.into()),
        stop_reason: response
            .stop_reason
            .as_deref()
            .map(map_anthropic_stop_reason)
            .unwrap_or(StopReason::Unknown),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessageStart {
    #[serde(default)]
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamBlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Server-sent events of a streaming messages request
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    MessageStart {
        message: StreamMessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: StreamBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: StreamBlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: StreamMessageDelta,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Unknown,
}

/// Tracks the tool invocation each content block index belongs to
#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    tool_blocks: HashMap<usize, (String, String)>,
}

impl StreamDecoder for AnthropicDecoder {
    type Event = AnthropicStreamEvent;

    fn decode(&mut self, event: AnthropicStreamEvent) -> ProviderResult<Vec<Decoded>> {
        Ok(match event {
            AnthropicStreamEvent::MessageStart { message } => {
                vec![Decoded::Usage(message.usage.into())]
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StreamBlockStart::Text { text } if !text.is_empty() => {
                    vec![Decoded::Chunk(StreamChunk::text(text))]
                }
                StreamBlockStart::Thinking { thinking } if !thinking.is_empty() => {
                    vec![Decoded::Chunk(StreamChunk::reasoning(thinking))]
                }
                StreamBlockStart::ToolUse { id, name } => {
                    // argument-less calls send no input deltas
                    self.tool_blocks.insert(index, (id.clone(), name.clone()));
                    vec![Decoded::Chunk(StreamChunk::ToolUseDelta {
                        id,
                        name,
                        partial_input: String::new(),
                    })]
                }
                _ => vec![],
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                StreamBlockDelta::TextDelta { text } => {
                    vec![Decoded::Chunk(StreamChunk::text(text))]
                }
                StreamBlockDelta::ThinkingDelta { thinking } => {
                    vec![Decoded::Chunk(StreamChunk::reasoning(thinking))]
                }
                StreamBlockDelta::InputJsonDelta { partial_json } => {
                    let (id, name) = self.tool_blocks.get(&index).cloned().ok_or_else(|| {
                        ProviderError::Protocol(format!(
                            "input delta for content block {} which is not a tool use",
                            index
                        ))
                    })?;
                    vec![Decoded::Chunk(StreamChunk::ToolUseDelta {
                        id,
                        name,
                        partial_input: partial_json,
                    })]
                }
                StreamBlockDelta::Other => vec![],
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let mut decoded = Vec::new();
                if let Some(usage) = usage {
                    decoded.push(Decoded::Usage(usage.into()));
                }
                if let Some(reason) = delta.stop_reason {
                    decoded.push(Decoded::Stop(map_anthropic_stop_reason(&reason)));
                }
                decoded
            }
            AnthropicStreamEvent::MessageStop => vec![Decoded::End],
            AnthropicStreamEvent::Error { error } => return Err(stream_error(error)),
            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Unknown => {
                vec![]
            }
        })
    }

    /// `message_delta` carries the stop reason before the final `message_stop`
    fn requires_end(&self) -> bool {
        true
    }
}

fn stream_error(error: StreamError) -> ProviderError {
    match error.kind.as_str() {
        "overloaded_error" => ProviderError::Server {
            status: 529,
            message: error.message,
            retry_after: None,
        },
        "api_error" => ProviderError::Server {
            status: 500,
            message: error.message,
            retry_after: None,
        },
        "rate_limit_error" => ProviderError::RateLimited {
            message: error.message,
            retry_after: None,
        },
        _ => ProviderError::InvalidRequest(format!("{}: {}", error.kind, error.message)),
    }
}
