//! xAI Grok wire format.
//!
//! There is no published reference for this shape. It mirrors the content part layout
//! the upstream project assumed, so everything Grok specific stays in this module and
//! can be swapped out once the real api is pinned down.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ConversionError, ProviderResult};
use crate::models::content::{ContentBlock, ImageSource, ToolResultBlock, ToolResultContent};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::stream::{CompletedMessage, StopReason, StreamChunk, Usage};
use crate::models::tool::Tool;
use crate::providers::stream::{Decoded, StreamDecoder};
use crate::providers::utils::{base64_image, check_tool_names, generate_tool_id};

pub const GROK_GENERATE_PATH: &str = "/v1/generate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrokRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrokImage {
    pub data: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrokToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrokResultItem {
    Text(String),
    Image { image: GrokImage },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrokResultContent {
    Text(String),
    Items(Vec<GrokResultItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrokToolResult {
    pub tool_call_id: String,
    pub content: GrokResultContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrokPart {
    Text { text: String },
    Image { image: GrokImage },
    ToolCall { tool_call: GrokToolCall },
    ToolResult { tool_result: GrokToolResult },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrokMessage {
    pub role: GrokRole,
    pub content: Vec<GrokPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrokTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrokRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<GrokMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GrokTool>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrokUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrokResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<GrokToolCall>>,
    #[serde(default)]
    pub usage: GrokUsage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

fn grok_image(source: &ImageSource) -> Result<GrokImage, ConversionError> {
    let (media_type, data) = base64_image(source)?;
    Ok(GrokImage {
        data: data.to_string(),
        media_type: media_type.to_string(),
    })
}

fn image_source(image: &GrokImage) -> ImageSource {
    ImageSource::Base64 {
        media_type: image.media_type.clone(),
        data: image.data.clone(),
    }
}

fn tool_result_to_grok(content: &ToolResultContent) -> Result<GrokResultContent, ConversionError> {
    if let ToolResultContent::Text(text) = content {
        if !text.is_empty() {
            return Ok(GrokResultContent::Text(text.clone()));
        }
    }
    content
        .blocks()
        .iter()
        .map(|block| match block {
            ToolResultBlock::Text { text } => Ok(GrokResultItem::Text(text.clone())),
            ToolResultBlock::Image { source } => Ok(GrokResultItem::Image {
                image: grok_image(source)?,
            }),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(GrokResultContent::Items)
}

/// Convert canonical messages to Grok messages. Empty tool results are sent as an
/// empty list so every tool call keeps its answer.
pub fn messages_to_grok_spec(messages: &[Message]) -> Result<Vec<GrokMessage>, ConversionError> {
    messages
        .iter()
        .map(|message| {
            let content = message
                .content
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => Ok(GrokPart::Text { text: text.clone() }),
                    ContentBlock::Image { source } => Ok(GrokPart::Image {
                        image: grok_image(source)?,
                    }),
                    ContentBlock::ToolUse { id, name, input } => Ok(GrokPart::ToolCall {
                        tool_call: GrokToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: input.clone(),
                        },
                    }),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => Ok(GrokPart::ToolResult {
                        tool_result: GrokToolResult {
                            tool_call_id: tool_use_id.clone(),
                            content: tool_result_to_grok(content)?,
                        },
                    }),
                    ContentBlock::Unsupported { kind } => {
                        Err(ConversionError::UnsupportedContentType(kind.clone()))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(GrokMessage {
                role: match message.role {
                    Role::User => GrokRole::User,
                    Role::Assistant => GrokRole::Assistant,
                },
                content,
            })
        })
        .collect()
}

pub fn messages_from_grok_spec(messages: &[GrokMessage]) -> Result<Vec<Message>, ConversionError> {
    let mut result = Vec::new();
    for message in messages {
        let role = match message.role {
            GrokRole::Assistant => Role::Assistant,
            GrokRole::User => Role::User,
            GrokRole::System => continue,
        };
        let content = message
            .content
            .iter()
            .map(|part| match part {
                GrokPart::Text { text } => ContentBlock::text(text.clone()),
                GrokPart::Image { image } => ContentBlock::Image {
                    source: image_source(image),
                },
                GrokPart::ToolCall { tool_call } => ContentBlock::tool_use(
                    tool_call.id.clone(),
                    tool_call.name.clone(),
                    tool_call.arguments.clone(),
                ),
                GrokPart::ToolResult { tool_result } => ContentBlock::tool_result(
                    tool_result.tool_call_id.clone(),
                    match &tool_result.content {
                        GrokResultContent::Text(text) => ToolResultContent::Text(text.clone()),
                        GrokResultContent::Items(items) => ToolResultContent::Blocks(
                            items
                                .iter()
                                .map(|item| match item {
                                    GrokResultItem::Text(text) => {
                                        ToolResultBlock::Text { text: text.clone() }
                                    }
                                    GrokResultItem::Image { image } => ToolResultBlock::Image {
                                        source: image_source(image),
                                    },
                                })
                                .collect(),
                        ),
                    },
                ),
            })
            .collect();
        result.push(Message::new(role, content));
    }
    Ok(result)
}

pub fn tools_to_grok_spec(tools: &[Tool]) -> Result<Vec<GrokTool>, ConversionError> {
    check_tool_names(tools)?;
    tools
        .iter()
        .map(|tool| {
            Ok(GrokTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.object_schema()?,
            })
        })
        .collect()
}

pub fn map_grok_stop_reason(reason: &str) -> StopReason {
    match reason.to_lowercase().as_str() {
        "end" => StopReason::EndTurn,
        "max_tokens" => StopReason::MaxTokens,
        "stop" => StopReason::StopSequence,
        _ => StopReason::Unknown,
    }
}

fn stop_reason(response: &GrokResponse) -> StopReason {
    match &response.stop_reason {
        Some(reason) => map_grok_stop_reason(reason),
        None if response.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty()) => {
            StopReason::ToolUse
        }
        None => StopReason::EndTurn,
    }
}

fn tool_calls(response: &GrokResponse) -> impl Iterator<Item = (String, String, Value)> + '_ {
    response
        .tool_calls
        .iter()
        .flatten()
        .enumerate()
        .map(|(index, call)| {
            let id = if call.id.is_empty() {
                generate_tool_id("grok", index)
            } else {
                call.id.clone()
            };
            let arguments = if call.arguments.is_null() {
                json!({})
            } else {
                call.arguments.clone()
            };
            (id, call.name.clone(), arguments)
        })
}

pub fn grok_response_to_message(response: GrokResponse) -> Result<CompletedMessage, ConversionError> {
    let mut message = Message::assistant();
    if let Some(text) = response.text.as_deref().filter(|t| !t.is_empty()) {
        message = message.with_text(text);
    }
    for (id, name, arguments) in tool_calls(&response) {
        message = message.with_tool_use(id, name, arguments);
    }

    Ok(CompletedMessage {
        message,
        usage: Some(Usage::new(
            response.usage.input_tokens,
            response.usage.output_tokens,
        )),
        stop_reason: stop_reason(&response),
    })
}

/// The whole reply arrives as one response object
#[derive(Debug, Default)]
pub struct GrokDecoder;

impl StreamDecoder for GrokDecoder {
    type Event = GrokResponse;

    fn decode(&mut self, response: GrokResponse) -> ProviderResult<Vec<Decoded>> {
        let mut decoded = Vec::new();
        if let Some(text) = response.text.as_deref().filter(|t| !t.is_empty()) {
            decoded.push(Decoded::Chunk(StreamChunk::text(text)));
        }
        for (id, name, arguments) in tool_calls(&response) {
            decoded.push(Decoded::Chunk(StreamChunk::ToolUseDelta {
                id,
                name,
                partial_input: arguments.to_string(),
            }));
        }
        decoded.push(Decoded::Usage(Usage::new(
            response.usage.input_tokens,
            response.usage.output_tokens,
        )));
        decoded.push(Decoded::Stop(stop_reason(&response)));
        decoded.push(Decoded::End);
        Ok(decoded)
    }

    fn finish(&mut self) -> StopReason {
        StopReason::EndTurn
    }
}
