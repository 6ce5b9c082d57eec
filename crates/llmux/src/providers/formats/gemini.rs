use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

use crate::errors::{ConversionError, ProviderError, ProviderResult};
use crate::models::content::{ContentBlock, ImageSource, ToolResultBlock, ToolResultContent};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::stream::{CompletedMessage, StopReason, StreamChunk, Usage};
use crate::models::tool::Tool;
use crate::providers::stream::{Decoded, StreamDecoder};
use crate::providers::utils::{base64_image, check_tool_names, generate_tool_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiBlob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Value,
}

/// A part is an object with exactly one payload key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        thought: bool,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    /// Part kinds without a canonical counterpart, e.g. `executableCode`
    Other(Value),
}

impl GeminiPart {
    fn text<S: Into<String>>(text: S) -> Self {
        GeminiPart::Text {
            text: text.into(),
            thought: false,
        }
    }
}

fn other_kind(value: &Value) -> String {
    value
        .as_object()
        .and_then(|map| map.keys().next().cloned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<GeminiRole>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiTools {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GeminiTools>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

impl GeminiRequest {
    pub fn new(system: &str, contents: Vec<GeminiContent>, tools: Vec<GeminiFunctionDeclaration>) -> Self {
        Self {
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(system)],
            }),
            contents,
            tools: if tools.is_empty() {
                Vec::new()
            } else {
                vec![GeminiTools {
                    function_declarations: tools,
                }]
            },
            generation_config: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "thoughtsTokenCount", default)]
    pub thoughts_token_count: u32,
    #[serde(rename = "cachedContentTokenCount", default)]
    pub cached_content_token_count: Option<u32>,
}

impl From<GeminiUsageMetadata> for Usage {
    fn from(usage: GeminiUsageMetadata) -> Self {
        Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count + usage.thoughts_token_count,
            cache_write_tokens: None,
            cache_read_tokens: usage.cached_content_token_count,
            total_cost: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

/// Both the non-streaming response and every streamed event
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    pub usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    pub error: Option<Value>,
}

fn inline_data(source: &ImageSource) -> Result<GeminiPart, ConversionError> {
    let (media_type, data) = base64_image(source)?;
    Ok(GeminiPart::InlineData {
        inline_data: GeminiBlob {
            mime_type: media_type.to_string(),
            data: data.to_string(),
        },
    })
}

/// Convert canonical messages to Gemini contents.
///
/// Gemini identifies function responses by function name, so each tool result is
/// matched to the name of the tool use it answers. Images inside a tool result are
/// sent as inline data parts right after the function response.
pub fn messages_to_gemini_spec(messages: &[Message]) -> Result<Vec<GeminiContent>, ConversionError> {
    let mut tool_names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::new();

    for message in messages {
        let mut parts = Vec::new();
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => parts.push(GeminiPart::text(text.clone())),
                ContentBlock::Image { source } => parts.push(inline_data(source)?),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_names.insert(id, name);
                    parts.push(GeminiPart::FunctionCall {
                        function_call: GeminiFunctionCall {
                            name: name.clone(),
                            args: input.clone(),
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    let name = tool_names
                        .get(tool_use_id.as_str())
                        .ok_or_else(|| ConversionError::UnknownToolUseId(tool_use_id.clone()))?;
                    parts.push(GeminiPart::FunctionResponse {
                        function_response: GeminiFunctionResponse {
                            name: name.to_string(),
                            response: json!({"name": name, "content": content.text()}),
                        },
                    });
                    for image in content.images() {
                        parts.push(inline_data(image)?);
                    }
                }
                ContentBlock::Unsupported { kind } => {
                    return Err(ConversionError::UnsupportedContentType(kind.clone()))
                }
            }
        }

        contents.push(GeminiContent {
            role: Some(match message.role {
                Role::User => GeminiRole::User,
                Role::Assistant => GeminiRole::Model,
            }),
            parts,
        });
    }

    Ok(contents)
}

/// Map Gemini contents back to canonical messages.
///
/// Function calls have no ids on the wire. They get generated ids, and each function
/// response is attached to the oldest unanswered call with the same name.
pub fn messages_from_gemini_spec(
    contents: &[GeminiContent],
) -> Result<Vec<Message>, ConversionError> {
    let mut open_calls: HashMap<String, VecDeque<String>> = HashMap::new();
    let mut call_index = 0;
    let mut messages = Vec::new();

    for content in contents {
        let role = match content.role {
            Some(GeminiRole::Model) => Role::Assistant,
            _ => Role::User,
        };
        let mut blocks: Vec<ContentBlock> = Vec::new();

        for part in &content.parts {
            match part {
                GeminiPart::Text { thought: true, .. } => {}
                GeminiPart::Text { text, .. } => blocks.push(ContentBlock::text(text.clone())),
                GeminiPart::InlineData { inline_data } => {
                    let source = ImageSource::Base64 {
                        media_type: inline_data.mime_type.clone(),
                        data: inline_data.data.clone(),
                    };
                    // images following a function response belong to it
                    match blocks.last_mut() {
                        Some(ContentBlock::ToolResult { content, .. }) => {
                            let mut result_blocks = content.blocks();
                            result_blocks.push(ToolResultBlock::Image { source });
                            *content = ToolResultContent::Blocks(result_blocks);
                        }
                        _ => blocks.push(ContentBlock::Image { source }),
                    }
                }
                GeminiPart::FunctionCall { function_call } => {
                    let id = generate_tool_id("gemini", call_index);
                    call_index += 1;
                    open_calls
                        .entry(function_call.name.clone())
                        .or_default()
                        .push_back(id.clone());
                    blocks.push(ContentBlock::tool_use(
                        id,
                        function_call.name.clone(),
                        function_call.args.clone(),
                    ));
                }
                GeminiPart::FunctionResponse { function_response } => {
                    let id = open_calls
                        .get_mut(&function_response.name)
                        .and_then(VecDeque::pop_front)
                        .ok_or_else(|| {
                            ConversionError::UnknownToolUseId(function_response.name.clone())
                        })?;
                    let text = function_response
                        .response
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    blocks.push(ContentBlock::tool_result(id, ToolResultContent::Text(text)));
                }
                GeminiPart::Other(value) => {
                    return Err(ConversionError::UnsupportedContentType(other_kind(value)));
                }
            }
        }

        messages.push(Message::new(role, blocks));
    }

    Ok(messages)
}

/// Drop the JSON schema keywords the Gemini api rejects
fn gemini_schema(schema: Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| key != "additionalProperties" && key != "$schema")
                .map(|(key, value)| (key, gemini_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(gemini_schema).collect()),
        other => other,
    }
}

pub fn tools_to_gemini_spec(tools: &[Tool]) -> Result<Vec<GeminiFunctionDeclaration>, ConversionError> {
    check_tool_names(tools)?;
    tools
        .iter()
        .map(|tool| {
            let schema = tool.object_schema()?;
            // an object schema without properties is rejected, parameters must be omitted
            let has_properties = schema["properties"]
                .as_object()
                .map(|p| !p.is_empty())
                .unwrap_or(false);
            Ok(GeminiFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: has_properties.then(|| gemini_schema(schema)),
            })
        })
        .collect()
}

pub fn map_gemini_stop_reason(reason: &str) -> StopReason {
    match reason {
        "STOP" => StopReason::EndTurn,
        "MAX_TOKENS" => StopReason::MaxTokens,
        _ => StopReason::Unknown,
    }
}

fn response_error(error: &Value) -> ProviderError {
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
}

/// Decodes the streamed `GenerateContentResponse` objects, assigning ids to function calls
#[derive(Debug, Default)]
pub struct GeminiDecoder {
    function_calls: usize,
}

impl StreamDecoder for GeminiDecoder {
    type Event = GeminiResponse;

    fn decode(&mut self, response: GeminiResponse) -> ProviderResult<Vec<Decoded>> {
        if let Some(error) = &response.error {
            return Err(response_error(error));
        }

        let mut decoded = Vec::new();
        for candidate in response.candidates {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            for part in parts {
                match part {
                    GeminiPart::Text { text, thought } if !text.is_empty() => {
                        decoded.push(Decoded::Chunk(if thought {
                            StreamChunk::reasoning(text)
                        } else {
                            StreamChunk::text(text)
                        }));
                    }
                    GeminiPart::FunctionCall { function_call } => {
                        let id = generate_tool_id("gemini", self.function_calls);
                        self.function_calls += 1;
                        let args = if function_call.args.is_null() {
                            json!({})
                        } else {
                            function_call.args
                        };
                        decoded.push(Decoded::Chunk(StreamChunk::ToolUseDelta {
                            id,
                            name: function_call.name,
                            partial_input: args.to_string(),
                        }));
                    }
                    GeminiPart::Other(value) => {
                        tracing::debug!(kind = %other_kind(&value), "skipping gemini part");
                    }
                    _ => {}
                }
            }

            if let Some(reason) = candidate.finish_reason {
                let stop_reason = match map_gemini_stop_reason(&reason) {
                    StopReason::EndTurn if self.function_calls > 0 => StopReason::ToolUse,
                    other => other,
                };
                decoded.push(Decoded::Stop(stop_reason));
            }
        }

        if let Some(usage) = response.usage_metadata {
            decoded.push(Decoded::Usage(usage.into()));
        }
        Ok(decoded)
    }
}

pub fn gemini_response_to_message(response: GeminiResponse) -> ProviderResult<CompletedMessage> {
    let mut decoder = GeminiDecoder::default();
    let mut message = Message::assistant();
    let mut usage = None;
    let mut stop_reason = StopReason::Unknown;

    for decoded in decoder.decode(response)? {
        match decoded {
            Decoded::Chunk(StreamChunk::Text { text }) => message = message.with_text(text),
            Decoded::Chunk(StreamChunk::ToolUseDelta {
                id,
                name,
                partial_input,
            }) => {
                let input = serde_json::from_str(&partial_input)?;
                message = message.with_tool_use(id, name, input);
            }
            Decoded::Usage(report) => usage = Some(report),
            Decoded::Stop(reason) => stop_reason = reason,
            _ => {}
        }
    }

    Ok(CompletedMessage {
        message,
        usage,
        stop_reason,
    })
}
