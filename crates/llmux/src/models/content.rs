use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Where the bytes of an image come from. Only inline base64 data can be sent to a backend.
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

impl ImageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::Base64 { .. } => "base64",
            ImageSource::Url { .. } => "url",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// A single part of a tool result
pub enum ToolResultBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// Tool output, either a bare string or a mixed sequence of text and images
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

impl Default for ToolResultContent {
    fn default() -> Self {
        ToolResultContent::Blocks(Vec::new())
    }
}

impl ToolResultContent {
    pub fn is_empty(&self) -> bool {
        match self {
            ToolResultContent::Text(text) => text.is_empty(),
            ToolResultContent::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// View the content as blocks, a bare string becomes a single text block
    pub fn blocks(&self) -> Vec<ToolResultBlock> {
        match self {
            ToolResultContent::Text(text) if text.is_empty() => Vec::new(),
            ToolResultContent::Text(text) => vec![ToolResultBlock::Text { text: text.clone() }],
            ToolResultContent::Blocks(blocks) => blocks.clone(),
        }
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageSource> {
        let blocks: &[ToolResultBlock] = match self {
            ToolResultContent::Text(_) => &[],
            ToolResultContent::Blocks(blocks) => blocks,
        };
        blocks.iter().filter_map(|block| match block {
            ToolResultBlock::Image { source } => Some(source),
            ToolResultBlock::Text { .. } => None,
        })
    }

    /// All text parts joined with newlines
    pub fn text(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ToolResultBlock::Text { text } => Some(text.as_str()),
                    ToolResultBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Content passed inside a message
///
/// `Unsupported` is never constructed by this crate, it only appears when a caller
/// deserializes a block with a type tag we do not know, so that converters can
/// refuse it instead of silently dropping it.
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    Unsupported {
        kind: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: ToolResultContent,
        #[serde(default)]
        is_error: bool,
    },
}

impl From<KnownBlock> for ContentBlock {
    fn from(block: KnownBlock) -> Self {
        match block {
            KnownBlock::Text { text } => ContentBlock::Text { text },
            KnownBlock::Image { source } => ContentBlock::Image { source },
            KnownBlock::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
            KnownBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            },
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "text" | "image" | "tool_use" | "tool_result" => KnownBlock::deserialize(value)
                .map(ContentBlock::from)
                .map_err(serde::de::Error::custom),
            _ => Ok(ContentBlock::Unsupported { kind }),
        }
    }
}

impl ContentBlock {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image<S: Into<String>, T: Into<String>>(data: S, media_type: T) -> Self {
        ContentBlock::Image {
            source: ImageSource::Base64 {
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }

    pub fn tool_use<S: Into<String>, N: Into<String>>(id: S, name: N, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result<S: Into<String>>(tool_use_id: S, content: ToolResultContent) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error: false,
        }
    }

    pub fn tool_error<S: Into<String>, T: Into<String>>(tool_use_id: S, message: T) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: ToolResultContent::Text(message.into()),
            is_error: true,
        }
    }

    /// Get the text content if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The serialized type tag, used in error messages
    pub fn kind(&self) -> &str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Image { .. } => "image",
            ContentBlock::ToolUse { .. } => "tool_use",
            ContentBlock::ToolResult { .. } => "tool_result",
            ContentBlock::Unsupported { kind } => kind,
        }
    }

    /// Whether this block carries an image, directly or inside a tool result
    pub fn has_image(&self) -> bool {
        match self {
            ContentBlock::Image { .. } => true,
            ContentBlock::ToolResult { content, .. } => content.images().next().is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_blocks_deserialize() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_use",
            "id": "toolu_1",
            "name": "read_file",
            "input": {"path": "a.txt"}
        }))
        .unwrap();
        assert_eq!(
            block,
            ContentBlock::tool_use("toolu_1", "read_file", json!({"path": "a.txt"}))
        );

        let block: ContentBlock = serde_json::from_value(json!({
            "type": "image",
            "source": {"type": "base64", "media_type": "image/png", "data": "aGVsbG8="}
        }))
        .unwrap();
        assert_eq!(block, ContentBlock::image("aGVsbG8=", "image/png"));
    }

    #[test]
    fn test_unknown_block_is_kept_as_unsupported() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "document", "data": "..."})).unwrap();
        assert_eq!(
            block,
            ContentBlock::Unsupported {
                kind: "document".to_string()
            }
        );
    }

    #[test]
    fn test_tool_result_content_shapes() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "toolu_1",
            "content": "done"
        }))
        .unwrap();
        assert_eq!(
            block,
            ContentBlock::tool_result("toolu_1", ToolResultContent::Text("done".to_string()))
        );

        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "toolu_2",
        }))
        .unwrap();
        match block {
            ContentBlock::ToolResult { content, .. } => {
                assert!(content.is_empty());
                assert_eq!(serde_json::to_value(&content).unwrap(), json!([]));
            }
            _ => panic!("Expected ToolResult"),
        }
    }

    #[test]
    fn test_tool_result_images_and_text() {
        let content = ToolResultContent::Blocks(vec![
            ToolResultBlock::Text {
                text: "line one".to_string(),
            },
            ToolResultBlock::Image {
                source: ImageSource::Base64 {
                    media_type: "image/png".to_string(),
                    data: "abc".to_string(),
                },
            },
            ToolResultBlock::Text {
                text: "line two".to_string(),
            },
        ]);
        assert_eq!(content.text(), "line one\nline two");
        assert_eq!(content.images().count(), 1);
        assert!(ContentBlock::tool_result("id", content).has_image());
    }
}
