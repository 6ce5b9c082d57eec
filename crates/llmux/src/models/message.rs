use super::content::{ContentBlock, ToolResultContent};
use super::role::Role;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A bare string is the same thing as a single text block
fn string_or_blocks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error> {
    Ok(match RawContent::deserialize(deserializer)? {
        RawContent::Text(text) => vec![ContentBlock::text(text)],
        RawContent::Blocks(blocks) => blocks,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    #[serde(deserialize_with = "string_or_blocks")]
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Message { role, content }
    }

    /// Create a new user message
    pub fn user() -> Self {
        Message::new(Role::User, Vec::new())
    }

    /// Create a new assistant message
    pub fn assistant() -> Self {
        Message::new(Role::Assistant, Vec::new())
    }

    /// Add any ContentBlock to the message
    pub fn with_content(mut self, content: ContentBlock) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(ContentBlock::text(text))
    }

    /// Add base64 image content to the message
    pub fn with_image<S: Into<String>, T: Into<String>>(self, data: S, media_type: T) -> Self {
        self.with_content(ContentBlock::image(data, media_type))
    }

    /// Add a tool invocation to the message
    pub fn with_tool_use<S: Into<String>, N: Into<String>>(
        self,
        id: S,
        name: N,
        input: Value,
    ) -> Self {
        self.with_content(ContentBlock::tool_use(id, name, input))
    }

    /// Add a tool result to the message
    pub fn with_tool_result<S: Into<String>>(self, id: S, content: ToolResultContent) -> Self {
        self.with_content(ContentBlock::tool_result(id, content))
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_content_is_a_text_block() {
        let from_string: Message =
            serde_json::from_value(json!({"role": "user", "content": "Hello"})).unwrap();
        let from_blocks: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "text", "text": "Hello"}]
        }))
        .unwrap();

        assert_eq!(from_string, from_blocks);
        assert_eq!(from_string, Message::user().with_text("Hello"));
    }

    #[test]
    fn test_builders() {
        let message = Message::assistant()
            .with_text("Let me check. ")
            .with_text("One moment.")
            .with_tool_use("toolu_1", "get_weather", json!({"city": "Oslo"}));

        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content.len(), 3);
        assert_eq!(message.text(), "Let me check. One moment.");
        assert!(message.has_tool_use());
    }

    #[test]
    fn test_message_serialization() {
        let message = Message::user()
            .with_tool_result("toolu_1", ToolResultContent::Text("sunny".to_string()));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": "toolu_1",
                    "content": "sunny"
                }]
            })
        );
    }
}
