use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::message::Message;

/// Why a model stopped generating, normalized across backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    /// Fold a later usage report into this one.
    ///
    /// Backends report usage in pieces (input tokens up front, output tokens at the end)
    /// or as running totals, so non-zero values from the later report win.
    pub fn merge(&mut self, other: &Usage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
        if other.cache_write_tokens.is_some() {
            self.cache_write_tokens = other.cache_write_tokens;
        }
        if other.cache_read_tokens.is_some() {
            self.cache_read_tokens = other.cache_read_tokens;
        }
        if other.total_cost.is_some() {
            self.total_cost = other.total_cost;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One element of the canonical response stream
///
/// A stream carries any number of content chunks in backend order, then at most one
/// `Usage`, then exactly one `Done`. Nothing follows `Done`.
pub enum StreamChunk {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    /// A fragment of a tool invocation's JSON arguments. Every fragment of the same
    /// invocation carries the same id and name.
    ToolUseDelta {
        id: String,
        name: String,
        partial_input: String,
    },
    Usage(Usage),
    Done {
        stop_reason: StopReason,
    },
}

impl StreamChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        StreamChunk::Text { text: text.into() }
    }

    pub fn reasoning<S: Into<String>>(text: S) -> Self {
        StreamChunk::Reasoning { text: text.into() }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamChunk::Done { .. })
    }
}

/// A whole assistant reply, from a non-streaming response or a collected stream
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedMessage {
    pub message: Message,
    pub usage: Option<Usage>,
    pub stop_reason: StopReason,
}
