//! These models represent the canonical conversation passed to every provider
//!
//! There are several different related formats we need to interact with:
//! - anthropic messages, which the canonical blocks follow most closely
//! - openai chat completions, used by openai and every compatible server
//! - gemini generateContent requests and responses
//! - grok messages
//!
//! Providers convert the canonical structs into their native request shape right before
//! sending, and convert native responses and stream events back into canonical chunks.
//! Nothing outside of `providers` ever sees a native shape.
pub mod content;
pub mod message;
pub mod role;
pub mod stream;
pub mod tool;
