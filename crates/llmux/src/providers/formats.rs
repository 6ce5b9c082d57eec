//! Native request and response shapes of each backend family, and the mapping between
//! them and the canonical message model.
//!
//! Each family module exposes the same surface: `messages_to_<family>_spec`,
//! `tools_to_<family>_spec`, `messages_from_<family>_spec`,
//! `<family>_response_to_message`, `map_<family>_stop_reason` and a stream decoder.
pub mod anthropic;
pub mod gemini;
pub mod grok;
pub mod openai;
