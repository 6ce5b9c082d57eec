pub mod anthropic;
pub mod base;
pub mod catalog;
pub mod configs;
pub mod factory;
pub mod formats;
pub mod gemini;
pub mod grok;
pub mod openai;
pub mod retry;
pub mod stream;
pub mod utils;
pub mod vertex;

#[cfg(test)]
pub mod mock;
