//! Static model capability and pricing tables.
//!
//! Prices are USD per million tokens. These are passive lookup data, nothing here talks
//! to a backend.
use serde::Serialize;

use crate::models::stream::Usage;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelInfo {
    pub max_tokens: Option<u32>,
    pub context_window: u32,
    pub supports_images: bool,
    pub supports_tools: bool,
    pub supports_prompt_cache: bool,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub cache_writes_price: Option<f64>,
    pub cache_reads_price: Option<f64>,
}

const BASE: ModelInfo = ModelInfo {
    max_tokens: Some(8192),
    context_window: 128_000,
    supports_images: false,
    supports_tools: true,
    supports_prompt_cache: false,
    input_price: None,
    output_price: None,
    cache_writes_price: None,
    cache_reads_price: None,
};

/// Used for self-hosted and pass-through backends where we cannot know the model
pub const OPENAI_COMPATIBLE_DEFAULTS: ModelInfo = ModelInfo {
    max_tokens: None,
    supports_images: true,
    input_price: Some(0.0),
    output_price: Some(0.0),
    ..BASE
};

impl ModelInfo {
    /// Cost of a request in USD, if the model has known prices
    pub fn calculate_cost(&self, usage: &Usage) -> Option<f64> {
        let input = self.input_price? / 1_000_000.0 * usage.input_tokens as f64;
        let output = self.output_price? / 1_000_000.0 * usage.output_tokens as f64;
        let cache_writes = match (self.cache_writes_price, usage.cache_write_tokens) {
            (Some(price), Some(tokens)) => price / 1_000_000.0 * tokens as f64,
            _ => 0.0,
        };
        let cache_reads = match (self.cache_reads_price, usage.cache_read_tokens) {
            (Some(price), Some(tokens)) => price / 1_000_000.0 * tokens as f64,
            _ => 0.0,
        };
        Some(input + output + cache_writes + cache_reads)
    }
}

pub type ModelTable = &'static [(&'static str, ModelInfo)];

pub fn lookup(table: ModelTable, id: &str) -> Option<ModelInfo> {
    table
        .iter()
        .find(|(model_id, _)| *model_id == id)
        .map(|(_, info)| *info)
}

/// Resolve a model against a closed table, unknown ids fall back to the default model
pub fn resolve(table: ModelTable, default_id: &str, requested: Option<&str>) -> (String, ModelInfo) {
    if let Some(id) = requested {
        if let Some(info) = lookup(table, id) {
            return (id.to_string(), info);
        }
        tracing::debug!(model = id, "unknown model id, using {}", default_id);
    }
    let info = lookup(table, default_id).unwrap_or(BASE);
    (default_id.to_string(), info)
}

const CLAUDE_SONNET: ModelInfo = ModelInfo {
    max_tokens: Some(8192),
    context_window: 200_000,
    supports_images: true,
    supports_prompt_cache: true,
    input_price: Some(3.0),
    output_price: Some(15.0),
    cache_writes_price: Some(3.75),
    cache_reads_price: Some(0.3),
    ..BASE
};

const CLAUDE_HAIKU_35: ModelInfo = ModelInfo {
    max_tokens: Some(8192),
    context_window: 200_000,
    supports_prompt_cache: true,
    input_price: Some(0.8),
    output_price: Some(4.0),
    cache_writes_price: Some(1.0),
    cache_reads_price: Some(0.08),
    ..BASE
};

const CLAUDE_OPUS: ModelInfo = ModelInfo {
    max_tokens: Some(4096),
    context_window: 200_000,
    supports_images: true,
    supports_prompt_cache: true,
    input_price: Some(15.0),
    output_price: Some(75.0),
    cache_writes_price: Some(18.75),
    cache_reads_price: Some(1.5),
    ..BASE
};

const CLAUDE_HAIKU_3: ModelInfo = ModelInfo {
    max_tokens: Some(4096),
    context_window: 200_000,
    supports_images: true,
    supports_prompt_cache: true,
    input_price: Some(0.25),
    output_price: Some(1.25),
    cache_writes_price: Some(0.3),
    cache_reads_price: Some(0.03),
    ..BASE
};

pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const ANTHROPIC_MODELS: ModelTable = &[
    ("claude-3-7-sonnet-20250219", CLAUDE_SONNET),
    ("claude-3-5-sonnet-20241022", CLAUDE_SONNET),
    ("claude-3-5-haiku-20241022", CLAUDE_HAIKU_35),
    ("claude-3-opus-20240229", CLAUDE_OPUS),
    ("claude-3-haiku-20240307", CLAUDE_HAIKU_3),
];

pub const VERTEX_DEFAULT_MODEL: &str = "claude-3-7-sonnet@20250219";
pub const VERTEX_MODELS: ModelTable = &[
    ("claude-3-7-sonnet@20250219", CLAUDE_SONNET),
    ("claude-3-5-sonnet-v2@20241022", CLAUDE_SONNET),
    ("claude-3-5-haiku@20241022", CLAUDE_HAIKU_35),
    ("claude-3-opus@20240229", CLAUDE_OPUS),
    ("claude-3-haiku@20240307", CLAUDE_HAIKU_3),
];

pub const OPENROUTER_DEFAULT_MODEL: &str = "anthropic/claude-3.7-sonnet";
pub const OPENROUTER_MODELS: ModelTable = &[("anthropic/claude-3.7-sonnet", CLAUDE_SONNET)];

pub const OPENAI_NATIVE_DEFAULT_MODEL: &str = "gpt-4o";
pub const OPENAI_NATIVE_MODELS: ModelTable = &[
    (
        "gpt-4o",
        ModelInfo {
            max_tokens: Some(4096),
            supports_images: true,
            input_price: Some(2.5),
            output_price: Some(10.0),
            cache_reads_price: Some(1.25),
            ..BASE
        },
    ),
    (
        "gpt-4o-mini",
        ModelInfo {
            max_tokens: Some(16_384),
            supports_images: true,
            input_price: Some(0.15),
            output_price: Some(0.6),
            cache_reads_price: Some(0.075),
            ..BASE
        },
    ),
    (
        "o3-mini",
        ModelInfo {
            max_tokens: Some(100_000),
            context_window: 200_000,
            input_price: Some(1.1),
            output_price: Some(4.4),
            cache_reads_price: Some(0.55),
            ..BASE
        },
    ),
    (
        "o1",
        ModelInfo {
            max_tokens: Some(100_000),
            context_window: 200_000,
            supports_images: true,
            input_price: Some(15.0),
            output_price: Some(60.0),
            cache_reads_price: Some(7.5),
            ..BASE
        },
    ),
];

pub const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEEPSEEK_MODELS: ModelTable = &[
    (
        "deepseek-chat",
        ModelInfo {
            max_tokens: Some(8000),
            context_window: 64_000,
            supports_prompt_cache: true,
            input_price: Some(0.0),
            output_price: Some(0.28),
            cache_writes_price: Some(0.14),
            cache_reads_price: Some(0.014),
            ..BASE
        },
    ),
    (
        "deepseek-reasoner",
        ModelInfo {
            max_tokens: Some(8000),
            context_window: 64_000,
            supports_tools: false,
            supports_prompt_cache: true,
            input_price: Some(0.0),
            output_price: Some(2.19),
            cache_writes_price: Some(0.55),
            cache_reads_price: Some(0.14),
            ..BASE
        },
    ),
];

pub const MISTRAL_DEFAULT_MODEL: &str = "codestral-latest";
pub const MISTRAL_MODELS: ModelTable = &[
    (
        "codestral-latest",
        ModelInfo {
            max_tokens: Some(256_000),
            context_window: 256_000,
            input_price: Some(0.3),
            output_price: Some(0.9),
            ..BASE
        },
    ),
    (
        "mistral-large-latest",
        ModelInfo {
            max_tokens: Some(131_000),
            context_window: 131_000,
            input_price: Some(2.0),
            output_price: Some(6.0),
            ..BASE
        },
    ),
    (
        "pixtral-large-latest",
        ModelInfo {
            max_tokens: Some(131_000),
            context_window: 131_000,
            supports_images: true,
            input_price: Some(2.0),
            output_price: Some(6.0),
            ..BASE
        },
    ),
];

pub const QWEN_DEFAULT_MODEL: &str = "qwen-coder-plus-latest";
pub const QWEN_MODELS: ModelTable = &[
    (
        "qwen-coder-plus-latest",
        ModelInfo {
            context_window: 131_072,
            input_price: Some(3.5),
            output_price: Some(7.0),
            ..BASE
        },
    ),
    (
        "qwen-max-latest",
        ModelInfo {
            context_window: 32_768,
            input_price: Some(2.4),
            output_price: Some(9.6),
            ..BASE
        },
    ),
    (
        "qwen-vl-max-latest",
        ModelInfo {
            context_window: 32_768,
            supports_images: true,
            input_price: Some(3.0),
            output_price: Some(9.0),
            ..BASE
        },
    ),
];

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
pub const GEMINI_MODELS: ModelTable = &[
    (
        "gemini-2.0-flash-001",
        ModelInfo {
            context_window: 1_048_576,
            supports_images: true,
            input_price: Some(0.1),
            output_price: Some(0.4),
            ..BASE
        },
    ),
    (
        "gemini-1.5-pro-002",
        ModelInfo {
            context_window: 2_097_152,
            supports_images: true,
            input_price: Some(1.25),
            output_price: Some(5.0),
            ..BASE
        },
    ),
    (
        "gemini-1.5-flash-002",
        ModelInfo {
            context_window: 1_048_576,
            supports_images: true,
            input_price: Some(0.075),
            output_price: Some(0.3),
            ..BASE
        },
    ),
];

pub const GROK_DEFAULT_MODEL: &str = "grok-2-latest";
pub const GROK_MODELS: ModelTable = &[
    (
        "grok-2-latest",
        ModelInfo {
            context_window: 131_072,
            input_price: Some(2.0),
            output_price: Some(10.0),
            ..BASE
        },
    ),
    (
        "grok-2-vision-latest",
        ModelInfo {
            context_window: 32_768,
            supports_images: true,
            input_price: Some(2.0),
            output_price: Some(10.0),
            ..BASE
        },
    ),
];
