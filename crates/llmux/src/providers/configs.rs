use serde::{Deserialize, Serialize};

use super::base::ModelDescriptor;
use super::catalog::{self, ModelTable, OPENAI_COMPATIBLE_DEFAULTS};
use super::factory::ProviderType;
use crate::errors::{ProviderError, ProviderResult};

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const OPENAI_HOST: &str = "https://api.openai.com/v1";
pub const OPENROUTER_HOST: &str = "https://openrouter.ai/api/v1";
pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "qwen2.5";
pub const LMSTUDIO_HOST: &str = "http://localhost:1234";
pub const DEEPSEEK_HOST: &str = "https://api.deepseek.com/v1";
pub const TOGETHER_HOST: &str = "https://api.together.xyz/v1";
pub const QWEN_CHINA_HOST: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const QWEN_INTERNATIONAL_HOST: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";
pub const MISTRAL_HOST: &str = "https://api.mistral.ai/v1";
pub const REQUESTY_HOST: &str = "https://router.requesty.ai/v1";
pub const LITELLM_HOST: &str = "http://localhost:4000";
pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const GROK_HOST: &str = "https://api.x.ai";

/// Sent to routers that attribute traffic to an application
const APP_URL: &str = "https://github.com/llmux/llmux";
const APP_TITLE: &str = "llmux";

/// What callers hand to the factory: a provider id plus every provider's options.
///
/// Only the options of the selected provider are read, the rest are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfiguration {
    #[serde(default, alias = "api_provider")]
    pub provider: Option<String>,
    #[serde(flatten)]
    pub options: ProviderOptions,
}

impl ApiConfiguration {
    pub fn new<S: Into<String>>(provider: S, options: ProviderOptions) -> Self {
        Self {
            provider: Some(provider.into()),
            options,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Model override shared by providers without a dedicated model field
    pub api_model_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,

    pub api_key: Option<String>,
    pub anthropic_base_url: Option<String>,

    pub vertex_project_id: Option<String>,
    pub vertex_region: Option<String>,
    pub vertex_access_token: Option<String>,
    pub vertex_base_url: Option<String>,

    pub open_ai_api_key: Option<String>,
    pub open_ai_base_url: Option<String>,
    pub open_ai_model_id: Option<String>,
    pub open_ai_native_api_key: Option<String>,
    pub open_ai_native_base_url: Option<String>,

    pub openrouter_api_key: Option<String>,
    pub openrouter_model_id: Option<String>,
    pub openrouter_base_url: Option<String>,

    pub ollama_base_url: Option<String>,
    pub ollama_model_id: Option<String>,

    pub lmstudio_base_url: Option<String>,
    pub lmstudio_model_id: Option<String>,

    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: Option<String>,

    pub together_api_key: Option<String>,
    pub together_model_id: Option<String>,
    pub together_base_url: Option<String>,

    pub qwen_api_key: Option<String>,
    /// "china" or "international" (default)
    pub qwen_api_line: Option<String>,

    pub mistral_api_key: Option<String>,
    pub mistral_base_url: Option<String>,

    pub requesty_api_key: Option<String>,
    pub requesty_model_id: Option<String>,
    pub requesty_base_url: Option<String>,

    pub litellm_api_key: Option<String>,
    pub litellm_base_url: Option<String>,
    pub litellm_model_id: Option<String>,

    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,

    pub grok_api_key: Option<String>,
    pub grok_base_url: Option<String>,
}

fn require(value: &Option<String>, message: &str) -> ProviderResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Configuration(message.to_string()))
}

fn host_or(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Closed-table providers: unknown ids fall back to the provider default
fn closed_model(table: ModelTable, default_id: &str, requested: Option<&str>) -> ModelDescriptor {
    let (id, info) = catalog::resolve(table, default_id, requested);
    ModelDescriptor::new(id, info)
}

/// Pass-through providers: any id is accepted, unknown ones get generic capabilities
fn open_model(table: ModelTable, default_id: &str, requested: Option<&str>) -> ModelDescriptor {
    let id = requested.unwrap_or(default_id);
    let info = catalog::lookup(table, id).unwrap_or(OPENAI_COMPATIBLE_DEFAULTS);
    ModelDescriptor::new(id, info)
}

#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: ModelDescriptor,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl AnthropicProviderConfig {
    pub fn from_options(options: &ProviderOptions) -> ProviderResult<Self> {
        Ok(Self {
            host: host_or(&options.anthropic_base_url, ANTHROPIC_HOST),
            api_key: require(&options.api_key, "API key is required for Anthropic")?,
            model: closed_model(
                catalog::ANTHROPIC_MODELS,
                catalog::ANTHROPIC_DEFAULT_MODEL,
                options.api_model_id.as_deref(),
            ),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VertexProviderConfig {
    pub host: String,
    pub project_id: String,
    pub region: String,
    pub access_token: String,
    pub model: ModelDescriptor,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl VertexProviderConfig {
    pub fn from_options(options: &ProviderOptions) -> ProviderResult<Self> {
        let region = options
            .vertex_region
            .clone()
            .unwrap_or_else(|| "us-east5".to_string());
        let default_host = format!("https://{}-aiplatform.googleapis.com", region);
        Ok(Self {
            host: host_or(&options.vertex_base_url, &default_host),
            project_id: require(
                &options.vertex_project_id,
                "A Google Cloud project id is required for Vertex AI",
            )?,
            access_token: require(
                &options.vertex_access_token,
                "An access token is required for Vertex AI",
            )?,
            region,
            model: closed_model(
                catalog::VERTEX_MODELS,
                catalog::VERTEX_DEFAULT_MODEL,
                options.api_model_id.as_deref(),
            ),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        })
    }
}

/// How the system prompt is sent to an OpenAI compatible endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPromptRole {
    System,
    /// o3 family models
    Developer,
    /// o1 family models reject any system prompt, so it becomes the first user message
    User,
}

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    /// Base url including the api version path, `/chat/completions` is appended
    pub host: String,
    pub api_key: Option<String>,
    pub model: ModelDescriptor,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub headers: Vec<(String, String)>,
    pub system_role: SystemPromptRole,
    pub include_usage: bool,
    pub include_reasoning: bool,
}

impl OpenAiProviderConfig {
    fn preset(host: String, api_key: Option<String>, model: ModelDescriptor) -> Self {
        Self {
            host,
            api_key,
            model,
            max_tokens: None,
            temperature: None,
            headers: Vec::new(),
            system_role: SystemPromptRole::System,
            include_usage: true,
            include_reasoning: false,
        }
    }

    /// Build the config of one of the OpenAI compatible backends
    pub fn from_options(provider: ProviderType, options: &ProviderOptions) -> ProviderResult<Self> {
        let requested = options.api_model_id.as_deref();
        let mut config = match provider {
            ProviderType::OpenAi => Self::preset(
                host_or(&options.open_ai_base_url, OPENAI_HOST),
                Some(require(&options.open_ai_api_key, "API key is required for OpenAI")?),
                open_model(
                    &[],
                    catalog::OPENAI_NATIVE_DEFAULT_MODEL,
                    options.open_ai_model_id.as_deref().or(requested),
                ),
            ),
            ProviderType::OpenAiNative => {
                let model = closed_model(
                    catalog::OPENAI_NATIVE_MODELS,
                    catalog::OPENAI_NATIVE_DEFAULT_MODEL,
                    requested,
                );
                let mut config = Self::preset(
                    host_or(&options.open_ai_native_base_url, OPENAI_HOST),
                    Some(require(
                        &options.open_ai_native_api_key,
                        "API key is required for OpenAI",
                    )?),
                    model,
                );
                if config.model.id.starts_with("o1") {
                    config.system_role = SystemPromptRole::User;
                } else if config.model.id.starts_with("o3") {
                    config.system_role = SystemPromptRole::Developer;
                }
                config
            }
            ProviderType::OpenRouter => {
                let mut config = Self::preset(
                    host_or(&options.openrouter_base_url, OPENROUTER_HOST),
                    Some(require(
                        &options.openrouter_api_key,
                        "API key is required for OpenRouter",
                    )?),
                    open_model(
                        catalog::OPENROUTER_MODELS,
                        catalog::OPENROUTER_DEFAULT_MODEL,
                        options.openrouter_model_id.as_deref().or(requested),
                    ),
                );
                config.headers = attribution_headers();
                config.include_reasoning = true;
                config
            }
            ProviderType::Ollama => {
                let host = host_or(&options.ollama_base_url, OLLAMA_HOST);
                Self::preset(
                    format!("{}/v1", host),
                    None,
                    open_model(
                        &[],
                        OLLAMA_MODEL,
                        options.ollama_model_id.as_deref().or(requested),
                    ),
                )
            }
            ProviderType::LmStudio => {
                let host = host_or(&options.lmstudio_base_url, LMSTUDIO_HOST);
                let model_id = require(
                    &options.lmstudio_model_id.clone().or(options.api_model_id.clone()),
                    "A model id is required for LM Studio",
                )?;
                let mut config = Self::preset(
                    format!("{}/v1", host),
                    None,
                    ModelDescriptor::new(model_id, OPENAI_COMPATIBLE_DEFAULTS),
                );
                config.include_usage = false;
                config
            }
            ProviderType::DeepSeek => Self::preset(
                host_or(&options.deepseek_base_url, DEEPSEEK_HOST),
                Some(require(&options.deepseek_api_key, "API key is required for DeepSeek")?),
                closed_model(
                    catalog::DEEPSEEK_MODELS,
                    catalog::DEEPSEEK_DEFAULT_MODEL,
                    requested,
                ),
            ),
            ProviderType::Together => {
                let model_id = require(
                    &options.together_model_id.clone().or(options.api_model_id.clone()),
                    "A model id is required for Together",
                )?;
                Self::preset(
                    host_or(&options.together_base_url, TOGETHER_HOST),
                    Some(require(&options.together_api_key, "API key is required for Together")?),
                    ModelDescriptor::new(model_id, OPENAI_COMPATIBLE_DEFAULTS),
                )
            }
            ProviderType::Qwen => {
                let host = match options.qwen_api_line.as_deref() {
                    Some("china") => QWEN_CHINA_HOST,
                    _ => QWEN_INTERNATIONAL_HOST,
                };
                Self::preset(
                    host.to_string(),
                    Some(require(&options.qwen_api_key, "API key is required for Qwen")?),
                    closed_model(catalog::QWEN_MODELS, catalog::QWEN_DEFAULT_MODEL, requested),
                )
            }
            ProviderType::Mistral => {
                let mut config = Self::preset(
                    host_or(&options.mistral_base_url, MISTRAL_HOST),
                    Some(require(&options.mistral_api_key, "API key is required for Mistral")?),
                    closed_model(
                        catalog::MISTRAL_MODELS,
                        catalog::MISTRAL_DEFAULT_MODEL,
                        requested,
                    ),
                );
                config.include_usage = false;
                config
            }
            ProviderType::Requesty => {
                let model_id = require(
                    &options.requesty_model_id.clone().or(options.api_model_id.clone()),
                    "A model id is required for Requesty",
                )?;
                let mut config = Self::preset(
                    host_or(&options.requesty_base_url, REQUESTY_HOST),
                    Some(require(&options.requesty_api_key, "API key is required for Requesty")?),
                    ModelDescriptor::new(model_id, OPENAI_COMPATIBLE_DEFAULTS),
                );
                config.headers = attribution_headers();
                config
            }
            ProviderType::LiteLlm => {
                let host = host_or(&options.litellm_base_url, LITELLM_HOST);
                let model_id = require(
                    &options.litellm_model_id.clone().or(options.api_model_id.clone()),
                    "A model id is required for LiteLLM",
                )?;
                Self::preset(
                    format!("{}/v1", host),
                    // the proxy accepts any key when it runs without auth
                    Some(
                        options
                            .litellm_api_key
                            .clone()
                            .unwrap_or_else(|| "noop".to_string()),
                    ),
                    ModelDescriptor::new(model_id, OPENAI_COMPATIBLE_DEFAULTS),
                )
            }
            other => {
                return Err(ProviderError::Configuration(format!(
                    "{} is not an OpenAI compatible provider",
                    other
                )))
            }
        };

        config.max_tokens = options.max_tokens;
        config.temperature = options.temperature;
        Ok(config)
    }
}

fn attribution_headers() -> Vec<(String, String)> {
    vec![
        ("HTTP-Referer".to_string(), APP_URL.to_string()),
        ("X-Title".to_string(), APP_TITLE.to_string()),
    ]
}

#[derive(Debug, Clone)]
pub struct GeminiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: ModelDescriptor,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GeminiProviderConfig {
    pub fn from_options(options: &ProviderOptions) -> ProviderResult<Self> {
        Ok(Self {
            host: host_or(&options.gemini_base_url, GEMINI_HOST),
            api_key: require(&options.gemini_api_key, "API key is required for Google Gemini")?,
            model: closed_model(
                catalog::GEMINI_MODELS,
                catalog::GEMINI_DEFAULT_MODEL,
                options.api_model_id.as_deref(),
            ),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GrokProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: ModelDescriptor,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

impl GrokProviderConfig {
    pub fn from_options(options: &ProviderOptions) -> ProviderResult<Self> {
        Ok(Self {
            host: host_or(&options.grok_base_url, GROK_HOST),
            api_key: require(&options.grok_api_key, "API key is required for xAI Grok")?,
            model: closed_model(
                catalog::GROK_MODELS,
                catalog::GROK_DEFAULT_MODEL,
                options.api_model_id.as_deref(),
            ),
            max_tokens: options.max_tokens,
            temperature: options.temperature.unwrap_or(0.7),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_configuration_deserializes_flat() {
        let config: ApiConfiguration = serde_json::from_value(json!({
            "api_provider": "openrouter",
            "openrouter_api_key": "sk-or",
            "max_tokens": 1024
        }))
        .unwrap();

        assert_eq!(config.provider.as_deref(), Some("openrouter"));
        assert_eq!(config.options.openrouter_api_key.as_deref(), Some("sk-or"));
        assert_eq!(config.options.max_tokens, Some(1024));
        assert!(config.options.api_key.is_none());
    }

    #[test]
    fn test_missing_credentials_are_configuration_errors() {
        let options = ProviderOptions::default();
        let err = AnthropicProviderConfig::from_options(&options).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        let options = ProviderOptions {
            grok_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        let err = GrokProviderConfig::from_options(&options).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: API key is required for xAI Grok");
    }

    #[test]
    fn test_local_backends_need_no_key() {
        let config =
            OpenAiProviderConfig::from_options(ProviderType::Ollama, &ProviderOptions::default())
                .unwrap();
        assert_eq!(config.host, "http://localhost:11434/v1");
        assert_eq!(config.model.id, OLLAMA_MODEL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_openai_native_system_roles() {
        let mut options = ProviderOptions {
            open_ai_native_api_key: Some("sk".to_string()),
            api_model_id: Some("o1".to_string()),
            ..Default::default()
        };
        let config =
            OpenAiProviderConfig::from_options(ProviderType::OpenAiNative, &options).unwrap();
        assert_eq!(config.system_role, SystemPromptRole::User);

        options.api_model_id = Some("o3-mini".to_string());
        let config =
            OpenAiProviderConfig::from_options(ProviderType::OpenAiNative, &options).unwrap();
        assert_eq!(config.system_role, SystemPromptRole::Developer);
    }

    #[test]
    fn test_openrouter_keeps_unknown_models() {
        let options = ProviderOptions {
            openrouter_api_key: Some("sk-or".to_string()),
            openrouter_model_id: Some("meta-llama/llama-3.3-70b-instruct".to_string()),
            ..Default::default()
        };
        let config =
            OpenAiProviderConfig::from_options(ProviderType::OpenRouter, &options).unwrap();
        assert_eq!(config.model.id, "meta-llama/llama-3.3-70b-instruct");
        assert_eq!(config.model.info, OPENAI_COMPATIBLE_DEFAULTS);
        assert!(config.headers.iter().any(|(name, _)| name == "X-Title"));
    }

    #[test]
    fn test_vertex_host_follows_region() {
        let options = ProviderOptions {
            vertex_project_id: Some("proj".to_string()),
            vertex_access_token: Some("ya29".to_string()),
            vertex_region: Some("europe-west1".to_string()),
            ..Default::default()
        };
        let config = VertexProviderConfig::from_options(&options).unwrap();
        assert_eq!(config.host, "https://europe-west1-aiplatform.googleapis.com");
    }
}
