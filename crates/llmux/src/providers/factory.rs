use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use super::{
    anthropic::AnthropicProvider,
    base::Provider,
    configs::{
        AnthropicProviderConfig, ApiConfiguration, GeminiProviderConfig, GrokProviderConfig,
        OpenAiProviderConfig, VertexProviderConfig,
    },
    gemini::GeminiProvider,
    grok::GrokProvider,
    openai::OpenAiProvider,
    vertex::VertexProvider,
};
use crate::errors::ProviderResult;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ProviderType {
    #[default]
    #[strum(to_string = "anthropic")]
    Anthropic,
    #[strum(to_string = "vertex")]
    Vertex,
    #[strum(to_string = "openai")]
    OpenAi,
    #[strum(to_string = "openai-native")]
    OpenAiNative,
    #[strum(to_string = "openrouter")]
    OpenRouter,
    #[strum(to_string = "ollama")]
    Ollama,
    #[strum(to_string = "lmstudio")]
    LmStudio,
    #[strum(to_string = "deepseek")]
    DeepSeek,
    #[strum(to_string = "together")]
    Together,
    #[strum(to_string = "qwen")]
    Qwen,
    #[strum(to_string = "mistral")]
    Mistral,
    #[strum(to_string = "requesty")]
    Requesty,
    #[strum(to_string = "litellm")]
    LiteLlm,
    #[strum(to_string = "gemini")]
    Gemini,
    #[strum(to_string = "grok")]
    Grok,
}

impl ProviderType {
    /// Resolve a configured provider id. Unknown and missing ids select the default.
    pub fn from_id(id: Option<&str>) -> Self {
        let id = id.map(str::trim).filter(|id| !id.is_empty());
        match id.map(str::parse::<ProviderType>) {
            Some(Ok(provider_type)) => provider_type,
            Some(Err(_)) => {
                tracing::warn!(
                    provider = id.unwrap_or_default(),
                    "unsupported provider, falling back to {}",
                    ProviderType::default()
                );
                ProviderType::default()
            }
            None => {
                tracing::warn!("no provider configured, using {}", ProviderType::default());
                ProviderType::default()
            }
        }
    }

    pub fn id(self) -> &'static str {
        self.into()
    }
}

pub fn get_provider(config: &ApiConfiguration) -> ProviderResult<Box<dyn Provider>> {
    let options = &config.options;
    let provider_type = ProviderType::from_id(config.provider.as_deref());
    tracing::debug!(provider = %provider_type, "creating provider");

    let provider: Box<dyn Provider> = match provider_type {
        ProviderType::Anthropic => Box::new(AnthropicProvider::new(
            AnthropicProviderConfig::from_options(options)?,
        )?),
        ProviderType::Vertex => Box::new(VertexProvider::new(VertexProviderConfig::from_options(
            options,
        )?)?),
        ProviderType::Gemini => Box::new(GeminiProvider::new(GeminiProviderConfig::from_options(
            options,
        )?)?),
        ProviderType::Grok => Box::new(GrokProvider::new(GrokProviderConfig::from_options(
            options,
        )?)?),
        openai_compatible => Box::new(
            OpenAiProvider::new(OpenAiProviderConfig::from_options(
                openai_compatible,
                options,
            )?)?
            .with_name(openai_compatible.id()),
        ),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::providers::configs::ProviderOptions;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn test_provider_ids_round_trip() {
        for provider_type in ProviderType::iter() {
            let id = provider_type.to_string();
            assert_eq!(id.parse::<ProviderType>().unwrap(), provider_type);
            assert_eq!(provider_type.id(), id);
        }
        assert_eq!(ProviderType::OpenAiNative.to_string(), "openai-native");
        assert_eq!(ProviderType::from_id(Some("OpenRouter")), ProviderType::OpenRouter);
    }

    #[test]
    fn test_unknown_or_missing_provider_falls_back() {
        assert_eq!(ProviderType::from_id(None), ProviderType::Anthropic);
        assert_eq!(ProviderType::from_id(Some("  ")), ProviderType::Anthropic);
        assert_eq!(ProviderType::from_id(Some("bedrock")), ProviderType::Anthropic);
        assert_eq!(ProviderType::from_id(Some("vscode-lm")), ProviderType::Anthropic);
    }

    #[test]
    fn test_get_provider_builds_each_family() {
        let config: ApiConfiguration = serde_json::from_value(json!({
            "api_provider": "deepseek",
            "deepseek_api_key": "sk-ds",
            "api_model_id": "deepseek-reasoner"
        }))
        .unwrap();
        let provider = get_provider(&config).unwrap();
        assert_eq!(provider.name(), "deepseek");
        assert_eq!(provider.get_model().id, "deepseek-reasoner");

        let options = ProviderOptions {
            api_key: Some("sk-ant".to_string()),
            gemini_api_key: Some("gm".to_string()),
            grok_api_key: Some("xai".to_string()),
            vertex_project_id: Some("proj".to_string()),
            vertex_access_token: Some("ya29".to_string()),
            ..Default::default()
        };
        for (id, name) in [
            ("anthropic", "anthropic"),
            ("vertex", "vertex"),
            ("gemini", "gemini"),
            ("grok", "grok"),
            ("ollama", "ollama"),
            ("bedrock", "anthropic"),
        ] {
            let provider = get_provider(&ApiConfiguration::new(id, options.clone())).unwrap();
            assert_eq!(provider.name(), name);
        }
    }

    #[test]
    fn test_missing_credentials_fail_at_construction() {
        let config = ApiConfiguration::new("openrouter", ProviderOptions::default());
        let err = get_provider(&config).err().unwrap();
        assert!(matches!(err, ProviderError::Configuration(_)));

        // falls back to anthropic, which needs a key
        let err = get_provider(&ApiConfiguration::default()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: API key is required for Anthropic"
        );
    }
}
