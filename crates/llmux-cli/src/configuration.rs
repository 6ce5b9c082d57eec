use config::{Config, ConfigError, Environment, File, FileFormat};
use llmux::providers::configs::ApiConfiguration;
use std::path::Path;

/// Values given on the command line, they win over the file and the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Load the provider configuration.
///
/// Sources, lowest precedence first: the optional TOML file, then `LLMUX_*` environment
/// variables (`LLMUX_PROVIDER=openrouter`, `LLMUX_OPENROUTER_API_KEY=...`), then `overrides`.
pub fn load_configuration(
    path: Option<&Path>,
    overrides: Overrides,
) -> Result<ApiConfiguration, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    let config = builder
        .add_source(
            Environment::with_prefix("LLMUX")
                .prefix_separator("_")
                .try_parsing(true),
        )
        .build()?;

    let mut configuration: ApiConfiguration = config.try_deserialize()?;
    tracing::debug!(provider = ?configuration.provider, "loaded configuration");

    if overrides.provider.is_some() {
        configuration.provider = overrides.provider;
    }
    if overrides.model.is_some() {
        configuration.options.api_model_id = overrides.model;
    }
    if overrides.max_tokens.is_some() {
        configuration.options.max_tokens = overrides.max_tokens;
    }
    if overrides.temperature.is_some() {
        configuration.options.temperature = overrides.temperature;
    }
    Ok(configuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("LLMUX_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_environment_only() {
        clean_env();
        env::set_var("LLMUX_PROVIDER", "openrouter");
        env::set_var("LLMUX_OPENROUTER_API_KEY", "sk-or-test");
        env::set_var("LLMUX_MAX_TOKENS", "2000");

        let configuration = load_configuration(None, Overrides::default()).unwrap();
        assert_eq!(configuration.provider.as_deref(), Some("openrouter"));
        assert_eq!(
            configuration.options.openrouter_api_key.as_deref(),
            Some("sk-or-test")
        );
        assert_eq!(configuration.options.max_tokens, Some(2000));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_file_then_environment_then_flags() {
        clean_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            indoc! {r#"
                api_provider = "gemini"
                gemini_api_key = "from-file"
                temperature = 0.2
            "#}
            .as_bytes(),
        )
        .unwrap();
        env::set_var("LLMUX_GEMINI_API_KEY", "from-env");

        let configuration = load_configuration(
            Some(file.path()),
            Overrides {
                model: Some("gemini-1.5-pro-002".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(configuration.provider.as_deref(), Some("gemini"));
        assert_eq!(
            configuration.options.gemini_api_key.as_deref(),
            Some("from-env")
        );
        assert_eq!(configuration.options.temperature, Some(0.2));
        assert_eq!(
            configuration.options.api_model_id.as_deref(),
            Some("gemini-1.5-pro-002")
        );

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        clean_env();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("llmux.toml");
        assert!(load_configuration(Some(&missing), Overrides::default()).is_err());
    }

    #[test]
    #[serial]
    fn test_provider_flag_wins() {
        clean_env();
        env::set_var("LLMUX_PROVIDER", "anthropic");

        let configuration = load_configuration(
            None,
            Overrides {
                provider: Some("ollama".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(configuration.provider.as_deref(), Some("ollama"));

        clean_env();
    }
}
