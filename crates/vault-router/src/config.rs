use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::intent::service::DEFAULT_ENDPOINT;
use crate::intent::{ClassifierMode, ComplexityHeuristic, Intent};
use crate::routing::{ConfidenceThresholds, Locale};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub classifier: ClassifierConfig,
    pub thresholds: ConfidenceThresholds,
    /// `Some(target)` replaces or adds a fallback, `None` removes it.
    pub fallback_overrides: HashMap<Intent, Option<Intent>>,
    pub locale: Locale,
    pub vault: VaultConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// `rule_only`, `delegated_only` or `auto`
    pub mode: String,
    pub delegated_enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: usize,
    pub min_chars: usize,
    pub max_simple_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub root: PathBuf,
    /// Keyword command table. Defaults to `commands.yml` under the vault root.
    pub commands_file: Option<PathBuf>,
    pub search_limit: usize,
    pub resolve_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Required in `X-API-Key` when set.
    pub api_key: Option<String>,
    /// Comma-separated origins or `*`.
    pub cors_origins: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Auto.to_string(),
            delegated_enabled: false,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_ms: 10_000,
            temperature: 0.1,
            max_tokens: 200,
            min_chars: 5,
            max_simple_words: 2,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/srv/obsidian/Vault"),
            commands_file: None,
            search_limit: 30,
            resolve_limit: 200,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8787".to_string(),
            api_key: None,
            cors_origins: "*".to_string(),
        }
    }
}

impl ClassifierConfig {
    pub fn mode(&self) -> Result<ClassifierMode, ConfigError> {
        self.mode.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heuristic(&self) -> ComplexityHeuristic {
        ComplexityHeuristic {
            min_chars: self.min_chars,
            max_simple_words: self.max_simple_words,
        }
    }
}

impl VaultConfig {
    pub fn commands_path(&self) -> PathBuf {
        self.commands_file
            .clone()
            .unwrap_or_else(|| self.root.join("commands.yml"))
    }
}

impl ServerConfig {
    pub fn origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn allows_any_origin(&self) -> bool {
        let origins = self.origins();
        origins.is_empty() || origins.iter().any(|o| o == "*")
    }
}

impl RouterConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.classifier.mode()?;
        self.thresholds.validate()?;

        if self.classifier.timeout_ms == 0 {
            return Err(ConfigError::InvalidClassifier("timeout_ms must be > 0".into()));
        }
        if !self.classifier.temperature.is_finite() || !(0.0..=2.0).contains(&self.classifier.temperature) {
            return Err(ConfigError::InvalidClassifier(
                "temperature must be in [0.0, 2.0]".into(),
            ));
        }
        if self.classifier.max_tokens == 0 {
            return Err(ConfigError::InvalidClassifier("max_tokens must be > 0".into()));
        }
        if self.classifier.delegated_enabled && self.classifier.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidClassifier(
                "endpoint is required when the delegated classifier is enabled".into(),
            ));
        }
        if self.vault.search_limit == 0 || self.vault.resolve_limit == 0 {
            return Err(ConfigError::InvalidVault(
                "search_limit and resolve_limit must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Process environment on top of `ROUTER_CONFIG` (or defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RouterConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = match get("ROUTER_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(root) = get("VAULT_ROOT") {
            config.vault.root = PathBuf::from(root);
        }
        if let Some(key) = get("AISECRETARY_API_KEY") {
            config.server.api_key = Some(key);
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            config.server.cors_origins = origins;
        }
        if let Some(bind) = get("BIND_ADDR") {
            config.server.bind = bind;
        }
        if let Some(mode) = get("CLASSIFIER_TYPE") {
            config.classifier.mode = mode;
        }
        if let Some(flag) = get("ENABLE_LLM_CLASSIFIER") {
            config.classifier.delegated_enabled = flag == "1";
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            config.classifier.api_key = Some(key);
        }
        if let Some(model) = get("LLM_CLASSIFIER_MODEL") {
            config.classifier.model = model;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RouterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.classifier.mode().unwrap(), ClassifierMode::Auto);
        assert_eq!(config.classifier.timeout(), Duration::from_secs(10));
        assert_eq!(config.thresholds, ConfidenceThresholds::default());
        assert_eq!(config.vault.commands_path(), PathBuf::from("/srv/obsidian/Vault/commands.yml"));
        assert!(config.server.allows_any_origin());
    }

    #[test]
    fn test_from_file_with_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "classifier": {{ "mode": "rule_based" }},
                "thresholds": {{ "high": 0.9, "medium": 0.4 }},
                "fallback_overrides": {{ "open": "read", "comment": null }},
                "locale": "ja"
            }}"#
        )
        .unwrap();

        let config = RouterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.classifier.mode().unwrap(), ClassifierMode::RuleOnly);
        assert_eq!(config.classifier.model, "gpt-4o-mini");
        assert_eq!(config.thresholds.high, 0.9);
        assert_eq!(config.fallback_overrides.get(&Intent::Open), Some(&Some(Intent::Read)));
        assert_eq!(config.fallback_overrides.get(&Intent::Comment), Some(&None));
        assert_eq!(config.locale, Locale::Ja);
        assert_eq!(config.vault.search_limit, 30);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = RouterConfig::from_file(Path::new("/nonexistent/router.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(RouterConfig::from_file(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_mode_is_fatal() {
        let result = RouterConfig::from_lookup(env(&[("CLASSIFIER_TYPE", "sometimes")]));
        assert!(matches!(result, Err(ConfigError::InvalidMode(_))));
    }

    #[test]
    fn test_env_overlay() {
        let config = RouterConfig::from_lookup(env(&[
            ("VAULT_ROOT", "/tmp/vault"),
            ("AISECRETARY_API_KEY", "secret"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("CLASSIFIER_TYPE", "llm_based"),
            ("ENABLE_LLM_CLASSIFIER", "1"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_CLASSIFIER_MODEL", "gpt-4o"),
        ]))
        .unwrap();

        assert_eq!(config.vault.root, PathBuf::from("/tmp/vault"));
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.server.origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!config.server.allows_any_origin());
        assert_eq!(config.classifier.mode().unwrap(), ClassifierMode::DelegatedOnly);
        assert!(config.classifier.delegated_enabled);
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.classifier.model, "gpt-4o");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let config = RouterConfig::from_lookup(env(&[("VAULT_ROOT", "  "), ("ENABLE_LLM_CLASSIFIER", "0")])).unwrap();
        assert_eq!(config.vault.root, PathBuf::from("/srv/obsidian/Vault"));
        assert!(!config.classifier.delegated_enabled);
    }

    #[test]
    fn test_validate_rejects_broken_values() {
        let mut config = RouterConfig::default();
        config.classifier.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidClassifier(_))));

        let mut config = RouterConfig::default();
        config.vault.search_limit = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidVault(_))));

        let mut config = RouterConfig::default();
        config.thresholds.high = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThresholds(_))));
    }
}
