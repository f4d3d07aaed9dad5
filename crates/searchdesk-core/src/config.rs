//! Layered configuration loader.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars into typed [`Settings`].
//! Also provides `expand_path` for `~` and `${VAR}` in user-supplied paths.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::identity::{AssociationStrategy, DEFAULT_COOKIE_KEYS};
use crate::normalize::ParagraphJoin;
use crate::request::{KeywordOptions, QueryInput, DEFAULT_KEYWORD_FIELD};
use crate::types::{KeywordMode, SearchKind};
use crate::visibility::{ExportOptions, DEFAULT_CONFIRMATION};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self { base_url: "http://localhost:5006".to_string(), timeout_secs: None }
    }
}

impl BackendSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchSettings {
    pub default_limit: u32,
    pub model_name: String,
    pub paragraph_join: ParagraphJoin,
    pub keyword_field: String,
    pub keyword_mode: KeywordMode,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 5,
            model_name: "nim_mixtral_8x7b".to_string(),
            paragraph_join: ParagraphJoin::Raw,
            keyword_field: DEFAULT_KEYWORD_FIELD.to_string(),
            keyword_mode: KeywordMode::Union,
        }
    }
}

impl SearchSettings {
    /// A blank form pre-filled with the configured defaults.
    pub fn query_input(&self, query: impl Into<String>, kind: SearchKind) -> QueryInput {
        QueryInput {
            query: query.into(),
            limit: self.default_limit,
            search_kind: kind,
            keyword: KeywordOptions { field: self.keyword_field.clone(), mode: self.keyword_mode },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentitySettings {
    pub cookie_keys: Vec<String>,
    pub association: AssociationStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_username: Option<String>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            cookie_keys: DEFAULT_COOKIE_KEYS.iter().map(|k| k.to_string()).collect(),
            association: AssociationStrategy::Upsert,
            dev_username: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportSettings {
    pub separator: String,
    pub confirmation_ms: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self { separator: "\n".to_string(), confirmation_ms: DEFAULT_CONFIRMATION.as_millis() as u64 }
    }
}

impl ExportSettings {
    pub fn options(&self) -> ExportOptions {
        ExportOptions { separator: self.separator.clone(), confirmation: Duration::from_millis(self.confirmation_ms) }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub search: SearchSettings,
    pub identity: IdentitySettings,
    pub export: ExportSettings,
}

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."), None)
    }

    /// Merge defaults, `<dir>/config.toml`, `<dir>/config.<env>.toml` and
    /// `APP_*` variables (`APP_BACKEND__BASE_URL`, ...), later sources winning.
    pub fn load_from(dir: &Path, env_override: Option<&str>) -> anyhow::Result<Self> {
        let env_name = match env_override {
            Some(e) => e.to_string(),
            None => env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string()),
        };

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if !settings.backend.base_url.starts_with("http://") && !settings.backend.base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!("backend.base_url must be an http(s) URL, got '{}'", settings.backend.base_url)).into());
        }
        if settings.search.default_limit == 0 {
            return Err(Error::InvalidConfig("search.default_limit must be at least 1".to_string()).into());
        }
        match self.env_name.as_str() {
            "prod" | "production" if settings.identity.dev_username.is_some() => {
                Err(Error::InvalidConfig("identity.dev_username is not allowed in production".to_string()).into())
            }
            _ => Ok(()),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
