//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `BLOCKRANK_*` env vars into [`Settings`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::types::FailurePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data: DataSettings,
    pub backend: BackendSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    pub index_dir: String,
    pub algorithms_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub default_index: String,
    pub text_fields: Vec<String>,
    pub vector_field: String,
    pub id_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub failure_policy: FailurePolicy,
    /// 0 disables the request deadline.
    pub request_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data: DataSettings {
                index_dir: "~/.blockrank/indexes".to_string(),
                algorithms_dir: "./configs/algorithms".to_string(),
            },
            backend: BackendSettings {
                default_index: "products".to_string(),
                text_fields: vec!["title".to_string(), "description".to_string(), "tags".to_string()],
                vector_field: "embedding_vector".to_string(),
                id_field: "id".to_string(),
            },
            pipeline: PipelineSettings { failure_policy: FailurePolicy::FailFast, request_timeout_ms: 5000 },
        }
    }
}

impl Settings {
    pub fn index_dir(&self) -> PathBuf {
        expand_path(&self.data.index_dir)
    }

    pub fn algorithms_dir(&self) -> PathBuf {
        expand_path(&self.data.algorithms_dir)
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Merges defaults, `<dir>/config.toml`, `<dir>/config.<env>.toml`, then
    /// `BLOCKRANK_*` variables (`__` separates nested keys).
    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("BLOCKRANK_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
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
        self.figment.extract().map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if settings.backend.text_fields.is_empty() {
            anyhow::bail!("backend.text_fields must list at least one field");
        }
        if settings.backend.default_index.trim().is_empty() {
            anyhow::bail!("backend.default_index must not be empty");
        }
        Ok(())
    }
}

/// Expand `~` and `$VAR`/`${VAR}` in a configured path. Unknown variables
/// leave the input untouched.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
