use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::types::AppConfig;
use super::validation::validate_config;
use crate::core::errors::ConfigError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 10] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "access_key",
    "client_secret",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 3] = ["max_tokens", "token_count", "tokenizer"];

/// Environment variables that override individual config fields.
const ENV_OVERRIDES: [(&str, &[&str]); 8] = [
    ("SERPER_API_KEY", &["search", "serper_api_key"]),
    ("GOOGLE_SEARCH_API_KEY", &["search", "google_search_api_key"]),
    ("GOOGLE_SEARCH_ENGINE_ID", &["search", "google_search_engine_id"]),
    ("BRAVE_SEARCH_API_KEY", &["search", "brave_search_api_key"]),
    ("BING_SEARCH_API_KEY", &["search", "bing_search_api_key"]),
    ("EMBEDDING_ENDPOINT", &["embedding", "endpoint"]),
    ("EMBEDDING_API_KEY", &["embedding", "api_key"]),
    ("LYCEUM_INDEX_DIR", &["retrieval", "index_dir"]),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("LYCEUM_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Loads, merges and validates the effective configuration.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let mut merged = deep_merge(&public_config, &secrets_config);
        apply_env_overrides(&mut merged, |key| env::var(key).ok());
        parse_config(merged)
    }

    /// Index directory after applying config and path resolution.
    pub fn index_dir(&self, config: &AppConfig) -> PathBuf {
        match &config.retrieval.index_dir {
            Some(dir) => self.paths.resolve(dir),
            None => self.paths.index_dir.clone(),
        }
    }

    pub fn redacted(&self, config: &AppConfig) -> Value {
        match serde_json::to_value(config) {
            Ok(value) => redact_sensitive_values(&value),
            Err(_) => Value::Null,
        }
    }
}

pub fn parse_config(value: Value) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_value(value).map_err(|err| ConfigError::Shape {
        field: "root".to_string(),
        message: err.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

fn load_yaml_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_yaml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: "top level must be a mapping".to_string(),
        }),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, path) in ENV_OVERRIDES {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        set_path(config, path, Value::String(value));
    }
}

fn set_path(root: &mut Value, path: &[&str], value: Value) {
    let mut current = root;
    for (idx, key) in path.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if idx == path.len() - 1 {
            map.insert(key.to_string(), value);
            return;
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    if SENSITIVE_WHITELIST.contains(&lowered.as_str()) {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}
