//! # EmbAudio Configuration Module
//!
//! Configuration management for the EmbAudio player:
//! - Loading configuration from a YAML file
//! - Merging with the embedded default configuration
//! - Environment variable override for the config directory
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use embconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let origin = config.get_base_url();
//! ```

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use serde_yaml::{Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("embaudio.yaml");

const ENV_CONFIG_DIR: &str = "EMBAUDIO_CONFIG";
const CONFIG_FILE: &str = "embaudio.yaml";

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_TICK_INTERVAL_MS: u64 = 250;
const DEFAULT_BACKEND: &str = "device";
const DEFAULT_SIM_DURATION_SECS: f64 = 30.0;

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load EmbAudio configuration"));
}

/// Returns the global configuration singleton.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Configuration manager for EmbAudio.
///
/// The backing store is a YAML document: the embedded defaults merged with
/// the user file found in the config directory. Setters write through to the
/// user file so changes survive a restart.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().expect("Config mutex poisoned").clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds the config directory, trying in order: the provided directory,
    /// the `EMBAUDIO_CONFIG` environment variable, the platform config dir.
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Loading config dir from env");
            return env_path;
        }

        dirs::config_dir()
            .map(|d| d.join("embaudio").to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string())
    }

    /// Loads the configuration, merging the user file (if any) over the
    /// embedded defaults.
    pub fn load_config(directory: &str) -> Result<Config> {
        let config_dir = Self::find_config_dir(directory);
        let path = Path::new(&config_dir)
            .join(CONFIG_FILE)
            .to_string_lossy()
            .into_owned();

        let mut data: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        if Path::new(&path).exists() {
            let user_raw = fs::read_to_string(&path)?;
            let user: Value = serde_yaml::from_str(&user_raw)?;
            merge_values(&mut data, &user);
            info!(path = %path, "Loaded user configuration");
        }

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(data),
        })
    }

    /// Returns the directory holding the configuration file.
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Reads a value by dot-separated path (e.g. `"server.http_port"`).
    pub fn get_value(&self, path: &str) -> Result<Value> {
        let data = self.data.lock().expect("Config mutex poisoned");
        let mut current = &*data;
        for key in path.split('.') {
            current = current
                .get(key)
                .ok_or_else(|| anyhow!("Missing config key: {path}"))?;
        }
        Ok(current.clone())
    }

    /// Writes a value by dot-separated path and persists the file.
    pub fn set_value(&self, path: &str, value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().expect("Config mutex poisoned");
            let mut current = &mut *data;
            let keys: Vec<&str> = path.split('.').collect();
            for key in &keys[..keys.len() - 1] {
                if current.get(*key).is_none() {
                    if let Value::Mapping(map) = current {
                        map.insert(
                            Value::String(key.to_string()),
                            Value::Mapping(Default::default()),
                        );
                    }
                }
                current = current
                    .get_mut(*key)
                    .ok_or_else(|| anyhow!("Cannot descend into config key: {key}"))?;
            }
            let last = keys[keys.len() - 1];
            match current {
                Value::Mapping(map) => {
                    map.insert(Value::String(last.to_string()), value);
                }
                _ => return Err(anyhow!("Config key {path} is not a mapping")),
            }
        }
        self.save()
    }

    /// Persists the current document to the user config file.
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().expect("Config mutex poisoned");
        fs::create_dir_all(&self.config_dir)?;
        fs::write(&self.path, serde_yaml::to_string(&*data)?)?;
        Ok(())
    }

    fn get_string_or(&self, path: &str, default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => default.to_string(),
        }
    }

    fn get_u64_or(&self, path: &str, default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            _ => default,
        }
    }

    fn get_f64_or(&self, path: &str, default: f64) -> f64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_f64().unwrap_or(default),
            _ => default,
        }
    }

    /// Origin used to resolve `/`-prefixed source URIs.
    pub fn get_base_url(&self) -> String {
        self.get_string_or("server.base_url", DEFAULT_BASE_URL)
    }

    pub fn set_base_url(&self, url: &str) -> Result<()> {
        self.set_value("server.base_url", Value::String(url.to_string()))
    }

    pub fn get_http_port(&self) -> u16 {
        self.get_u64_or("server.http_port", DEFAULT_HTTP_PORT as u64) as u16
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value("server.http_port", Value::Number(Number::from(port)))
    }

    /// Interval of the playing tick, in milliseconds.
    pub fn get_tick_interval_ms(&self) -> u64 {
        self.get_u64_or("player.tick_interval_ms", DEFAULT_TICK_INTERVAL_MS)
    }

    pub fn set_tick_interval_ms(&self, ms: u64) -> Result<()> {
        self.set_value("player.tick_interval_ms", Value::Number(Number::from(ms)))
    }

    /// Playback backend kind: `"device"` or `"sim"`.
    pub fn get_backend(&self) -> String {
        self.get_string_or("player.backend", DEFAULT_BACKEND)
    }

    pub fn set_backend(&self, backend: &str) -> Result<()> {
        self.set_value("player.backend", Value::String(backend.to_string()))
    }

    /// Audio source the embed shell loads at startup, if configured.
    pub fn get_embed_source(&self) -> Option<String> {
        match self.get_value("embed.source") {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn set_embed_source(&self, source: &str) -> Result<()> {
        self.set_value("embed.source", Value::String(source.to_string()))
    }

    /// Duration reported by simulated sources, in seconds.
    pub fn get_sim_duration_secs(&self) -> f64 {
        self.get_f64_or("sim.duration_secs", DEFAULT_SIM_DURATION_SECS)
    }
}

/// Recursively merges `overlay` into `base`. Mappings merge key by key,
/// anything else is replaced.
fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, _) => *base_slot = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn defaults_apply_without_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        assert_eq!(config.get_http_port(), 8080);
        assert_eq!(config.get_tick_interval_ms(), 250);
        assert_eq!(config.get_backend(), "device");
        assert_eq!(config.get_embed_source(), None);
    }

    #[test]
    fn set_value_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        config.set_http_port(9000).unwrap();
        config.set_embed_source("/a.mp3").unwrap();

        let reloaded = config_in(&dir);
        assert_eq!(reloaded.get_http_port(), 9000);
        assert_eq!(reloaded.get_embed_source().as_deref(), Some("/a.mp3"));
    }

    #[test]
    fn typed_setters_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        config.set_base_url("http://media.local:9000").unwrap();
        config.set_tick_interval_ms(100).unwrap();
        config.set_backend("sim").unwrap();

        let reloaded = config_in(&dir);
        assert_eq!(reloaded.get_base_url(), "http://media.local:9000");
        assert_eq!(reloaded.get_tick_interval_ms(), 100);
        assert_eq!(reloaded.get_backend(), "sim");
    }

    #[test]
    fn user_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "player:\n  backend: \"sim\"\n",
        )
        .unwrap();
        let config = config_in(&dir);
        assert_eq!(config.get_backend(), "sim");
        // Untouched sections keep their defaults.
        assert_eq!(config.get_http_port(), 8080);
    }
}
