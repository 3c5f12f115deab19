// Configuration - TOML file with per-field defaults, then environment overrides

use imagent::{DevicePreference, GenerationLimits, LoadOptions, StableDiffusionVersion};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched in the working directory
pub const LOCAL_CONFIG_FILE: &str = "imagent-studio.toml";

/// File name searched in the home directory
pub const HOME_CONFIG_FILE: &str = ".imagent-studio.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: `{value}`")]
    Env { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which pipeline backend the server loads at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Candle Stable Diffusion with weights from the model hub
    #[default]
    StableDiffusion,
    /// Deterministic placeholder images, no model download
    Preview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub generation: GenerationLimits,
    #[serde(default)]
    pub storage: StorageSettings,

    /// Hub token, only ever taken from the environment
    #[serde(skip)]
    pub hf_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Size of the recent-generations gallery
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Largest accepted request body, base64 uploads included
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub version: StableDiffusionVersion,

    /// Hub repository; the version's repository when unset
    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub device: DevicePreference,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub safety_checker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Defaults

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_recent_limit() -> usize {
    6
}

fn default_max_upload_mb() -> usize {
    20
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs/generated")
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            recent_limit: default_recent_limit(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            version: StableDiffusionVersion::default(),
            model_id: None,
            device: DevicePreference::default(),
            cache_dir: None,
            safety_checker: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            model: ModelSettings::default(),
            generation: GenerationLimits::default(),
            storage: StorageSettings::default(),
            hf_token: None,
        }
    }
}

impl StudioConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// First existing file of: `explicit`, `./imagent-studio.toml`,
    /// `~/.imagent-studio.toml`. An explicit path must exist.
    pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Ok(Some(local));
        }

        Ok(dirs::home_dir()
            .map(|home| home.join(HOME_CONFIG_FILE))
            .filter(|path| path.is_file()))
    }

    /// Locate and read the config file (built-in defaults when none exists),
    /// apply environment overrides and validate the result.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let source = Self::locate(explicit)?;
        let mut config = match &source {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok((config, source))
    }

    /// Apply `IMAGENT_HOST`, `IMAGENT_PORT`, `IMAGENT_OUTPUT_DIR` and
    /// `HF_TOKEN` from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("IMAGENT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("IMAGENT_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "IMAGENT_PORT".into(),
                value: port.clone(),
            })?;
        }
        if let Some(dir) = get("IMAGENT_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(dir);
        }
        if let Some(token) = get("HF_TOKEN") {
            self.hf_token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generation
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if self.server.recent_limit == 0 {
            return Err(ConfigError::Invalid("server.recent_limit must be at least 1".into()));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::Invalid("server.max_upload_mb must be at least 1".into()));
        }
        if self.storage.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.output_dir must not be empty".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }

    /// Options for loading the Stable Diffusion backend
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            version: self.model.version,
            model_id: self.model.model_id.clone(),
            device: self.model.device,
            cache_dir: self.model.cache_dir.clone(),
            hf_token: self.hf_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StudioConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.server.recent_limit, 6);
        assert_eq!(config.storage.output_dir, PathBuf::from("outputs/generated"));
        assert_eq!(config.model.backend, BackendKind::StableDiffusion);
        assert!(config.model.model_id.is_none());
        assert_eq!(config.model.version.repo(), "runwayml/stable-diffusion-v1-5");
        assert!(!config.model.safety_checker);
        assert_eq!(config.generation.defaults.steps, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_matches_defaults() {
        let config = StudioConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.generation, GenerationLimits::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = StudioConfig::from_toml(
            r#"
            [server]
            port = 9000

            [model]
            backend = "preview"
            device = "cpu"
            version = "v2-1"

            [generation.bounds]
            max_steps = 50

            [storage]
            output_dir = "/tmp/images"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.backend, BackendKind::Preview);
        assert_eq!(config.model.device, DevicePreference::Cpu);
        assert_eq!(config.model.version, StableDiffusionVersion::V2_1);
        assert_eq!(config.generation.bounds.max_steps, 50);
        assert_eq!(config.generation.bounds.min_steps, 1);
        assert_eq!(config.storage.output_dir, PathBuf::from("/tmp/images"));
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config =
            StudioConfig::from_toml(include_str!("../config/imagent-studio.example.toml")).unwrap();
        let defaults = StudioConfig::default();
        assert_eq!(config.generation, defaults.generation);
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.storage.output_dir, defaults.storage.output_dir);
        assert_eq!(config.model.backend, BackendKind::StableDiffusion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(StudioConfig::from_toml("[model]\nbackend = \"remote\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StudioConfig::default();
        config
            .apply_overrides(env(&[
                ("IMAGENT_HOST", "0.0.0.0"),
                ("IMAGENT_PORT", "8080"),
                ("IMAGENT_OUTPUT_DIR", "/data/out"),
                ("HF_TOKEN", "hf_abc"),
            ]))
            .unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.storage.output_dir, PathBuf::from("/data/out"));
        assert_eq!(config.load_options().hf_token.as_deref(), Some("hf_abc"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = StudioConfig::default();
        config
            .apply_overrides(env(&[("IMAGENT_PORT", " "), ("HF_TOKEN", "")]))
            .unwrap();
        assert_eq!(config.server.port, 7860);
        assert!(config.hf_token.is_none());
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = StudioConfig::default();
        let err = config
            .apply_overrides(env(&[("IMAGENT_PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = StudioConfig::default();
        config.generation.bounds.min_steps = 80;
        config.generation.bounds.max_steps = 20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = StudioConfig::default();
        config.server.recent_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = StudioConfig::locate(Some(Path::new("/nonexistent/imagent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.toml");
        std::fs::write(&path, "[server]\nrecent_limit = 12\n").unwrap();

        let config = StudioConfig::from_file(&path).unwrap();
        assert_eq!(config.server.recent_limit, 12);
        assert_eq!(StudioConfig::locate(Some(&path)).unwrap(), Some(path.clone()));

        std::fs::write(&path, "[server\n").unwrap();
        assert!(matches!(
            StudioConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
