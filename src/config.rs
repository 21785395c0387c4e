//! Configuration management for VaultScan.
//!
//! Settings come from an optional config file (TOML/JSON/YAML by extension)
//! with environment variables taking precedence. Secrets (AWS keys, the
//! vision API key) are environment-only and never read from config files.
//!
//! Feature enablement is resolved ONCE into [`Capabilities`] at startup;
//! nothing else in the pipeline checks environment state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sigv4::Credentials;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Runtime settings, fully resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bucket holding uploaded documents.
    pub bucket: Option<String>,
    pub region: String,
    /// Host override for S3-compatible storage.
    pub s3_endpoint: Option<String>,
    /// Host override for a Textract-compatible OCR endpoint.
    pub textract_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub vision_api_key: Option<String>,
    pub vision_model: String,
    /// Base URL override for OpenAI-compatible gateways.
    pub vision_endpoint: Option<String>,
    /// Timeout applied to outbound HTTP clients, in seconds.
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bucket: env_nonempty("VAULTSCAN_BUCKET").or_else(|| env_nonempty("S3_BUCKET")),
            region: env_nonempty("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            s3_endpoint: env_nonempty("VAULTSCAN_S3_ENDPOINT"),
            textract_endpoint: env_nonempty("VAULTSCAN_TEXTRACT_ENDPOINT"),
            aws_access_key_id: env_nonempty("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: env_nonempty("AWS_SECRET_ACCESS_KEY"),
            vision_api_key: env_nonempty("OPENAI_API_KEY"),
            vision_model: env_nonempty("VAULTSCAN_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            vision_endpoint: env_nonempty("VAULTSCAN_VISION_ENDPOINT"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// AWS credentials, when both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
            }),
            _ => None,
        }
    }

    /// Resolve which pipeline stages are enabled.
    pub fn capabilities(&self) -> Capabilities {
        let creds = self.credentials().is_some();
        Capabilities {
            storage: creds && self.bucket.is_some(),
            ocr: creds,
            vision: self.vision_api_key.is_some(),
        }
    }
}

/// Which pipeline stages the process can run, computed once at startup.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Capabilities {
    /// Object storage is configured (bucket + credentials).
    pub storage: bool,
    /// The OCR service can be called.
    pub ocr: bool,
    /// The vision fusion model can be called.
    pub vision: bool,
}

/// Config file structure. Every field is optional; secrets are not accepted
/// here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textract_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// Supports TOML, YAML, and JSON based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => {
                toml::from_str(&contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Look for a config file in the working directory.
    pub fn discover() -> Option<PathBuf> {
        for ext in ["toml", "json", "yaml", "yml"] {
            let path = PathBuf::from(format!("vaultscan.{}", ext));
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Apply file values underneath any environment-derived settings.
    /// Environment wins for values it already set.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if settings.bucket.is_none() {
            settings.bucket = self.bucket.clone();
        }
        if let Some(ref region) = self.region {
            if std::env::var("AWS_REGION").is_err() {
                settings.region = region.clone();
            }
        }
        if settings.s3_endpoint.is_none() {
            settings.s3_endpoint = self.s3_endpoint.clone();
        }
        if settings.textract_endpoint.is_none() {
            settings.textract_endpoint = self.textract_endpoint.clone();
        }
        if let Some(ref model) = self.vision_model {
            if std::env::var("VAULTSCAN_VISION_MODEL").is_err() {
                settings.vision_model = model.clone();
            }
        }
        if settings.vision_endpoint.is_none() {
            settings.vision_endpoint = self.vision_endpoint.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
    }
}

/// Load settings, merging an explicit or discovered config file with the
/// environment.
pub async fn load_settings(config_path: Option<&Path>) -> (Settings, Config) {
    let config = match config_path.map(Path::to_path_buf).or_else(Config::discover) {
        Some(path) => match Config::load_from_path(&path).await {
            Ok(config) => {
                tracing::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Config::default()
            }
        },
        None => Config::default(),
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    (settings, config)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
