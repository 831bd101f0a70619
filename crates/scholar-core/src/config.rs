use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ScholarError};

/// Top-level configuration for the Scholar recommender.
///
/// Loaded from `~/.scholar/config.toml` by default. Every section falls back
/// to its defaults when omitted, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScholarConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl ScholarConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScholarConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.recommend.default_top_k == 0 {
            return Err(ScholarError::Config(
                "recommend.default_top_k must be at least 1".to_string(),
            ));
        }
        if self.recommend.max_top_k < self.recommend.default_top_k {
            return Err(ScholarError::Config(format!(
                "recommend.max_top_k ({}) is below recommend.default_top_k ({})",
                self.recommend.max_top_k, self.recommend.default_top_k
            )));
        }
        for name in [&self.store.embeddings_file, &self.store.metadata_file] {
            let mut parts = Path::new(name).components();
            if !matches!(
                (parts.next(), parts.next()),
                (Some(Component::Normal(_)), None)
            ) {
                return Err(ScholarError::Config(format!(
                    "store file name '{}' must be a plain file name",
                    name
                )));
            }
        }
        if self.encoder.max_tokens == 0 {
            return Err(ScholarError::Config(
                "encoder.max_tokens must be positive".to_string(),
            ));
        }
        if self.encoder.backend == EncoderBackend::Mock && self.encoder.dimensions == 0 {
            return Err(ScholarError::Config(
                "encoder.dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Location of the persisted embedding matrix and its metadata.
///
/// The two files are one unit: they are produced by the same build run and
/// always read together. Builds are published under `dir` as generations;
/// the file names are used inside each generation directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store directory.
    pub dir: String,
    /// File name of the `(N, D)` embedding matrix (`.npy`).
    pub embeddings_file: String,
    /// File name of the JSON metadata array.
    pub metadata_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: "model/artifacts".to_string(),
            embeddings_file: "faculty_embeddings.npy".to_string(),
            metadata_file: "faculty_meta.json".to_string(),
        }
    }
}

/// Which text-to-vector backend to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderBackend {
    /// Sentence-transformer ONNX export run through ONNX Runtime.
    #[default]
    Onnx,
    /// Deterministic hash vectors; for tests and offline demos.
    Mock,
}

/// Query encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub backend: EncoderBackend,
    /// Directory containing `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Human-readable model name, reported in logs.
    pub model_name: String,
    /// Vector dimension produced by the mock backend.
    pub dimensions: usize,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
    /// Longer inputs are truncated to this many tokens before inference.
    pub max_tokens: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            backend: EncoderBackend::Onnx,
            model_dir: "model/all-mpnet-base-v2".to_string(),
            model_name: "all-mpnet-base-v2".to_string(),
            dimensions: 768,
            intra_threads: 1,
            max_tokens: 384,
        }
    }
}

/// Recommendation call defaults and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Number of results when the caller does not ask for a specific count.
    pub default_top_k: usize,
    /// Largest `top_k` a caller may request.
    pub max_top_k: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second accepted on the recommend and admin routes.
    pub rate_limit_per_sec: u64,
    /// Bearer token for the admin routes. Read from `admin_token_file`, or
    /// generated there, when unset.
    pub admin_token: Option<String>,
    /// Where the admin token is kept. Defaults to `admin_token` next to the
    /// configuration file.
    pub admin_token_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            rate_limit_per_sec: 100,
            admin_token: None,
            admin_token_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ScholarConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.store.dir, "model/artifacts");
        assert_eq!(config.store.embeddings_file, "faculty_embeddings.npy");
        assert_eq!(config.store.metadata_file, "faculty_meta.json");
        assert_eq!(config.encoder.backend, EncoderBackend::Onnx);
        assert_eq!(config.encoder.model_name, "all-mpnet-base-v2");
        assert_eq!(config.encoder.dimensions, 768);
        assert_eq!(config.recommend.default_top_k, 5);
        assert_eq!(config.recommend.max_top_k, 20);
        assert_eq!(config.server.port, 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[general]
log_level = "debug"

[store]
dir = "/srv/scholar"

[encoder]
backend = "mock"
dimensions = 32

[recommend]
default_top_k = 3
max_top_k = 10

[server]
port = 9100
"#,
        );

        let config = ScholarConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.store.dir, "/srv/scholar");
        assert_eq!(config.store.metadata_file, "faculty_meta.json");
        assert_eq!(config.encoder.backend, EncoderBackend::Mock);
        assert_eq!(config.encoder.dimensions, 32);
        assert_eq!(config.recommend.default_top_k, 3);
        assert_eq!(config.recommend.max_top_k, 10);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[server]\nport = 8123\n");
        let config = ScholarConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.recommend.default_top_k, 5);
        assert_eq!(config.encoder.backend, EncoderBackend::Onnx);
    }

    #[test]
    fn test_load_rejects_inverted_top_k_bounds() {
        let file = create_temp_config("[recommend]\ndefault_top_k = 10\nmax_top_k = 4\n");
        let err = ScholarConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ScholarError::Config(_)));
    }

    #[test]
    fn test_load_rejects_zero_default_top_k() {
        let file = create_temp_config("[recommend]\ndefault_top_k = 0\n");
        assert!(ScholarConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_backend() {
        let file = create_temp_config("[encoder]\nbackend = \"gpu-magic\"\n");
        assert!(matches!(
            ScholarConfig::load(file.path()),
            Err(ScholarError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ScholarConfig::default();
        config.store.dir = "/data/store".to_string();
        config.encoder.backend = EncoderBackend::Mock;
        config.save(&path).unwrap();

        let reloaded = ScholarConfig::load(&path).unwrap();
        assert_eq!(reloaded.store.dir, "/data/store");
        assert_eq!(reloaded.encoder.backend, EncoderBackend::Mock);
    }

    #[test]
    fn test_store_file_names_must_be_plain() {
        let mut config = ScholarConfig::default();
        config.store.metadata_file = "../meta.json".to_string();
        assert!(config.validate().is_err());

        config.store.metadata_file = String::new();
        assert!(config.validate().is_err());

        config.store.metadata_file = "meta.json".to_string();
        assert!(config.validate().is_ok());
    }
}
