//! CLI argument definitions for the Scholar application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use scholar_core::config::ScholarConfig;

/// Scholar - semantic faculty search over precomputed profile embeddings.
#[derive(Parser, Debug)]
#[command(name = "scholar", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the embedding matrix and metadata files.
    #[arg(short = 's', long = "store-dir", global = true)]
    pub store_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve recommendations over HTTP (the default).
    Serve(ServeArgs),
    /// Ask for recommendations from the terminal.
    Query(QueryArgs),
    /// Embed a corpus file and write a fresh vector store.
    Build(BuildArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct QueryArgs {
    /// Query text. Reads queries from stdin until `exit` when omitted.
    pub text: Option<String>,

    /// Number of results.
    #[arg(short = 'k', long = "top-k")]
    pub top_k: Option<usize>,

    /// Only return this category (faculty, adjunct, ...).
    #[arg(long = "category")]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct BuildArgs {
    /// Corpus JSON file produced by the crawler.
    pub corpus: PathBuf,
}

impl CliArgs {
    /// The subcommand to run; `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SCHOLAR_CONFIG env var > ~/.scholar/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SCHOLAR_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the store directory.
    ///
    /// Priority: --store-dir flag > SCHOLAR_STORE_DIR env var.
    /// Returns `None` if neither is set (use the config value).
    pub fn resolve_store_dir(&self) -> Option<String> {
        if let Some(ref p) = self.store_dir {
            return Some(p.to_string_lossy().to_string());
        }
        std::env::var("SCHOLAR_STORE_DIR").ok()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > SCHOLAR_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(Command::Serve(ServeArgs { port: Some(p) })) = &self.command {
            return *p;
        }
        std::env::var("SCHOLAR_PORT")
            .ok()
            .and_then(|val| val.parse::<u16>().ok())
            .unwrap_or(config_port)
    }

    /// Apply flag and environment overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut ScholarConfig) {
        if let Some(dir) = self.resolve_store_dir() {
            config.store.dir = dir;
        }
        config.server.port = self.resolve_port(config.server.port);
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Ok(token) = std::env::var("SCHOLAR_ADMIN_TOKEN") {
            config.server.admin_token = Some(token);
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".scholar").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".scholar").join("config.toml");
    }
    PathBuf::from("config.toml")
}
