//! Service configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::BackendKind;
use crate::error::{Error, Result};

/// Upper bound on total sequence length handed to every generation call.
pub const DEFAULT_MAX_LENGTH: usize = 1000;

/// Top-level configuration for a parley process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// One persona fact per line
    #[serde(default = "default_persona_file")]
    pub persona_file: PathBuf,

    /// One canned reply per line, used by the fallback backend
    #[serde(default = "default_fallback_file")]
    pub fallback_file: PathBuf,

    /// Cache directory for tokenizer files pulled from the model hub
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default)]
    pub load_policy: LoadPolicy,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            persona_file: default_persona_file(),
            fallback_file: default_fallback_file(),
            models_dir: default_models_dir(),
            max_length: default_max_length(),
            load_policy: LoadPolicy::default(),
            worker: WorkerConfig::default(),
            backends: default_backends(),
        }
    }
}

impl ServiceConfig {
    /// Read a JSON configuration file. Fields missing from the file keep their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: ServiceConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(Error::Config("max_length must be positive".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(Error::Config("Backend name must not be empty".to_string()));
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(Error::Config(format!(
                    "Backend '{}' is configured twice",
                    backend.name
                )));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// When backends are constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// All backends are built before the server accepts traffic.
    #[default]
    Eager,
    /// Each backend is built on its first request and memoized.
    Lazy,
}

/// Connection settings for the out-of-process generation worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Command line used to launch the worker when it is not already running.
    /// `--socket <socket_path>` is appended. `null` means the worker is
    /// managed externally.
    #[serde(default = "default_worker_command")]
    pub command: Option<Vec<String>>,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Read timeout for a single generation call
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            command: default_worker_command(),
            startup_timeout_secs: default_startup_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

/// One registered backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name used in `/api/model/{name}/interact/`
    pub name: String,

    pub kind: BackendKind,

    /// Overrides the catalog repository for model-backed kinds
    #[serde(default)]
    pub repo_id: Option<String>,

    /// Local directory with tokenizer files; skips the model hub when set
    #[serde(default)]
    pub tokenizer_dir: Option<PathBuf>,

    /// Run at most one generation at a time on this backend
    #[serde(default = "default_serialize")]
    pub serialize: bool,
}

impl BackendConfig {
    pub fn for_kind(kind: BackendKind) -> Self {
        Self {
            name: kind.default_name().to_string(),
            kind,
            repo_id: None,
            tokenizer_dir: None,
            serialize: default_serialize(),
        }
    }

    pub fn repo_id(&self) -> Option<&str> {
        self.repo_id.as_deref().or_else(|| self.kind.repo_id())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8010
}

fn default_persona_file() -> PathBuf {
    PathBuf::from("resources/personas.txt")
}

fn default_fallback_file() -> PathBuf {
    PathBuf::from("resources/degraded_random_responses_filtered.txt")
}

fn default_models_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("PARLEY_MODELS_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("models")
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/parley_generation_worker.sock")
}

fn default_worker_command() -> Option<Vec<String>> {
    Some(vec![
        "python3".to_string(),
        "scripts/generation_worker.py".to_string(),
    ])
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_read_timeout_secs() -> u64 {
    300
}

fn default_serialize() -> bool {
    true
}

fn default_backends() -> Vec<BackendConfig> {
    BackendKind::all()
        .iter()
        .copied()
        .map(BackendConfig::for_kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_register_every_known_backend() {
        let config = ServiceConfig::default();
        let names: Vec<&str> = config.backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "qc",
                "bart",
                "dialogpt",
                "vanilla_dialogpt",
                "vanilla_blenderbot_small"
            ]
        );
        assert_eq!(config.bind_addr(), "0.0.0.0:8010");
        assert_eq!(config.max_length, 1000);
        assert_eq!(config.load_policy, LoadPolicy::Eager);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.json");
        fs::write(
            &path,
            r#"{"port": 9000, "load_policy": "lazy",
                "backends": [{"name": "qc", "kind": "fallback"},
                             {"name": "gpt", "kind": "persona_gpt", "serialize": false}]}"#,
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.load_policy, LoadPolicy::Lazy);
        assert_eq!(config.backends.len(), 2);
        assert!(!config.backends[1].serialize);
        assert_eq!(config.backends[1].repo_id(), Some("af1tang/personaGPT"));
    }

    #[test]
    fn worker_command_defaults_to_bundled_script() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.worker.command.as_deref(),
            Some(&["python3".to_string(), "scripts/generation_worker.py".to_string()][..])
        );

        let external: WorkerConfig = serde_json::from_str(r#"{"command": null}"#).unwrap();
        assert_eq!(external.command, None);
        let omitted: WorkerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(omitted.command, config.worker.command);
    }

    #[test]
    fn bundled_worker_script_ships_with_the_workspace() {
        let script = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join(&default_worker_command().unwrap()[1]);
        assert!(script.is_file(), "missing {script:?}");
    }

    #[test]
    fn duplicate_backend_names_are_rejected() {
        let mut config = ServiceConfig::default();
        config.backends.push(BackendConfig::for_kind(BackendKind::Fallback));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
