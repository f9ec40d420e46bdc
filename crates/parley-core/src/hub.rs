//! Tokenizer files from the HuggingFace Hub.

use std::path::{Path, PathBuf};

use hf_hub::api::sync::{Api, ApiBuilder};
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// Files describing a tokenizer. Only one of `tokenizer.json` or the
/// `vocab.json` + `merges.txt` pair has to exist.
const TOKENIZER_FILES: [&str; 6] = [
    "tokenizer.json",
    "vocab.json",
    "merges.txt",
    "added_tokens.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
];

/// Directory holding the backend's tokenizer files.
///
/// A configured `tokenizer_dir` is used as-is; otherwise the files are pulled
/// into the hub cache under `models_dir`.
pub fn resolve_tokenizer_dir(
    backend: &BackendConfig,
    repo_id: &str,
    models_dir: &Path,
) -> Result<PathBuf> {
    if let Some(dir) = &backend.tokenizer_dir {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Tokenizer directory {:?} for backend '{}' does not exist",
                dir, backend.name
            )));
        }
        return Ok(dir.clone());
    }

    std::fs::create_dir_all(models_dir)?;
    let api = ApiBuilder::new()
        .with_cache_dir(models_dir.to_path_buf())
        .with_progress(false)
        .build()
        .map_err(|e| Error::HfHub(e.to_string()))?;

    fetch_tokenizer_files(&api, repo_id)
}

fn fetch_tokenizer_files(api: &Api, repo_id: &str) -> Result<PathBuf> {
    info!("Fetching tokenizer files for {}", repo_id);
    let repo = api.model(repo_id.to_string());

    let mut snapshot_dir: Option<PathBuf> = None;
    for file in TOKENIZER_FILES {
        match repo.get(file) {
            Ok(path) => {
                debug!("Cached {} at {:?}", file, path);
                if snapshot_dir.is_none() {
                    snapshot_dir = path.parent().map(Path::to_path_buf);
                }
            }
            // Repositories ship different subsets of these files.
            Err(e) => debug!("{} not available for {}: {}", file, repo_id, e),
        }
    }

    let dir = snapshot_dir.ok_or_else(|| {
        Error::HfHub(format!("No tokenizer files could be fetched for {repo_id}"))
    })?;

    let has_tokenizer = dir.join("tokenizer.json").exists()
        || (dir.join("vocab.json").exists() && dir.join("merges.txt").exists());
    if !has_tokenizer {
        return Err(Error::HfHub(format!(
            "{repo_id} provides neither tokenizer.json nor vocab.json + merges.txt"
        )));
    }

    Ok(dir)
}
