use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use tracing::info;

/// Where a model's files come from: a local directory or a Hugging Face hub repository.
pub enum ModelSource {
    Local(PathBuf),
    Hub { repo_id: String, repo: ApiRepo },
}

impl ModelSource {
    /// Opens `id` as a local directory when one exists, otherwise as a hub repository id.
    ///
    /// Ids written as paths (absolute, `./`, `../` or `~`) never fall back to the hub.
    #[tracing::instrument(level = "info")]
    pub fn open(id: &str, revision: &str) -> Result<Self> {
        let path = Path::new(id);
        if path.is_dir() {
            info!("Using local model directory {}", path.display());
            return Ok(ModelSource::Local(path.to_path_buf()));
        }
        if looks_like_path(id) {
            bail!("Model directory {id} does not exist");
        }

        let api = Api::new().context("Failed to create hub API")?;
        let repo = api.repo(Repo::with_revision(
            id.into(),
            RepoType::Model,
            revision.into(),
        ));
        info!("Using hub repository {id}@{revision}");
        Ok(ModelSource::Hub {
            repo_id: id.into(),
            repo,
        })
    }

    /// Returns the local path of `filename`, downloading it first for hub sources.
    pub fn get(&self, filename: &str) -> Result<PathBuf> {
        match self {
            ModelSource::Local(dir) => {
                let path = dir.join(filename);
                if !path.is_file() {
                    bail!("Missing {} in {}", filename, dir.display());
                }
                Ok(path)
            }
            ModelSource::Hub { repo_id, repo } => repo
                .get(filename)
                .with_context(|| format!("Failed to fetch {filename} from {repo_id}")),
        }
    }
}

fn looks_like_path(id: &str) -> bool {
    Path::new(id).is_absolute() || id.starts_with('.') || id.starts_with('~')
}
