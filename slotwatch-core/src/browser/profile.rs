use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::error::{BrowserError, BrowserResult};

/// Throwaway Chromium user-data directory, one per browser session.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    id: String,
    path: PathBuf,
}

impl BrowserProfile {
    pub fn allocate(base_dir: &Path) -> BrowserResult<Self> {
        let id = Uuid::new_v4().to_string();
        let path = base_dir.join(&id);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Launch(format!("failed to create profile dir: {err}")))?;
        Ok(Self { id, path })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(&self) {
        if let Err(err) = tokio::fs::remove_dir_all(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove browser profile");
        }
    }
}
