use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::{ArtifactError, ArtifactStore, ByteStream};

/// Filesystem-based artifact store.
///
/// Each artifact is stored at `{base_path}/{key}`. Parent directories are
/// created on write. Writes go to a temporary sibling first and are renamed
/// into place, so a failed run never leaves a half-written image at `key`.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn key_to_path(&self, key: &str) -> Result<PathBuf, ArtifactError> {
    let relative = Path::new(key);
    let valid = !key.is_empty()
      && relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !valid {
      return Err(ArtifactError::InvalidKey(key.to_string()));
    }
    Ok(self.base_path.join(relative))
  }
}

async fn write_stream(mut file: File, mut data: ByteStream) -> Result<(), ArtifactError> {
  while let Some(chunk) = data.next().await {
    file.write_all(&chunk?).await?;
  }
  file.flush().await?;
  Ok(())
}

#[async_trait]
impl ArtifactStore for FsStore {
  async fn put(&self, key: &str, data: ByteStream, _content_type: &str) -> Result<(), ArtifactError> {
    let path = self.key_to_path(key)?;

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut partial = path.clone().into_os_string();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let file = File::create(&partial).await?;
    let written = match write_stream(file, data).await {
      Ok(()) => fs::rename(&partial, &path).await.map_err(ArtifactError::from),
      Err(e) => Err(e),
    };

    if written.is_err() {
      let _ = fs::remove_file(&partial).await;
    }
    written
  }

  fn locate(&self, key: &str) -> Result<PathBuf, ArtifactError> {
    self.key_to_path(key)
  }
}
