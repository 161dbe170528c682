//! Sightline Artifact
//!
//! Storage for the images a pipeline run produces. The [`ArtifactStore`]
//! trait is the backend layer; [`FsStore`] keeps artifacts as files under a
//! base directory. [`render_detections`] turns the original image plus the
//! detected objects into the final artifact.
//!
//! Data moves as byte streams so large images are never required to sit in
//! memory twice.

mod fs;
mod render;

pub use fs::FsStore;
pub use render::{ArtifactKind, FinalArtifact, content_type_for, render_detections};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for artifact data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ArtifactError>> + Send>>;

/// Error type for artifact operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
  /// Keys are relative paths without `..` components.
  #[error("invalid artifact key '{0}'")]
  InvalidKey(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The input image could not be decoded or the output encoded.
  #[error("image error: {0}")]
  Image(#[from] image::ImageError),
}

/// Artifact storage trait.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
  /// Store an artifact, replacing any previous one under `key`.
  async fn put(&self, key: &str, data: ByteStream, content_type: &str) -> Result<(), ArtifactError>;

  /// Where the artifact for `key` lives, as reported to the caller.
  fn locate(&self, key: &str) -> Result<std::path::PathBuf, ArtifactError>;

  /// Store a buffer that is already in memory.
  async fn put_bytes(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ArtifactError> {
    self.put(key, once(data), content_type).await
  }
}

fn once(data: Bytes) -> ByteStream {
  Box::pin(futures::stream::once(async move { Ok(data) }))
}
