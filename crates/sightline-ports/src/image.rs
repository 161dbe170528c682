use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::PortError;

/// Reference to the input image of a run.
///
/// The local file is always required: it is what the final artifact is drawn
/// on. Remote services receive `url` when present, otherwise the file inlined
/// as a base64 data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
  path: PathBuf,
  url: Option<String>,
}

impl ImageRef {
  pub fn local(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      url: None,
    }
  }

  /// Attach a publicly reachable URL for the same image.
  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn url(&self) -> Option<&str> {
    self.url.as_deref()
  }

  /// Read the raw bytes of the local file.
  pub async fn read_bytes(&self) -> Result<Vec<u8>, PortError> {
    tokio::fs::read(&self.path)
      .await
      .map_err(|e| PortError::Image {
        path: self.path.display().to_string(),
        source: e,
      })
  }

  /// The string remote services should receive for this image.
  pub async fn remote_reference(&self) -> Result<String, PortError> {
    match &self.url {
      Some(url) => Ok(url.clone()),
      None => {
        let bytes = self.read_bytes().await?;
        Ok(format!(
          "data:{};base64,{}",
          self.mime_type(),
          STANDARD.encode(bytes)
        ))
      }
    }
  }

  /// MIME type guessed from the file extension.
  pub fn mime_type(&self) -> &'static str {
    let ext = self
      .path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
      Some("png") => "image/png",
      Some("gif") => "image/gif",
      Some("webp") => "image/webp",
      Some("bmp") => "image/bmp",
      _ => "image/jpeg",
    }
  }
}
