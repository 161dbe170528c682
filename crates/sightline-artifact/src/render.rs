use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::Serialize;
use sightline_detection::DetectedObject;
use tracing::debug;

use crate::{ArtifactError, ArtifactStore};

/// What ended up in the output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactKind {
  /// The input image with the detected boxes drawn on it.
  Annotated { objects: Vec<DetectedObject> },
  /// Nothing was detected; the input image, byte for byte.
  Original,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalArtifact {
  pub path: PathBuf,
  #[serde(flatten)]
  pub kind: ArtifactKind,
  /// Labels that were sent to detection.
  pub labels: Vec<String>,
}

impl FinalArtifact {
  pub fn is_annotated(&self) -> bool {
    matches!(self.kind, ArtifactKind::Annotated { .. })
  }
}

const PALETTE: [Rgb<u8>; 6] = [
  Rgb([230, 25, 75]),
  Rgb([60, 180, 75]),
  Rgb([0, 130, 200]),
  Rgb([245, 130, 48]),
  Rgb([145, 30, 180]),
  Rgb([255, 225, 25]),
];

/// MIME type for an output path, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
  match ImageFormat::from_path(path) {
    Ok(ImageFormat::Png) => "image/png",
    Ok(ImageFormat::Jpeg) => "image/jpeg",
    Ok(ImageFormat::WebP) => "image/webp",
    Ok(ImageFormat::Gif) => "image/gif",
    Ok(ImageFormat::Bmp) => "image/bmp",
    Ok(ImageFormat::Tiff) => "image/tiff",
    _ => "application/octet-stream",
  }
}

/// Write the final image for a run under `key`.
///
/// With no objects the original bytes are stored untouched and
/// [`ArtifactKind::Original`] is returned. Otherwise the image is decoded,
/// every box is outlined, and the result is encoded in the format implied
/// by `key` (falling back to the input's own format).
pub async fn render_detections(
  store: &dyn ArtifactStore,
  key: &str,
  original: Bytes,
  objects: &[DetectedObject],
) -> Result<ArtifactKind, ArtifactError> {
  let content_type = content_type_for(Path::new(key));

  if objects.is_empty() {
    debug!(key = %key, "artifact_original");
    store.put_bytes(key, original, content_type).await?;
    return Ok(ArtifactKind::Original);
  }

  let format = match ImageFormat::from_path(key) {
    Ok(format) => format,
    Err(_) => image::guess_format(&original)?,
  };
  let encoded = annotate(&original, objects, format)?;

  debug!(key = %key, objects = objects.len(), "artifact_annotated");
  store.put_bytes(key, Bytes::from(encoded), content_type).await?;

  Ok(ArtifactKind::Annotated {
    objects: objects.to_vec(),
  })
}

fn annotate(
  original: &[u8],
  objects: &[DetectedObject],
  format: ImageFormat,
) -> Result<Vec<u8>, ArtifactError> {
  let mut canvas = image::load_from_memory(original)?.to_rgb8();
  let thickness = (canvas.width().min(canvas.height()) / 200).max(2);

  let mut categories: Vec<&str> = Vec::new();
  for object in objects {
    let index = match categories.iter().position(|c| *c == object.category) {
      Some(i) => i,
      None => {
        categories.push(&object.category);
        categories.len() - 1
      }
    };
    // mask-only objects have nothing to outline
    if let Some(bbox) = object.bbox {
      draw_box(&mut canvas, bbox, PALETTE[index % PALETTE.len()], thickness);
    }
  }

  let mut out = Cursor::new(Vec::new());
  DynamicImage::ImageRgb8(canvas).write_to(&mut out, format)?;
  Ok(out.into_inner())
}

/// Outline `bbox` (`[x1, y1, x2, y2]`), clamped to the canvas.
fn draw_box(canvas: &mut RgbImage, bbox: [f64; 4], color: Rgb<u8>, thickness: u32) {
  let (width, height) = canvas.dimensions();
  if width == 0 || height == 0 || bbox.iter().any(|v| !v.is_finite()) {
    return;
  }

  let clamp = |v: f64, max: u32| v.round().clamp(0.0, f64::from(max - 1)) as u32;
  let x0 = clamp(bbox[0].min(bbox[2]), width);
  let x1 = clamp(bbox[0].max(bbox[2]), width);
  let y0 = clamp(bbox[1].min(bbox[3]), height);
  let y1 = clamp(bbox[1].max(bbox[3]), height);

  for t in 0..thickness {
    let top = (y0 + t).min(y1);
    let bottom = y1.saturating_sub(t).max(y0);
    let left = (x0 + t).min(x1);
    let right = x1.saturating_sub(t).max(x0);

    for x in x0..=x1 {
      canvas.put_pixel(x, top, color);
      canvas.put_pixel(x, bottom, color);
    }
    for y in y0..=y1 {
      canvas.put_pixel(left, y, color);
      canvas.put_pixel(right, y, color);
    }
  }
}
