//! Pre-upload image transform
//!
//! Re-encodes raster images to WebP before upload when enabled. Any
//! decode or encode failure falls back silently to the original bytes;
//! the transform never blocks the async runtime (decode/encode run on a
//! blocking worker).

use std::path::Path;
use tracing::debug;

/// A re-encoded source ready for upload under a new name
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Re-encode `path` to WebP at `quality` (0-1), or `None` when the file
/// is not a convertible raster image or the transform fails
pub async fn maybe_reencode(path: &Path, quality: f32) -> Option<TransformedImage> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE || mime.subtype() == "webp" {
        return None;
    }

    let stem = path.file_stem()?.to_str()?.to_string();
    if stem.is_empty() {
        return None;
    }

    let source = path.to_path_buf();
    let encoded = tokio::task::spawn_blocking(move || -> Option<Vec<u8>> {
        // image::open rejects vector formats (svg) and corrupt files,
        // both of which fall through to the original bytes
        let img = image::open(&source).ok()?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
        Some(encoder.encode(quality * 100.0).to_vec())
    })
    .await
    .ok()
    .flatten();

    match encoded {
        Some(data) => Some(TransformedImage { file_name: format!("{stem}.webp"), data }),
        None => {
            debug!(path = %path.display(), "image transform skipped, uploading original");
            None
        }
    }
}
