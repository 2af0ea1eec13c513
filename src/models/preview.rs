use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;

/// Longest edge of a generated thumbnail, in pixels.
pub const PREVIEW_EDGE: u32 = 256;

/// Thumbnail handle for a submitted image.
///
/// Acquired when the job is submitted and released when the job leaves the
/// store. Images the decoder cannot read still get a handle, just an empty one.
#[derive(Debug, Clone, Default)]
pub struct Preview {
    png: Option<Arc<[u8]>>,
}

impl Preview {
    /// Decodes `bytes` and renders a PNG thumbnail.
    ///
    /// CPU bound; callers on the async runtime should run it through
    /// `spawn_blocking`.
    pub fn generate(bytes: &[u8]) -> Self {
        match render_thumbnail(bytes) {
            Ok(png) => Self {
                png: Some(Arc::from(png)),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Preview unavailable for image");
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self { png: None }
    }

    pub fn png(&self) -> Option<Arc<[u8]>> {
        self.png.clone()
    }

    pub fn is_available(&self) -> bool {
        self.png.is_some()
    }

    /// Bytes held by this handle.
    pub fn size_bytes(&self) -> usize {
        self.png.as_ref().map_or(0, |png| png.len())
    }
}

fn render_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let thumbnail = decoded.thumbnail(PREVIEW_EDGE, PREVIEW_EDGE);

    let mut out = Cursor::new(Vec::new());
    thumbnail.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
