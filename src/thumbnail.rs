//! Thumbnail capture collaborator.
//!
//! Rendering the canvas is outside this crate. A [`ThumbnailProducer`]
//! returns an already-encoded image, or `None` when there is nothing to
//! capture. Sync treats it as best-effort.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::Result;

/// Prefix of a PNG data URL.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Produces an encoded thumbnail of the current graph.
#[async_trait]
pub trait ThumbnailProducer: Send + Sync {
    /// Captures a thumbnail, typically a [`png_data_url`].
    async fn capture(&self) -> Result<Option<String>>;
}

/// Producer that never captures anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThumbnail;

#[async_trait]
impl ThumbnailProducer for NoThumbnail {
    async fn capture(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Producer returning a fixed image.
#[derive(Debug, Clone)]
pub struct StaticThumbnail(String);

impl StaticThumbnail {
    /// Wraps raw PNG bytes.
    pub fn from_png(png: &[u8]) -> Self {
        Self(png_data_url(png))
    }
}

#[async_trait]
impl ThumbnailProducer for StaticThumbnail {
    async fn capture(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Encodes PNG bytes as a `data:` URL.
///
/// # Examples
///
/// ```
/// use flowsync::thumbnail::png_data_url;
///
/// assert_eq!(png_data_url(b"png"), "data:image/png;base64,cG5n");
/// ```
pub fn png_data_url(png: &[u8]) -> String {
    format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(png))
}

/// Decodes a PNG `data:` URL back to bytes.
///
/// Returns `None` if the prefix is missing or the payload is not base64.
pub fn decode_png_data_url(url: &str) -> Option<Vec<u8>> {
    let payload = url.strip_prefix(PNG_DATA_URL_PREFIX)?;
    STANDARD.decode(payload).ok()
}
