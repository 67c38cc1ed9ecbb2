use crate::error::IconError;
use image::DynamicImage;
use log::warn;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

static DEFAULT_ICON_BYTES: &[u8] = include_bytes!("../../assets/default-icon.png");

static DEFAULT_ICON: Lazy<Icon> = Lazy::new(|| {
    match Icon::from_bytes(DEFAULT_ICON_BYTES, IconSource::Bundled) {
        Ok(icon) => icon,
        Err(e) => {
            // Only reachable if the bundled asset is corrupted at build time.
            warn!("Bundled default icon failed to decode, using a blank icon: {}", e);
            let blank = DynamicImage::new_rgba8(64, 64);
            Icon::from_image(blank, IconSource::Bundled)
        }
    }
});

/// Where an icon came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    Bundled,
    File(PathBuf),
    Url(Url),
    Memory,
}

/// Rendering mode, mirroring the usual toolkit icon modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconMode {
    Normal,
    Disabled,
    Active,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconState {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An immutable, cheaply clonable icon.
///
/// Two icons are equal when their content keys are equal, i.e. they were decoded
/// from the same bytes.
#[derive(Clone)]
pub struct Icon {
    inner: Arc<IconInner>,
}

struct IconInner {
    key: u64,
    source: IconSource,
    image: DynamicImage,
}

impl Icon {
    /// The bundled default icon. Every call returns the same shared instance.
    pub fn default_icon() -> Icon {
        DEFAULT_ICON.clone()
    }

    /// Decode an icon from encoded image bytes (PNG, JPEG, GIF, ICO, BMP).
    pub fn from_bytes(bytes: &[u8], source: IconSource) -> Result<Icon, IconError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self {
            inner: Arc::new(IconInner {
                key: content_key(bytes),
                source,
                image,
            }),
        })
    }

    /// Load an icon from a local file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Icon, IconError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, IconSource::File(path.to_path_buf()))
    }

    fn from_image(image: DynamicImage, source: IconSource) -> Icon {
        Self {
            inner: Arc::new(IconInner {
                key: content_key(image.as_bytes()),
                source,
                image,
            }),
        }
    }

    /// Stable identity of the icon content, used to build cache file names.
    pub fn cache_key(&self) -> u64 {
        self.inner.key
    }

    pub fn source(&self) -> &IconSource {
        &self.inner.source
    }

    pub fn image(&self) -> &DynamicImage {
        &self.inner.image
    }

    pub fn is_default(&self) -> bool {
        Arc::ptr_eq(&self.inner, &DEFAULT_ICON.inner)
    }

    /// Render the icon scaled to fit inside `size`, keeping its aspect ratio.
    pub fn render(&self, size: Size, mode: IconMode, _state: IconState) -> DynamicImage {
        let image = &self.inner.image;
        let scaled = if image.width() > size.width || image.height() > size.height {
            image.resize(size.width, size.height, image::imageops::FilterType::Lanczos3)
        } else {
            image.clone()
        };

        // Single-pixmap icons have no separate On/Off artwork.
        match mode {
            IconMode::Disabled => DynamicImage::ImageLumaA8(scaled.to_luma_alpha8()),
            IconMode::Normal | IconMode::Active | IconMode::Selected => scaled,
        }
    }
}

impl PartialEq for Icon {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for Icon {}

impl std::fmt::Debug for Icon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Icon")
            .field("key", &self.inner.key)
            .field("source", &self.inner.source)
            .field("width", &self.inner.image.width())
            .field("height", &self.inner.image.height())
            .finish()
    }
}

impl Default for Icon {
    fn default() -> Self {
        Self::default_icon()
    }
}

/// First 8 bytes of the SHA-256 of `bytes`. Stable across builds, so cached file
/// names stay valid.
fn content_key(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut key = [0u8; 8];
    key.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(key)
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}
