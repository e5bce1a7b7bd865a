//! Backing image of a sprite sheet sequence.
//!
//! One resource type covers every load strategy. A resource is either
//! unloaded or holds its decoded atlas; [`ImageResource::instance`]
//! materializes it and [`ImageResource::release`] drops the pixels again
//! when the strategy allows it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbaImage;
use log::debug;
use serde::{Deserialize, Serialize};

use super::SheetError;

/// How sprite sheets are loaded during preload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum LoadStrategy {
    /// Decode immediately and keep forever
    Eager,
    /// Decode on first use and keep forever
    Lazy,
    /// Decode from disk on use, release when replaced
    HotLoad,
    /// Keep encoded bytes in memory, decode on use, release when replaced
    #[default]
    MemoryHotLoad,
}

#[derive(Debug)]
enum ImageSource {
    File(PathBuf),
    Memory(Vec<u8>),
    Decoded,
}

/// Lazily decoded, optionally unloadable atlas image.
#[derive(Debug)]
pub struct ImageResource {
    source: ImageSource,
    unloadable: bool,
    decoded: Mutex<Option<Arc<RgbaImage>>>,
}

impl ImageResource {
    /// Create a resource for the cache file at `path`.
    pub fn load(path: &Path, strategy: LoadStrategy) -> Result<Self, SheetError> {
        let resource = match strategy {
            LoadStrategy::Eager => {
                let resource = Self::new(ImageSource::File(path.to_path_buf()), false);
                resource.instance()?;
                resource
            }
            LoadStrategy::Lazy => Self::new(ImageSource::File(path.to_path_buf()), false),
            LoadStrategy::HotLoad => Self::new(ImageSource::File(path.to_path_buf()), true),
            LoadStrategy::MemoryHotLoad => {
                let bytes = fs::read(path).map_err(|e| SheetError::io(path, e))?;
                Self::new(ImageSource::Memory(bytes), true)
            }
        };
        Ok(resource)
    }

    /// Wrap an already decoded image. Such a resource is never released.
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            source: ImageSource::Decoded,
            unloadable: false,
            decoded: Mutex::new(Some(Arc::new(image))),
        }
    }

    fn new(source: ImageSource, unloadable: bool) -> Self {
        Self {
            source,
            unloadable,
            decoded: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<Arc<RgbaImage>>> {
        self.decoded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The decoded atlas, decoding it first if needed.
    pub fn instance(&self) -> Result<Arc<RgbaImage>, SheetError> {
        let mut state = self.state();
        if let Some(image) = state.as_ref() {
            return Ok(Arc::clone(image));
        }
        let image = Arc::new(self.decode()?);
        *state = Some(Arc::clone(&image));
        Ok(image)
    }

    /// The decoded atlas without making it resident.
    ///
    /// An unloadable resource that is currently released is decoded into a
    /// temporary copy and stays released. Other resources behave like
    /// [`ImageResource::instance`].
    pub fn peek_or_decode_transient(&self) -> Result<Arc<RgbaImage>, SheetError> {
        if !self.unloadable {
            return self.instance();
        }
        if let Some(image) = self.state().as_ref() {
            return Ok(Arc::clone(image));
        }
        Ok(Arc::new(self.decode()?))
    }

    fn decode(&self) -> Result<RgbaImage, SheetError> {
        let image = match &self.source {
            ImageSource::File(path) => {
                debug!("Decoding {}", path.display());
                // Cache files carry no extension, so sniff the format.
                image::io::Reader::open(path)
                    .and_then(|reader| reader.with_guessed_format())
                    .map_err(|e| SheetError::io(path, e))?
                    .decode()?
            }
            ImageSource::Memory(bytes) => image::load_from_memory(bytes)?,
            ImageSource::Decoded => return Err(SheetError::Released),
        };
        Ok(image.to_rgba8())
    }

    /// Drop the decoded pixels if this resource supports unloading.
    ///
    /// Returns whether pixel memory was actually freed.
    pub fn release(&self) -> bool {
        if !self.unloadable {
            return false;
        }
        self.state().take().is_some()
    }

    /// Drop the decoded pixels regardless of strategy.
    pub(crate) fn dispose(&self) {
        if matches!(self.source, ImageSource::Decoded) {
            return;
        }
        self.state().take();
    }

    pub fn is_loaded(&self) -> bool {
        self.state().is_some()
    }

    pub fn supports_unload(&self) -> bool {
        self.unloadable
    }

    /// Approximate resident memory: decoded pixels plus buffered bytes.
    pub fn used_bytes(&self) -> usize {
        let decoded = self
            .state()
            .as_ref()
            .map(|image| image.width() as usize * image.height() as usize * 4)
            .unwrap_or(0);
        let buffered = match &self.source {
            ImageSource::Memory(bytes) => bytes.len(),
            _ => 0,
        };
        decoded + buffered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn write_atlas(dir: &Path) -> PathBuf {
        let path = dir.join("atlas");
        let image = RgbaImage::from_pixel(6, 3, Rgba([7, 8, 9, 255]));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn test_eager_decodes_up_front() {
        let temp = TempDir::new().unwrap();
        let resource = ImageResource::load(&write_atlas(temp.path()), LoadStrategy::Eager).unwrap();
        assert!(resource.is_loaded());
        assert_eq!(resource.used_bytes(), 6 * 3 * 4);
        assert!(!resource.release());
        assert!(resource.is_loaded());
    }

    #[test]
    fn test_lazy_decodes_on_first_access() {
        let temp = TempDir::new().unwrap();
        let resource = ImageResource::load(&write_atlas(temp.path()), LoadStrategy::Lazy).unwrap();
        assert!(!resource.is_loaded());
        assert_eq!(resource.used_bytes(), 0);

        let first = resource.instance().unwrap();
        let second = resource.instance().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.dimensions(), (6, 3));
    }

    #[test]
    fn test_hot_load_releases_and_reloads() {
        let temp = TempDir::new().unwrap();
        let resource = ImageResource::load(&write_atlas(temp.path()), LoadStrategy::HotLoad).unwrap();
        resource.instance().unwrap();
        assert!(resource.release());
        assert!(!resource.is_loaded());
        assert!(!resource.release());

        assert_eq!(resource.instance().unwrap().dimensions(), (6, 3));
    }

    #[test]
    fn test_transient_decode_keeps_hot_load_released() {
        let temp = TempDir::new().unwrap();
        let resource = ImageResource::load(&write_atlas(temp.path()), LoadStrategy::HotLoad).unwrap();
        assert_eq!(resource.peek_or_decode_transient().unwrap().dimensions(), (6, 3));
        assert!(!resource.is_loaded());

        let resident = resource.instance().unwrap();
        let peeked = resource.peek_or_decode_transient().unwrap();
        assert!(Arc::ptr_eq(&resident, &peeked));
    }

    #[test]
    fn test_transient_decode_loads_lazy() {
        let temp = TempDir::new().unwrap();
        let resource = ImageResource::load(&write_atlas(temp.path()), LoadStrategy::Lazy).unwrap();
        resource.peek_or_decode_transient().unwrap();
        assert!(resource.is_loaded());
    }

    #[test]
    fn test_memory_hot_load_counts_buffer() {
        let temp = TempDir::new().unwrap();
        let path = write_atlas(temp.path());
        let encoded = fs::metadata(&path).unwrap().len() as usize;

        let resource = ImageResource::load(&path, LoadStrategy::MemoryHotLoad).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(resource.used_bytes(), encoded);

        resource.instance().unwrap();
        assert_eq!(resource.used_bytes(), encoded + 6 * 3 * 4);
        assert!(resource.release());
        assert_eq!(resource.used_bytes(), encoded);
    }

    #[test]
    fn test_missing_file_fails_eager_only() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        assert!(ImageResource::load(&missing, LoadStrategy::Eager).is_err());
        assert!(ImageResource::load(&missing, LoadStrategy::MemoryHotLoad).is_err());

        let lazy = ImageResource::load(&missing, LoadStrategy::Lazy).unwrap();
        assert!(lazy.instance().is_err());
    }
}
