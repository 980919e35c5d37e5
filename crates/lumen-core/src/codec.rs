//! Image loading and saving.
//!
//! The scheduler only talks to images through [`ImageCodec`], so tests and
//! embedders can swap the filesystem for something else.

use image::ImageFormat;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{PipelineError, PipelineResult};
use crate::types::Rgba16Image;

/// Loads source images and persists finished ones.
pub trait ImageCodec: Send + Sync {
    /// Decode the image at `path` into 16-bit RGBA.
    fn load(&self, path: &Path) -> PipelineResult<Rgba16Image>;

    /// Write `image` to `path`.
    fn save(&self, image: &Rgba16Image, path: &Path) -> PipelineResult<()>;
}

/// PNG codec backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn load(&self, path: &Path) -> PipelineResult<Rgba16Image> {
        let reader = image::ImageReader::open(path).map_err(|e| PipelineError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let decoded = reader.decode().map_err(|e| PipelineError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(decoded.into_rgba16())
    }

    fn save(&self, image: &Rgba16Image, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::Save {
                path: path.to_path_buf(),
                message: format!("Cannot create output directory: {}", e),
            })?;
        }
        image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| PipelineError::Save {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

/// In-memory codec: images are loaded from and saved to a path-keyed map.
///
/// Every save is recorded, including repeated saves to the same path.
#[derive(Debug, Default)]
pub struct MemoryCodec {
    sources: Mutex<HashMap<PathBuf, Rgba16Image>>,
    saved: Mutex<Vec<(PathBuf, Rgba16Image)>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `image` loadable from `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, image: Rgba16Image) {
        lock(&self.sources).insert(path.into(), image);
    }

    /// Make every save to `path` fail.
    pub fn fail_saves_to(&self, path: impl Into<PathBuf>) {
        lock(&self.failing).insert(path.into());
    }

    /// Every `(path, image)` saved so far, in save order.
    pub fn saved(&self) -> Vec<(PathBuf, Rgba16Image)> {
        lock(&self.saved).clone()
    }

    /// Number of saves so far.
    pub fn save_count(&self) -> usize {
        lock(&self.saved).len()
    }
}

impl ImageCodec for MemoryCodec {
    fn load(&self, path: &Path) -> PipelineResult<Rgba16Image> {
        lock(&self.sources)
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::Load {
                path: path.to_path_buf(),
                message: "no such image".to_string(),
            })
    }

    fn save(&self, image: &Rgba16Image, path: &Path) -> PipelineResult<()> {
        if lock(&self.failing).contains(path) {
            return Err(PipelineError::Save {
                path: path.to_path_buf(),
                message: "rejected".to_string(),
            });
        }
        lock(&self.saved).push((path.to_path_buf(), image.clone()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_png_round_trip_preserves_16_bit_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");

        let mut image = Rgba16Image::new(3, 2);
        image.put_pixel(2, 1, Rgba([1, 513, 65535, 32768]));
        PngCodec.save(&image, &path).unwrap();

        let loaded = PngCodec.load(&path).unwrap();
        assert_eq!(loaded, image);
    }

    #[test]
    fn test_memory_codec_records_saves() {
        let codec = MemoryCodec::new();
        let image = Rgba16Image::from_pixel(1, 1, Rgba([1, 2, 3, 4]));
        codec.insert("/in/a.png", image.clone());

        let loaded = codec.load(Path::new("/in/a.png")).unwrap();
        codec.save(&loaded, Path::new("/out/a.png")).unwrap();
        assert_eq!(codec.saved(), vec![(PathBuf::from("/out/a.png"), image)]);
        assert!(codec.load(Path::new("/in/b.png")).is_err());
    }

    #[test]
    fn test_load_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PngCodec.load(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
    }
}
