//! Filesystem boundary: raster load/save and crop export.

use image::{DynamicImage, ImageReader};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::BoundingBox;

/// Source and sink for rasters.
pub trait ImageStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<DynamicImage>;
    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()>;
}

/// Image files on disk, format picked from the extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageStore;

impl ImageStore for FsImageStore {
    fn load(&self, path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(Error::Io)?;
        reader.decode().map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        image.save(path).map_err(|e| Error::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "saved image");
        Ok(())
    }
}

/// Cuts a box out of a raster.
pub trait CropExport: Send + Sync {
    fn crop(&self, image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    /// 270 degrees clockwise, turning a vertical column into a horizontal strip.
    Rotate270,
}

/// In-memory crop, optionally rotated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrop {
    pub rotation: Rotation,
}

impl ImageCrop {
    pub fn rotated() -> Self {
        Self {
            rotation: Rotation::Rotate270,
        }
    }
}

impl CropExport for ImageCrop {
    fn crop(&self, image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage> {
        if !bbox.fits_within(image.width(), image.height()) {
            return Err(Error::OutOfBounds {
                bbox: *bbox,
                width: image.width(),
                height: image.height(),
            });
        }
        let cropped = image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
        Ok(match self.rotation {
            Rotation::None => cropped,
            Rotation::Rotate270 => cropped.rotate270(),
        })
    }
}

/// Write a value as pretty JSON, creating parent directories.
pub fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::Write {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
    }
    Ok(())
}
