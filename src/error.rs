use std::path::PathBuf;

use crate::models::BoundingBox;

/// Errors returned by the sheet segmentation library.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("failed to load template {path}: {reason}")]
    TemplateLoad { path: PathBuf, reason: String },
    #[error("box {bbox:?} is outside the {width}x{height} raster")]
    OutOfBounds {
        bbox: BoundingBox,
        width: u32,
        height: u32,
    },
    #[error("staff reference table is empty")]
    EmptyReferenceTable,
    #[error("invalid staff reference table: {0}")]
    InvalidStaffTable(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("processing budget of {0:?} exceeded")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
