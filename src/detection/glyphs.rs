//! Glyph extraction from binary measure masks.
//!
//! Three views of the same connected components:
//! - note heads, filtered by size and shape;
//! - a density scan that picks out one distinguished marker glyph;
//! - full-height column slices around every wide component.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{BinarizeParams, GlyphParams, MarkerParams, SlicingParams};
use crate::detection::contours::find_external_contours;
use crate::detection::preprocessing::binarize;
use crate::error::Result;
use crate::io::{CropExport, ImageCrop, ImageStore};
use crate::models::{BoundingBox, Contour, GlyphCandidate, Region};

/// True when a component passes every configured note-head threshold.
pub fn is_note_head(contour: &Contour, params: &GlyphParams) -> bool {
    let (w, h) = (contour.width(), contour.height());
    w >= params.min_contour_width
        && h >= params.min_contour_height
        && w <= params.max_contour_width
        && h <= params.max_contour_height
        && contour.area >= params.min_area
        && contour.area <= params.max_area
        && contour.aspect_ratio() >= params.aspect_ratio_threshold
        && contour.circularity() >= params.circularity_threshold
}

/// Keep note heads only, ordered left to right.
pub fn filter_note_heads(contours: &[Contour], params: &GlyphParams) -> Vec<GlyphCandidate> {
    let mut heads: Vec<GlyphCandidate> = contours
        .iter()
        .filter(|c| is_note_head(c, params))
        .map(Contour::to_candidate)
        .collect();
    heads.sort_by_key(|g| (g.bbox.x, g.bbox.y));
    heads
}

/// Note-head candidates of a binary mask (ink = 255).
pub fn extract_glyphs(binary: &GrayImage, params: &GlyphParams) -> Vec<GlyphCandidate> {
    let contours = find_external_contours(binary);
    let heads = filter_note_heads(&contours, params);
    debug!(components = contours.len(), heads = heads.len(), "glyphs extracted");
    heads
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DensityClass {
    /// Narrower than the relative width threshold (stems, barlines).
    Narrow,
    /// Density inside the configured band.
    Marker,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityItem {
    pub bbox: BoundingBox,
    /// Background pixels inside the box, in percent. Unset for narrow items.
    pub density: Option<f64>,
    pub class: DensityClass,
}

/// Outcome of the marker density scan over one strip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerScan {
    /// Every component, left to right.
    pub items: Vec<DensityItem>,
    /// Right edge of the last marker, or 0 when none was found.
    pub target: u32,
}

impl MarkerScan {
    pub fn markers(&self) -> impl Iterator<Item = &DensityItem> {
        self.items.iter().filter(|i| i.class == DensityClass::Marker)
    }

    pub fn narrow_positions(&self) -> Vec<u32> {
        self.items
            .iter()
            .filter(|i| i.class == DensityClass::Narrow)
            .map(|i| i.bbox.x)
            .collect()
    }

    pub fn found_marker(&self) -> bool {
        self.markers().next().is_some()
    }
}

/// Percentage of background pixels inside `bbox`.
pub fn background_density(binary: &GrayImage, bbox: &BoundingBox) -> f64 {
    if bbox.is_empty() {
        return 0.0;
    }
    let mut background = 0u64;
    for y in bbox.y..bbox.bottom() {
        for x in bbox.x..bbox.right() {
            if binary.get_pixel(x, y)[0] == 0 {
                background += 1;
            }
        }
    }
    background as f64 / bbox.area() as f64 * 100.0
}

/// Classify every component by width and density and locate the marker.
pub fn scan_markers(binary: &GrayImage, params: &MarkerParams) -> MarkerScan {
    let min_width = binary.width() as f64 * params.min_relative_width;
    let mut contours = find_external_contours(binary);
    contours.sort_by_key(|c| (c.bbox.x, c.bbox.y));

    let items: Vec<DensityItem> = contours
        .iter()
        .map(|c| {
            if (c.width() as f64) < min_width {
                return DensityItem {
                    bbox: c.bbox,
                    density: None,
                    class: DensityClass::Narrow,
                };
            }
            let density = background_density(binary, &c.bbox);
            let class = if (params.density_min..=params.density_max).contains(&density) {
                DensityClass::Marker
            } else {
                DensityClass::Other
            };
            DensityItem {
                bbox: c.bbox,
                density: Some(density),
                class,
            }
        })
        .collect();

    let target = items
        .iter()
        .rev()
        .find(|i| i.class == DensityClass::Marker)
        .map(|i| i.bbox.right())
        .unwrap_or(0);
    debug!(items = items.len(), target, "marker scan");
    MarkerScan { items, target }
}

/// Full-height column boxes around every component at least
/// `min_relative_width` of the strip wide, left to right.
pub fn note_column_boxes(binary: &GrayImage, params: &SlicingParams) -> Vec<BoundingBox> {
    let (width, height) = binary.dimensions();
    let min_width = width as f64 * params.min_relative_width;
    let mut boxes: Vec<BoundingBox> = find_external_contours(binary)
        .into_iter()
        .filter(|c| c.width() as f64 >= min_width)
        .map(|c| BoundingBox::new(c.bbox.x, 0, c.bbox.width, height))
        .collect();
    boxes.sort_by_key(|b| b.x);
    boxes
}

/// The cropper column slices are exported with.
pub fn column_cropper(params: &SlicingParams) -> ImageCrop {
    if params.rotate {
        ImageCrop::rotated()
    } else {
        ImageCrop::default()
    }
}

/// Slice `strip` into note columns found on its mask.
pub fn slice_note_columns(strip: &DynamicImage, binary: &GrayImage, params: &SlicingParams) -> Vec<Region> {
    let cropper = column_cropper(params);
    let mut columns = Vec::new();
    for bbox in note_column_boxes(binary, params) {
        match cropper.crop(strip, &bbox) {
            Ok(image) => columns.push(Region {
                bbox,
                image,
                ordinal: columns.len(),
            }),
            Err(e) => warn!(error = %e, "skipping note column"),
        }
    }
    columns
}

/// Binarize a measure strip, slice it into note columns and save them as
/// `column-01.png`, `column-02.png`, ... under `out_dir`.
pub fn export_note_columns(
    strip: &DynamicImage,
    mask_params: &BinarizeParams,
    params: &SlicingParams,
    store: &dyn ImageStore,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mask = binarize(strip, mask_params);
    let mut written = Vec::new();
    for column in slice_note_columns(strip, &mask, params) {
        let path = out_dir.join(format!("column-{:02}.png", column.ordinal + 1));
        store.save(&column.image, &path)?;
        written.push(path);
    }
    info!(columns = written.len(), dir = %out_dir.display(), "note columns written");
    Ok(written)
}
