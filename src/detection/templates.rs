//! Template-matched section localization.
//!
//! Each template is slid over the sheet with zero-mean normalized
//! cross-correlation. Every cell at or above the match threshold proposes a
//! section box grown from the match position; the pooled proposals are then
//! thinned with greedy non-maximum suppression.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LocatorParams;
use crate::error::{Error, Result};
use crate::io::{CropExport, FsImageStore, ImageStore};
use crate::models::{BoundingBox, Region};

const TEMPLATE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Score surface: one `f32` in `[-1, 1]` per template placement.
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub image: GrayImage,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self> {
        let image = FsImageStore.load(path).map_err(|e| Error::TemplateLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            image: image.to_luma8(),
        })
    }
}

/// Templates loaded once per run and shared read-only between images.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: Arc<Vec<Template>>,
}

impl TemplateSet {
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            templates: Arc::new(templates),
        }
    }

    /// Load every `.png`/`.jpg`/`.jpeg` in `dir`, in file-name order.
    ///
    /// Unreadable files are skipped with a warning; the load fails only when
    /// the folder cannot be read or yields no template at all.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| Error::TemplateLoad {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| TEMPLATE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut templates = Vec::with_capacity(paths.len());
        for path in &paths {
            match Template::load(path) {
                Ok(template) => templates.push(template),
                Err(e) => warn!(error = %e, "skipping template"),
            }
        }

        if templates.is_empty() {
            return Err(Error::TemplateLoad {
                path: dir.to_path_buf(),
                reason: "no readable template images".into(),
            });
        }
        info!(count = templates.len(), dir = %dir.display(), "templates loaded");
        Ok(Self::new(templates))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Zero-mean normalized cross-correlation of `template` over `image`.
///
/// The surface is `(W - tw + 1) x (H - th + 1)`. Windows (or templates)
/// without variance score 0. Returns `None` when the template does not fit.
pub fn match_template_zncc(image: &GrayImage, template: &GrayImage) -> Option<ScoreMap> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }
    let (out_w, out_h) = (iw - tw + 1, ih - th + 1);
    let n = (tw as f64) * (th as f64);

    let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let t_zero: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
    let t_norm = t_zero.iter().map(|v| v * v).sum::<f64>().sqrt();

    let sums = integral_image::<_, u64>(image);
    let squares = integral_squared_image::<_, u64>(image);
    let window = |img: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32| -> f64 {
        let a = img.get_pixel(x, y)[0];
        let b = img.get_pixel(x + tw, y)[0];
        let c = img.get_pixel(x, y + th)[0];
        let d = img.get_pixel(x + tw, y + th)[0];
        (d + a) as f64 - (b + c) as f64
    };

    let rows: Vec<Vec<f32>> = (0..out_h)
        .into_par_iter()
        .map(|y| {
            let mut row = Vec::with_capacity(out_w as usize);
            for x in 0..out_w {
                let sum = window(&sums, x, y);
                let sum_sq = window(&squares, x, y);
                let variance = sum_sq - sum * sum / n;
                let denom = t_norm * variance.max(0.0).sqrt();
                if denom <= f64::EPSILON {
                    row.push(0.0);
                    continue;
                }
                let mut cross = 0.0;
                for ty in 0..th {
                    let base = (ty * tw) as usize;
                    for tx in 0..tw {
                        let v = image.get_pixel(x + tx, y + ty)[0] as f64;
                        cross += v * t_zero[base + tx as usize];
                    }
                }
                row.push((cross / denom).clamp(-1.0, 1.0) as f32);
            }
            row
        })
        .collect();

    ScoreMap::from_raw(out_w, out_h, rows.into_iter().flatten().collect())
}

/// Grow section boxes from every surface cell at or above the threshold.
///
/// Left edge is `x * x_scale`, width `surface_width - 2x`, height
/// `template_height * height_scale`. Boxes are clipped to the image; boxes
/// with nothing left are dropped.
pub fn candidate_boxes(
    scores: &ScoreMap,
    template_height: u32,
    image_width: u32,
    image_height: u32,
    params: &LocatorParams,
) -> Vec<BoundingBox> {
    let surface_width = scores.width() as f64;
    let height = template_height as f64 * params.height_scale;
    scores
        .enumerate_pixels()
        .filter(|(_, _, score)| score[0] as f64 >= params.match_threshold)
        .filter_map(|(x, y, _)| {
            let width = surface_width - 2.0 * x as f64;
            if width <= 0.0 {
                return None;
            }
            BoundingBox::clipped(
                x as f64 * params.x_scale,
                y as f64,
                width,
                height,
                image_width,
                image_height,
            )
        })
        .collect()
}

/// Greedy non-maximum suppression.
///
/// Boxes are ordered by bottom edge; the lowest remaining box is kept and
/// every other box whose intersection covers at least `overlap_threshold` of
/// the kept box's area is discarded. Survivors come back in pick order.
pub fn non_maximum_suppression(mut boxes: Vec<BoundingBox>, overlap_threshold: f64) -> Vec<BoundingBox> {
    boxes.sort_by_key(|b| b.bottom());
    let mut picked = Vec::new();
    while let Some(last) = boxes.pop() {
        let last_area = last.area() as f64;
        boxes.retain(|b| {
            let overlap = if last_area > 0.0 {
                last.intersection_area(b) as f64 / last_area
            } else {
                0.0
            };
            overlap < overlap_threshold
        });
        picked.push(last);
    }
    picked
}

/// Result of localizing sections on one sheet.
#[derive(Debug, Clone, Default)]
pub struct Localization {
    /// Sections in reading order.
    pub regions: Vec<Region>,
    pub candidate_count: usize,
    /// Names of templates that did not fit the search image.
    pub skipped_templates: Vec<String>,
}

/// Locate sections matching any template and crop them from `image`.
pub fn locate_regions(
    image: &DynamicImage,
    templates: &TemplateSet,
    params: &LocatorParams,
    cropper: &dyn CropExport,
) -> Localization {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for template in templates.iter() {
        let (tw, th) = template.image.dimensions();
        let Some(scores) = match_template_zncc(&gray, &template.image) else {
            warn!(
                template = %template.name,
                tw, th, width, height,
                "skipping template larger than the search image"
            );
            skipped.push(template.name.clone());
            continue;
        };
        let boxes = candidate_boxes(&scores, th, width, height, params);
        debug!(template = %template.name, candidates = boxes.len(), "template matched");
        candidates.extend(boxes);
    }

    let candidate_count = candidates.len();
    let mut kept = non_maximum_suppression(candidates, params.nms_overlap_threshold);
    kept.sort_by_key(|b| (b.y, b.x));

    let mut regions = Vec::with_capacity(kept.len());
    for bbox in kept {
        match cropper.crop(image, &bbox) {
            Ok(section) => regions.push(Region {
                bbox,
                image: section,
                ordinal: regions.len(),
            }),
            Err(e) => warn!(error = %e, "dropping section"),
        }
    }

    info!(candidates = candidate_count, sections = regions.len(), "sections located");
    Localization {
        regions,
        candidate_count,
        skipped_templates: skipped,
    }
}
