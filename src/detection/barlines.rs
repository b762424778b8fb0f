//! Barline detection and measure splitting.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BarlineParams;
use crate::detection::hough::{HoughParams, LineSegment, detect_segments};
use crate::detection::morphology::{self, RectKernel};
use crate::detection::preprocessing::{apply_blur, detect_edges};
use crate::io::CropExport;
use crate::models::{BoundingBox, DetectionFailure, Region, Stage};

/// Barline x-coordinates, ascending, at most one per proximity cluster.
///
/// Positions are edge columns from Canny, not stroke centres: the first edge
/// of each stroke, which sits a pixel or two left of it (right of it for a
/// stroke touching x = 0). Expect them within 3px of the drawn line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarlineSet {
    positions: Vec<i32>,
}

impl BarlineSet {
    /// Sort and merge raw positions.
    pub fn from_positions(mut positions: Vec<i32>, proximity: i32) -> Self {
        positions.sort_unstable();
        Self {
            positions: merge_positions(&positions, proximity),
        }
    }

    pub fn positions(&self) -> &[i32] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// One full-height box per consecutive pair of barlines, clipped to the
    /// strip width. Pairs with nothing between them are skipped.
    pub fn measure_boxes(&self, width: u32, height: u32) -> Vec<BoundingBox> {
        self.positions
            .windows(2)
            .filter_map(|pair| {
                BoundingBox::clipped(
                    pair[0] as f64,
                    0.0,
                    (pair[1] - pair[0]) as f64,
                    height as f64,
                    width,
                    height,
                )
            })
            .collect()
    }
}

/// Keep a position only when it lies more than `proximity` right of the
/// previously kept one. Input must be sorted.
pub fn merge_positions(sorted: &[i32], proximity: i32) -> Vec<i32> {
    let mut merged: Vec<i32> = Vec::new();
    for &x in sorted {
        match merged.last() {
            Some(&last) if x - last <= proximity => {}
            _ => merged.push(x),
        }
    }
    merged
}

/// x of every segment whose endpoints differ horizontally by less than
/// `verticality` pixels.
pub fn vertical_positions(segments: &[LineSegment], verticality: u32) -> Vec<i32> {
    segments
        .iter()
        .filter(|s| (s.dx() as u32) < verticality)
        .map(|s| s.x1)
        .collect()
}

#[derive(Debug, Clone)]
pub struct BarlineDetection {
    pub barlines: BarlineSet,
    /// Accepted near-vertical segments, for debug overlays.
    pub segments: Vec<LineSegment>,
    pub failure: Option<DetectionFailure>,
}

/// Edge mask with broken vertical strokes bridged.
///
/// `blur_sigma` adds to the smoothing Canny does on its own.
pub fn vertical_edge_mask(strip: &GrayImage, params: &BarlineParams) -> GrayImage {
    let blurred = apply_blur(strip, params.blur_sigma);
    let edges = detect_edges(&blurred, params.canny_low, params.canny_high);
    morphology::close(&edges, RectKernel::vertical(params.closing_height))
}

/// Find barlines in a grayscale (or binary) strip.
pub fn detect_barlines(strip: &GrayImage, params: &BarlineParams) -> BarlineDetection {
    let mask = vertical_edge_mask(strip, params);
    let hough = HoughParams {
        rho: params.rho,
        theta: params.theta_degrees.to_radians(),
        min_votes: params.min_votes,
        min_line_length: params.min_line_length,
        max_line_gap: params.max_line_gap,
    };
    let segments: Vec<LineSegment> = detect_segments(&mask, &hough)
        .into_iter()
        .filter(|s| (s.dx() as u32) < params.verticality_px)
        .collect();
    let positions = vertical_positions(&segments, params.verticality_px);
    debug!(segments = segments.len(), "vertical segments");

    let barlines = BarlineSet::from_positions(positions, params.barline_proximity_px as i32);
    let failure = if barlines.len() < 2 {
        let failure = DetectionFailure {
            stage: Stage::Barlines,
            expected: 2,
            found: barlines.len(),
        };
        warn!(%failure, "no measures can be formed");
        Some(failure)
    } else {
        None
    };

    BarlineDetection {
        barlines,
        segments,
        failure,
    }
}

/// Cut the strip into measures between consecutive barlines.
///
/// A box the cropper rejects is skipped; the other measures are kept.
pub fn split_measures(strip: &DynamicImage, barlines: &BarlineSet, cropper: &dyn CropExport) -> Vec<Region> {
    let mut measures = Vec::new();
    for bbox in barlines.measure_boxes(strip.width(), strip.height()) {
        match cropper.crop(strip, &bbox) {
            Ok(image) => measures.push(Region {
                bbox,
                image,
                ordinal: measures.len(),
            }),
            Err(e) => warn!(error = %e, "skipping measure"),
        }
    }
    measures
}
