//! Staff-line detection.
//!
//! Long horizontal runs are isolated with a line-shaped opening, their rows
//! are clustered into at most five staff lines, the spacing is evened out to
//! a multiple of two pixels and a midpoint is interpolated between each pair
//! of lines. The result is the nine-entry reference table used for pitch
//! lookup.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::StaffParams;
use crate::detection::preprocessing::horizontal_lines;
use crate::error::{Error, Result};
use crate::io;
use crate::models::{DetectionFailure, Stage};

/// Five staff lines plus the four spaces between them.
pub const STAFF_REFERENCE_COUNT: usize = 9;
pub const STAFF_LINE_COUNT: usize = 5;

/// Ordered reference coordinates of one staff, top to bottom.
///
/// Serialized as `{ "referenceLines": [y0, ..., y8] }`. Entries are strictly
/// increasing; a table with fewer than nine entries comes from a partial
/// detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StaffTableFile", into = "StaffTableFile")]
pub struct StaffReferenceTable {
    lines: Vec<i32>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaffTableFile {
    reference_lines: Vec<i32>,
}

impl TryFrom<StaffTableFile> for StaffReferenceTable {
    type Error = Error;

    fn try_from(file: StaffTableFile) -> Result<Self> {
        Self::new(file.reference_lines)
    }
}

impl From<StaffReferenceTable> for StaffTableFile {
    fn from(table: StaffReferenceTable) -> Self {
        Self {
            reference_lines: table.lines,
        }
    }
}

impl StaffReferenceTable {
    pub fn new(lines: Vec<i32>) -> Result<Self> {
        if lines.len() > STAFF_REFERENCE_COUNT {
            return Err(Error::InvalidStaffTable(format!(
                "{} entries, at most {} allowed",
                lines.len(),
                STAFF_REFERENCE_COUNT
            )));
        }
        if let Some(w) = lines.windows(2).find(|w| w[1] <= w[0]) {
            return Err(Error::InvalidStaffTable(format!(
                "entries must increase, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { lines })
    }

    pub fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn lines(&self) -> &[i32] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.lines.len() == STAFF_REFERENCE_COUNT
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(self, path)
    }

    /// Read and validate a table written by [`StaffReferenceTable::save`].
    pub fn load(path: &Path) -> Result<Self> {
        io::read_json(path)
    }
}

/// Everything staff detection learned about one strip.
#[derive(Debug, Clone)]
pub struct StaffDetection {
    pub table: StaffReferenceTable,
    /// Evened-out staff line rows (at most five).
    pub lines: Vec<i32>,
    /// Foreground pixel count per row after line isolation.
    pub histogram: BTreeMap<u32, u32>,
    pub failure: Option<DetectionFailure>,
}

impl StaffDetection {
    pub fn found_lines(&self) -> usize {
        self.lines.len()
    }
}

/// Detect the staff of a binary strip (ink = 255).
pub fn detect_staff(binary: &GrayImage, params: &StaffParams) -> StaffDetection {
    let isolated = horizontal_lines(binary, params.line_kernel_width);

    let mut histogram: BTreeMap<u32, u32> = BTreeMap::new();
    for (_, y, pixel) in isolated.enumerate_pixels() {
        if pixel[0] > 0 {
            *histogram.entry(y).or_insert(0) += 1;
        }
    }
    debug!(rows = histogram.len(), "horizontal line rows");

    // Row 0 is a border artifact of the crop.
    let rows: Vec<i32> = histogram.keys().filter(|&&y| y != 0).map(|&y| y as i32).collect();
    let mut merged = merge_rows(&rows, params.staff_line_proximity_px as i32);
    merged.truncate(params.max_lines);

    let lines = even_out_spacing(&merged);
    let references = interpolate_spaces(&lines);

    let failure = if lines.len() < STAFF_LINE_COUNT {
        let failure = DetectionFailure {
            stage: Stage::Staff,
            expected: STAFF_LINE_COUNT,
            found: lines.len(),
        };
        warn!(%failure, "partial staff");
        Some(failure)
    } else {
        None
    };

    StaffDetection {
        // Merging keeps rows more than `proximity` apart, so the table is
        // strictly increasing.
        table: StaffReferenceTable { lines: references },
        lines,
        histogram,
        failure,
    }
}

/// Keep a row only when it lies more than `proximity` below the previously
/// kept row. Input must be sorted.
pub fn merge_rows(sorted: &[i32], proximity: i32) -> Vec<i32> {
    let mut merged: Vec<i32> = Vec::new();
    for &y in sorted {
        match merged.last() {
            Some(&last) if y - last <= proximity => {}
            _ => merged.push(y),
        }
    }
    merged
}

/// Snap each gap from the previous corrected line to a multiple of two.
pub fn even_out_spacing(lines: &[i32]) -> Vec<i32> {
    let mut out: Vec<i32> = Vec::with_capacity(lines.len());
    for &y in lines {
        match out.last() {
            None => out.push(y),
            Some(&prev) => out.push(prev + 2 * round_half_up(y - prev, 2)),
        }
    }
    out
}

/// Insert the rounded midpoint between every pair of consecutive lines.
pub fn interpolate_spaces(lines: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(lines.len() * 2);
    for pair in lines.windows(2) {
        out.push(pair[0]);
        out.push(round_half_up(pair[0] + pair[1], 2));
    }
    if let Some(&last) = lines.last() {
        out.push(last);
    }
    out
}

/// `round(value / divisor)` with halves rounded towards +∞.
fn round_half_up(value: i32, divisor: i32) -> i32 {
    (2 * value + divisor).div_euclid(2 * divisor)
}
