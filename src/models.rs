use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned box in the coordinate space of its parent raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Box covering the whole of a `width` x `height` raster.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the box is non-empty and lies fully inside the raster.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.right() <= width && self.bottom() <= height
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 || y2 <= y1 {
            return 0;
        }
        (x2 - x1) as u64 * (y2 - y1) as u64
    }

    /// Clip a box given in signed/fractional coordinates to the raster.
    /// Returns `None` when nothing of it remains.
    pub fn clipped(x: f64, y: f64, width: f64, height: f64, max_w: u32, max_h: u32) -> Option<Self> {
        let x1 = x.round().max(0.0);
        let y1 = y.round().max(0.0);
        let x2 = (x + width).round().min(max_w as f64);
        let y2 = (y + height).round().min(max_h as f64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }

    /// Translate a box from a child raster into its parent's coordinates.
    pub fn offset_by(&self, origin: &BoundingBox) -> Self {
        Self::new(self.x + origin.x, self.y + origin.y, self.width, self.height)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// A located sub-area of a parent image together with its pixels.
#[derive(Clone)]
pub struct Region {
    pub bbox: BoundingBox,
    pub image: DynamicImage,
    pub ordinal: usize,
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("bbox", &self.bbox)
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

/// Outer border of one connected component of ink.
#[derive(Debug, Clone)]
pub struct Contour {
    pub bbox: BoundingBox,
    /// Area enclosed by the border polygon.
    pub area: f64,
    /// Closed length of the border polygon.
    pub perimeter: f64,
    /// Foreground pixels inside the bounding box.
    pub ink_pixels: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.bbox.width
    }

    pub fn height(&self) -> u32 {
        self.bbox.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.bbox.height == 0 {
            return 0.0;
        }
        self.bbox.width as f64 / self.bbox.height as f64
    }

    /// `4π·area/perimeter²`; 1.0 for a circle, 0.0 for degenerate borders.
    pub fn circularity(&self) -> f64 {
        if self.perimeter <= 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area / (self.perimeter * self.perimeter)
    }

    pub fn to_candidate(&self) -> GlyphCandidate {
        GlyphCandidate {
            bbox: self.bbox,
            area: self.area,
            perimeter: self.perimeter,
            aspect_ratio: self.aspect_ratio(),
            circularity: self.circularity(),
        }
    }
}

/// A component that passed the contour stage, with its shape metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlyphCandidate {
    pub bbox: BoundingBox,
    pub area: f64,
    pub perimeter: f64,
    pub aspect_ratio: f64,
    pub circularity: f64,
}

/// Diatonic letter name. No octave is inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchLetter {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl fmt::Display for PitchLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PitchLetter::A => "A",
            PitchLetter::B => "B",
            PitchLetter::C => "C",
            PitchLetter::D => "D",
            PitchLetter::E => "E",
            PitchLetter::F => "F",
            PitchLetter::G => "G",
        };
        f.write_str(s)
    }
}

/// A note-head glyph with its inferred letter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub glyph: GlyphCandidate,
    pub letter: PitchLetter,
    pub ordinal: usize,
    /// Index of the staff reference the glyph snapped to.
    pub reference_index: usize,
}

/// Pipeline stage names used in logs and diagnostic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Load,
    Binarize,
    Locate,
    Staff,
    Barlines,
    Glyphs,
    Pitch,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Binarize => "binarize",
            Stage::Locate => "locate",
            Stage::Staff => "staff",
            Stage::Barlines => "barlines",
            Stage::Glyphs => "glyphs",
            Stage::Pitch => "pitch",
            Stage::Export => "export",
        };
        f.write_str(s)
    }
}

/// Soft failure: a detector found fewer features than it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionFailure {
    pub stage: Stage,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for DetectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} detection found {} of {} expected features",
            self.stage, self.found, self.expected
        )
    }
}
