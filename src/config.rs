//! Per-run configuration.
//!
//! Every stage takes its own parameter struct; `Config` groups them so a run
//! can be described by one JSON file. Missing fields fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Mask used for staff-line and barline detection.
    pub staff_mask: BinarizeParams,
    /// Mask used for note-head extraction.
    pub glyph_mask: BinarizeParams,
    /// Mask used for the density-based marker search.
    pub marker_mask: BinarizeParams,
    pub locator: LocatorParams,
    pub staff: StaffParams,
    pub barlines: BarlineParams,
    pub glyphs: GlyphParams,
    pub marker: MarkerParams,
    pub slicing: SlicingParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staff_mask: BinarizeParams::default(),
            glyph_mask: BinarizeParams {
                mode: BinarizeMode::AdaptiveGaussian,
                morphology: MorphologyOrder::CloseOpen,
                remove_horizontal_lines: true,
                line_removal_width: 30,
                ..BinarizeParams::default()
            },
            marker_mask: BinarizeParams {
                mode: BinarizeMode::FixedInverse,
                remove_horizontal_lines: true,
                line_removal_width: 30,
                ..BinarizeParams::default()
            },
            locator: LocatorParams::default(),
            staff: StaffParams::default(),
            barlines: BarlineParams::default(),
            glyphs: GlyphParams::default(),
            marker: MarkerParams::default(),
            slicing: SlicingParams::default(),
        }
    }
}

impl Config {
    /// Read a JSON configuration file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Basic range checks. Runs before any image is touched.
    pub fn validate(&self) -> Result<()> {
        for (name, mask) in [
            ("staffMask", &self.staff_mask),
            ("glyphMask", &self.glyph_mask),
            ("markerMask", &self.marker_mask),
        ] {
            mask.validate().map_err(|e| Error::Config(format!("{name}: {e}")))?;
        }

        unit_range("locator.matchThreshold", self.locator.match_threshold)?;
        unit_range("locator.nmsOverlapThreshold", self.locator.nms_overlap_threshold)?;
        positive("locator.xScale", self.locator.x_scale)?;
        positive("locator.heightScale", self.locator.height_scale)?;

        if self.staff.line_kernel_width == 0 {
            return Err(Error::Config("staff.lineKernelWidth must be > 0".into()));
        }
        if self.staff.max_lines == 0 {
            return Err(Error::Config("staff.maxLines must be > 0".into()));
        }

        let b = &self.barlines;
        positive("barlines.rho", b.rho)?;
        positive("barlines.thetaDegrees", b.theta_degrees)?;
        if b.canny_low > b.canny_high {
            return Err(Error::Config(
                "barlines.cannyLow must not exceed barlines.cannyHigh".into(),
            ));
        }
        if b.closing_height == 0 {
            return Err(Error::Config("barlines.closingHeight must be > 0".into()));
        }

        let g = &self.glyphs;
        if g.min_area < 0.0 || g.min_area > g.max_area {
            return Err(Error::Config(format!(
                "glyphs area range [{}, {}] is empty",
                g.min_area, g.max_area
            )));
        }
        if g.aspect_ratio_threshold < 0.0 {
            return Err(Error::Config("glyphs.aspectRatioThreshold must be >= 0".into()));
        }
        unit_range("glyphs.circularityThreshold", g.circularity_threshold)?;
        if g.min_contour_width > g.max_contour_width || g.min_contour_height > g.max_contour_height {
            return Err(Error::Config("glyphs contour size range is empty".into()));
        }

        unit_range("marker.minRelativeWidth", self.marker.min_relative_width)?;
        let (lo, hi) = (self.marker.density_min, self.marker.density_max);
        if !(0.0..=100.0).contains(&lo) || !(0.0..=100.0).contains(&hi) || lo > hi {
            return Err(Error::Config(format!(
                "marker density band [{lo}, {hi}] must lie within [0, 100]"
            )));
        }
        unit_range("slicing.minRelativeWidth", self.slicing.min_relative_width)?;
        Ok(())
    }
}

fn unit_range(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!("{name} = {value} is outside [0, 1]")));
    }
    Ok(())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(Error::Config(format!("{name} = {value} must be positive")));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinarizeMode {
    /// Ink where a pixel is `c` darker than its Gaussian-weighted block mean.
    AdaptiveGaussian,
    /// Otsu's global level, inverted so ink is foreground.
    OtsuInverse,
    /// Global inverted threshold at `fixed_level`.
    FixedInverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MorphologyOrder {
    None,
    OpenClose,
    CloseOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BinarizeParams {
    pub mode: BinarizeMode,
    /// Odd neighbourhood size for the adaptive mode.
    pub block_size: u32,
    pub c: f32,
    pub fixed_level: u8,
    pub morphology: MorphologyOrder,
    /// Side of the square cleanup element.
    pub kernel_size: u32,
    pub remove_horizontal_lines: bool,
    pub line_removal_width: u32,
}

impl Default for BinarizeParams {
    fn default() -> Self {
        Self {
            mode: BinarizeMode::OtsuInverse,
            block_size: 19,
            c: 1.0,
            fixed_level: 128,
            morphology: MorphologyOrder::None,
            kernel_size: 3,
            remove_horizontal_lines: false,
            line_removal_width: 40,
        }
    }
}

impl BinarizeParams {
    fn validate(&self) -> Result<()> {
        if self.block_size < 3 || self.block_size % 2 == 0 {
            return Err(Error::Config(format!(
                "blockSize {} must be odd and >= 3",
                self.block_size
            )));
        }
        if self.kernel_size == 0 {
            return Err(Error::Config("kernelSize must be > 0".into()));
        }
        if self.remove_horizontal_lines && self.line_removal_width < 2 {
            return Err(Error::Config("lineRemovalWidth must be >= 2".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocatorParams {
    pub match_threshold: f64,
    pub nms_overlap_threshold: f64,
    /// Multiplier applied to the match x to get the region's left edge.
    pub x_scale: f64,
    /// Region height as a multiple of the template height.
    pub height_scale: f64,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            nms_overlap_threshold: 0.3,
            x_scale: 1.75,
            height_scale: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StaffParams {
    pub line_kernel_width: u32,
    pub staff_line_proximity_px: u32,
    pub max_lines: usize,
}

impl Default for StaffParams {
    fn default() -> Self {
        Self {
            line_kernel_width: 40,
            staff_line_proximity_px: 10,
            max_lines: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BarlineParams {
    /// Extra blur before edge detection. imageproc's Canny already smooths
    /// with sigma 1.4, so any pre-blur here stacks on top of that.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Height of the vertical closing element.
    pub closing_height: u32,
    pub rho: f64,
    pub theta_degrees: f64,
    pub min_votes: u32,
    pub min_line_length: f64,
    pub max_line_gap: u32,
    /// Largest endpoint x delta for a segment to count as vertical.
    pub verticality_px: u32,
    pub barline_proximity_px: u32,
}

impl Default for BarlineParams {
    fn default() -> Self {
        Self {
            blur_sigma: 0.0,
            canny_low: 50.0,
            canny_high: 150.0,
            closing_height: 9,
            rho: 1.0,
            theta_degrees: 1.0,
            min_votes: 40,
            min_line_length: 20.0,
            max_line_gap: 10,
            verticality_px: 10,
            barline_proximity_px: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlyphParams {
    pub min_area: f64,
    pub max_area: f64,
    pub aspect_ratio_threshold: f64,
    pub circularity_threshold: f64,
    pub min_contour_width: u32,
    pub min_contour_height: u32,
    pub max_contour_width: u32,
    pub max_contour_height: u32,
}

impl Default for GlyphParams {
    fn default() -> Self {
        Self {
            min_area: 20.0,
            max_area: 100.0,
            aspect_ratio_threshold: 0.1,
            circularity_threshold: 0.1,
            min_contour_width: 0,
            min_contour_height: 0,
            max_contour_width: 100,
            max_contour_height: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerParams {
    /// Components narrower than this fraction of the strip are not markers.
    pub min_relative_width: f64,
    /// Inclusive band, in percent of background pixels inside the box.
    pub density_min: f64,
    pub density_max: f64,
}

impl Default for MarkerParams {
    fn default() -> Self {
        Self {
            min_relative_width: 0.02,
            density_min: 1.0,
            density_max: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlicingParams {
    pub min_relative_width: f64,
    /// Rotate exported column slices by 270 degrees.
    pub rotate: bool,
}

impl Default for SlicingParams {
    fn default() -> Self {
        Self {
            min_relative_width: 0.05,
            rotate: true,
        }
    }
}
