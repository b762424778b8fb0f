pub mod barlines;
pub mod contours;
pub mod glyphs;
pub mod hough;
pub mod morphology;
pub mod overlay;
pub mod pitch;
pub mod preprocessing;
pub mod staff;
pub mod steps;
pub mod templates;

use std::sync::Arc;

use crate::config::Config;
use crate::detection::steps::*;
use crate::detection::templates::TemplateSet;
use crate::pipeline::Pipeline;

/// Build the standard sheet pipeline:
/// sheet → sections → measures → (staff) → note heads → letters.
pub fn build_standard_pipeline(config: &Config, templates: TemplateSet, verbose: bool) -> Pipeline {
    Pipeline::new()
        .with_verbose(verbose)
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(SectionLocatorStep {
            templates,
            params: config.locator.clone(),
        }))
        .add_step(Arc::new(MeasureSplitStep {
            mask: config.staff_mask.clone(),
            params: config.barlines.clone(),
        }))
        .add_step(Arc::new(StaffDetectionStep {
            mask: config.staff_mask.clone(),
            params: config.staff.clone(),
        }))
        .add_step(Arc::new(GlyphExtractionStep {
            mask: config.glyph_mask.clone(),
            params: config.glyphs.clone(),
        }))
        .add_step(Arc::new(PitchMappingStep))
}
