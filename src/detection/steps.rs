use crate::config::{BarlineParams, BinarizeParams, GlyphParams, LocatorParams, StaffParams};
use crate::detection::barlines::{detect_barlines, split_measures};
use crate::detection::glyphs::extract_glyphs;
use crate::detection::overlay::{self, BLUE, GREEN, RED};
use crate::detection::pitch::note_for;
use crate::detection::preprocessing;
use crate::detection::staff::detect_staff;
use crate::detection::templates::{TemplateSet, locate_regions};
use crate::io::{CropExport, FsImageStore, ImageCrop, ImageStore};
use crate::models::{BoundingBox, Stage};
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};
use crate::report::keys;
use anyhow::Result;
use image::{DynamicImage, RgbImage};
use std::path::Path;
use tracing::debug;

/// Short label for debug artifacts, e.g. "s01-m02" (1-based).
fn item_tag(item: &PipelineData) -> String {
    let mut parts = Vec::new();
    if let Some(section) = item.get_int(keys::SECTION) {
        parts.push(format!("s{:02}", section + 1));
    }
    if let Some(measure) = item.get_int(keys::MEASURE) {
        parts.push(format!("m{:02}", measure + 1));
    }
    if parts.is_empty() {
        "sheet".to_string()
    } else {
        parts.join("-")
    }
}

fn save_overlay(dir: &Path, name: String, overlay: RgbImage) -> Result<()> {
    FsImageStore.save(&DynamicImage::ImageRgb8(overlay), &dir.join(name))?;
    Ok(())
}

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .iter()
            .map(|item| item.with_image(DynamicImage::ImageLuma8(preprocessing::to_grayscale(&item.image))))
            .collect())
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }

    fn stage(&self) -> Stage {
        Stage::Load
    }
}

/// Find template-matched sections - splits one sheet into many sections
pub struct SectionLocatorStep {
    pub templates: TemplateSet,
    pub params: LocatorParams,
}

impl PipelineStep for SectionLocatorStep {
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let localization = locate_regions(&item.image, &self.templates, &self.params, &ImageCrop::default());
            if localization.regions.is_empty() {
                context.report(
                    Stage::Locate,
                    format!(
                        "no section matched ({} candidates before suppression)",
                        localization.candidate_count
                    ),
                );
            }

            let origin = item.absolute_bbox();
            if let Some(dir) = context.artifact_dir() {
                let boxes: Vec<BoundingBox> = localization.regions.iter().map(|r| r.bbox).collect();
                save_overlay(
                    dir,
                    format!("{}-sections.png", item_tag(&item)),
                    overlay::draw_boxes(&item.image, &boxes, GREEN),
                )?;
            }

            for section in localization.regions {
                let bbox = section.bbox.offset_by(&origin);
                result.push(
                    PipelineData::from_region(&item, section.image, bbox)
                        .with_metadata(keys::SECTION, MetadataValue::Int(section.ordinal as i64))
                        .with_metadata(keys::SECTION_BOX, MetadataValue::Box(bbox)),
                );
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Section Localization"
    }

    fn stage(&self) -> Stage {
        Stage::Locate
    }
}

/// Split sections at their barlines - one item per measure
pub struct MeasureSplitStep {
    pub mask: BinarizeParams,
    pub params: BarlineParams,
}

impl PipelineStep for MeasureSplitStep {
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let binary = preprocessing::binarize(&item.image, &self.mask);
            let detection = detect_barlines(&binary, &self.params);

            if let Some(dir) = context.artifact_dir() {
                save_overlay(
                    dir,
                    format!("{}-barlines.png", item_tag(&item)),
                    overlay::draw_segments(&item.image, &detection.segments, BLUE),
                )?;
            }

            if let Some(failure) = detection.failure {
                context.report(Stage::Barlines, format!("{}: {}", item_tag(&item), failure));
                continue;
            }

            let origin = item.absolute_bbox();
            for measure in split_measures(&item.image, &detection.barlines, &ImageCrop::default()) {
                let bbox = measure.bbox.offset_by(&origin);
                result.push(
                    PipelineData::from_region(&item, measure.image, bbox)
                        .with_metadata(keys::MEASURE, MetadataValue::Int(measure.ordinal as i64))
                        .with_metadata(keys::MEASURE_BOX, MetadataValue::Box(bbox)),
                );
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Measure Splitting"
    }

    fn stage(&self) -> Stage {
        Stage::Barlines
    }
}

/// Attach the staff reference table of each measure
pub struct StaffDetectionStep {
    pub mask: BinarizeParams,
    pub params: StaffParams,
}

impl PipelineStep for StaffDetectionStep {
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let binary = preprocessing::binarize(&item.image, &self.mask);
            let detection = detect_staff(&binary, &self.params);
            let tag = item_tag(&item);

            if let Some(dir) = context.artifact_dir() {
                detection.table.save(&dir.join(format!("{tag}-staff.json")))?;
                save_overlay(
                    dir,
                    format!("{tag}-staff.png"),
                    overlay::draw_rows(&item.image, detection.table.lines(), RED),
                )?;
            }

            if let Some(failure) = detection.failure {
                context.report(Stage::Staff, format!("{tag}: {failure}"));
            }
            if detection.table.is_empty() {
                continue;
            }

            debug!(%tag, references = detection.table.len(), "staff attached");
            result.push(item.with_metadata(keys::STAFF, MetadataValue::Staff(detection.table)));
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Staff Detection"
    }

    fn stage(&self) -> Stage {
        Stage::Staff
    }
}

/// Extract note heads - one item per glyph, cropped from the measure
pub struct GlyphExtractionStep {
    pub mask: BinarizeParams,
    pub params: GlyphParams,
}

impl PipelineStep for GlyphExtractionStep {
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        let cropper = ImageCrop::default();

        for item in data {
            let binary = preprocessing::binarize(&item.image, &self.mask);
            let glyphs = extract_glyphs(&binary, &self.params);
            let tag = item_tag(&item);

            if let Some(dir) = context.artifact_dir() {
                let boxes: Vec<BoundingBox> = glyphs.iter().map(|g| g.bbox).collect();
                save_overlay(
                    dir,
                    format!("{tag}-glyphs.png"),
                    overlay::draw_boxes(&item.image, &boxes, GREEN),
                )?;
            }

            if glyphs.is_empty() {
                context.report(Stage::Glyphs, format!("{tag}: no note heads"));
                continue;
            }

            let origin = item.absolute_bbox();
            let mut ordinal = 0i64;
            for glyph in glyphs {
                let crop = match cropper.crop(&item.image, &glyph.bbox) {
                    Ok(crop) => crop,
                    Err(e) => {
                        context.report(Stage::Glyphs, format!("{tag}: {e}"));
                        continue;
                    }
                };
                result.push(
                    PipelineData::from_region(&item, crop, glyph.bbox.offset_by(&origin))
                        .with_metadata(keys::NOTE, MetadataValue::Int(ordinal))
                        .with_metadata(keys::GLYPH, MetadataValue::Glyph(glyph)),
                );
                ordinal += 1;
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Glyph Extraction"
    }

    fn stage(&self) -> Stage {
        Stage::Glyphs
    }
}

/// Map each glyph to a letter using its measure's staff
pub struct PitchMappingStep;

impl PipelineStep for PitchMappingStep {
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let (Some(staff), Some(glyph)) = (item.get_staff(keys::STAFF), item.get_glyph(keys::GLYPH)) else {
                context.report(Stage::Pitch, format!("{}: missing staff or glyph", item_tag(&item)));
                continue;
            };
            let ordinal = item.get_int(keys::NOTE).unwrap_or(0) as usize;
            let note = match note_for(staff, glyph, ordinal) {
                Ok(note) => note,
                Err(e) => {
                    context.report(Stage::Pitch, format!("{}: {e}", item_tag(&item)));
                    continue;
                }
            };
            result.push(
                item.with_metadata(keys::LETTER, MetadataValue::Letter(note.letter))
                    .with_metadata(keys::REFERENCE_INDEX, MetadataValue::Int(note.reference_index as i64)),
            );
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Pitch Mapping"
    }

    fn stage(&self) -> Stage {
        Stage::Pitch
    }
}
