//! Staff position to letter name.

use image::DynamicImage;
use tracing::debug;

use crate::config::Config;
use crate::detection::glyphs::{MarkerScan, scan_markers};
use crate::detection::preprocessing::binarize;
use crate::detection::staff::{STAFF_REFERENCE_COUNT, StaffReferenceTable};
use crate::error::{Error, Result};
use crate::models::{GlyphCandidate, Note, PitchLetter};

/// Letter for each reference, top line of a treble staff first.
pub const STAFF_LETTERS: [PitchLetter; STAFF_REFERENCE_COUNT] = [
    PitchLetter::G,
    PitchLetter::F,
    PitchLetter::E,
    PitchLetter::D,
    PitchLetter::C,
    PitchLetter::B,
    PitchLetter::A,
    PitchLetter::G,
    PitchLetter::F,
];

pub fn letter_for_index(index: usize) -> PitchLetter {
    STAFF_LETTERS[index % STAFF_LETTERS.len()]
}

/// Index of the reference closest to `target`. The first one wins a tie.
pub fn nearest_index(references: &[i32], target: f64) -> Result<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &r) in references.iter().enumerate() {
        let distance = (r as f64 - target).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((i, distance)),
        }
    }
    best.map(|(i, _)| i).ok_or(Error::EmptyReferenceTable)
}

/// Letter of the staff position nearest to `target`.
///
/// Targets far above or below the staff still snap to the outermost entry.
pub fn map_pitch(table: &StaffReferenceTable, target: f64) -> Result<PitchLetter> {
    nearest_index(table.lines(), target).map(letter_for_index)
}

/// Promote one glyph using the vertical centre of its box.
pub fn note_for(table: &StaffReferenceTable, glyph: &GlyphCandidate, ordinal: usize) -> Result<Note> {
    let (_, cy) = glyph.bbox.center();
    let reference_index = nearest_index(table.lines(), cy)?;
    Ok(Note {
        glyph: *glyph,
        letter: letter_for_index(reference_index),
        ordinal,
        reference_index,
    })
}

/// Promote glyphs to notes. Ordinals follow the order of `glyphs`.
pub fn assign_notes(table: &StaffReferenceTable, glyphs: &[GlyphCandidate]) -> Result<Vec<Note>> {
    glyphs
        .iter()
        .enumerate()
        .map(|(ordinal, glyph)| note_for(table, glyph, ordinal))
        .collect()
}

/// Letter inferred from the marker glyph of a rotated note column.
#[derive(Debug, Clone)]
pub struct MarkerPitch {
    pub scan: MarkerScan,
    pub reference_index: usize,
    pub letter: PitchLetter,
}

/// Find the marker on `strip` and look its right edge up in `table`.
///
/// When no marker is found the target is 0 and the first entry answers.
pub fn infer_marker_pitch(strip: &DynamicImage, table: &StaffReferenceTable, config: &Config) -> Result<MarkerPitch> {
    let mask = binarize(strip, &config.marker_mask);
    let scan = scan_markers(&mask, &config.marker);
    let reference_index = nearest_index(table.lines(), scan.target as f64)?;
    let letter = letter_for_index(reference_index);
    debug!(target = scan.target, reference_index, %letter, "marker pitch");
    Ok(MarkerPitch {
        scan,
        reference_index,
        letter,
    })
}
