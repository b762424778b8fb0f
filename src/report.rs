//! Per-sheet results and diagnostic records written next to the crops.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::io;
use crate::models::{BoundingBox, PitchLetter, Stage};
use crate::pipeline::PipelineData;

/// Metadata keys the standard steps write.
pub mod keys {
    pub const SECTION: &str = "section";
    pub const SECTION_BOX: &str = "section_box";
    pub const MEASURE: &str = "measure";
    pub const MEASURE_BOX: &str = "measure_box";
    pub const STAFF: &str = "staff";
    pub const NOTE: &str = "note";
    pub const GLYPH: &str = "glyph";
    pub const LETTER: &str = "letter";
    pub const REFERENCE_INDEX: &str = "reference_index";
}

/// Machine-readable record of a soft or hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub image: String,
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn write(&self, path: &Path) -> Result<()> {
        io::write_json(self, path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub section: usize,
    pub measure: usize,
    pub ordinal: usize,
    pub letter: PitchLetter,
    pub reference_index: usize,
    /// Box in the original sheet.
    pub bbox: BoundingBox,
}

impl NoteRecord {
    /// Read a note back from a finished pipeline item. Items missing any
    /// note field are not notes.
    pub fn from_item(item: &PipelineData) -> Option<Self> {
        Some(Self {
            section: item.get_int(keys::SECTION)? as usize,
            measure: item.get_int(keys::MEASURE)? as usize,
            ordinal: item.get_int(keys::NOTE)? as usize,
            letter: item.get_letter(keys::LETTER)?,
            reference_index: item.get_int(keys::REFERENCE_INDEX)? as usize,
            bbox: item.bbox?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetReport {
    pub image: String,
    /// Notes in reading order: section, then measure, then position.
    pub notes: Vec<NoteRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SheetReport {
    pub fn from_results(image: &str, results: &[PipelineData], diagnostics: Vec<Diagnostic>) -> Self {
        let mut notes: Vec<NoteRecord> = results.iter().filter_map(NoteRecord::from_item).collect();
        notes.sort_by_key(|n| (n.section, n.measure, n.ordinal));
        Self {
            image: image.to_string(),
            notes,
            diagnostics,
        }
    }

    /// Letters of every note, one measure per group, separated by `|`.
    pub fn letters(&self) -> String {
        let mut out = String::new();
        let mut current: Option<(usize, usize)> = None;
        for note in &self.notes {
            let key = (note.section, note.measure);
            match current {
                Some(k) if k == key => out.push(' '),
                Some(_) => out.push_str(" | "),
                None => {}
            }
            current = Some(key);
            out.push_str(&note.letter.to_string());
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        io::write_json(self, path)
    }
}
