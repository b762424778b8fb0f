//! Integration tests for pitch mapping.
//!
//! Tests cover:
//! - Exact and nearest lookups, including ties and far-off targets
//! - Promotion of glyphs to notes in reading order
//! - Marker-based pitch inference on a rotated column

mod common;

use common::*;
use image::DynamicImage;
use sheetnotes::GlyphCandidate;
use sheetnotes::detection::pitch::{
    STAFF_LETTERS, assign_notes, infer_marker_pitch, letter_for_index, map_pitch, nearest_index,
};

fn table() -> StaffReferenceTable {
    StaffReferenceTable::new(vec![20, 30, 40, 50, 60, 70, 80, 90, 100]).expect("valid table")
}

/// 9x9 glyph whose box centre sits half a pixel below `cy`.
fn glyph_at(x: u32, cy: u32) -> GlyphCandidate {
    GlyphCandidate {
        bbox: BoundingBox::new(x, cy - 4, 9, 9),
        area: 48.0,
        perimeter: 27.0,
        aspect_ratio: 1.0,
        circularity: 0.8,
    }
}

#[test]
fn test_exact_hits() {
    let table = table();
    assert_eq!(map_pitch(&table, 20.0).unwrap(), PitchLetter::G);
    assert_eq!(map_pitch(&table, 60.0).unwrap(), PitchLetter::C);
    assert_eq!(map_pitch(&table, 100.0).unwrap(), PitchLetter::F);
}

#[test]
fn test_tie_goes_to_upper_reference() {
    assert_eq!(nearest_index(table().lines(), 25.0).unwrap(), 0);
    assert_eq!(map_pitch(&table(), 25.0).unwrap(), PitchLetter::G);
    assert_eq!(map_pitch(&table(), 25.1).unwrap(), PitchLetter::F);
}

#[test]
fn test_far_targets_snap_to_outer_entries() {
    assert_eq!(map_pitch(&table(), -500.0).unwrap(), PitchLetter::G);
    assert_eq!(map_pitch(&table(), 1000.0).unwrap(), PitchLetter::F);
}

#[test]
fn test_empty_table_is_an_error() {
    let empty = StaffReferenceTable::empty();
    assert!(matches!(map_pitch(&empty, 10.0), Err(Error::EmptyReferenceTable)));
    assert!(matches!(
        assign_notes(&empty, &[glyph_at(0, 20)]),
        Err(Error::EmptyReferenceTable)
    ));
}

#[test]
fn test_partial_table_uses_its_own_indices() {
    let partial = StaffReferenceTable::new(vec![20, 30, 40]).expect("valid table");
    assert_eq!(map_pitch(&partial, 39.0).unwrap(), PitchLetter::E);
}

#[test]
fn test_letter_cycle() {
    assert_eq!(STAFF_LETTERS.len(), 9);
    assert_eq!(letter_for_index(0), PitchLetter::G);
    assert_eq!(letter_for_index(5), PitchLetter::B);
    assert_eq!(letter_for_index(9), PitchLetter::G);
}

#[test]
fn test_assign_notes_keeps_order() {
    let glyphs = [glyph_at(10, 20), glyph_at(30, 60), glyph_at(50, 100)];

    let notes = assign_notes(&table(), &glyphs).unwrap();

    let letters: Vec<PitchLetter> = notes.iter().map(|n| n.letter).collect();
    assert_eq!(letters, vec![PitchLetter::G, PitchLetter::C, PitchLetter::F]);
    let ordinals: Vec<usize> = notes.iter().map(|n| n.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
    assert_eq!(notes[1].reference_index, 4);
    assert_eq!(notes[2].glyph, glyphs[2]);
}

#[test]
fn test_marker_pitch_on_rotated_column() {
    // 1. White column with one filled marker disc
    let mut strip = paper(200, 60);
    draw_disc(&mut strip, 50, 30, 8, BLACK);
    let table = StaffReferenceTable::new(vec![11, 21, 31, 41, 51, 61, 71, 81, 91]).unwrap();

    // 2. Infer
    let pitch = infer_marker_pitch(&DynamicImage::ImageLuma8(strip), &table, &Config::default()).unwrap();

    // 3. Right edge 59 snaps to 61
    assert!(pitch.scan.found_marker());
    assert_eq!(pitch.scan.target, 59);
    assert_eq!(pitch.reference_index, 5);
    assert_eq!(pitch.letter, PitchLetter::B);
}

#[test]
fn test_marker_pitch_without_marker() {
    let table = table();

    let pitch = infer_marker_pitch(&DynamicImage::ImageLuma8(paper(100, 40)), &table, &Config::default()).unwrap();

    assert_eq!(pitch.scan.target, 0);
    assert_eq!(pitch.reference_index, 0);
    assert_eq!(pitch.letter, PitchLetter::G);
}
