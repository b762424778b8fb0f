//! Integration tests for glyph extraction, marker scanning and column slicing.
//!
//! Tests cover:
//! - Note-head filtering by area, aspect ratio and circularity
//! - Contour metrics for filled discs and thin bars
//! - Marker density classification and the marker target
//! - Full-height note columns, optionally rotated

mod common;

use common::*;
use image::DynamicImage;
use sheetnotes::config::{MarkerParams, SlicingParams};
use sheetnotes::detection::contours::find_external_contours;
use sheetnotes::detection::glyphs::{
    DensityClass, background_density, extract_glyphs, filter_note_heads, is_note_head, note_column_boxes,
    export_note_columns, scan_markers, slice_note_columns,
};
use sheetnotes::models::Contour;

/// 200x60 mask with a disc (r=8) at x=50, a solid 20x10 block and a 2px bar.
fn marker_mask(with_disc: bool) -> image::GrayImage {
    let mut mask = empty_mask(200, 60);
    if with_disc {
        draw_disc(&mut mask, 50, 30, 8, INK);
    }
    draw_block(&mut mask, 100, 20, 20, 10, INK);
    draw_block(&mut mask, 150, 5, 2, 50, INK);
    mask
}

#[test]
fn test_extract_three_note_heads() {
    let glyphs = extract_glyphs(&glyph_mask(), &GlyphParams::default());

    let xs: Vec<u32> = glyphs.iter().map(|g| g.bbox.x).collect();
    assert_eq!(xs, vec![26, 76, 126]);
    for glyph in &glyphs {
        assert_eq!((glyph.bbox.width, glyph.bbox.height), (9, 9));
        assert_eq!(glyph.bbox.y, 46);
        assert!(glyph.circularity > 0.7, "circularity {}", glyph.circularity);
    }
}

#[test]
fn test_contour_metrics() {
    let contours = find_external_contours(&glyph_mask());
    assert_eq!(contours.len(), 4);

    let bar = contours
        .iter()
        .find(|c| c.bbox.x == 170)
        .expect("bar contour");
    assert_eq!((bar.width(), bar.height()), (2, 100));
    assert_eq!(bar.ink_pixels, 200);
    assert!(bar.aspect_ratio() < 0.1);

    let disc = contours.iter().find(|c| c.bbox.x == 26).expect("disc contour");
    assert!(disc.area > 20.0 && disc.area < 100.0);
    assert!(disc.perimeter > 0.0);
}

#[test]
fn test_note_head_filter_is_consistent() {
    // 1. Every candidate the filter keeps satisfies the predicate
    let params = GlyphParams::default();
    let contours = find_external_contours(&glyph_mask());
    let heads = filter_note_heads(&contours, &params);

    for head in &heads {
        let source = contours.iter().find(|c| c.bbox == head.bbox).expect("source contour");
        assert!(is_note_head(source, &params));
    }

    // 2. Rejected contours fail it
    let rejected = contours.iter().filter(|c| !heads.iter().any(|h| h.bbox == c.bbox));
    for contour in rejected {
        assert!(!is_note_head(contour, &params));
    }

    // 3. Filtering is repeatable
    assert_eq!(filter_note_heads(&contours, &params), heads);
}

#[test]
fn test_note_head_thresholds() {
    let round = Contour {
        bbox: BoundingBox::new(0, 0, 9, 9),
        area: 48.0,
        perimeter: 27.0,
        ink_pixels: 61,
    };
    let params = GlyphParams::default();
    assert!(is_note_head(&round, &params));

    let too_big = Contour { area: 150.0, ..round.clone() };
    assert!(!is_note_head(&too_big, &params));

    let ragged = Contour { perimeter: 200.0, ..round.clone() };
    assert!(!is_note_head(&ragged, &params));

    let narrow_only = GlyphParams {
        max_contour_width: 8,
        ..GlyphParams::default()
    };
    assert!(!is_note_head(&round, &narrow_only));
}

#[test]
fn test_background_density() {
    let mut mask = empty_mask(20, 20);
    draw_block(&mut mask, 0, 0, 10, 20, INK);

    let half = background_density(&mask, &BoundingBox::new(0, 0, 20, 20));
    assert!((half - 50.0).abs() < 1e-9);
    assert_eq!(background_density(&mask, &BoundingBox::new(0, 0, 10, 20)), 0.0);
    assert_eq!(background_density(&mask, &BoundingBox::new(0, 0, 0, 20)), 0.0);
}

#[test]
fn test_marker_scan_classifies_components() {
    let scan = scan_markers(&marker_mask(true), &MarkerParams::default());

    let classes: Vec<DensityClass> = scan.items.iter().map(|i| i.class).collect();
    assert_eq!(
        classes,
        vec![DensityClass::Marker, DensityClass::Other, DensityClass::Narrow]
    );
    assert!(scan.found_marker());
    assert_eq!(scan.target, 59);
    assert_eq!(scan.narrow_positions(), vec![150]);
    assert!(scan.items[2].density.is_none());
    assert_eq!(scan.items[1].density, Some(0.0));
}

#[test]
fn test_marker_scan_without_marker() {
    let scan = scan_markers(&marker_mask(false), &MarkerParams::default());

    assert!(!scan.found_marker());
    assert_eq!(scan.target, 0);
    assert_eq!(scan.items.len(), 2);
}

#[test]
fn test_marker_band_is_configurable() {
    // A band that excludes the disc's ~23% background
    let params = MarkerParams {
        density_min: 30.0,
        density_max: 60.0,
        ..MarkerParams::default()
    };

    let scan = scan_markers(&marker_mask(true), &params);

    assert!(!scan.found_marker());
    assert_eq!(scan.target, 0);
}

#[test]
fn test_note_column_boxes() {
    let boxes = note_column_boxes(&marker_mask(true), &SlicingParams::default());

    // 20px block and 17px disc are wide enough, the 2px bar is not
    assert_eq!(
        boxes,
        vec![BoundingBox::new(42, 0, 17, 60), BoundingBox::new(100, 0, 20, 60)]
    );
}

#[test]
fn test_slice_note_columns() {
    let mask = marker_mask(true);
    let strip = DynamicImage::ImageLuma8(mask.clone());

    let rotated = slice_note_columns(&strip, &mask, &SlicingParams::default());
    assert_eq!(rotated.len(), 2);
    assert_eq!((rotated[0].image.width(), rotated[0].image.height()), (60, 17));
    assert_eq!(rotated[1].ordinal, 1);

    let upright = slice_note_columns(
        &strip,
        &mask,
        &SlicingParams {
            rotate: false,
            ..SlicingParams::default()
        },
    );
    assert_eq!((upright[0].image.width(), upright[0].image.height()), (17, 60));
}

#[test]
fn test_export_note_columns_from_scan() -> anyhow::Result<()> {
    // 1. A scanned strip: black ink on white paper
    let mut strip = paper(200, 60);
    draw_disc(&mut strip, 50, 30, 8, BLACK);
    draw_block(&mut strip, 100, 20, 20, 10, BLACK);
    draw_block(&mut strip, 150, 5, 2, 50, BLACK);
    let dir = tempfile::TempDir::new()?;
    let config = Config::default();

    // 2. Export
    let written = export_note_columns(
        &DynamicImage::ImageLuma8(strip),
        &config.marker_mask,
        &config.slicing,
        &sheetnotes::io::FsImageStore,
        dir.path(),
    )?;

    // 3. One rotated file per wide component, numbered left to right
    assert_eq!(written, vec![dir.path().join("column-01.png"), dir.path().join("column-02.png")]);
    let first = image::open(&written[0])?;
    assert_eq!(first.width(), 60);
    let second = image::open(&written[1])?;
    assert_eq!((second.width(), second.height()), (60, 20));
    Ok(())
}
