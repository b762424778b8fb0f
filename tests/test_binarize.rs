//! Integration tests for binarization and morphology.
//!
//! Tests cover:
//! - Every mode returning an empty mask for a raster without contrast
//! - Otsu and fixed thresholds marking dark ink as foreground
//! - Adaptive thresholding picking up dark edges against paper
//! - Horizontal line removal keeping glyph ink
//! - Square and line-shaped openings

mod common;

use common::*;
use image::DynamicImage;
use sheetnotes::detection::morphology::{self, RectKernel};
use sheetnotes::detection::preprocessing::{binarize, binarize_gray, remove_horizontal_lines};

fn params(mode: BinarizeMode) -> BinarizeParams {
    BinarizeParams {
        mode,
        ..BinarizeParams::default()
    }
}

#[test]
fn test_no_contrast_gives_empty_mask() {
    let blank = paper(60, 40);
    for mode in [
        BinarizeMode::AdaptiveGaussian,
        BinarizeMode::OtsuInverse,
        BinarizeMode::FixedInverse,
    ] {
        let mask = binarize_gray(&blank, &params(mode));
        assert_eq!(mask.dimensions(), (60, 40));
        assert_eq!(count_ink(&mask), 0, "{mode:?} found ink on blank paper");
    }
}

#[test]
fn test_otsu_marks_dark_square() {
    // 1. Black 10x10 square on white paper
    let mut page = paper(50, 50);
    draw_block(&mut page, 20, 20, 10, 10, BLACK);

    // 2. Binarize through the DynamicImage entry point
    let mask = binarize(&DynamicImage::ImageLuma8(page), &params(BinarizeMode::OtsuInverse));

    // 3. Exactly the square is ink
    assert_eq!(count_ink(&mask), 100);
    assert_eq!(mask.get_pixel(25, 25)[0], 255);
    assert_eq!(mask.get_pixel(5, 5)[0], 0);
}

#[test]
fn test_fixed_threshold_level() {
    let mut page = paper(30, 10);
    draw_block(&mut page, 0, 0, 10, 10, image::Luma([100u8]));
    draw_block(&mut page, 10, 0, 10, 10, image::Luma([200u8]));

    let mask = binarize_gray(&page, &params(BinarizeMode::FixedInverse));

    // 100 <= 128 is ink, 200 and 255 are paper
    assert_eq!(count_ink(&mask), 100);
    assert_eq!(mask.get_pixel(5, 5)[0], 255);
    assert_eq!(mask.get_pixel(15, 5)[0], 0);
}

#[test]
fn test_adaptive_marks_edges() {
    let mut page = paper(80, 80);
    draw_block(&mut page, 20, 20, 40, 40, BLACK);

    let mask = binarize_gray(&page, &params(BinarizeMode::AdaptiveGaussian));

    // Left edge of the square is darker than its neighbourhood
    assert_eq!(mask.get_pixel(20, 40)[0], 255);
    // Paper far from the square stays background
    assert_eq!(mask.get_pixel(2, 2)[0], 0);
    assert_eq!(mask.get_pixel(77, 77)[0], 0);
}

#[test]
fn test_horizontal_line_removal_keeps_glyphs() {
    // 1. Mask with a long 2px line and a separate 6x6 blob
    let mut mask = empty_mask(200, 60);
    draw_block(&mut mask, 10, 10, 150, 2, INK);
    draw_block(&mut mask, 80, 30, 6, 6, INK);

    // 2. Remove runs of 40px or more
    let stripped = remove_horizontal_lines(&mask, 40);

    // 3. Only the blob survives
    assert_eq!(count_ink(&stripped), 36);
    assert_eq!(stripped.get_pixel(50, 10)[0], 0);
    assert_eq!(stripped.get_pixel(82, 32)[0], 255);
}

#[test]
fn test_line_removal_through_binarize() {
    let mut page = paper(200, 60);
    draw_block(&mut page, 0, 10, 200, 2, BLACK);
    draw_block(&mut page, 80, 30, 6, 6, BLACK);

    let mask = binarize_gray(
        &page,
        &BinarizeParams {
            mode: BinarizeMode::FixedInverse,
            remove_horizontal_lines: true,
            line_removal_width: 40,
            ..BinarizeParams::default()
        },
    );

    assert_eq!(count_ink(&mask), 36);
}

#[test]
fn test_open_close_removes_speckle() {
    let mut page = paper(40, 40);
    draw_block(&mut page, 10, 10, 10, 10, BLACK);
    draw_block(&mut page, 35, 35, 1, 1, BLACK);

    let mask = binarize_gray(
        &page,
        &BinarizeParams {
            mode: BinarizeMode::FixedInverse,
            morphology: MorphologyOrder::OpenClose,
            kernel_size: 3,
            ..BinarizeParams::default()
        },
    );

    assert_eq!(count_ink(&mask), 100);
    assert_eq!(mask.get_pixel(35, 35)[0], 0);
}

#[test]
fn test_line_opening_keeps_only_long_runs() {
    let mut mask = empty_mask(40, 5);
    draw_block(&mut mask, 2, 1, 3, 1, INK);
    draw_block(&mut mask, 10, 3, 10, 1, INK);

    let opened = morphology::open(&mask, RectKernel::horizontal(5));

    assert_eq!(count_ink(&opened), 10);
    for x in 10..20 {
        assert_eq!(opened.get_pixel(x, 3)[0], 255);
    }
}

#[test]
fn test_vertical_close_bridges_gap() {
    let mut mask = empty_mask(5, 30);
    draw_block(&mut mask, 2, 0, 1, 10, INK);
    draw_block(&mut mask, 2, 14, 1, 10, INK);

    let closed = morphology::close(&mask, RectKernel::vertical(9));

    for y in 0..24 {
        assert_eq!(closed.get_pixel(2, y)[0], 255, "gap left at y={y}");
    }
    assert_eq!(closed.get_pixel(1, 12)[0], 0);
}
