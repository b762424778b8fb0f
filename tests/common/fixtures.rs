use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

pub const INK: Luma<u8> = Luma([255u8]);
pub const BLACK: Luma<u8> = Luma([0u8]);
pub const WHITE: Luma<u8> = Luma([255u8]);

/// Blank paper: white everywhere.
pub fn paper(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, WHITE)
}

/// Blank mask: no ink.
pub fn empty_mask(width: u32, height: u32) -> GrayImage {
    GrayImage::new(width, height)
}

/// Full-width horizontal lines of `thickness` rows starting at each `ys`.
pub fn draw_rows(image: &mut GrayImage, ys: &[u32], thickness: u32, color: Luma<u8>) {
    let width = image.width();
    for &y in ys {
        draw_filled_rect_mut(image, Rect::at(0, y as i32).of_size(width, thickness), color);
    }
}

/// Full-height vertical lines of `thickness` columns starting at each `xs`.
pub fn draw_columns(image: &mut GrayImage, xs: &[u32], thickness: u32, color: Luma<u8>) {
    let height = image.height();
    for &x in xs {
        draw_filled_rect_mut(image, Rect::at(x as i32, 0).of_size(thickness, height), color);
    }
}

pub fn draw_block(image: &mut GrayImage, x: i32, y: i32, width: u32, height: u32, color: Luma<u8>) {
    draw_filled_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
}

pub fn draw_disc(image: &mut GrayImage, cx: i32, cy: i32, radius: i32, color: Luma<u8>) {
    draw_filled_circle_mut(image, (cx, cy), radius, color);
}

/// Binary mask of a five-line staff, lines 2px thick, 20px apart from y=20.
pub fn staff_mask(width: u32, height: u32) -> GrayImage {
    let mut mask = empty_mask(width, height);
    draw_rows(&mut mask, &[20, 40, 60, 80, 100], 2, INK);
    mask
}

/// Printed version of [`staff_mask`]: black lines on white paper.
pub fn staff_strip(width: u32, height: u32) -> GrayImage {
    let mut strip = paper(width, height);
    draw_rows(&mut strip, &[20, 40, 60, 80, 100], 2, BLACK);
    strip
}

/// Mask with three note-head discs (r=4) at x=30, 80, 130 on y=50 and one
/// 2x100 stem at x=170.
pub fn glyph_mask() -> GrayImage {
    let mut mask = empty_mask(200, 150);
    for cx in [130, 30, 80] {
        draw_disc(&mut mask, cx, 50, 4, INK);
    }
    draw_block(&mut mask, 170, 20, 2, 100, INK);
    mask
}

/// Section template: a black 8x8 square inside a 2px white margin.
pub fn section_template() -> GrayImage {
    let mut template = paper(12, 12);
    draw_block(&mut template, 2, 2, 8, 8, BLACK);
    template
}

/// Sheet with the section mark printed at (10, 20) and (10, 70).
pub fn sheet_with_sections() -> GrayImage {
    let mut sheet = paper(200, 120);
    for y in [20, 70] {
        draw_block(&mut sheet, 12, y + 2, 8, 8, BLACK);
    }
    sheet
}

/// Deterministic textured image for correlation tests.
pub fn textured(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([((x * x * 3 + y * y * 5 + x * y * 7 + x * 11) % 251) as u8])
    })
}

pub fn save_png(dir: &Path, name: &str, image: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).expect("Failed to save test image");
    path
}

pub fn count_ink(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}
