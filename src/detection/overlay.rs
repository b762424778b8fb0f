//! Debug overlays. These images are side artifacts only; no stage reads them.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::detection::hough::LineSegment;
use crate::models::BoundingBox;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

pub fn draw_boxes(image: &DynamicImage, boxes: &[BoundingBox], color: Rgb<u8>) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for bbox in boxes.iter().filter(|b| !b.is_empty()) {
        let rect = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width, bbox.height);
        draw_hollow_rect_mut(&mut canvas, rect, color);
    }
    canvas
}

pub fn draw_rows(image: &DynamicImage, ys: &[i32], color: Rgb<u8>) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let right = canvas.width().saturating_sub(1) as f32;
    for &y in ys {
        draw_line_segment_mut(&mut canvas, (0.0, y as f32), (right, y as f32), color);
    }
    canvas
}

pub fn draw_segments(image: &DynamicImage, segments: &[LineSegment], color: Rgb<u8>) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for s in segments {
        draw_line_segment_mut(&mut canvas, (s.x1 as f32, s.y1 as f32), (s.x2 as f32, s.y2 as f32), color);
    }
    canvas
}
