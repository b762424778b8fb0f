use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::arc_length;
use imageproc::point::Point;

use crate::models::{BoundingBox, Contour};

/// Find the outer borders of every top-level ink component (ink = non-zero).
///
/// Components nested inside another component's hole are not reported.
pub fn find_external_contours(binary: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let bbox = bounding_box(&c.points)?;
            Some(Contour {
                bbox,
                area: polygon_area(&c.points),
                perimeter: arc_length(&c.points, true),
                ink_pixels: ink_in_box(binary, &bbox),
            })
        })
        .collect()
}

/// Inclusive bounds of a point set.
fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Shoelace area of the closed border polygon through pixel centres.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

fn ink_in_box(binary: &GrayImage, bbox: &BoundingBox) -> u32 {
    let mut count = 0;
    for y in bbox.y..bbox.bottom() {
        for x in bbox.x..bbox.right() {
            if binary.get_pixel(x, y)[0] > 0 {
                count += 1;
            }
        }
    }
    count
}
