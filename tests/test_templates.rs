//! Integration tests for template-matched section localization.
//!
//! Tests cover:
//! - Zero-mean correlation scoring an exact placement at 1
//! - Flat windows scoring 0 and oversized templates being rejected
//! - Non-maximum suppression collapsing overlapping clusters
//! - Section localization on a synthetic sheet, in reading order
//! - Loading a template folder, skipping unreadable and unrelated files

mod common;

use approx::assert_relative_eq;
use common::*;
use image::DynamicImage;
use sheetnotes::detection::templates::{
    Template, TemplateSet, candidate_boxes, locate_regions, match_template_zncc, non_maximum_suppression,
};
use sheetnotes::io::ImageCrop;

#[test]
fn test_exact_placement_scores_one() {
    let image = textured(40, 30);
    let template = image::imageops::crop_imm(&image, 10, 5, 8, 6).to_image();

    let scores = match_template_zncc(&image, &template).expect("template fits");

    assert_eq!(scores.dimensions(), (33, 25));
    assert_relative_eq!(scores.get_pixel(10, 5)[0] as f64, 1.0, epsilon = 1e-4);
    for score in scores.pixels() {
        assert!(score[0] <= 1.0 && score[0] >= -1.0);
    }
}

#[test]
fn test_flat_window_scores_zero() {
    let image = paper(30, 30);
    let template = section_template();

    let scores = match_template_zncc(&image, &template).expect("template fits");

    assert!(scores.pixels().all(|p| p[0] == 0.0));
}

#[test]
fn test_oversized_template_does_not_match() {
    let image = paper(10, 10);
    let template = paper(11, 4);
    assert!(match_template_zncc(&image, &template).is_none());
}

#[test]
fn test_candidate_box_geometry() {
    // One cell above threshold at (4, 3) on a 20-wide surface
    let mut scores = sheetnotes::detection::templates::ScoreMap::new(20, 10);
    scores.put_pixel(4, 3, image::Luma([0.9f32]));

    let boxes = candidate_boxes(&scores, 10, 100, 100, &LocatorParams::default());

    // left = 4 * 1.75, width = 20 - 8, height = 10 * 1.2
    assert_eq!(boxes, vec![BoundingBox::new(7, 3, 12, 12)]);
}

#[test]
fn test_nms_collapses_cluster() {
    let boxes = vec![
        BoundingBox::new(0, 0, 10, 10),
        BoundingBox::new(1, 1, 10, 10),
        BoundingBox::new(50, 50, 10, 10),
    ];

    let kept = non_maximum_suppression(boxes, 0.3);

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0], BoundingBox::new(50, 50, 10, 10));
    assert_eq!(kept[1], BoundingBox::new(1, 1, 10, 10));
}

#[test]
fn test_nms_survivors_do_not_overlap() {
    // 1. A grid of boxes that overlap their neighbours by varying amounts
    let mut boxes = Vec::new();
    for i in 0..6u32 {
        for j in 0..4u32 {
            boxes.push(BoundingBox::new(i * 7, j * 9, 12, 12));
        }
    }
    let input_len = boxes.len();
    let threshold = 0.3;

    // 2. Suppress
    let kept = non_maximum_suppression(boxes, threshold);

    // 3. Never grows, and every later pick overlaps each earlier pick below
    //    the threshold of the earlier pick's area
    assert!(kept.len() <= input_len);
    assert!(!kept.is_empty());
    for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
            let overlap = a.intersection_area(b) as f64 / a.area() as f64;
            assert!(overlap < threshold, "{a:?} and {b:?} overlap by {overlap}");
        }
    }
}

#[test]
fn test_nms_empty_input() {
    assert!(non_maximum_suppression(Vec::new(), 0.3).is_empty());
}

#[test]
fn test_locate_sections_in_reading_order() {
    // 1. Sheet with the mark printed twice
    let sheet = DynamicImage::ImageLuma8(sheet_with_sections());
    let templates = TemplateSet::new(vec![Template {
        name: "mark.png".to_string(),
        image: section_template(),
    }]);

    // 2. Locate
    let found = locate_regions(&sheet, &templates, &LocatorParams::default(), &ImageCrop::default());

    // 3. One section per mark, top first
    assert!(found.skipped_templates.is_empty());
    assert!(found.candidate_count >= 2);
    assert_eq!(found.regions.len(), 2);
    let (top, bottom) = (&found.regions[0], &found.regions[1]);
    assert_eq!(top.ordinal, 0);
    assert_eq!(bottom.ordinal, 1);
    assert!(top.bbox.y.abs_diff(20) <= 4, "top section at {:?}", top.bbox);
    assert!(bottom.bbox.y.abs_diff(70) <= 4, "bottom section at {:?}", bottom.bbox);
    for region in &found.regions {
        assert!(region.bbox.fits_within(200, 120));
        assert_eq!(region.image.width(), region.bbox.width);
        assert_eq!(region.image.height(), region.bbox.height);
    }
}

#[test]
fn test_oversized_template_is_skipped() {
    let sheet = DynamicImage::ImageLuma8(paper(20, 20));
    let templates = TemplateSet::new(vec![Template {
        name: "huge.png".to_string(),
        image: paper(40, 40),
    }]);

    let found = locate_regions(&sheet, &templates, &LocatorParams::default(), &ImageCrop::default());

    assert!(found.regions.is_empty());
    assert_eq!(found.skipped_templates, vec!["huge.png".to_string()]);
}

#[test]
fn test_load_template_folder() -> anyhow::Result<()> {
    // 1. Folder with two images, a broken png and a text file
    let dir = tempfile::TempDir::new()?;
    save_png(dir.path(), "b.png", &section_template());
    save_png(dir.path(), "a.PNG", &section_template());
    std::fs::write(dir.path().join("broken.png"), b"not an image")?;
    std::fs::write(dir.path().join("notes.txt"), b"ignored")?;

    // 2. Load
    let set = TemplateSet::load_dir(dir.path())?;

    // 3. Readable images only, in file-name order
    let names: Vec<&str> = set.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a.PNG", "b.png"]);
    Ok(())
}

#[test]
fn test_load_empty_folder_fails() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let result = TemplateSet::load_dir(dir.path());
    assert!(matches!(result, Err(Error::TemplateLoad { .. })));

    let missing = TemplateSet::load_dir(dir.path().join("missing"));
    assert!(matches!(missing, Err(Error::TemplateLoad { .. })));
    Ok(())
}
