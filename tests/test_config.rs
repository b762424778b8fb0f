//! Integration tests for configuration loading and validation.

mod common;

use common::*;
use std::fs;

#[test]
fn test_defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.staff.max_lines, 5);
    assert_eq!(config.glyph_mask.mode, BinarizeMode::AdaptiveGaussian);
    assert_eq!(config.marker_mask.mode, BinarizeMode::FixedInverse);
}

#[test]
fn test_partial_file_falls_back_to_defaults() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "locator": { "matchThreshold": 0.8 },
            "glyphs": { "minArea": 30.0, "maxArea": 90.0 },
            "glyphMask": { "mode": "otsu-inverse", "morphology": "open-close" }
        }"#,
    )?;

    let config = Config::load(&path)?;

    assert_eq!(config.locator.match_threshold, 0.8);
    assert_eq!(config.locator.nms_overlap_threshold, LocatorParams::default().nms_overlap_threshold);
    assert_eq!(config.glyphs.min_area, 30.0);
    assert_eq!(config.glyphs.circularity_threshold, GlyphParams::default().circularity_threshold);
    assert_eq!(config.glyph_mask.mode, BinarizeMode::OtsuInverse);
    assert_eq!(config.glyph_mask.morphology, MorphologyOrder::OpenClose);
    assert_eq!(config.barlines.min_votes, BarlineParams::default().min_votes);
    Ok(())
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let mut config = Config::default();
    config.locator.match_threshold = 1.5;
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let mut config = Config::default();
    config.glyphs.min_area = 200.0;
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let mut config = Config::default();
    config.staff_mask.block_size = 4;
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let mut config = Config::default();
    config.marker.density_min = 70.0;
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    let mut config = Config::default();
    config.barlines.canny_low = 200.0;
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn test_load_rejects_invalid_file() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;

    let invalid = dir.path().join("invalid.json");
    fs::write(&invalid, r#"{ "locator": { "nmsOverlapThreshold": -0.1 } }"#)?;
    assert!(matches!(Config::load(&invalid), Err(Error::Config(_))));

    let malformed = dir.path().join("malformed.json");
    fs::write(&malformed, "{ locator")?;
    assert!(matches!(Config::load(&malformed), Err(Error::Json(_))));

    assert!(matches!(Config::load(dir.path().join("none.json")), Err(Error::Io(_))));
    Ok(())
}
