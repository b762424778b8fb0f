#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from sheetnotes for tests
pub use sheetnotes::config::{BarlineParams, BinarizeMode, BinarizeParams, GlyphParams, LocatorParams, MorphologyOrder};
pub use sheetnotes::{BoundingBox, Config, Error, PitchLetter, Stage, StaffReferenceTable};
