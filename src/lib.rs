pub mod batch;
pub mod config;
pub mod detection;
pub mod error;
pub mod io;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod report;

pub use config::Config;
pub use detection::build_standard_pipeline;
pub use detection::staff::StaffReferenceTable;
pub use detection::templates::TemplateSet;
pub use error::{Error, Result};
pub use models::{BoundingBox, GlyphCandidate, Note, PitchLetter, Region, Stage};
pub use pipeline::{
    DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineExecutor, PipelineRun,
    PipelineStep, StepFailure, WorkItem,
};
pub use report::{Diagnostic, NoteRecord, SheetReport};
