//! Batch processing: one pipeline run per sheet, sheets in parallel.
//!
//! A sheet either produces its full output tree or nothing but a
//! `<name>.diagnostic.json` record; partial output is removed on failure.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::io::{CropExport, ImageCrop, ImageStore};
use crate::models::{BoundingBox, Stage};
use crate::pipeline::{Pipeline, PipelineData, StepFailure};
use crate::report::{Diagnostic, SheetReport, keys};

#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Processed(SheetReport),
    Failed(Diagnostic),
}

impl ImageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ImageOutcome::Failed(_))
    }
}

/// File stem used to name a sheet's outputs.
pub fn image_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// One output name per path. Repeated stems get `-2`, `-3`, ... so no two
/// sheets of a batch write to the same directory.
pub fn output_names(paths: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = paths.iter().map(|p| image_name(p)).collect();
    let mut reserved: HashSet<String> = stems.iter().cloned().collect();
    let mut claimed: HashSet<&str> = HashSet::new();

    stems
        .iter()
        .map(|stem| {
            if claimed.insert(stem.as_str()) {
                return stem.clone();
            }
            let mut n = 2;
            loop {
                let candidate = format!("{stem}-{n}");
                if reserved.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Process every sheet in parallel. One failing sheet never stops the others.
pub fn process_batch(
    paths: &[PathBuf],
    pipeline: &Pipeline,
    store: &dyn ImageStore,
    out_dir: &Path,
) -> Vec<ImageOutcome> {
    let names = output_names(paths);
    let outcomes: Vec<ImageOutcome> = paths
        .par_iter()
        .zip(names.par_iter())
        .map(|(path, name)| process_named(path, name, pipeline, store, out_dir))
        .collect();
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    info!(sheets = outcomes.len(), failed, "batch finished");
    outcomes
}

pub fn process_image(path: &Path, pipeline: &Pipeline, store: &dyn ImageStore, out_dir: &Path) -> ImageOutcome {
    process_named(path, &image_name(path), pipeline, store, out_dir)
}

/// Process one sheet into `out_dir/<name>`, replacing whatever an earlier run
/// left under that name.
pub fn process_named(path: &Path, name: &str, pipeline: &Pipeline, store: &dyn ImageStore, out_dir: &Path) -> ImageOutcome {
    let sheet_dir = out_dir.join(name);
    let record = out_dir.join(format!("{name}.diagnostic.json"));
    if sheet_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&sheet_dir) {
            warn!(error = %e, dir = %sheet_dir.display(), "could not clear previous output");
        }
    }

    match run_sheet(path, name, pipeline, store, &sheet_dir) {
        Ok(report) => {
            if record.exists() {
                if let Err(e) = fs::remove_file(&record) {
                    warn!(error = %e, path = %record.display(), "could not remove stale diagnostic");
                }
            }
            info!(image = %name, notes = report.notes.len(), "sheet processed");
            ImageOutcome::Processed(report)
        }
        Err(err) => {
            if sheet_dir.exists() {
                if let Err(e) = fs::remove_dir_all(&sheet_dir) {
                    warn!(error = %e, dir = %sheet_dir.display(), "could not remove partial output");
                }
            }
            let diagnostic = failure_diagnostic(name, &err);
            error!(image = %name, stage = %diagnostic.stage, message = %diagnostic.message, "sheet failed");
            if let Err(e) = diagnostic.write(&record) {
                error!(error = %e, "could not write diagnostic record");
            }
            ImageOutcome::Failed(diagnostic)
        }
    }
}

/// Describe a hard failure, naming the stage that raised it.
pub fn failure_diagnostic(name: &str, err: &anyhow::Error) -> Diagnostic {
    let stage = err
        .downcast_ref::<StepFailure>()
        .map(|f| f.stage)
        .unwrap_or(Stage::Load);
    Diagnostic {
        image: name.to_string(),
        stage,
        message: format!("{err:#}"),
    }
}

fn run_sheet(path: &Path, name: &str, pipeline: &Pipeline, store: &dyn ImageStore, sheet_dir: &Path) -> Result<SheetReport> {
    let sheet = store.load(path).with_context(|| StepFailure {
        stage: Stage::Load,
        step: "load".to_string(),
    })?;
    let run = pipeline.for_image(name).run_with_executor(sheet)?;
    let report = SheetReport::from_results(name, &run.results, run.diagnostics);
    export_sheet(&report, &run.results, store, sheet_dir).with_context(|| StepFailure {
        stage: Stage::Export,
        step: "export".to_string(),
    })?;
    Ok(report)
}

/// Write section, measure and note crops, per-measure staff tables and the
/// sheet report.
///
/// Layout: `section-01.png`, `section-01/measure-02.png`,
/// `section-01/measure-02/staff.json`, `section-01/measure-02/note-03.png`.
pub fn export_sheet(report: &SheetReport, results: &[PipelineData], store: &dyn ImageStore, sheet_dir: &Path) -> Result<()> {
    let cropper = ImageCrop::default();
    let mut sections: BTreeMap<i64, BoundingBox> = BTreeMap::new();
    let mut measures: BTreeMap<(i64, i64), &PipelineData> = BTreeMap::new();

    for item in results {
        let (Some(section), Some(measure)) = (item.get_int(keys::SECTION), item.get_int(keys::MEASURE)) else {
            continue;
        };
        if let Some(bbox) = item.get_box(keys::SECTION_BOX) {
            sections.entry(section).or_insert(bbox);
        }
        measures.entry((section, measure)).or_insert(item);

        if let Some(note) = item.get_int(keys::NOTE) {
            let path = measure_dir(sheet_dir, section, measure).join(format!("note-{:02}.png", note + 1));
            store.save(&item.image, &path)?;
        }
    }

    if let Some(original) = results.first().map(|item| &item.original) {
        for (section, bbox) in &sections {
            let crop = cropper.crop(original, bbox)?;
            store.save(&crop, &sheet_dir.join(format!("section-{:02}.png", section + 1)))?;
        }
    }

    for ((section, measure), item) in &measures {
        let dir = measure_dir(sheet_dir, *section, *measure);
        if let Some(bbox) = item.get_box(keys::MEASURE_BOX) {
            let crop = cropper.crop(&item.original, &bbox)?;
            store.save(&crop, &dir.with_extension("png"))?;
        }
        if let Some(staff) = item.get_staff(keys::STAFF) {
            staff.save(&dir.join("staff.json"))?;
        }
    }

    report.write(&sheet_dir.join("report.json"))?;
    Ok(())
}

fn measure_dir(sheet_dir: &Path, section: i64, measure: i64) -> PathBuf {
    sheet_dir
        .join(format!("section-{:02}", section + 1))
        .join(format!("measure-{:02}", measure + 1))
}
