//! Step-based processing of one sheet.
//!
//! A sheet enters as a single item. Each step maps the items it receives to
//! any number of new ones (one section becomes many measures, a measure many
//! note heads), so the run forms a tree whose leaves are the results. Steps
//! record soft failures on the shared context and keep going; a returned
//! error aborts the run and carries the failing stage as a [`StepFailure`].

use anyhow::{Context, Result};
use image::DynamicImage;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::detection::staff::StaffReferenceTable;
use crate::error::Error;
use crate::models::{BoundingBox, GlyphCandidate, PitchLetter, Stage};
use crate::report::Diagnostic;

/// One region of the sheet on its way through the steps.
#[derive(Clone)]
pub struct PipelineData {
    /// Pixels of this region only.
    pub image: DynamicImage,
    /// The whole sheet, shared by every item of a run.
    pub original: Arc<DynamicImage>,
    /// Where `image` sits in `original`; `None` for the sheet itself.
    pub bbox: Option<BoundingBox>,
    /// Results attached by earlier steps, see [`crate::report::keys`].
    pub metadata: HashMap<String, MetadataValue>,
}

#[derive(Debug, Clone)]
pub enum MetadataValue {
    Int(i64),
    Box(BoundingBox),
    Staff(StaffReferenceTable),
    Glyph(GlyphCandidate),
    Letter(PitchLetter),
}

impl PipelineData {
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            original: Arc::new(image.clone()),
            image,
            bbox: None,
            metadata: HashMap::new(),
        }
    }

    /// Child region of `parent`; `bbox` is in sheet coordinates. The child
    /// starts with a copy of the parent's metadata.
    pub fn from_region(parent: &PipelineData, image: DynamicImage, bbox: BoundingBox) -> Self {
        Self {
            image,
            original: Arc::clone(&parent.original),
            bbox: Some(bbox),
            metadata: parent.metadata.clone(),
        }
    }

    /// Same region and metadata, new pixels.
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            ..self.clone()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Box of this item in the original sheet.
    pub fn absolute_bbox(&self) -> BoundingBox {
        self.bbox
            .unwrap_or_else(|| BoundingBox::full(self.original.width(), self.original.height()))
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key)? {
            MetadataValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_box(&self, key: &str) -> Option<BoundingBox> {
        match self.metadata.get(key)? {
            MetadataValue::Box(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_staff(&self, key: &str) -> Option<&StaffReferenceTable> {
        match self.metadata.get(key)? {
            MetadataValue::Staff(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_glyph(&self, key: &str) -> Option<&GlyphCandidate> {
        match self.metadata.get(key)? {
            MetadataValue::Glyph(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_letter(&self, key: &str) -> Option<PitchLetter> {
        match self.metadata.get(key)? {
            MetadataValue::Letter(v) => Some(*v),
            _ => None,
        }
    }
}

/// Where debug images go. Each step gets a `NN_step_name` folder below
/// `root`.
#[derive(Clone, Debug)]
pub struct DebugConfig {
    pub root: PathBuf,
}

/// Shared state handed to every step of a run.
#[derive(Clone)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
    /// Name of the sheet being processed, used in diagnostics.
    pub image: String,
    /// Wall-clock budget for one run.
    pub timeout: Option<Duration>,
    /// Set when a run starts.
    pub deadline: Option<Instant>,
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self {
            verbose: false,
            debug: None,
            image: String::new(),
            timeout: None,
            deadline: None,
            diagnostics: Arc::default(),
        }
    }

    /// Fresh diagnostics and deadline for one run.
    fn for_run(&self) -> Self {
        Self {
            deadline: self.timeout.map(|t| Instant::now() + t),
            diagnostics: Arc::default(),
            ..self.clone()
        }
    }

    /// Record a soft failure. Processing continues.
    pub fn report(&self, stage: Stage, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            image: self.image.clone(),
            stage,
            message: message.into(),
        };
        warn!(image = %diagnostic.image, %stage, message = %diagnostic.message, "diagnostic");
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    /// Fail with `Error::Timeout` once the run's budget is spent.
    pub fn check_deadline(&self) -> std::result::Result<(), Error> {
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => Err(Error::Timeout(timeout)),
            _ => Ok(()),
        }
    }

    /// Debug folder of the step at `step_index`, when debugging.
    pub fn debug_dir(&self, step_index: usize, step_name: &str) -> Option<PathBuf> {
        let debug = self.debug.as_ref()?;
        let slug = step_name.to_lowercase().replace(' ', "_");
        Some(debug.root.join(format!("{:02}_{slug}", step_index + 1)))
    }

    /// The context a step sees: its debug root is its own folder.
    fn scoped_to(&self, step_dir: Option<PathBuf>) -> Self {
        Self {
            debug: step_dir.map(|root| DebugConfig { root }),
            ..self.clone()
        }
    }

    /// Where a step may write side artifacts, when debugging.
    pub fn artifact_dir(&self) -> Option<&Path> {
        self.debug.as_ref().map(|d| d.root.as_path())
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Context attached to errors raised by a step, naming the stage.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub stage: Stage,
    pub step: String,
}

impl StepFailure {
    fn of(step: &dyn PipelineStep) -> Self {
        Self {
            stage: step.stage(),
            step: step.name().to_string(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' ({}) failed", self.step, self.stage)
    }
}

/// One stage of the pipeline.
pub trait PipelineStep: Send + Sync {
    /// Map the incoming items to outgoing ones. A step may split an item
    /// (1 → n), drop it (1 → 0) or replace it (1 → 1).
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Shown in logs; also names the step's debug folder.
    fn name(&self) -> &str;

    /// Stage reported when this step fails.
    fn stage(&self) -> Stage;
}

fn save_png(image: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating debug directory {}", dir.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("saving debug image {}", path.display()))?;
    debug!(path = %path.display(), "debug image saved");
    Ok(())
}

/// An item together with the steps it still has to pass.
#[derive(Clone)]
pub struct WorkItem {
    pub data: PipelineData,
    pub remaining: Vec<Arc<dyn PipelineStep>>,
    /// Index of the next step within the whole pipeline.
    pub step_index: usize,
    /// 1-based position among its siblings at every split so far, e.g.
    /// `[1, 3, 2]` is the second note of the third measure of section one.
    pub lineage: Vec<usize>,
}

impl WorkItem {
    pub fn new(data: PipelineData, steps: Vec<Arc<dyn PipelineStep>>) -> Self {
        Self {
            data,
            remaining: steps,
            step_index: 0,
            lineage: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Debug file name, e.g. `01-03-02.png`; the root item is `01`.
    pub fn lineage_filename(&self, extension: &str) -> String {
        if self.lineage.is_empty() {
            return format!("01.{extension}");
        }
        let ids: Vec<String> = self.lineage.iter().map(|id| format!("{id:02}")).collect();
        format!("{}.{extension}", ids.join("-"))
    }

    /// Run the next step on this item alone and wrap what it returns.
    pub fn advance(&self, context: &PipelineContext) -> Result<Vec<WorkItem>> {
        let Some((step, rest)) = self.remaining.split_first() else {
            return Ok(Vec::new());
        };
        context
            .check_deadline()
            .with_context(|| StepFailure::of(step.as_ref()))?;

        let step_dir = context.debug_dir(self.step_index, step.name());
        let outputs = step
            .process(vec![self.data.clone()], &context.scoped_to(step_dir.clone()))
            .with_context(|| StepFailure::of(step.as_ref()))?;

        let mut children = Vec::with_capacity(outputs.len());
        for (i, data) in outputs.into_iter().enumerate() {
            let mut lineage = self.lineage.clone();
            lineage.push(i + 1);
            let child = WorkItem {
                data,
                remaining: rest.to_vec(),
                step_index: self.step_index + 1,
                lineage,
            };
            if let Some(dir) = &step_dir {
                save_png(&child.data.image, &dir.join(child.lineage_filename("png")))?;
            }
            children.push(child);
        }
        Ok(children)
    }
}

/// Work queue over an mpsc channel. Items are advanced one step at a time
/// until none has steps left.
pub struct PipelineExecutor {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    context: PipelineContext,
}

impl PipelineExecutor {
    pub fn new(context: PipelineContext) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            context,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    fn enqueue(&self, item: WorkItem) -> Result<()> {
        self.sender
            .send(item)
            .map_err(|_| anyhow::anyhow!("work queue closed"))
    }

    /// Drain the queue and return the finished items.
    pub fn execute(&self, initial_items: Vec<WorkItem>) -> Result<Vec<PipelineData>> {
        let mut pending = initial_items.len();
        for item in initial_items {
            self.enqueue(item)?;
        }

        let mut finished = Vec::new();
        while pending > 0 {
            let item = self.receiver.recv().context("work queue closed")?;
            pending -= 1;
            if item.is_complete() {
                finished.push(item.data);
                continue;
            }
            for child in item.advance(&self.context)? {
                self.enqueue(child)?;
                pending += 1;
            }
        }
        Ok(finished)
    }
}

/// Output of one pipeline run.
pub struct PipelineRun {
    pub results: Vec<PipelineData>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Ordered steps plus the settings every run shares. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::new(),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Abandon a run once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.context.timeout = timeout;
        self
    }

    /// Write per-step debug images below `root`, which must be empty or
    /// missing.
    pub fn with_debug(mut self, root: PathBuf) -> Result<Self> {
        if root.exists() {
            if fs::read_dir(&root)?.next().is_some() {
                anyhow::bail!("debug directory is not empty: {}", root.display());
            }
        } else {
            fs::create_dir_all(&root)?;
        }
        self.context.debug = Some(DebugConfig { root });
        Ok(self)
    }

    /// Copy of this pipeline for one sheet: diagnostics carry `name` and
    /// debug output goes to a sub-directory of the same name.
    pub fn for_image(&self, name: &str) -> Self {
        let mut pipeline = self.clone();
        pipeline.context.image = name.to_string();
        if let Some(debug) = &mut pipeline.context.debug {
            debug.root = debug.root.join(name);
        }
        pipeline
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    fn save_debug_input(&self, input: &DynamicImage) -> Result<()> {
        match &self.context.debug {
            Some(debug) => save_png(input, &debug.root.join("00_input").join("01.png")),
            None => Ok(()),
        }
    }

    /// Run every step over the whole batch of items, one step at a time.
    pub fn run(&self, input: DynamicImage) -> Result<PipelineRun> {
        self.run_partial(input, self.steps.len())
    }

    /// Run through the work queue, one item at a time. Debug images are
    /// named by lineage.
    pub fn run_with_executor(&self, input: DynamicImage) -> Result<PipelineRun> {
        self.save_debug_input(&input)?;
        let context = self.context.for_run();
        info!(image = %context.image, steps = self.steps.len(), "running pipeline");

        let executor = PipelineExecutor::new(context);
        let root = WorkItem::new(PipelineData::from_image(input), self.steps.clone());
        let results = executor.execute(vec![root])?;
        Ok(PipelineRun {
            results,
            diagnostics: executor.context().diagnostics(),
        })
    }

    /// Like [`Pipeline::run`] but stop after `num_steps` steps.
    pub fn run_partial(&self, input: DynamicImage, num_steps: usize) -> Result<PipelineRun> {
        self.save_debug_input(&input)?;
        let context = self.context.for_run();
        let mut items = vec![PipelineData::from_image(input)];

        for (index, step) in self.steps.iter().take(num_steps).enumerate() {
            context
                .check_deadline()
                .with_context(|| StepFailure::of(step.as_ref()))?;
            debug!(step = step.name(), items = items.len(), "running step");

            let step_dir = context.debug_dir(index, step.name());
            items = step
                .process(items, &context.scoped_to(step_dir.clone()))
                .with_context(|| StepFailure::of(step.as_ref()))?;

            if let Some(dir) = step_dir {
                for (i, item) in items.iter().enumerate() {
                    save_png(&item.image, &dir.join(format!("{:02}.png", i + 1)))?;
                }
            }
        }

        Ok(PipelineRun {
            results: items,
            diagnostics: context.diagnostics(),
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
