use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use sheetnotes::batch::{ImageOutcome, process_batch};
use sheetnotes::detection::glyphs::export_note_columns;
use sheetnotes::detection::pitch::infer_marker_pitch;
use sheetnotes::detection::preprocessing::binarize;
use sheetnotes::detection::staff::detect_staff;
use sheetnotes::io::{FsImageStore, ImageStore};
use sheetnotes::logging::init_tracing;
use sheetnotes::{Config, StaffReferenceTable, TemplateSet, build_standard_pipeline};

#[derive(Parser)]
#[command(name = "sheetnotes")]
#[command(about = "Segment scanned sheet music and name the notes")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file (defaults are used when absent)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline on one or more sheets
    Process {
        #[arg(value_name = "IMAGES", required = true)]
        images: Vec<PathBuf>,

        /// Folder of section templates
        #[arg(long, value_name = "DIR")]
        templates: PathBuf,

        /// Output folder
        #[arg(long, value_name = "DIR", default_value = "out")]
        out: PathBuf,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Give up on a sheet after this many seconds
        #[arg(long, value_name = "N")]
        timeout_secs: Option<u64>,
    },
    /// Detect the staff of a measure strip and write its reference table
    Staff {
        #[arg(value_name = "STRIP")]
        strip: PathBuf,

        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Slice a measure strip into note columns (rotated unless configured otherwise)
    Columns {
        #[arg(value_name = "STRIP")]
        strip: PathBuf,

        /// Output folder
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
    /// Name the marked note of a rotated column using a saved staff table
    Pitch {
        #[arg(value_name = "STRIP")]
        strip: PathBuf,

        #[arg(long, value_name = "FILE")]
        staff: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Process {
            images,
            templates,
            out,
            debug_out,
            timeout_secs,
        } => {
            let templates = TemplateSet::load_dir(&templates)?;
            let mut pipeline = build_standard_pipeline(&config, templates, args.verbose)
                .with_timeout(timeout_secs.map(Duration::from_secs));
            if let Some(debug_dir) = debug_out {
                pipeline = pipeline.with_debug(debug_dir)?;
            }

            let outcomes = process_batch(&images, &pipeline, &FsImageStore, &out);

            println!("\n=== Sheet Results ===");
            for outcome in &outcomes {
                match outcome {
                    ImageOutcome::Processed(report) => {
                        println!("{}: {} notes, {} diagnostics", report.image, report.notes.len(), report.diagnostics.len());
                        if !report.notes.is_empty() {
                            println!("  {}", report.letters());
                        }
                    }
                    ImageOutcome::Failed(diagnostic) => {
                        println!("{}: failed at {} ({})", diagnostic.image, diagnostic.stage, diagnostic.message);
                    }
                }
            }
            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} sheets failed", outcomes.len());
            }
        }
        Command::Staff { strip, out } => {
            let image = FsImageStore.load(&strip)?;
            let detection = detect_staff(&binarize(&image, &config.staff_mask), &config.staff);
            detection.table.save(&out)?;
            println!("Staff lines found: {}", detection.found_lines());
            println!("References: {:?}", detection.table.lines());
            if let Some(failure) = detection.failure {
                println!("Warning: {failure}");
            }
        }
        Command::Columns { strip, out } => {
            let image = FsImageStore.load(&strip)?;
            let written = export_note_columns(&image, &config.marker_mask, &config.slicing, &FsImageStore, &out)?;
            println!("Columns written: {}", written.len());
            for path in &written {
                println!("  {}", path.display());
            }
        }
        Command::Pitch { strip, staff } => {
            let image = FsImageStore.load(&strip)?;
            let table = StaffReferenceTable::load(&staff)
                .with_context(|| format!("reading staff table {}", staff.display()))?;
            let pitch = infer_marker_pitch(&image, &table, &config)?;
            if !pitch.scan.found_marker() {
                println!("No marker found, using target 0");
            }
            println!("Narrow items at x: {:?}", pitch.scan.narrow_positions());
            println!("Target: {}", pitch.scan.target);
            println!("Pitch: {}", pitch.letter);
        }
    }

    Ok(())
}
