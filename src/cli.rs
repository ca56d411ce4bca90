use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, error::ErrorKind};

use crate::config::CurationConfig;
use crate::constants::curation::{
    DEFAULT_BACKFILL_MULTIPLIER, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LOW_CONFIDENCE_WARNING,
    DEFAULT_MIN_CLASS_SIZE_FOR_SPLIT, DEFAULT_PER_CLASS_CAP, DEFAULT_RANDOM_SEED,
    DEFAULT_TEST_FRACTION, DEFAULT_VALIDATION_FRACTION,
};
use crate::constants::ingestion::DEFAULT_BATCH_PREFIX;
use crate::data::SourceTag;
use crate::errors::CurationError;
use crate::export::OutputLayout;
use crate::ingestion::ProvenanceManifest;
use crate::metadata::{low_confidence_labels, read_metadata};
use crate::pipeline::{CurationPipeline, CurationReport};

#[derive(Debug, Parser)]
#[command(
    name = "curate",
    disable_help_subcommand = true,
    about = "Curate a labeled text-classification corpus",
    long_about = "Deduplicate labeled batches, balance classes by confidence, export backfill candidates, and write stratified train/val/test splits with per-class metadata."
)]
struct CurateCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full curation pipeline.
    Run(RunArgs),
    /// Summarize an existing metadata_balanced.csv.
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
/// Arguments for `curate run`.
///
/// Common usage:
/// - Tag each producer family explicitly: `--batch-dir synthetic=output_chunks/output_chunks_synthetic`
/// - Keep per-row `source` cells: `--unmapped-dir output_chunks/scraped`
/// - Fall back to folder-name inference for unmapped dirs: `--infer-source`
struct RunArgs {
    #[arg(
        long = "batch-dir",
        value_name = "TAG=PATH",
        value_parser = parse_tagged_dir,
        help = "Provenance directory with an explicit source tag (synthetic, natural, manual, unknown); repeatable"
    )]
    batch_dirs: Vec<(SourceTag, PathBuf)>,
    #[arg(
        long = "unmapped-dir",
        value_name = "PATH",
        help = "Provenance directory without an explicit source tag; repeatable"
    )]
    unmapped_dirs: Vec<PathBuf>,
    #[arg(
        long = "infer-source",
        help = "Infer tags for unmapped directories from their names (*synthetic*, *natural*, *manual*)"
    )]
    infer_source: bool,
    #[arg(
        long = "batch-prefix",
        default_value = DEFAULT_BATCH_PREFIX,
        help = "File-name prefix of batch CSVs"
    )]
    batch_prefix: String,
    #[arg(
        long,
        value_name = "DIR",
        default_value = "balanced_split_output",
        help = "Directory receiving splits, metadata, and per-class artifacts"
    )]
    output: PathBuf,
    #[arg(long = "confidence-threshold", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    confidence_threshold: f64,
    #[arg(long = "per-class-cap", default_value_t = DEFAULT_PER_CLASS_CAP)]
    per_class_cap: usize,
    #[arg(long = "backfill-multiplier", default_value_t = DEFAULT_BACKFILL_MULTIPLIER)]
    backfill_multiplier: usize,
    #[arg(
        long = "backfill-absent-labels",
        help = "Also export candidates for labels with no high-confidence records"
    )]
    backfill_absent_labels: bool,
    #[arg(long = "min-class-size", default_value_t = DEFAULT_MIN_CLASS_SIZE_FOR_SPLIT)]
    min_class_size_for_split: usize,
    #[arg(long = "test-fraction", default_value_t = DEFAULT_TEST_FRACTION)]
    test_fraction: f64,
    #[arg(long = "validation-fraction", default_value_t = DEFAULT_VALIDATION_FRACTION)]
    validation_fraction: f64,
    #[arg(long, default_value_t = DEFAULT_RANDOM_SEED)]
    seed: u64,
    #[arg(long = "low-confidence-warning", default_value_t = DEFAULT_LOW_CONFIDENCE_WARNING)]
    low_confidence_warning: f64,
}

impl RunArgs {
    fn config(&self) -> CurationConfig {
        CurationConfig {
            confidence_threshold: self.confidence_threshold,
            per_class_cap: self.per_class_cap,
            backfill_multiplier: self.backfill_multiplier,
            min_class_size_for_split: self.min_class_size_for_split,
            test_fraction: self.test_fraction,
            validation_fraction: self.validation_fraction,
            random_seed: self.seed,
            low_confidence_warning: self.low_confidence_warning,
            backfill_absent_labels: self.backfill_absent_labels,
        }
    }

    fn manifest(&self) -> ProvenanceManifest {
        let mut manifest = ProvenanceManifest::new()
            .with_name_inference(self.infer_source)
            .with_batch_prefix(self.batch_prefix.clone());
        for (tag, dir) in &self.batch_dirs {
            manifest = manifest.with_location(location_id(dir), dir, *tag);
        }
        for dir in &self.unmapped_dirs {
            manifest = manifest.with_unmapped_location(location_id(dir), dir);
        }
        manifest
    }
}

#[derive(Debug, Args)]
struct InspectArgs {
    #[arg(
        long,
        value_name = "DIR",
        default_value = "balanced_split_output",
        help = "Output directory of a previous run"
    )]
    output: PathBuf,
    #[arg(long = "low-confidence-warning", default_value_t = DEFAULT_LOW_CONFIDENCE_WARNING)]
    low_confidence_warning: f64,
}

/// Parse `args_iter` (without the program name) and run the selected command.
pub fn run_cli<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) = parse_cli::<CurateCli, _>(std::iter::once("curate".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    match cli.command {
        Command::Run(args) => {
            let report = run_curation(&args)?;
            print_report(&report);
        }
        Command::Inspect(args) => run_inspect(&args.output, args.low_confidence_warning)?,
    }
    Ok(())
}

fn run_curation(args: &RunArgs) -> Result<CurationReport, Box<dyn Error>> {
    if args.batch_dirs.is_empty() && args.unmapped_dirs.is_empty() {
        return Err("at least one --batch-dir or --unmapped-dir is required".into());
    }
    let pipeline = CurationPipeline::new(args.config())?;
    let report = pipeline.run(&args.manifest(), &OutputLayout::new(&args.output))?;
    Ok(report)
}

fn print_report(report: &CurationReport) {
    println!("=== curation summary ===");
    println!(
        "batches: {} | rows: {} | duplicates removed: {} | unique: {}",
        report.batches, report.rows_read, report.duplicates_removed, report.corpus_size
    );
    println!(
        "confidence >= {:.2}: {} kept, {} in reserve",
        report.config.confidence_threshold, report.high_confidence, report.reserve
    );
    println!(
        "balanced: {} records (cap {} per label, {} label(s) capped)",
        report.balanced_size,
        report.config.per_class_cap,
        report.capped.len()
    );
    for selection in &report.backfill {
        println!(
            "  backfill {}: deficit {}, quota {}",
            selection.label, selection.deficit, selection.quota
        );
    }
    for (label, count) in &report.dropped_labels {
        println!("  dropped {label}: {count} record(s)");
    }
    let sizes: Vec<String> = report
        .split_sizes
        .iter()
        .map(|(label, size)| format!("{label}={size}"))
        .collect();
    println!("splits: {}", sizes.join(", "));
    if let Some(skew) = &report.label_skew {
        println!(
            "labels: {} | min {} | max {} | mean {:.1}",
            skew.labels, skew.min, skew.max, skew.mean
        );
    }
    if report.warnings.is_empty() {
        println!("no warnings");
    } else {
        println!("warnings ({}):", report.warnings.len());
        for message in &report.warnings {
            println!("  - {message}");
        }
    }
}

/// Print per-label balanced metadata and low-confidence labels from a previous run.
pub fn run_inspect(output: &Path, threshold: f64) -> Result<(), Box<dyn Error>> {
    let layout = OutputLayout::new(output);
    let table = read_metadata(&layout.balanced_metadata())?;
    println!("{:<40} {:>8} {:>8}", "label", "samples", "avg_conf");
    let mut rows: Vec<_> = table.rows.iter().collect();
    rows.sort_by(|a, b| b.num_samples.cmp(&a.num_samples).then_with(|| a.label.cmp(&b.label)));
    for row in rows {
        match row.shares {
            Some(shares) => println!(
                "{:<40} {:>8} {:>8.3}  synthetic={:.3} natural={:.3} manual={:.3}",
                row.label,
                row.num_samples,
                row.avg_confidence,
                shares.pct_synthetic,
                shares.pct_natural,
                shares.pct_manual
            ),
            None => println!(
                "{:<40} {:>8} {:>8.3}",
                row.label, row.num_samples, row.avg_confidence
            ),
        }
    }
    let flagged = low_confidence_labels(&table, threshold);
    if flagged.is_empty() {
        println!("all labels have average confidence >= {threshold:.2}");
    } else {
        println!(
            "WARNING: {} label(s) have average confidence below {threshold:.2}:",
            flagged.len()
        );
        for entry in flagged {
            println!("  - {}", entry.message(threshold));
        }
    }
    Ok(())
}

fn location_id(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn parse_tagged_dir(raw: &str) -> Result<(SourceTag, PathBuf), String> {
    let (tag, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("--batch-dir expects TAG=PATH, got '{raw}'"))?;
    let tag: SourceTag = tag.parse().map_err(|err: CurationError| err.to_string())?;
    if path.trim().is_empty() {
        return Err("--batch-dir path must not be empty".to_string());
    }
    Ok((tag, PathBuf::from(path)))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
