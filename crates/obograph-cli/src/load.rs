//! Target resolution and multi-file load runs.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use obograph_load::{
    BulkSink, IngestPipeline, JapaneseLabels, LoadError, LoadReport, LoadTarget, LoaderConfig,
    OntologyManifest,
};
use obograph_obo::{Document, Emit};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::Mode;

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Ontology files to load (destinations derived from the file name)
    pub files: Vec<PathBuf>,

    /// JSON manifest: `{ "ontologies": [ { "file", "graph"?, "index"? } ] }`.
    /// `*.xsd` entries are Darwin Core schemas (index mode only).
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Load every `*.obo` file directly inside this directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Load files concurrently (one worker per file)
    #[arg(long)]
    pub parallel: bool,

    /// Items per write request (overrides the configured batch size)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

/// Every `*.obo` file directly inside `dir`, sorted by name.
pub fn discover_obo_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to scan {}", dir.display()))?;
        let is_obo = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obo"));
        if entry.file_type().is_file() && is_obo {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Collect targets from the manifest, the directory and explicit files, in
/// that order. Files that do not exist are skipped with a warning.
pub fn resolve_targets(sources: &SourceArgs, config: &LoaderConfig) -> Result<Vec<LoadTarget>> {
    let mut targets = Vec::new();

    if let Some(manifest_path) = &sources.manifest {
        let manifest = OntologyManifest::from_path(manifest_path)?;
        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        targets.extend(manifest.targets(base_dir, config));
    }
    if let Some(dir) = &sources.dir {
        for path in discover_obo_files(dir)? {
            targets.push(LoadTarget::for_file(path, config));
        }
    }
    for path in &sources.files {
        targets.push(LoadTarget::for_file(path.clone(), config));
    }

    let (present, missing): (Vec<_>, Vec<_>) = targets.into_iter().partition(|t| t.path.is_file());
    for target in &missing {
        tracing::warn!(path = %target.path.display(), "ontology file not found, skipping");
    }
    if present.is_empty() {
        bail!("no ontology files to load (pass files, --dir or --manifest)");
    }
    Ok(present)
}

pub type RunOutcome = (LoadTarget, Result<LoadReport, LoadError>);

/// Split off Darwin Core schema targets: `(ontologies, schemas)`.
pub fn split_schemas(targets: Vec<LoadTarget>) -> (Vec<LoadTarget>, Vec<LoadTarget>) {
    targets.into_iter().partition(|t| !t.is_schema())
}

/// Japanese labels for schema documents. A file that cannot be read is
/// logged and loading continues without labels.
pub fn japanese_labels(path: Option<&Path>) -> JapaneseLabels {
    let Some(path) = path else {
        return JapaneseLabels::default();
    };
    match JapaneseLabels::from_path(path) {
        Ok(labels) => {
            tracing::info!(path = %path.display(), labels = labels.len(), "loaded Japanese labels");
            labels
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "continuing without Japanese labels");
            JapaneseLabels::default()
        }
    }
}

/// Load every Darwin Core schema target as documents.
pub fn run_schemas<S>(
    pipeline: &IngestPipeline<S>,
    targets: &[LoadTarget],
    labels: &JapaneseLabels,
    parallel: bool,
) -> Vec<RunOutcome>
where
    S: BulkSink<Item = Document> + Sync,
{
    let run = |target: &LoadTarget| -> RunOutcome {
        tracing::info!(path = %target.path.display(), index = %target.index, "loading schema terms");
        let outcome = pipeline.load_schema(&target.path, &target.index, labels);
        (target.clone(), outcome)
    };

    if parallel {
        targets.par_iter().map(run).collect()
    } else {
        targets.iter().map(run).collect()
    }
}

/// Load every target, sequentially or on the rayon pool.
pub fn run_all<S>(
    pipeline: &IngestPipeline<S>,
    targets: &[LoadTarget],
    mode: Mode,
    parallel: bool,
) -> Vec<RunOutcome>
where
    S: BulkSink + Sync,
    S::Item: Emit,
{
    let run = |target: &LoadTarget| -> RunOutcome {
        let destination = mode.destination(target);
        tracing::info!(path = %target.path.display(), destination, "loading ontology");
        let outcome = pipeline.load_file_with_reload(&target.path, destination);
        (target.clone(), outcome)
    };

    if parallel {
        targets.par_iter().map(run).collect()
    } else {
        targets.iter().map(run).collect()
    }
}

/// Print one line per run; fails if any run failed.
pub fn summarize(outcomes: Vec<RunOutcome>) -> Result<()> {
    let mut failed = 0usize;
    let mut total_items = 0usize;

    for (target, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                total_items += report.items;
                println!(
                    "{} {} {} {}: {} items in {} batches ({} records, {} duplicates, {} without id)",
                    "ok".green().bold(),
                    target.path.display(),
                    "→".yellow(),
                    report.destination,
                    report.items,
                    report.batches,
                    report.records,
                    report.duplicates,
                    report.inert,
                );
                if !report.clear_ok {
                    println!("   {} destination was not cleared before loading", "warning:".yellow().bold());
                }
                if report.attempt > 1 {
                    println!("   {} succeeded on attempt {}", "info:".yellow().bold(), report.attempt);
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!(
                    "{} {}: {:#}",
                    "failed".red().bold(),
                    target.path.display(),
                    anyhow::Error::from(err)
                );
            }
        }
    }

    println!("{} {} items delivered", "done".green().bold(), total_items);
    if failed > 0 {
        bail!("{failed} ontology run(s) failed");
    }
    Ok(())
}
