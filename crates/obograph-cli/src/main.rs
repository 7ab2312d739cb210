//! Obograph CLI
//!
//! Loads OBO ontologies into:
//! - a SPARQL 1.1 Update triple store, one named graph per ontology (`triples`)
//! - a search index, one flat document per term (`index`)
//!
//! and offers offline inspection (`parse`, `id`) that never touches a sink.
//! Connection settings come from `OBOGRAPH_*` environment variables; flags
//! override individual values.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use obograph_load::{
    IngestPipeline, LoadTarget, LoaderConfig, SearchIndexSink, SparqlUpdateSink,
};
use obograph_obo::{Document, OboParser, ParseOptions, Triple};
use tracing_subscriber::EnvFilter;
use url::Url;

mod load;

use load::SourceArgs;

#[derive(Parser)]
#[command(name = "obograph")]
#[command(author, version, about = "Obograph: OBO ontology loader for triple stores and search indexes")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. `info`, `obograph_load=debug`)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clear each ontology's named graph and load it as triples.
    Triples(TriplesArgs),

    /// Load Term blocks (and Darwin Core schema terms) as documents into the search index.
    Index(IndexArgs),

    /// Parse a file offline and print N-Triples or JSON documents.
    Parse {
        /// Input OBO file
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Triples)]
        mode: Mode,
    },

    /// Identifier utilities.
    Id {
        #[command(subcommand)]
        command: IdCommands,
    },
}

#[derive(Args)]
struct TriplesArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// SPARQL update endpoint (overrides OBOGRAPH_SPARQL_UPDATE_URL)
    #[arg(long)]
    update_url: Option<String>,

    /// Do not wait for the triple store to answer before loading
    #[arg(long)]
    no_wait: bool,

    /// Readiness probes before giving up
    #[arg(long, default_value_t = 30)]
    wait_attempts: u32,
}

#[derive(Args)]
struct IndexArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Search service base URL (overrides OBOGRAPH_SEARCH_URL)
    #[arg(long)]
    search_url: Option<String>,

    /// Index for every target (overrides manifest entries)
    #[arg(long)]
    index: Option<String>,

    /// Keep existing documents instead of clearing each index first
    #[arg(long)]
    keep_existing: bool,

    /// Japanese labels for Darwin Core schema terms (overrides OBOGRAPH_DWC_LABELS)
    #[arg(long)]
    dwc_labels: Option<PathBuf>,
}

#[derive(Subcommand)]
enum IdCommands {
    /// `PATO:0000014` → `http://purl.obolibrary.org/obo/PATO_0000014`
    Normalize { raw: String },
    /// `http://purl.obolibrary.org/obo/NCBITaxon_9606` → `ncbi:9606`
    Shorten { uri: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Triples,
    Documents,
}

impl Mode {
    pub fn destination(self, target: &LoadTarget) -> &str {
        match self {
            Mode::Triples => &target.graph,
            Mode::Documents => &target.index,
        }
    }

    fn parse_options(self) -> ParseOptions {
        match self {
            Mode::Triples => ParseOptions::triples(),
            Mode::Documents => ParseOptions::documents(),
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level `{level}`"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = LoaderConfig::from_env().context("invalid OBOGRAPH_* configuration")?;

    match cli.command {
        Commands::Triples(args) => cmd_triples(args, config),
        Commands::Index(args) => cmd_index(args, config),
        Commands::Parse { input, mode } => cmd_parse(&input, mode, &config),
        Commands::Id { command } => cmd_id(command, &config),
    }
}

fn parse_url(flag: &str, value: &str) -> Result<Url> {
    Url::parse(value).with_context(|| format!("{flag}: invalid url `{value}`"))
}

fn cmd_triples(args: TriplesArgs, mut config: LoaderConfig) -> Result<()> {
    if let Some(url) = &args.update_url {
        config.sparql.update_url = parse_url("--update-url", url)?;
    }
    if let Some(size) = args.sources.batch_size {
        config.triple_batch_size = size;
    }
    config.validate()?;

    let (targets, schemas) = load::split_schemas(load::resolve_targets(&args.sources, &config)?);
    for schema in &schemas {
        tracing::warn!(path = %schema.path.display(), "schemas are only indexed as documents, skipping");
    }
    if targets.is_empty() {
        bail!("no ontology files to load as triples");
    }
    let sink = SparqlUpdateSink::new(&config.sparql)?;

    if !args.no_wait {
        println!("{} {}", "Waiting for".green().bold(), config.sparql.server_root());
        sink.wait_until_ready(args.wait_attempts, Duration::from_secs(1))
            .context("triple store is not reachable (use --no-wait to skip this check)")?;
    }

    println!(
        "{} {} ontologies into {}",
        "Loading".green().bold(),
        targets.len(),
        sink.update_url()
    );

    let parser = OboParser::new(config.normalizer(), ParseOptions::triples());
    let pipeline = IngestPipeline::new(&sink, parser, config.triple_batch_size)
        .with_clear_retry(config.clear_retry)
        .with_reload_retry(config.reload_retry);

    let outcomes = load::run_all(&pipeline, &targets, Mode::Triples, args.sources.parallel);
    load::summarize(outcomes)
}

fn cmd_index(args: IndexArgs, mut config: LoaderConfig) -> Result<()> {
    if let Some(url) = &args.search_url {
        config.search.url = parse_url("--search-url", url)?;
    }
    if let Some(size) = args.sources.batch_size {
        config.document_batch_size = size;
    }
    config.validate()?;

    let mut targets = load::resolve_targets(&args.sources, &config)?;
    if let Some(index) = &args.index {
        for target in &mut targets {
            target.index = index.clone();
        }
    }
    let (ontologies, schemas) = load::split_schemas(targets);
    let sink = SearchIndexSink::new(&config.search)?;

    let parser = OboParser::new(config.normalizer(), ParseOptions::documents());
    let pipeline = IngestPipeline::new(&sink, parser, config.document_batch_size)
        .with_clear_retry(config.clear_retry)
        .with_reload_retry(config.reload_retry)
        .without_clear();

    // Several files may share one index: set up and clear each index once.
    let indexes: BTreeSet<&str> = ontologies
        .iter()
        .chain(&schemas)
        .map(|t| t.index.as_str())
        .collect();
    for index in indexes {
        if let Err(err) = sink.configure_index(index) {
            tracing::warn!(index, error = %err, "could not configure search index");
        }
        if !args.keep_existing {
            pipeline.clear_destination(index);
        }
    }

    println!(
        "{} {} ontologies and {} schemas into {}",
        "Indexing".green().bold(),
        ontologies.len(),
        schemas.len(),
        config.search.url
    );

    let mut outcomes = load::run_all(&pipeline, &ontologies, Mode::Documents, args.sources.parallel);
    if !schemas.is_empty() {
        let labels_path = args.dwc_labels.as_deref().or(config.dwc_labels.as_deref());
        let labels = load::japanese_labels(labels_path);
        outcomes.extend(load::run_schemas(&pipeline, &schemas, &labels, args.sources.parallel));
    }
    load::summarize(outcomes)
}

fn cmd_parse(input: &Path, mode: Mode, config: &LoaderConfig) -> Result<()> {
    let file = File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let parser = OboParser::new(config.normalizer(), mode.parse_options());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stats = match mode {
        Mode::Triples => {
            let (triples, stats) = parser.collect::<Triple, _>(BufReader::new(file))?;
            for triple in &triples {
                writeln!(out, "{triple}")?;
            }
            stats
        }
        Mode::Documents => {
            let (documents, stats) = parser.collect::<Document, _>(BufReader::new(file))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&documents)?)?;
            stats
        }
    };
    out.flush()?;

    eprintln!(
        "{} {}: {} records, {} emitted, {} duplicates, {} without id, {} items",
        "parsed".green().bold(),
        input.display(),
        stats.records,
        stats.admitted,
        stats.duplicates,
        stats.inert,
        stats.items
    );
    Ok(())
}

fn cmd_id(command: IdCommands, config: &LoaderConfig) -> Result<()> {
    let normalizer = config.normalizer();
    match command {
        IdCommands::Normalize { raw } => {
            let id = normalizer
                .normalize(&raw)
                .with_context(|| format!("cannot normalize `{raw}`"))?;
            println!("{}", id.uri());
        }
        IdCommands::Shorten { uri } => {
            println!("{}", normalizer.shorten(&uri));
        }
    }
    Ok(())
}
