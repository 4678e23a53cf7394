use anyhow::{Context, Result};
use clap::Parser;
use graphsync::deadletter::DeadLetterSink;
use graphsync::ingest::{open_graph_store, CollectionStats, IngestDriver, RunOptions};
use graphsync::mapping::MappingConfig;
use graphsync::schema::SchemaMetadata;
use graphsync::{Config, GraphStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "graphsync-ingest")]
#[command(about = "Ingest document-store collections into the graph store (dry-run by default)")]
struct Args {
    /// Write to the graph store (without it nothing is written)
    #[arg(long)]
    apply: bool,

    /// Create or migrate the graph store before writing (with --apply)
    #[arg(long)]
    init_schema: bool,

    /// Process at most this many documents per collection
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Comma-separated subset of mapped collections, run in the given order
    #[arg(long)]
    collections: Option<String>,

    /// Dead-letter log path (overrides sync.deadletter_path)
    #[arg(long)]
    deadletter: Option<PathBuf>,

    /// Schema file (overrides sync.schema_path)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Mapping file (overrides sync.mapping_path)
    #[arg(long)]
    mapping: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::read()?;
    if let Some(path) = args.schema {
        config.sync.schema_path = path;
    }
    if let Some(path) = args.mapping {
        config.sync.mapping_path = path;
    }
    if let Some(path) = args.deadletter {
        config.sync.deadletter_path = path;
    }
    config.validate()?;

    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.sync.log_level),
    )
    .init();

    let schema = Arc::new(SchemaMetadata::load(&config.sync.schema_path)?);
    let mapping = Arc::new(MappingConfig::load(&config.sync.mapping_path)?);

    let options = RunOptions::resolve(
        args.apply,
        args.init_schema,
        args.limit,
        args.collections.as_deref(),
        &mapping,
    )?;
    if options.init_schema && !options.apply {
        log::warn!("--init-schema has no effect without --apply");
    }

    let sink = Arc::new(
        DeadLetterSink::open(&config.sync.deadletter_path).with_context(|| {
            format!(
                "Failed to open dead-letter log {}",
                config.sync.deadletter_path.display()
            )
        })?,
    );
    let source = config.document_source().await?;

    let mut driver = IngestDriver::new(schema.clone(), mapping, source, sink.clone())
        .with_progress_every(config.sync.progress_every)
        .with_concurrency(config.sync.concurrency);
    if let Some(store) = open_graph_store(&options, config.db_path(), config.migrations_dir(), schema).await? {
        let store: Arc<dyn GraphStore> = Arc::new(store);
        driver = driver.with_store(store);
    }

    let start = Instant::now();
    let stats = driver.run(&options).await?;
    print_summary(&options, &stats, &sink);
    log::info!("Ingestion finished in {:?}", start.elapsed());

    Ok(())
}

fn print_summary(options: &RunOptions, stats: &[CollectionStats], sink: &DeadLetterSink) {
    println!("\n=== graphsync ingest ({}) ===\n", options.mode());
    println!("{:-<112}", "");
    println!(
        "{:<32} {:>8} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10} {:>8}",
        "Collection", "Scanned", "Inserted", "Skipped", "Failed", "Rel ins", "Rel skip", "Rel fail", "ms"
    );
    println!("{:-<112}", "");
    let mut total = CollectionStats::new("total");
    for s in stats {
        println!(
            "{:<32} {:>8} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10} {:>8}",
            s.collection,
            s.scanned,
            s.inserted,
            s.skipped,
            s.failed,
            s.relations_inserted,
            s.relations_skipped,
            s.relation_failed,
            s.duration_ms
        );
        total.merge(s);
        total.duration_ms += s.duration_ms;
    }
    println!("{:-<112}", "");
    println!(
        "{:<32} {:>8} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10} {:>8}",
        total.collection,
        total.scanned,
        total.inserted,
        total.skipped,
        total.failed,
        total.relations_inserted,
        total.relations_skipped,
        total.relation_failed,
        total.duration_ms
    );
    println!("\nDead letters: {} (run {})", sink.path().display(), sink.run_id());
}
