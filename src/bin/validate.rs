use anyhow::Result;
use clap::Parser;
use graphsync::db::SqliteGraphStore;
use graphsync::validate::{default_checks, run_checks, CheckLevel};
use graphsync::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "graphsync-validate")]
#[command(about = "Run post-ingestion consistency checks against the graph store (read-only)")]
struct Args {
    /// Graph store path (overrides store.db_path)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

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
    let db_path = match args.db {
        Some(path) => path,
        None => Config::read()?.store.db_path,
    };
    println!("db={}", db_path.display());

    let store = SqliteGraphStore::open_existing(&db_path, None).await?;
    let reports = run_checks(&store, &default_checks()).await;

    for report in &reports {
        println!("{}", report);
    }
    let warnings = reports.iter().filter(|r| r.level == CheckLevel::Warn).count();
    log::info!("{} checks, {} warnings", reports.len(), warnings);
    Ok(())
}
