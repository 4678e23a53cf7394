use anyhow::Result;
use clap::Parser;
use graphsync::deadletter::{read_entries, summarize};
use graphsync::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "graphsync-deadletters")]
#[command(about = "Summarise the dead-letter log by collection and reason")]
struct Args {
    /// Dead-letter log path (overrides sync.deadletter_path)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Only count entries of this run id
    #[arg(long)]
    run: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let path = match args.path {
        Some(path) => path,
        None => Config::read()?.sync.deadletter_path,
    };

    if !path.exists() {
        println!("No dead-letter log at {}.", path.display());
        return Ok(());
    }

    let entries = read_entries(&path)?;
    let counts = summarize(&entries, args.run.as_deref());

    println!("\n=== Dead Letters: {} ===\n", path.display());
    if let Some(run) = &args.run {
        println!("Run: {}\n", run);
    }
    if counts.is_empty() {
        println!("No entries.");
        return Ok(());
    }

    println!("{:-<80}", "");
    println!("{:<40} {:<30} {:>8}", "Collection", "Reason", "Count");
    println!("{:-<80}", "");
    for ((collection, reason), count) in &counts {
        println!("{:<40} {:<30} {:>8}", collection, reason, count);
    }
    println!("{:-<80}", "");
    println!("{:<71} {:>8}", "Total", counts.values().sum::<usize>());

    let mut runs: Vec<&str> = entries.iter().map(|e| e.run_id.as_str()).collect();
    runs.sort_unstable();
    runs.dedup();
    println!("\nRuns in log: {}", runs.len());
    if let Some(last) = entries.last() {
        println!("Last entry: {} (run {})", last.timestamp, last.run_id);
    }
    println!();

    Ok(())
}
