//! # CLI - metadata table shell
//!
//! A REPL over the read side of a dataset's metadata table. Reads commands
//! from stdin, runs them against [`reader::TableMetadata`], and prints the
//! results to stdout. Pipe commands in for scripted use.
//!
//! ## Commands
//!
//! ```text
//! GET partition key                 Look up one key (prints the record or "(nil)")
//! MGET partition key...             Look up several keys, in input order
//! PREFIX partition prefix... [--parallel|--distributed]
//!                                   Every record whose key starts with a prefix
//! PARTITIONS [prefix...]            Dataset partitions, optionally filtered
//! FILES partition_path              Live files of one dataset partition ("." = root)
//! SYNCED                            Latest synced and compacted instants
//! STATUS                            Whether the metadata table is in use
//! STATS                             Reader counters and timings
//! RESET                             Drop cached readers and reload the timelines
//! EXIT / QUIT                       Close readers and leave
//! ```
//!
//! ## Configuration
//!
//! The dataset path is the first argument, or `METADATA_DATASET_PATH`
//! (default: "."). Reader settings come from the `METADATA_*` variables
//! read by [`config::MetadataConfig::from_env`]. Logs go to stderr and are
//! filtered with `RUST_LOG` (default: "warn").
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli -- /data/trips
//! metadata shell (dataset=/data/trips, status=ready, synced=20240101120000000)
//! > PARTITIONS 2024
//! 2024/01
//! 2024/02
//! > GET bloom_filters 0042|file-000001
//! bloom_filter SIMPLE ts=20240101120000000 (4096 bytes)
//! > EXIT
//! bye
//! ```

mod commands;

use anyhow::Result;
use commands::{execute, Command, HELP};
use config::MetadataConfig;
use reader::TableMetadata;
use std::io::{self, BufRead, Write};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let dataset = std::env::args()
        .nth(1)
        .unwrap_or_else(|| env_or("METADATA_DATASET_PATH", "."));
    let mut md = TableMetadata::new(&dataset, MetadataConfig::from_env());

    println!(
        "metadata shell (dataset={}, status={}, synced={})",
        dataset,
        md.status(),
        md.get_synced_instant_time()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("{HELP}");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        match Command::parse(&line) {
            Ok(Some(cmd)) => {
                tracing::debug!(?cmd, "running command");
                if !execute(&mut md, cmd, &mut stdout)? {
                    break;
                }
            }
            Ok(None) => {}
            Err(msg) => println!("ERR {msg}"),
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    md.close();
    Ok(())
}
