//! Parsing and execution of shell commands.

use anyhow::Result;
use record::{MetadataPayload, MetadataRecord, StatValue};
use reader::{EvaluationMode, TableMetadata};
use std::io::Write;

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { partition: String, key: String },
    MGet { partition: String, keys: Vec<String> },
    Prefix {
        partition: String,
        prefixes: Vec<String>,
        mode: EvaluationMode,
    },
    Partitions { prefixes: Vec<String> },
    Files { partition_path: String },
    Synced,
    Status,
    Stats,
    Reset,
    Exit,
}

pub const HELP: &str = "\
Commands: GET partition key | MGET partition key... | PREFIX partition prefix... [--parallel|--distributed]
          PARTITIONS [prefix...] | FILES partition_path | SYNCED | STATUS | STATS | RESET | EXIT";

impl Command {
    /// Parses one input line. `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(None);
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        let cmd = match cmd.to_uppercase().as_str() {
            "GET" => match args.as_slice() {
                [partition, key] => Command::Get {
                    partition: partition.clone(),
                    key: key.clone(),
                },
                _ => return Err("usage: GET partition key".to_string()),
            },
            "MGET" => match args.split_first() {
                Some((partition, keys)) if !keys.is_empty() => Command::MGet {
                    partition: partition.clone(),
                    keys: keys.to_vec(),
                },
                _ => return Err("usage: MGET partition key...".to_string()),
            },
            "PREFIX" => {
                let mut mode = EvaluationMode::Sequential;
                let mut rest = Vec::new();
                for arg in args {
                    match arg.as_str() {
                        "--parallel" => mode = EvaluationMode::Parallel,
                        "--distributed" => mode = EvaluationMode::Distributed,
                        _ => rest.push(arg),
                    }
                }
                match rest.split_first() {
                    Some((partition, prefixes)) if !prefixes.is_empty() => Command::Prefix {
                        partition: partition.clone(),
                        prefixes: prefixes.to_vec(),
                        mode,
                    },
                    _ => return Err("usage: PREFIX partition prefix... [--parallel|--distributed]".to_string()),
                }
            }
            "PARTITIONS" => Command::Partitions { prefixes: args },
            "FILES" => match args.as_slice() {
                [path] => Command::Files {
                    partition_path: if path == "." { String::new() } else { path.clone() },
                },
                _ => return Err("usage: FILES partition_path".to_string()),
            },
            "SYNCED" => Command::Synced,
            "STATUS" => Command::Status,
            "STATS" => Command::Stats,
            "RESET" => Command::Reset,
            "EXIT" | "QUIT" => Command::Exit,
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(Some(cmd))
    }
}

/// Runs `cmd`, writing its output to `out`. Returns `false` once the shell
/// should stop. Lookup failures are printed, not returned.
pub fn execute<W: Write>(md: &mut TableMetadata, cmd: Command, out: &mut W) -> Result<bool> {
    match cmd {
        Command::Get { partition, key } => match md.get_record_by_key(&key, &partition) {
            Ok(Some(record)) => writeln!(out, "{}", describe(&record))?,
            Ok(None) => writeln!(out, "(nil)")?,
            Err(e) => writeln!(out, "ERR lookup failed: {e:#}")?,
        },
        Command::MGet { partition, keys } => match md.get_records_by_keys(&keys, &partition) {
            Ok(results) => {
                for (key, record) in &results {
                    match record {
                        Some(r) => writeln!(out, "{key} -> {}", describe(r))?,
                        None => writeln!(out, "{key} -> (nil)")?,
                    }
                }
            }
            Err(e) => writeln!(out, "ERR lookup failed: {e:#}")?,
        },
        Command::Prefix {
            partition,
            prefixes,
            mode,
        } => match md.get_records_by_key_prefixes(&prefixes, &partition, mode) {
            Ok(records) if records.is_empty() => writeln!(out, "(empty)")?,
            Ok(records) => {
                for r in &records {
                    writeln!(out, "{} -> {}", r.key, describe(r))?;
                }
                writeln!(out, "({} entries)", records.len())?;
            }
            Err(e) => writeln!(out, "ERR lookup failed: {e:#}")?,
        },
        Command::Partitions { prefixes } => match md.get_partition_paths_with_prefixes(&prefixes) {
            Ok(paths) if paths.is_empty() => writeln!(out, "(empty)")?,
            Ok(paths) => {
                for p in &paths {
                    writeln!(out, "{}", if p.is_empty() { "." } else { p })?;
                }
            }
            Err(e) => writeln!(out, "ERR lookup failed: {e:#}")?,
        },
        Command::Files { partition_path } => match md.get_all_files_in_partition(&partition_path) {
            Ok(files) if files.is_empty() => writeln!(out, "(empty)")?,
            Ok(files) => {
                for (name, size) in &files {
                    writeln!(out, "{name}\t{size}")?;
                }
            }
            Err(e) => writeln!(out, "ERR lookup failed: {e:#}")?,
        },
        Command::Synced => {
            let show = |t: Option<timeline::InstantTime>| {
                t.map(|t| t.to_string()).unwrap_or_else(|| "(none)".to_string())
            };
            writeln!(out, "synced={}", show(md.get_synced_instant_time()))?;
            writeln!(out, "compacted={}", show(md.get_latest_compaction_time()))?;
        }
        Command::Status => writeln!(out, "{}", md.status())?,
        Command::Stats => writeln!(out, "{}\ncached_readers={}", md.stats(), md.cached_readers())?,
        Command::Reset => {
            md.reset();
            writeln!(out, "OK ({})", md.status())?;
        }
        Command::Exit => {
            writeln!(out, "bye")?;
            return Ok(false);
        }
    }
    Ok(true)
}

fn stat(v: &Option<StatValue>) -> String {
    match v {
        Some(StatValue::Long(n)) => n.to_string(),
        Some(StatValue::Double(d)) => d.to_string(),
        Some(StatValue::String(s)) => format!("{s:?}"),
        Some(StatValue::Bytes(b)) => format!("<{} bytes>", b.len()),
        None => "-".to_string(),
    }
}

/// One-line rendering of a record's payload.
pub fn describe(record: &MetadataRecord) -> String {
    let body = match &record.payload {
        MetadataPayload::Files(listing) => {
            let files: Vec<String> = listing
                .live_files()
                .map(|(name, size)| format!("{name}({size})"))
                .collect();
            format!("files[{}] {}", files.len(), files.join(" "))
        }
        MetadataPayload::ColumnStats(c) => format!(
            "column_stats {}@{} min={} max={} nulls={} values={}",
            c.column_name,
            c.file_name,
            stat(&c.min_value),
            stat(&c.max_value),
            c.null_count,
            c.value_count
        ),
        MetadataPayload::BloomFilter(b) => format!(
            "bloom_filter {} ts={} ({} bytes)",
            b.filter_type,
            b.timestamp,
            b.filter.len()
        ),
    };
    if record.payload.is_deleted() {
        format!("{body} (deleted)")
    } else {
        body
    }
}

#[cfg(test)]
mod tests;
