use super::*;
use anyhow::Result;
use basefile::{BaseFileName, BaseFileWriter};
use config::MetadataConfig;
use logfile::{Block, LogFileName, LogWriter};
use record::{key, BloomFilterPayload, FilesKind, FilesPayload, PARTITION_BLOOM_FILTERS, PARTITION_FILES};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};
use timeline::{Action, Instant, InstantTime, TableMetaClient, TIMELINE_DIR};

// -------------------- Fixture --------------------

fn touch(table: &Path, instant: Instant) -> Result<()> {
    let dir = table.join(TIMELINE_DIR);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(instant.file_name()), b"")?;
    Ok(())
}

fn listing(k: &str, kind: FilesKind, files: &[(&str, u64)]) -> MetadataRecord {
    MetadataRecord::new(
        k,
        MetadataPayload::Files(FilesPayload::listing(kind, files.iter().copied())),
    )
}

fn bloom(k: &str, ts: &str) -> MetadataRecord {
    MetadataRecord::new(
        k,
        MetadataPayload::BloomFilter(BloomFilterPayload {
            filter_type: "SIMPLE".to_string(),
            timestamp: ts.to_string(),
            filter: vec![0; 8],
            deleted: false,
        }),
    )
}

fn write_base(partition_dir: &Path, file_id: &str, mut records: Vec<MetadataRecord>) -> Result<()> {
    fs::create_dir_all(partition_dir)?;
    records.sort_by(|a, b| a.key.cmp(&b.key));
    let name = BaseFileName::new(file_id, InstantTime::new(1));
    BaseFileWriter::write(&partition_dir.join(name.file_name()), &records)?;
    Ok(())
}

/// Two dataset partitions and a couple of bloom filters, the newest of
/// which arrives through a log.
fn table() -> Result<(TempDir, TableMetadata)> {
    let dir = tempdir()?;
    let dataset = dir.path().join("dataset");
    let metadata = TableMetaClient::metadata_table_path(&dataset);
    for ts in [1u64, 2] {
        touch(&dataset, Instant::completed(ts, Action::Commit))?;
        touch(&metadata, Instant::completed(ts, Action::DeltaCommit))?;
    }

    write_base(
        &metadata.join(PARTITION_FILES),
        "files-0000",
        vec![
            listing(
                key::ALL_PARTITIONS,
                FilesKind::PartitionList,
                &[("2024/01", 0), ("2024/02", 0)],
            ),
            listing(&key::files("2024/01"), FilesKind::FileList, &[("a.parquet", 10), ("b.parquet", 20)]),
        ],
    )?;

    let blooms = metadata.join(PARTITION_BLOOM_FILTERS);
    write_base(&blooms, "bloom-0000", vec![bloom("k1", "1"), bloom("k2", "1")])?;
    let log = LogFileName::new("bloom-0000", InstantTime::new(1), 1);
    let mut w = LogWriter::create(blooms.join(log.file_name()), false)?;
    w.append(&Block::Data {
        instant: InstantTime::new(2),
        records: vec![bloom("k1", "2")],
    })?;
    w.sync_to_disk()?;

    let md = TableMetadata::new(
        &dataset,
        MetadataConfig {
            spill_dir: dir.path().join("spill"),
            ..MetadataConfig::default()
        },
    );
    Ok((dir, md))
}

fn run(md: &mut TableMetadata, line: &str) -> Result<String> {
    let cmd = Command::parse(line)
        .map_err(anyhow::Error::msg)?
        .ok_or_else(|| anyhow::anyhow!("blank line"))?;
    let mut out = Vec::new();
    execute(md, cmd, &mut out)?;
    Ok(String::from_utf8(out)?)
}

// -------------------- Parsing --------------------

#[test]
fn parse_is_case_insensitive_and_skips_blank_lines() {
    assert_eq!(
        Command::parse("get files k").unwrap(),
        Some(Command::Get {
            partition: "files".to_string(),
            key: "k".to_string()
        })
    );
    assert_eq!(Command::parse("   ").unwrap(), None);
    assert_eq!(Command::parse("quit").unwrap(), Some(Command::Exit));
}

#[test]
fn parse_prefix_mode_flags_anywhere() {
    let cmd = Command::parse("PREFIX --distributed bloom_filters a b").unwrap();
    assert_eq!(
        cmd,
        Some(Command::Prefix {
            partition: "bloom_filters".to_string(),
            prefixes: vec!["a".to_string(), "b".to_string()],
            mode: EvaluationMode::Distributed,
        })
    );
    let Some(Command::Prefix { mode, .. }) = Command::parse("PREFIX p x --parallel").unwrap() else {
        panic!("expected PREFIX");
    };
    assert_eq!(mode, EvaluationMode::Parallel);
}

#[test]
fn parse_reports_usage_errors() {
    assert!(Command::parse("GET onlypartition").unwrap_err().starts_with("usage"));
    assert!(Command::parse("MGET p").unwrap_err().starts_with("usage"));
    assert!(Command::parse("PREFIX p --parallel").unwrap_err().starts_with("usage"));
    assert!(Command::parse("FILES").unwrap_err().starts_with("usage"));
    assert_eq!(Command::parse("SET a b").unwrap_err(), "unknown command: SET");
}

#[test]
fn files_dot_means_non_partitioned() {
    assert_eq!(
        Command::parse("FILES .").unwrap(),
        Some(Command::Files {
            partition_path: String::new()
        })
    );
}

// -------------------- Execution --------------------

#[test]
fn get_and_mget_print_merged_records() -> Result<()> {
    let (_dir, mut md) = table()?;
    assert_eq!(
        run(&mut md, "GET bloom_filters k1")?,
        "bloom_filter SIMPLE ts=2 (8 bytes)\n"
    );
    assert_eq!(run(&mut md, "GET bloom_filters nope")?, "(nil)\n");
    assert_eq!(
        run(&mut md, "MGET bloom_filters k2 nope k1")?,
        "k2 -> bloom_filter SIMPLE ts=1 (8 bytes)\n\
         nope -> (nil)\n\
         k1 -> bloom_filter SIMPLE ts=2 (8 bytes)\n"
    );
    Ok(())
}

#[test]
fn prefix_lists_matches_with_count() -> Result<()> {
    let (_dir, mut md) = table()?;
    let out = run(&mut md, "PREFIX bloom_filters k --parallel")?;
    assert_eq!(
        out,
        "k1 -> bloom_filter SIMPLE ts=2 (8 bytes)\n\
         k2 -> bloom_filter SIMPLE ts=1 (8 bytes)\n\
         (2 entries)\n"
    );
    assert_eq!(run(&mut md, "PREFIX bloom_filters z")?, "(empty)\n");
    Ok(())
}

#[test]
fn partitions_and_files() -> Result<()> {
    let (_dir, mut md) = table()?;
    assert_eq!(run(&mut md, "PARTITIONS")?, "2024/01\n2024/02\n");
    assert_eq!(run(&mut md, "PARTITIONS 2024/02/")?, "2024/02\n");
    assert_eq!(run(&mut md, "PARTITIONS 2023")?, "(empty)\n");
    assert_eq!(
        run(&mut md, "FILES 2024/01")?,
        "a.parquet\t10\nb.parquet\t20\n"
    );
    assert_eq!(run(&mut md, "FILES 2024/02")?, "(empty)\n");
    Ok(())
}

#[test]
fn status_synced_reset_and_exit() -> Result<()> {
    let (_dir, mut md) = table()?;
    assert_eq!(run(&mut md, "STATUS")?, "ready\n");
    assert_eq!(
        run(&mut md, "SYNCED")?,
        format!("synced={}\ncompacted=(none)\n", InstantTime::new(2))
    );
    run(&mut md, "GET bloom_filters k1")?;
    assert!(run(&mut md, "STATS")?.contains("cached_readers=1"));
    assert_eq!(run(&mut md, "RESET")?, "OK (ready)\n");
    assert_eq!(md.cached_readers(), 0);

    let mut out = Vec::new();
    assert!(!execute(&mut md, Command::Exit, &mut out)?);
    assert_eq!(out, b"bye\n");
    Ok(())
}

#[test]
fn disabled_table_answers_nil() -> Result<()> {
    let (dir, _) = table()?;
    let mut md = TableMetadata::new(
        dir.path().join("dataset"),
        MetadataConfig {
            enabled: false,
            ..MetadataConfig::default()
        },
    );
    assert_eq!(run(&mut md, "STATUS")?, "disabled (config)\n");
    assert_eq!(run(&mut md, "GET bloom_filters k1")?, "(nil)\n");
    assert_eq!(run(&mut md, "PARTITIONS")?, "(empty)\n");
    Ok(())
}

// -------------------- Formatting --------------------

#[test]
fn describe_marks_deleted_payloads() {
    let mut r = bloom("k", "3");
    if let MetadataPayload::BloomFilter(b) = &mut r.payload {
        b.deleted = true;
    }
    assert_eq!(describe(&r), "bloom_filter SIMPLE ts=3 (8 bytes) (deleted)");

    let stats = MetadataRecord::new(
        "c",
        MetadataPayload::ColumnStats(record::ColumnStatsPayload {
            file_name: "a.parquet".to_string(),
            column_name: "fare".to_string(),
            min_value: Some(StatValue::Long(1)),
            max_value: Some(StatValue::String("z".to_string())),
            null_count: 0,
            value_count: 5,
            total_size: 0,
            total_uncompressed_size: 0,
            deleted: false,
        }),
    );
    assert_eq!(
        describe(&stats),
        "column_stats fare@a.parquet min=1 max=\"z\" nulls=0 values=5"
    );
}
