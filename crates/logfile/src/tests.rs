use super::*;
use record::{FilesKind, FilesPayload, MetadataPayload, MetadataRecord};
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;
use timeline::InstantTime;

// -------------------- Helpers --------------------

fn files_record(partition: &str, names: &[(&str, u64)]) -> MetadataRecord {
    MetadataRecord::new(
        partition,
        MetadataPayload::Files(FilesPayload::listing(
            FilesKind::FileList,
            names.iter().copied(),
        )),
    )
    .with_partition(partition)
}

fn data(instant: u64, records: Vec<MetadataRecord>) -> Block {
    Block::Data {
        instant: InstantTime::new(instant),
        records,
    }
}

fn delete(instant: u64, keys: &[&str]) -> Block {
    Block::Delete {
        instant: InstantTime::new(instant),
        keys: keys.iter().map(|k| k.to_string()).collect(),
    }
}

/// Reads every block back into owned form.
fn read_all<R: std::io::Read>(mut r: LogReader<R>) -> Result<Vec<Block>, LogError> {
    let mut out = Vec::new();
    while let Some(block) = r.next_block()? {
        let owned = match block.kind() {
            BlockKind::Data => Block::Data {
                instant: block.instant(),
                records: block
                    .records()
                    .map(|raw| raw?.to_record())
                    .collect::<Result<_, _>>()?,
            },
            BlockKind::Delete => Block::Delete {
                instant: block.instant(),
                keys: block
                    .deleted_keys()
                    .map(|k| k.map(str::to_string))
                    .collect::<Result<_, _>>()?,
            },
        };
        out.push(owned);
    }
    Ok(out)
}

fn write_blocks(path: &std::path::Path, blocks: &[Block]) {
    let mut w = LogWriter::create(path, false).unwrap();
    for b in blocks {
        w.append(b).unwrap();
    }
    w.sync_to_disk().unwrap();
}

// -------------------- Write & read --------------------

#[test]
fn write_and_read_data_and_delete_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".files-0000_0.log.1_0-1-0");
    let blocks = vec![
        data(
            10,
            vec![
                files_record("2024/01/01", &[("a.parquet", 100)]),
                files_record("2024/01/02", &[("b.parquet", 200)]),
            ],
        ),
        delete(11, &["2024/01/01"]),
        data(12, vec![files_record("2024/01/03", &[])]),
    ];
    write_blocks(&path, &blocks);

    let r = LogReader::open(&path).unwrap();
    assert_eq!(read_all(r).unwrap(), blocks);
}

#[test]
fn empty_file_has_no_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.log");
    fs::write(&path, b"").unwrap();
    let mut r = LogReader::open(&path).unwrap();
    assert!(r.next_block().unwrap().is_none());
    assert_eq!(r.blocks_read(), 0);
}

#[test]
fn header_exposes_kind_instant_and_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("h.log");
    write_blocks(&path, &[delete(7, &["x", "y", "z"])]);

    let mut r = LogReader::open_with_capacity(&path, 16).unwrap();
    let block = r.next_block().unwrap().unwrap();
    assert_eq!(
        block.header(),
        BlockHeader {
            kind: BlockKind::Delete,
            instant: InstantTime::new(7),
            count: 3,
        }
    );
    // a delete block has no records and vice versa
    assert_eq!(block.records().count(), 0);
}

// -------------------- Buffer reuse --------------------

#[test]
fn copied_record_is_independent_of_block_buffer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reuse.log");
    let first = files_record("p1", &[("one.parquet", 1)]);
    let second = files_record("p2", &[("two.parquet", 2)]);
    write_blocks(
        &path,
        &[data(1, vec![first.clone()]), data(2, vec![second.clone()])],
    );

    let mut r = LogReader::open(&path).unwrap();
    let kept = {
        let block = r.next_block().unwrap().unwrap();
        let raw = block.records().next().unwrap().unwrap();
        raw.to_record().unwrap()
    };
    // the next block overwrites the reader's body buffer
    let block = r.next_block().unwrap().unwrap();
    let next = block.records().next().unwrap().unwrap().to_record().unwrap();

    assert_eq!(kept, first);
    assert_eq!(next, second);
    assert_eq!(r.blocks_read(), 2);
}

#[test]
fn raw_record_borrows_until_copied() {
    let rec = files_record("p", &[("f", 9)]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.log");
    write_blocks(&path, &[data(3, vec![rec.clone()])]);
    let bytes = fs::read(&path).unwrap();

    let mut body = bytes[8..].to_vec();
    let copy = {
        let block = LogBlock::parse(&body).unwrap();
        let raw = block.records().next().unwrap().unwrap();
        assert_eq!(raw.key, "p");
        raw.to_record().unwrap()
    };
    body.iter_mut().for_each(|b| *b = 0);
    assert_eq!(copy, rec);
}

// -------------------- Truncated tail --------------------

#[test]
fn truncated_tail_reads_as_eof() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.log");
    write_blocks(&path, &[delete(1, &["a"]), delete(2, &["b"])]);

    let mut bytes = fs::read(&path).unwrap();
    let full = bytes.len();
    bytes.truncate(full - 3);
    let blocks = read_all(LogReader::from_reader(Cursor::new(bytes))).unwrap();
    assert_eq!(blocks, vec![delete(1, &["a"])]);
}

#[test]
fn partial_length_prefix_reads_as_eof() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0x20, 0x00]);
    let blocks = read_all(LogReader::from_reader(Cursor::new(bytes))).unwrap();
    assert!(blocks.is_empty());
}

// -------------------- Corruption --------------------

#[test]
fn crc_mismatch_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("c.log");
    write_blocks(&path, &[delete(1, &["key"])]);

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    let err = read_all(LogReader::from_reader(Cursor::new(bytes))).unwrap_err();
    assert!(matches!(err, LogError::Corrupt(_)));
}

#[test]
fn absurd_length_is_corrupt() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    let err = read_all(LogReader::from_reader(Cursor::new(bytes))).unwrap_err();
    assert!(matches!(err, LogError::Corrupt(_)));
}

#[test]
fn short_body_is_corrupt() {
    assert!(matches!(
        LogBlock::parse(&[0u8; 4]),
        Err(LogError::Corrupt(_))
    ));
    let mut unknown = vec![9u8];
    unknown.extend_from_slice(&[0u8; 12]);
    assert!(matches!(
        LogBlock::parse(&unknown),
        Err(LogError::Corrupt(_))
    ));
}

#[test]
fn overlong_entry_stops_iteration() {
    // data block claiming two records, with one key length running off the end
    let mut body = vec![0u8];
    body.extend_from_slice(&5u64.to_le_bytes());
    body.extend_from_slice(&2u32.to_le_bytes());
    body.extend_from_slice(&100u32.to_le_bytes());
    body.extend_from_slice(b"ab");

    let block = LogBlock::parse(&body).unwrap();
    let mut records = block.records();
    assert!(matches!(records.next(), Some(Err(LogError::Corrupt(_)))));
    assert!(records.next().is_none());
}

// -------------------- File names --------------------

#[test]
fn log_names_parse_and_format() {
    let name = ".files-0000_20240101.log.3_1-0-1";
    let parsed = LogFileName::parse(name).unwrap();
    assert_eq!(parsed.file_id, "files-0000");
    assert_eq!(parsed.base_instant, InstantTime::new(20240101));
    assert_eq!(parsed.version, 3);
    assert_eq!(parsed.write_token, "1-0-1");
    assert!(!parsed.cdc);
    assert_eq!(parsed.file_name(), name);

    let cdc = LogFileName::parse(".files-0000_1.log.1_0-0-0-cdc").unwrap();
    assert!(cdc.cdc);
    assert_eq!(cdc.write_token, "0-0-0");
}

#[test]
fn non_log_names_are_rejected() {
    for name in [
        "files-0000_1.base",
        ".files-0000_1.log",
        ".files-0000_x.log.1_0",
        ".files-0000_1.log.v_0",
        "._1.log.1_0",
        ".hidden",
    ] {
        assert!(LogFileName::parse(name).is_none(), "{name:?}");
    }
}

#[test]
fn log_names_order_by_id_base_version_token() {
    let mut names: Vec<LogFileName> = [
        ".b_1.log.1_0",
        ".a_2.log.1_0",
        ".a_1.log.2_0",
        ".a_1.log.1_1",
        ".a_1.log.1_0",
    ]
    .iter()
    .map(|n| LogFileName::parse(n).unwrap())
    .collect();
    names.sort();
    let ordered: Vec<String> = names.iter().map(LogFileName::file_name).collect();
    assert_eq!(
        ordered,
        vec![
            ".a_1.log.1_0",
            ".a_1.log.1_1",
            ".a_1.log.2_0",
            ".a_2.log.1_0",
            ".b_1.log.1_0",
        ]
    );
}

#[test]
fn log_file_from_path() {
    let f = LogFile::from_path(std::path::Path::new("/p/.g_5.log.1_0-cdc")).unwrap();
    assert!(f.is_cdc());
    assert_eq!(f.name.file_id, "g");
    assert!(LogFile::from_path(std::path::Path::new("/p/g_5.base")).is_none());
}
