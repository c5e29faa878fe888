//! Tests for table storage.

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use tempfile::TempDir;

use super::*;
use crate::column::{ColumnKind, MaskRow, MaskValues};
use crate::config::LimitsConfig;

fn temp_table() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("table.tbl");
    (dir, path)
}

fn schema_ab() -> Vec<Column> {
    vec![Column::long("a").unwrap(), Column::double("b").unwrap()]
}

fn rows_ab(a: Vec<i64>, b: Vec<f64>) -> Vec<Column> {
    vec![
        Column::long("a")
            .unwrap()
            .with_values(ColumnValues::Long(a))
            .unwrap(),
        Column::double("b")
            .unwrap()
            .with_values(ColumnValues::Double(b))
            .unwrap(),
    ]
}

fn table_ab(path: &Path) -> Storage {
    let mut storage = Storage::open(path).expect("open");
    storage
        .initialize(&schema_ab(), MetadataMap::new())
        .expect("initialize");
    storage
        .append(&rows_ab(vec![1, 2, 3], vec![1.0, 2.0, 3.0]))
        .expect("append");
    storage
}

fn longs(column: &Column) -> &[i64] {
    match column.values() {
        ColumnValues::Long(v) => v,
        other => panic!("expected longs, got {other:?}"),
    }
}

fn doubles(column: &Column) -> &[f64] {
    match column.values() {
        ColumnValues::Double(v) => v,
        other => panic!("expected doubles, got {other:?}"),
    }
}

// ========================================================================
// Open and initialize
// ========================================================================

#[test]
fn test_open_creates_uninitialized_table() {
    // Arrange
    let (_dir, path) = temp_table();

    // Act
    let storage = Storage::open(&path).expect("open");

    // Assert
    assert!(path.exists());
    assert_eq!(storage.state(), StorageState::Uninitialized);
    assert_eq!(storage.version(), None);
    assert!(matches!(storage.headers(), Err(Error::NotInitialized(_))));
}

#[test]
fn test_open_missing_directory_is_not_found() {
    let (dir, _) = temp_table();
    let path = dir.path().join("missing").join("t.tbl");
    let err = Storage::open(&path).expect_err("missing dir");
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.code(), "TBL-015");
}

#[test]
fn test_open_text_file_is_invalid_format() {
    // Arrange
    let (_dir, path) = temp_table();
    fs::write(&path, "this is a plain text file, not a table\n").expect("write");

    // Act
    let err = Storage::open(&path).expect_err("text file");

    // Assert
    assert!(matches!(err, Error::InvalidFormat { .. }));
}

#[test]
fn test_initialize_writes_headers_and_reserved_metadata() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    let mut meta = MetadataMap::new();
    meta.insert("origin".to_string(), MetaValue::from("test"));

    // Act
    storage.initialize(&schema_ab(), meta).expect("initialize");

    // Assert
    assert_eq!(storage.state(), StorageState::Ready);
    assert_eq!(storage.version(), Some(FormatVersion::V2));
    let headers = storage.headers().expect("headers");
    let names: Vec<&str> = headers.iter().map(Column::name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(headers[0].kind(), ColumnKind::Long);
    assert_eq!(headers[1].kind(), ColumnKind::Double);
    assert_eq!(storage.row_count().expect("rows"), 0);

    let meta = storage.get_meta_map().expect("meta");
    assert_eq!(meta.get(VERSION_KEY), Some(&MetaValue::from("2")));
    assert!(meta.contains_key(INITIALIZED_KEY));
    assert_eq!(meta.get("origin"), Some(&MetaValue::from("test")));
}

#[test]
fn test_initialize_twice_fails() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let err = storage
        .initialize(&schema_ab(), MetadataMap::new())
        .expect_err("second initialize");
    assert!(matches!(err, Error::AlreadyInitialized(_)));
    assert_eq!(storage.headers().expect("headers").len(), 2);
}

#[test]
fn test_initialize_unnamed_column_names_position() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    let unnamed = Column::header(ColumnDescriptor {
        name: String::new(),
        description: String::new(),
        kind: ColumnKind::Long,
        size: 0,
    });

    // Act
    let err = storage
        .initialize(&[Column::long("a").unwrap(), unnamed], MetadataMap::new())
        .expect_err("unnamed");

    // Assert
    assert!(err.to_string().contains("Column unnamed:1"));
    assert_eq!(storage.state(), StorageState::Uninitialized);
}

#[test]
fn test_initialize_reserved_column_name() {
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    let reserved = Column::header(ColumnDescriptor {
        name: "__hidden".to_string(),
        description: String::new(),
        kind: ColumnKind::Long,
        size: 0,
    });
    let err = storage
        .initialize(&[reserved], MetadataMap::new())
        .expect_err("reserved");
    assert!(err.to_string().contains("Reserved column name: __hidden"));
}

#[test]
fn test_initialize_reserved_metadata_key() {
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    let mut meta = MetadataMap::new();
    meta.insert("__version".to_string(), MetaValue::from("9"));
    let err = storage
        .initialize(&schema_ab(), meta)
        .expect_err("reserved key");
    assert!(matches!(err, Error::ReservedMetadataKey(_)));
    assert_eq!(storage.state(), StorageState::Uninitialized);
}

// ========================================================================
// Append and read
// ========================================================================

#[test]
fn test_concrete_where_list_scenario() {
    // Arrange
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);

    // Act
    let matches = storage
        .get_where_list("(a==2)", &Variables::new(), 0, 0, 0)
        .expect("where");
    let rows = storage.read_coordinates(&[1]).expect("read");

    // Assert
    assert_eq!(matches, vec![1]);
    assert_eq!(longs(&rows[0]), &[2]);
    assert_eq!(doubles(&rows[1]), &[2.0]);
}

#[test]
fn test_append_increases_row_count_by_k() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    storage
        .append(&rows_ab(vec![4, 5], vec![4.0, 5.0]))
        .expect("append");
    assert_eq!(storage.row_count().expect("rows"), 5);
    let all = storage.read(&[0], 0, 100).expect("read");
    assert_eq!(longs(&all[0]), &[1, 2, 3, 4, 5]);
}

#[test]
fn test_append_accepts_columns_in_any_order() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let mut columns = rows_ab(vec![7], vec![7.5]);
    columns.reverse();
    storage.append(&columns).expect("append");
    let last = storage.read_coordinates(&[3]).expect("read");
    assert_eq!(longs(&last[0]), &[7]);
    assert_eq!(doubles(&last[1]), &[7.5]);
}

#[test]
fn test_append_zero_rows_is_noop() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let stamp = storage.stamp();
    storage
        .append(&rows_ab(Vec::new(), Vec::new()))
        .expect("empty append");
    assert_eq!(storage.row_count().expect("rows"), 3);
    assert_eq!(storage.stamp(), stamp);
}

#[test]
fn test_append_mismatched_lengths_rejected() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);

    // Act
    let err = storage
        .append(&rows_ab(vec![4, 5], vec![4.0]))
        .expect_err("mismatch");

    // Assert
    assert!(matches!(err, Error::ColumnMismatch(_)));
    assert_eq!(storage.row_count().expect("rows"), 3);
}

#[test]
fn test_append_missing_or_unknown_column_rejected() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);

    let only_a = &rows_ab(vec![4], vec![4.0])[..1];
    assert!(matches!(
        storage.append(only_a),
        Err(Error::ColumnMismatch(_))
    ));

    let wrong = vec![
        Column::long("a")
            .unwrap()
            .with_values(ColumnValues::Long(vec![1]))
            .unwrap(),
        Column::long("c")
            .unwrap()
            .with_values(ColumnValues::Long(vec![1]))
            .unwrap(),
    ];
    assert!(matches!(
        storage.append(&wrong),
        Err(Error::ColumnMismatch(_))
    ));
    assert_eq!(storage.row_count().expect("rows"), 3);
}

#[test]
fn test_append_string_too_long_rejected() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    storage
        .initialize(&[Column::string("s", 4).unwrap()], MetadataMap::new())
        .expect("initialize");
    // A caller-built column with a generous size is still bound to the
    // stored width.
    let column = Column::string("s", 64)
        .unwrap()
        .with_values(ColumnValues::String(vec!["ok".into(), "too long".into()]))
        .unwrap();

    // Act
    let err = storage.append(&[column]).expect_err("too long");

    // Assert
    assert!(matches!(err, Error::ValueMismatch { ref column, .. } if column == "s"));
    assert!(err.to_string().contains("row 1"));
    assert_eq!(storage.row_count().expect("rows"), 0);
}

#[test]
fn test_read_clamps_stop_and_handles_inverted_range() {
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);

    let tail = storage.read(&[1, 0], 1, 1000).expect("read");
    assert_eq!(doubles(&tail[0]), &[2.0, 3.0]);
    assert_eq!(longs(&tail[1]), &[2, 3]);

    let empty = storage.read(&[0], 2, 1).expect("inverted");
    assert!(empty[0].is_empty());
}

#[test]
fn test_read_stop_zero_reads_to_end() {
    // Arrange
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);

    // Act
    let tail = storage.read(&[0], 1, 0).expect("read");
    let all = storage.read(&[0, 1], 0, 0).expect("read");
    let past_end = storage.read(&[0], 5, 0).expect("read");

    // Assert
    assert_eq!(longs(&tail[0]), &[2, 3]);
    assert_eq!(longs(&all[0]), &[1, 2, 3]);
    assert_eq!(doubles(&all[1]), &[1.0, 2.0, 3.0]);
    assert!(past_end[0].is_empty());
}

#[test]
fn test_read_unknown_column_number() {
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);
    let err = storage.read(&[2], 0, 3).expect_err("bad column");
    assert!(matches!(err, Error::ColumnMismatch(_)));
}

#[test]
fn test_read_coordinates_preserves_order_and_duplicates() {
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);
    let rows = storage.read_coordinates(&[2, 0, 2]).expect("read");
    assert_eq!(longs(&rows[0]), &[3, 1, 3]);
    assert_eq!(doubles(&rows[1]), &[3.0, 1.0, 3.0]);
}

#[test]
fn test_read_coordinates_out_of_range() {
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);
    let err = storage.read_coordinates(&[0, 3]).expect_err("out of range");
    assert!(matches!(err, Error::RowOutOfRange { row: 3, rows: 3 }));
}

#[test]
fn test_slice_defaults_to_everything() {
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);

    let all = storage.slice(&[], &[]).expect("slice");
    assert_eq!(all.len(), 2);
    assert_eq!(longs(&all[0]), &[1, 2, 3]);

    let some = storage.slice(&[1], &[2, 1]).expect("slice");
    assert_eq!(some.len(), 1);
    assert_eq!(doubles(&some[0]), &[3.0, 2.0]);
}

#[test]
fn test_read_limit_enforced() {
    // Arrange
    let (_dir, path) = temp_table();
    let options = StorageOptions {
        limits: LimitsConfig {
            max_read_rows: 2,
            ..LimitsConfig::default()
        },
        ..StorageOptions::default()
    };
    let mut storage = Storage::open_with_options(&path, options).expect("open");
    storage
        .initialize(&schema_ab(), MetadataMap::new())
        .expect("initialize");
    storage
        .append(&rows_ab(vec![1, 2, 3], vec![1.0, 2.0, 3.0]))
        .expect("append");

    // Act & Assert
    assert!(storage.read(&[0], 0, 2).is_ok());
    assert!(matches!(
        storage.read(&[0], 0, 3),
        Err(Error::LimitExceeded {
            limit: "limits.max_read_rows",
            ..
        })
    ));
    assert!(storage.slice(&[], &[]).is_err());
}

// ========================================================================
// Update
// ========================================================================

#[test]
fn test_update_touches_only_supplied_column() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let a = Column::long("a")
        .unwrap()
        .with_values(ColumnValues::Long(vec![20, 30]))
        .unwrap();

    // Act
    storage.update(&[1, 2], &[a]).expect("update");

    // Assert
    let all = storage.slice(&[], &[]).expect("slice");
    assert_eq!(longs(&all[0]), &[1, 20, 30]);
    assert_eq!(doubles(&all[1]), &[1.0, 2.0, 3.0]);
    assert_eq!(storage.row_count().expect("rows"), 3);
}

#[test]
fn test_update_across_chunks_survives_reopen() {
    // Arrange: two chunks, rows 0..3 and 3..5
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    storage
        .append(&rows_ab(vec![4, 5], vec![4.0, 5.0]))
        .expect("append");
    let b = Column::double("b")
        .unwrap()
        .with_values(ColumnValues::Double(vec![-1.0, -4.0]))
        .unwrap();

    // Act
    storage.update(&[0, 3], &[b]).expect("update");
    storage.cleanup();
    let reopened = Storage::open(&path).expect("reopen");

    // Assert
    let all = reopened.slice(&[], &[]).expect("slice");
    assert_eq!(longs(&all[0]), &[1, 2, 3, 4, 5]);
    assert_eq!(doubles(&all[1]), &[-1.0, 2.0, 3.0, -4.0, 5.0]);
}

#[test]
fn test_update_out_of_range_changes_nothing() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let a = Column::long("a")
        .unwrap()
        .with_values(ColumnValues::Long(vec![9, 9]))
        .unwrap();
    let err = storage.update(&[0, 5], &[a]).expect_err("out of range");
    assert!(matches!(err, Error::RowOutOfRange { row: 5, rows: 3 }));
    let all = storage.read(&[0], 0, 3).expect("read");
    assert_eq!(longs(&all[0]), &[1, 2, 3]);
}

#[test]
fn test_update_value_count_must_match_rows() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let a = Column::long("a")
        .unwrap()
        .with_values(ColumnValues::Long(vec![9]))
        .unwrap();
    let err = storage.update(&[0, 1], &[a]).expect_err("count");
    assert!(matches!(err, Error::ColumnMismatch(_)));
}

#[test]
fn test_update_with_wrong_kind_changes_nothing() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let stamp = storage.stamp();
    let a_as_double = Column::double("a")
        .unwrap()
        .with_values(ColumnValues::Double(vec![9.0]))
        .unwrap();

    // Act
    let err = storage.update(&[0], &[a_as_double]).expect_err("wrong kind");

    // Assert
    assert!(matches!(err, Error::ColumnMismatch(_)));
    assert_eq!(storage.stamp(), stamp);
    let all = storage.slice(&[], &[]).expect("slice");
    assert_eq!(longs(&all[0]), &[1, 2, 3]);
    assert_eq!(doubles(&all[1]), &[1.0, 2.0, 3.0]);
}

// ========================================================================
// Where list
// ========================================================================

#[test]
fn test_where_list_range_and_step() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    storage
        .initialize(&[Column::long("x").unwrap()], MetadataMap::new())
        .expect("initialize");
    let x = Column::long("x")
        .unwrap()
        .with_values(ColumnValues::Long((0..10).collect()))
        .unwrap();
    storage.append(&[x]).expect("append");
    let vars = Variables::new();

    // Act & Assert
    assert_eq!(
        storage.get_where_list("x >= 0", &vars, 0, 0, 0).unwrap(),
        (0..10).collect::<Vec<u64>>()
    );
    assert_eq!(
        storage.get_where_list("x >= 0", &vars, 2, 8, 3).unwrap(),
        vec![2, 5]
    );
    assert_eq!(
        storage.get_where_list("x % 2 == 1", &vars, 5, 100, 1).unwrap(),
        vec![5, 7, 9]
    );
    assert!(storage
        .get_where_list("x >= 0", &vars, 9, 3, 1)
        .unwrap()
        .is_empty());
}

#[test]
fn test_where_list_rejects_deep_conditions_as_condition_errors() {
    // Arrange
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);
    let negations = format!("{}(a==2)", "~".repeat(500));
    let sums = format!("a{} == 2", "+a".repeat(500));

    // Act & Assert
    for condition in [negations, sums] {
        let err = storage
            .get_where_list(&condition, &Variables::new(), 0, 0, 0)
            .expect_err("too deep");
        assert_eq!(err.code(), "TBL-010");
    }
}

#[test]
fn test_where_list_rejects_bad_conditions_before_scanning() {
    let (_dir, path) = temp_table();
    let storage = table_ab(&path);
    let vars = Variables::new();

    for condition in ["a ==", "c > 1", "a + 1", "a == 'x'"] {
        let err = storage
            .get_where_list(condition, &vars, 0, 0, 0)
            .expect_err(condition);
        assert!(matches!(err, Error::Condition(_)), "{condition}: {err}");
        assert_eq!(err.code(), "TBL-010");
    }
}

#[test]
fn test_where_list_condition_length_limit() {
    let (_dir, path) = temp_table();
    let options = StorageOptions {
        limits: LimitsConfig {
            max_condition_length: 8,
            ..LimitsConfig::default()
        },
        ..StorageOptions::default()
    };
    let mut storage = Storage::open_with_options(&path, options).expect("open");
    storage
        .initialize(&schema_ab(), MetadataMap::new())
        .expect("initialize");
    assert!(storage
        .get_where_list("a == 1", &Variables::new(), 0, 0, 0)
        .is_ok());
    let err = storage
        .get_where_list("(a == 1) | (a == 2)", &Variables::new(), 0, 0, 0)
        .expect_err("too long");
    assert!(matches!(err, Error::LimitExceeded { .. }));
}

// ========================================================================
// Metadata
// ========================================================================

#[test]
fn test_add_meta_map_merge_and_replace() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let mut first = MetadataMap::new();
    first.insert("a".to_string(), MetaValue::from(1));
    first.insert("b".to_string(), MetaValue::from(2.0));
    let mut second = MetadataMap::new();
    second.insert("c".to_string(), MetaValue::from("three"));

    // Act
    storage.add_meta_map(first, false).expect("merge");
    storage.add_meta_map(second, true).expect("replace");

    // Assert
    let meta = storage.get_meta_map().expect("meta");
    assert!(!meta.contains_key("a"));
    assert_eq!(meta.get("c"), Some(&MetaValue::from("three")));
    assert!(meta.contains_key(VERSION_KEY));
    assert!(meta.contains_key(INITIALIZED_KEY));
}

#[test]
fn test_add_meta_map_reserved_key_leaves_map_unchanged() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let before = storage.get_meta_map().expect("meta");
    let mut bad = MetadataMap::new();
    bad.insert("__x".to_string(), MetaValue::from(1));

    let err = storage.add_meta_map(bad, false).expect_err("reserved");

    assert!(err.to_string().contains("Reserved attribute name: __x"));
    assert_eq!(storage.get_meta_map().expect("meta"), before);
}

#[test]
fn test_metadata_write_does_not_advance_stamp() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let stamp = storage.stamp();
    let mut meta = MetadataMap::new();
    meta.insert("k".to_string(), MetaValue::from(1));
    storage.add_meta_map(meta, false).expect("meta");
    assert_eq!(storage.stamp(), stamp);
}

#[test]
fn test_reopen_preserves_rows_and_metadata() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    let mut meta = MetadataMap::new();
    meta.insert("k".to_string(), MetaValue::from(42));
    storage.add_meta_map(meta, false).expect("meta");
    let expected_meta = storage.get_meta_map().expect("meta");
    drop(storage);

    // Act
    let reopened = Storage::open(&path).expect("reopen");

    // Assert
    assert_eq!(reopened.row_count().expect("rows"), 3);
    assert_eq!(reopened.get_meta_map().expect("meta"), expected_meta);
    assert_eq!(
        reopened
            .get_where_list("b > 1.5", &Variables::new(), 0, 0, 0)
            .expect("where"),
        vec![1, 2]
    );
}

// ========================================================================
// Versioning
// ========================================================================

#[test]
fn test_v1_table_refuses_typed_metadata() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    storage
        .initialize_with_version(&schema_ab(), MetadataMap::new(), FormatVersion::V1)
        .expect("initialize v1");
    storage
        .append(&rows_ab(vec![1], vec![1.0]))
        .expect("v1 append");
    let before = storage.get_meta_map().expect("meta");
    let mut meta = MetadataMap::new();
    meta.insert("k".to_string(), MetaValue::from(1));

    // Act
    let err = storage.add_meta_map(meta, false).expect_err("v1");

    // Assert
    assert!(err
        .to_string()
        .contains("Tables metadata is only supported for version >= 2"));
    assert_eq!(storage.get_meta_map().expect("meta"), before);
    assert!(before.is_empty());
    assert_eq!(
        Storage::probe_version(&path).expect("probe"),
        Some(FormatVersion::V1)
    );
}

#[test]
fn test_v1_refuses_v2_only_kinds() {
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    let err = storage
        .initialize_with_version(
            &[Column::long_array("v", 3).unwrap()],
            MetadataMap::new(),
            FormatVersion::V1,
        )
        .expect_err("v2 kind");
    assert!(matches!(
        err,
        Error::VersionUnsupported {
            required: 2,
            actual: 1,
            ..
        }
    ));
}

#[test]
fn test_probe_version() {
    let (dir, path) = temp_table();
    assert!(matches!(
        Storage::probe_version(dir.path().join("nope.tbl")),
        Err(Error::NotFound(_))
    ));

    let storage = Storage::open(&path).expect("open");
    assert_eq!(Storage::probe_version(&path).expect("probe"), None);
    drop(storage);

    let _storage = table_ab(&path);
    assert_eq!(
        Storage::probe_version(&path).expect("probe"),
        Some(FormatVersion::V2)
    );
}

// ========================================================================
// Locking and lifecycle
// ========================================================================

#[test]
fn test_second_open_is_locked_until_cleanup() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut first = Storage::open(&path).expect("open");

    // Act
    let err = Storage::open(&path).expect_err("locked");

    // Assert
    assert!(matches!(err, Error::Locked(_)));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("Lock timeout"));

    first.cleanup();
    assert!(Storage::open(&path).is_ok());
}

#[test]
fn test_cleanup_is_idempotent_and_closes() {
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    storage.cleanup();
    storage.cleanup();
    assert_eq!(storage.state(), StorageState::Closed);
    assert!(matches!(storage.row_count(), Err(Error::Closed(_))));
    assert!(matches!(
        storage.append(&rows_ab(vec![1], vec![1.0])),
        Err(Error::Closed(_))
    ));
}

// ========================================================================
// On-disk format
// ========================================================================

#[test]
fn test_corrupt_newest_superblock_falls_back() {
    // Arrange: generation 1 (initialize) lives in slot B, generation 2
    // (first append) in slot A.
    let (_dir, path) = temp_table();
    drop(table_ab(&path));

    // Act: flip a byte inside slot A's generation field
    let mut file = fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("open raw");
    file.seek(SeekFrom::Start(14)).expect("seek");
    file.write_all(&[0xFF]).expect("corrupt");
    drop(file);

    // Assert: the initialized, empty table from generation 1 is visible
    let storage = Storage::open(&path).expect("reopen");
    assert_eq!(storage.row_count().expect("rows"), 0);
    assert_eq!(storage.headers().expect("headers").len(), 2);
}

#[test]
fn test_both_superblocks_corrupt_is_invalid_format() {
    let (_dir, path) = temp_table();
    drop(table_ab(&path));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("open raw");
    file.seek(SeekFrom::Start(0)).expect("seek");
    file.write_all(b"garbage!").expect("corrupt a");
    file.seek(SeekFrom::Start(128)).expect("seek");
    file.write_all(b"garbage!").expect("corrupt b");
    drop(file);

    assert!(matches!(
        Storage::open(&path),
        Err(Error::InvalidFormat { .. })
    ));
}

#[test]
fn test_inconsistent_mask_segment_is_invalid_format() {
    // Arrange: a one-row mask table
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    storage
        .initialize(&[Column::mask("m").unwrap()], MetadataMap::new())
        .expect("initialize");
    let row = MaskRow {
        image_id: 1,
        the_z: 2,
        the_t: 3,
        x: 4.0,
        y: 5.0,
        w: 6.0,
        h: 7.0,
        bytes: vec![9],
    };
    let column = Column::mask("m")
        .unwrap()
        .with_values(ColumnValues::Mask(std::iter::once(row).collect()))
        .unwrap();
    storage.append(&[column]).expect("append");
    drop(storage);

    // Act: commit a checksum-valid segment whose `the_z` is empty
    let mut file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .expect("open raw");
    let sb = format::read_superblock(&mut file, &path)
        .expect("superblock")
        .expect("initialized");
    let mut directory: Directory = format::decode(
        &path,
        "directory",
        &format::read_block(&mut file, &path, sb.directory).expect("directory"),
    )
    .expect("decode");
    let short = ColumnValues::Mask(MaskValues {
        image_id: vec![1],
        the_z: Vec::new(),
        the_t: vec![3],
        x: vec![4.0],
        y: vec![5.0],
        w: vec![6.0],
        h: vec![7.0],
        bytes: vec![vec![9]],
    });
    let end = file.metadata().expect("stat").len();
    let mut buf = Vec::new();
    let segment = format::frame_block(&mut buf, end, &format::encode(&short).expect("encode"))
        .expect("frame");
    directory.chunks[0].segments[0] = segment;
    let directory_at = end + buf.len() as u64;
    let directory_ref = format::frame_block(
        &mut buf,
        directory_at,
        &format::encode(&directory).expect("encode"),
    )
    .expect("frame");
    file.seek(SeekFrom::Start(end)).expect("seek");
    file.write_all(&buf).expect("write blocks");
    let crafted = Superblock {
        generation: sb.generation + 1,
        directory: directory_ref,
        ..sb
    };
    format::write_superblock(&mut file, &crafted).expect("write superblock");
    drop(file);

    // Assert
    let err = Storage::open(&path).expect_err("inconsistent mask");
    assert!(matches!(err, Error::InvalidFormat { .. }), "{err}");
    assert_eq!(err.code(), "TBL-017");
}

#[test]
fn test_compact_preserves_content_and_shrinks_file() {
    // Arrange: many small appends and updates leave dead segments behind
    let (_dir, path) = temp_table();
    let mut storage = table_ab(&path);
    for i in 0..20 {
        storage
            .append(&rows_ab(vec![i], vec![i as f64]))
            .expect("append");
        let a = Column::long("a")
            .unwrap()
            .with_values(ColumnValues::Long(vec![100 + i]))
            .unwrap();
        storage.update(&[0], &[a]).expect("update");
    }
    let before = storage.slice(&[], &[]).expect("slice");
    let meta = storage.get_meta_map().expect("meta");

    // Act
    let stats = storage.compact().expect("compact");

    // Assert
    assert!(stats.bytes_after < stats.bytes_before);
    assert!(stats.reclaimed() > 0);
    assert_eq!(fs::metadata(&path).expect("stat").len(), stats.bytes_after);
    assert_eq!(storage.slice(&[], &[]).expect("slice"), before);
    storage
        .append(&rows_ab(vec![-1], vec![-1.0]))
        .expect("append after compaction");
    drop(storage);

    let reopened = Storage::open(&path).expect("reopen");
    assert_eq!(reopened.row_count().expect("rows"), 24);
    assert_eq!(reopened.get_meta_map().expect("meta"), meta);
    let all = reopened.slice(&[], &[]).expect("slice");
    assert_eq!(longs(&all[0])[0], 119);
    assert_eq!(longs(&all[0])[23], -1);
}

// ========================================================================
// Column kinds
// ========================================================================

#[test]
fn test_mask_round_trip() {
    // Arrange
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    storage
        .initialize(&[Column::mask("m").unwrap()], MetadataMap::new())
        .expect("initialize");
    let row = MaskRow {
        image_id: 1,
        the_z: 2,
        the_t: 3,
        x: 4.0,
        y: 5.0,
        w: 6.0,
        h: 7.0,
        bytes: vec![9],
    };
    let values: MaskValues = std::iter::once(row.clone()).collect();
    let column = Column::mask("m")
        .unwrap()
        .with_values(ColumnValues::Mask(values))
        .unwrap();

    // Act
    storage.append(&[column]).expect("append");
    drop(storage);
    let reopened = Storage::open(&path).expect("reopen");
    let read = reopened.read_coordinates(&[0]).expect("read");

    // Assert
    match read[0].values() {
        ColumnValues::Mask(m) => assert_eq!(m.row(0), Some(row)),
        other => panic!("expected mask, got {other:?}"),
    }
}

#[test]
fn test_array_and_reference_kinds_round_trip() {
    let (_dir, path) = temp_table();
    let mut storage = Storage::open(&path).expect("open");
    storage
        .initialize(
            &[
                Column::float_array("f", 2).unwrap(),
                Column::image("img").unwrap(),
                Column::bool("ok").unwrap(),
            ],
            MetadataMap::new(),
        )
        .expect("initialize");
    let columns = vec![
        Column::float_array("f", 2)
            .unwrap()
            .with_values(ColumnValues::FloatArray(vec![vec![1.0, 2.0], vec![3.0, 4.0]]))
            .unwrap(),
        Column::image("img")
            .unwrap()
            .with_values(ColumnValues::Long(vec![11, 12]))
            .unwrap(),
        Column::bool("ok")
            .unwrap()
            .with_values(ColumnValues::Bool(vec![true, false]))
            .unwrap(),
    ];
    storage.append(&columns).expect("append");

    let read = storage.read_coordinates(&[0, 1]).expect("read");
    assert_eq!(read, columns);
    assert_eq!(
        storage
            .get_where_list("ok & (img == 11)", &Variables::new(), 0, 0, 0)
            .unwrap(),
        vec![0]
    );
}
