//! Fuzz target for opening table files.
//!
//! Any byte sequence on disk must open as a table, open as an empty file,
//! or fail with a format error. Block lengths and counts read from the
//! file are untrusted and must not drive unbounded allocations.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tablestore_core::{Storage, Variables};

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let path = dir.path().join("fuzz.tbl");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    let Ok(storage) = Storage::open(&path) else {
        return;
    };
    if let Ok(rows) = storage.row_count() {
        let _ = storage.headers();
        let _ = storage.get_meta_map();
        let _ = storage.read(&[0], 0, rows.min(16));
        let _ = storage.get_where_list("a == 1", &Variables::new(), 0, 16, 1);
    }
});
