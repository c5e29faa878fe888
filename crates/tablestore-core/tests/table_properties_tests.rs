//! Property-based tests for table storage.
//!
//! Row counts, headers and `get_where_list` results are checked against
//! plain in-memory models over random inputs.

use proptest::prelude::*;
use tablestore_core::{Column, ColumnValues, MetadataMap, Scalar, Storage, Variables};

fn columns(a: Vec<i64>, b: Vec<f64>) -> Vec<Column> {
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

fn new_table(dir: &tempfile::TempDir) -> Storage {
    let mut storage = Storage::open(dir.path().join("t.tbl")).expect("open");
    storage
        .initialize(
            &[Column::long("a").unwrap(), Column::double("b").unwrap()],
            MetadataMap::new(),
        )
        .expect("initialize");
    storage
}

fn rows_strategy() -> impl Strategy<Value = Vec<(i64, f64)>> {
    proptest::collection::vec((-20i64..20, -5.0f64..5.0), 0usize..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: appending K rows adds exactly K, updates add none, and
    /// the headers never change.
    #[test]
    fn prop_row_count_tracks_appends(
        batches in proptest::collection::vec(rows_strategy(), 1usize..6),
        update_value in -100i64..100,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut storage = new_table(&dir);
        let headers = storage.headers().expect("headers");
        let mut expected = 0u64;

        for batch in batches {
            let (a, b): (Vec<i64>, Vec<f64>) = batch.into_iter().unzip();
            let added = a.len() as u64;
            storage.append(&columns(a, b)).expect("append");
            expected += added;
            prop_assert_eq!(storage.row_count().expect("rows"), expected);

            if expected > 0 {
                let a = Column::long("a")
                    .unwrap()
                    .with_values(ColumnValues::Long(vec![update_value]))
                    .unwrap();
                storage.update(&[expected - 1], &[a]).expect("update");
                prop_assert_eq!(storage.row_count().expect("rows"), expected);
            }
        }

        prop_assert_eq!(storage.headers().expect("headers"), headers);
    }

    /// Property: `get_where_list` returns exactly the ascending rows in the
    /// stepped range for which the condition holds.
    #[test]
    fn prop_where_list_matches_oracle(
        rows in rows_strategy(),
        threshold in -20i64..20,
        modulus in -2i64..=2,
        limit in -5.0f64..5.0,
        start in 0u64..10,
        stop in 0u64..50,
        step in 0u64..4,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut storage = new_table(&dir);
        let (a, b): (Vec<i64>, Vec<f64>) = rows.iter().copied().unzip();
        storage.append(&columns(a, b)).expect("append");

        let condition = format!("(a > {threshold} & b <= lim) | a % 3 == {modulus}");
        let mut variables = Variables::new();
        variables.insert("lim".to_string(), Scalar::Double(limit));

        let actual = storage
            .get_where_list(&condition, &variables, start, stop, step)
            .expect("where");

        let n = rows.len() as u64;
        let end = if stop == 0 { n } else { stop.min(n) };
        let expected: Vec<u64> = (start..end)
            .step_by(step.max(1) as usize)
            .filter(|&i| {
                let (a, b) = rows[i as usize];
                (a > threshold && b <= limit) || a % 3 == modulus
            })
            .collect();
        prop_assert_eq!(actual, expected);
    }

    /// Property: values read back by coordinates equal what was appended.
    #[test]
    fn prop_read_coordinates_round_trip(rows in rows_strategy()) {
        prop_assume!(!rows.is_empty());
        let dir = tempfile::tempdir().expect("tempdir");
        let mut storage = new_table(&dir);
        let (a, b): (Vec<i64>, Vec<f64>) = rows.iter().copied().unzip();
        storage.append(&columns(a.clone(), b.clone())).expect("append");
        drop(storage);

        let reopened = Storage::open(dir.path().join("t.tbl")).expect("reopen");
        let all: Vec<u64> = (0..rows.len() as u64).collect();
        let read = reopened.read_coordinates(&all).expect("read");
        prop_assert_eq!(read[0].values(), &ColumnValues::Long(a));
        prop_assert_eq!(read[1].values(), &ColumnValues::Double(b));
    }
}
