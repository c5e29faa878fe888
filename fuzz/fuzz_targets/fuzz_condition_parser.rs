//! Fuzz target for the condition parser and evaluator.
//!
//! Conditions may come from untrusted callers. Parsing, type-checking and
//! evaluating any input must return a result, never panic: integer
//! overflow, division by zero and deep nesting all surface as errors.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tablestore_core::condition::{compile, parse, Variables};
use tablestore_core::{ColumnDescriptor, ColumnKind, ColumnValues, Scalar};

#[derive(Debug, Arbitrary)]
struct Input {
    condition: String,
    a: Vec<i64>,
    b: Vec<f64>,
    lim: i64,
}

fn descriptor(name: &str, kind: ColumnKind, size: usize) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        description: String::new(),
        kind,
        size,
    }
}

fuzz_target!(|input: Input| {
    if input.condition.len() > 4096 {
        return;
    }
    let Ok(expr) = parse(&input.condition) else {
        return;
    };

    let schema = [
        descriptor("a", ColumnKind::Long, 0),
        descriptor("b", ColumnKind::Double, 0),
        descriptor("s", ColumnKind::String, 8),
    ];
    let mut variables = Variables::new();
    variables.insert("lim".to_string(), Scalar::Long(input.lim));
    let Ok(compiled) = compile(&expr, &schema, &variables) else {
        return;
    };

    let rows = input.a.len().min(input.b.len()).min(64);
    let columns = [
        ColumnValues::Long(input.a[..rows].to_vec()),
        ColumnValues::Double(input.b[..rows].to_vec()),
        ColumnValues::String((0..rows).map(|i| i.to_string()).collect()),
    ];
    for row in 0..rows {
        let _ = compiled.matches(&columns, row);
    }
});
