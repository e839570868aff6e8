//! Concurrent category construction against one registry.

use std::sync::Arc;

use pm_core::Value;
use pm_data::{MemoryLoader, Signature, SourceRegistry};
use rayon::prelude::*;

#[test]
fn concurrent_lookups_share_instances() {
    let loader = MemoryLoader::new()
        .with_table("ttbar_1", [("x", vec![Value::Int(1), Value::Int(2)])])
        .with_table("ttbar_2", [("x", vec![Value::Int(3)])])
        .with_table("data", [("x", vec![Value::Int(4)])]);
    let registry = SourceRegistry::new();

    let file_sets: Vec<Vec<&str>> = (0..64)
        .map(|i| match i % 3 {
            0 => vec!["ttbar_1", "ttbar_2"],
            1 => vec!["ttbar_2", "ttbar_1"],
            _ => vec!["data"],
        })
        .collect();

    let sources: Vec<_> = file_sets
        .par_iter()
        .map(|files| {
            let sig = Signature::new("memory", files.iter().copied()).unwrap();
            registry.get_or_create(&sig, &loader).unwrap()
        })
        .collect();

    assert_eq!(registry.len(), 2);
    for (files, src) in file_sets.iter().zip(&sources) {
        let expected = if files[0] == "data" { 1 } else { 2 };
        assert_eq!(src.signature().files().len(), expected);
    }

    let ttbar: Vec<_> = sources.iter().filter(|s| s.signature().files().len() == 2).collect();
    assert!(ttbar.windows(2).all(|w| Arc::ptr_eq(w[0], w[1])));
}

#[test]
fn shared_source_reads_each_record_once_per_scan() {
    let loader = MemoryLoader::new().with_table("t", [("x", vec![Value::Int(1), Value::Int(5), Value::Int(9)])]);
    let registry = SourceRegistry::new();
    let sig = Signature::new("memory", ["t"]).unwrap();
    let a = registry.get_or_create(&sig, &loader).unwrap();
    let b = registry.get_or_create(&sig, &loader).unwrap();

    let mut scan = a.scan().unwrap();
    let mut seen = 0;
    while scan.advance().unwrap() {
        seen += 1;
    }
    drop(scan);
    assert_eq!(seen, 3);
    assert_eq!(b.records_decoded(), 3);
}
