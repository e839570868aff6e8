#![no_main]

use libfuzzer_sys::fuzz_target;
use pm_core::{MapRecord, Value};
use pm_expr::Formula;

fuzz_target!(|data: &[u8]| {
    // Formulas are short; long inputs only slow the fuzzer down.
    if data.len() > 4096 {
        return;
    }
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(formula) = Formula::parse(text) else {
        return;
    };
    let record = MapRecord::new()
        .with("x", Value::Int(3))
        .with("pt", Value::Float(42.5))
        .with("flag", Value::Bool(true))
        .with("channel", Value::Str("ee".into()))
        .with("jets", Value::Vector(vec![1.0, 2.0, 3.0]));
    let _ = formula.eval(&record);
});
