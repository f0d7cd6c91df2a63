//! Per-layer dump for investigating a single verdict
//!
//! Prints every layer's full result (score, details, anomalies) followed by
//! the aggregate, as JSON.

use fakescope::analyzer::assemble;
use fakescope::{Orchestrator, Settings};
use serde_json::{json, Map, Value};
use std::env;
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: layer_dump <file1> [file2]");
        std::process::exit(1);
    }

    let orchestrator = Orchestrator::from_settings(&Settings::from_env());

    for path in &args[1..] {
        println!("\n{}", "=".repeat(60));
        println!("FILE: {}", path);
        println!("{}", "=".repeat(60));
        dump_file(&orchestrator, Path::new(path));
    }
}

fn dump_file(orchestrator: &Orchestrator, path: &Path) {
    let (sample, results) = match orchestrator.run_layers(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Cannot analyse: {}", e);
            return;
        }
    };

    let mut layers = Map::new();
    for (id, result) in &results {
        match serde_json::to_value(result) {
            Ok(mut v) => {
                if let Value::Object(ref mut obj) = v {
                    obj.insert("weight".to_string(), json!(id.weight()));
                }
                layers.insert(id.details_key().to_string(), v);
            }
            Err(e) => eprintln!("{}: {}", id, e),
        }
    }

    let report = assemble(&sample, &results);
    let out = json!({
        "media_type": sample.kind(),
        "bytes": sample.len(),
        "layers": layers,
        "aggregate": {
            "verdict": report.verdict,
            "confidence": report.confidence,
            "explanation": report.explanation,
        },
    });

    match serde_json::to_string_pretty(&out) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error serializing dump: {}", e),
    }
}
