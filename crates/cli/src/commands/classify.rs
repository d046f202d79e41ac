use std::process;

use axum::http::Uri;
use parksync_core::Classification;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::{report_error, OutputFormat};

/// Show how the interceptor would treat a request to `target`.
///
/// `target` is a path with an optional query string; a local-only flag in
/// the query is honored the same way the server honors it.
pub(crate) fn cmd_classify(
    target: &str,
    config: &Config,
    local_only: bool,
    output: OutputFormat,
    quiet: bool,
) {
    let uri: Uri = match target.parse() {
        Ok(u) => u,
        Err(e) => {
            report_error(&format!("invalid path '{}': {}", target, e), output, quiet);
            process::exit(1);
        }
    };
    let path = uri.path();
    let query: Map<String, Value> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k.to_string(), Value::String(v.to_string()))
        })
        .collect();

    let table = config.route_table();
    let local_only = local_only || table.local_only().is_set(&query, None);
    let outcome = table.classify(path, local_only);

    let (label, route) = match &outcome {
        Classification::LocalOnly => ("local-only", None),
        Classification::Excluded => ("excluded", None),
        Classification::Unmapped => ("unmapped", None),
        Classification::Mapped(m) => ("mapped", Some(m)),
    };

    match output {
        OutputFormat::Json => {
            let mut result = serde_json::json!({
                "path": path,
                "outcome": label,
            });
            if let Some(m) = route {
                result["collection"] = Value::from(m.collection.as_str());
                result["prefix"] = Value::from(m.prefix.as_str());
                result["segments"] = Value::from(m.segments(path));
            }
            match serde_json::to_string_pretty(&result) {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    report_error(&format!("serialization error: {}", e), output, quiet);
                    process::exit(1);
                }
            }
        }
        OutputFormat::Text => match route {
            Some(m) => {
                println!("{} -> {} (prefix {})", path, m.collection, m.prefix);
                let segments = m.segments(path);
                if !segments.is_empty() && !quiet {
                    println!("  segments: {}", segments.join("/"));
                }
            }
            None => println!("{} -> {}", path, label),
        },
    }
}
