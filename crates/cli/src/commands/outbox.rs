use std::path::Path;
use std::process;

use parksync_storage::{JsonlOutbox, OutboxStatus, OutboxStore};

use crate::{report_error, OutputFormat};

/// Print the records of an outbox file, oldest first.
pub(crate) fn cmd_outbox(
    path: &Path,
    status: Option<&str>,
    limit: usize,
    output: OutputFormat,
    quiet: bool,
) {
    let status = match status.map(str::parse::<OutboxStatus>).transpose() {
        Ok(s) => s,
        Err(e) => {
            report_error(&e, output, quiet);
            process::exit(1);
        }
    };

    if !path.exists() {
        let msg = format!("outbox file '{}' not found", path.display());
        report_error(&msg, output, quiet);
        process::exit(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let records = rt.block_on(async {
        match JsonlOutbox::open(path).await {
            Ok(outbox) => outbox.list(status, limit).await,
            Err(e) => Err(e),
        }
    });
    let records = match records {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("error reading '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => match serde_json::to_string_pretty(&records) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                report_error(&format!("serialization error: {}", e), output, quiet);
                process::exit(1);
            }
        },
        OutputFormat::Text => {
            for r in &records {
                println!(
                    "{}  {:<6} {:<8} {:<22} {}  {}",
                    r.created_at,
                    r.method.as_str(),
                    r.status.as_str(),
                    r.collection,
                    r.target_id().unwrap_or(if r.is_bulk() { "(bulk)" } else { "-" }),
                    r.route,
                );
            }
            if !quiet {
                println!("{} record(s)", records.len());
            }
        }
    }
}
