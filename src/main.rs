mod api;
mod attendance;
mod calc;
mod classroom;
mod config;
mod error;
mod gradebook;
mod ipc;
mod ledger;
mod registry;
mod session;
#[cfg(test)]
mod testing;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // stdout carries the IPC channel, so logs go to stderr.
    let filter = std::env::var("CLASSBOOKD_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn run() -> anyhow::Result<()> {
    let config = config::Config::from_env().context("invalid configuration")?;
    let backend = api::HttpBackend::new(&config).context("failed to build HTTP client")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %config.api_base_url,
        "classbookd ready"
    );
    let mut state = ipc::AppState::new(config, Box::new(backend));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                writeln!(stdout, "{}", reply)?;
                stdout.flush()?;
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        )?;
        stdout.flush()?;
    }
    info!("stdin closed, exiting");
    Ok(())
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        error!("classbookd failed to start: {e:#}");
        std::process::exit(1);
    }
}
