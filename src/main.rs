mod auth;
mod calc;
mod config;
mod db;
mod distribution;
mod export;
mod ingest;
mod ipc;
mod jitter;
mod logging;
mod model;
mod pivot;
mod session;
mod sheet;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Grade dashboard sidecar: newline-delimited JSON requests on stdin,
/// one response line per request on stdout.
#[derive(Debug, Parser)]
#[command(name = "gradeboardd", version)]
struct Cli {
    /// JSON configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Credential file; overrides the configured path.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// SQLite database file; overrides the configured path.
    #[arg(long)]
    database: Option<PathBuf>,
}

fn startup(cli: Cli) -> anyhow::Result<ipc::AppState> {
    let mut cfg = match cli.config.as_deref() {
        Some(p) => config::Config::load(p)?,
        None => config::Config::default(),
    };
    if let Some(p) = cli.credentials {
        cfg.credentials_path = p;
    }
    if let Some(p) = cli.database {
        cfg.database_path = p;
    }

    let credentials = auth::Credentials::load(&cfg.credentials_path)?;
    tracing::info!(
        users = credentials.len(),
        database = %cfg.database_path.display(),
        "gradeboardd ready"
    );
    Ok(ipc::AppState::new(cfg, credentials))
}

fn main() {
    logging::init();
    let mut state = match startup(Cli::parse()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            std::process::exit(1);
        }
    };

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
                tracing::warn!("unparseable request: {e}");
                let body = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", body);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
