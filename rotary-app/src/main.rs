//! Rotary headless host.
//!
//! Loads settings and the contact directory, wires the engine to simulated
//! hardware and a loopback call provider, and runs the console bench on
//! stdin. Status events are printed to stdout as JSON lines; logs go to
//! stderr.

mod bench;
mod prompts;
mod settings;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rotary_core::{
    Collaborators, Directory, LoopbackProvider, NoopPower, PhoneEngine, ScriptedRecognizer,
    SimulatedHardware,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use bench::{Bench, BenchCommand, Reply};
use prompts::ClipPrompter;
use settings::{default_settings_path, load_or_init_settings};

/// Number this host registers as on the loopback provider.
const LOCAL_NUMBER: &str = "rotary";

fn load_directory(path: &Path) -> anyhow::Result<Directory> {
    if !path.exists() {
        warn!(path = %path.display(), "contact directory not found, starting empty");
        return Ok(Directory::new());
    }
    let directory = Directory::load(path)
        .with_context(|| format!("loading contact directory {}", path.display()))?;
    info!(contacts = directory.len(), "contact directory loaded");
    Ok(directory)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rotary=info,rotary_core=info")),
        )
        .init();

    info!("Rotary starting");

    let settings_path = default_settings_path();
    let mut app_settings = load_or_init_settings(&settings_path);
    app_settings.apply_env_overrides();
    info!(
        settings = %settings_path.display(),
        directory = %app_settings.directory_path.display(),
        voice_root = %app_settings.voice_root.display(),
        "settings loaded"
    );

    let directory = load_directory(&app_settings.directory_path)?;

    let hardware = Arc::new(SimulatedHardware::new());
    let provider = Arc::new(LoopbackProvider::new(LOCAL_NUMBER));
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let engine = Arc::new(
        PhoneEngine::new(
            app_settings.engine_config(),
            Collaborators {
                hardware: hardware.clone(),
                provider: provider.clone(),
                recognizer: recognizer.clone(),
                prompts: Arc::new(ClipPrompter::new(&app_settings.voice_root)),
                power: Arc::new(NoopPower),
                directory: Arc::new(directory),
            },
        )
        .context("building phone engine")?,
    );

    // ── Status forwarding: engine → stdout JSON lines ──────────────────────
    let mut status_rx = engine.subscribe_status();
    let forwarder = tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("status serialization failed: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "status consumer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    engine.start().context("starting phone engine")?;

    let bench = Bench {
        engine: Arc::clone(&engine),
        hardware,
        provider,
        recognizer,
    };

    // ── Console loop ────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading console")? {
        if line.trim().is_empty() {
            continue;
        }
        match BenchCommand::parse(&line) {
            Ok(command) => match bench.execute(command) {
                Reply::Continue(Some(note)) => eprintln!("{note}"),
                Reply::Continue(None) => {}
                Reply::Quit => break,
            },
            Err(usage) => eprintln!("{usage}"),
        }
    }

    info!("Rotary shutting down");
    let engine_for_shutdown = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || engine_for_shutdown.shutdown())
        .await
        .context("joining engine shutdown")?;
    forwarder.abort();
    Ok(())
}
