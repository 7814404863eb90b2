//! vktrim
//!
//! Drives a scripted workload through a trim session and writes the trimmed
//! stream as JSON lines.

mod workload;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use trim_core::{NullSink, TrimSession, TrimStats};
use trim_metrics::PhaseTimer;
use trim_services::{JsonLinesSink, Settings};
use workload::ScriptedApp;

/// Frames to run: the whole window plus one, or a few past the start when open ended.
fn frames_to_run(settings: &Settings) -> u64 {
    match settings.trim.frames {
        Some(range) if range.is_open_ended() => range.start + 3,
        Some(range) => range.end + 1,
        None => 3,
    }
}

fn run(session: &TrimSession, frames: u64) -> Result<TrimStats> {
    let mut app = ScriptedApp::start(session)?;
    for _ in 0..frames {
        app.frame(session)?;
        session.advance_frame();
    }
    if session.phase().is_recording() {
        session.flush().context("failed to write trimmed stream")?;
    }
    Ok(session.stats())
}

fn main() -> Result<()> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path).with_context(|| format!("loading {path}"))?,
        None => Settings::default(),
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("vktrim v{}", trim_core::VERSION);
    tracing::info!(frames = ?settings.trim.frames, policy = ?settings.trim.image_creation, "trim window");

    let session = match (&settings.output, settings.trim.frames) {
        (_, None) => {
            tracing::info!("trimming disabled, nothing will be written");
            TrimSession::new(settings.trim.clone(), NullSink)?
        }
        (Some(path), Some(_)) => {
            let sink = JsonLinesSink::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            TrimSession::new(settings.trim.clone(), sink)?
        }
        (None, Some(_)) => TrimSession::new(settings.trim.clone(), JsonLinesSink::stdout())?,
    };

    let mut timer = PhaseTimer::new();
    let stats = timer.time_phase("workload", || run(&session, frames_to_run(&settings)))?;

    tracing::info!(
        snapshotted = stats.objects_snapshotted,
        written = stats.packets_written,
        skipped = stats.packets_skipped,
        released = stats.packets_released,
        "trim complete"
    );
    tracing::info!(
        workload = ?timer.get_timing("workload"),
        snapshot = ?session.phase_timing("snapshot"),
        emit = ?session.phase_timing("emit"),
        "timings"
    );
    Ok(())
}
