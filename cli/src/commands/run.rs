use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::eyre::Result;
use drainwatch_engine::{PowerEstimator, ScreenState};
use drainwatch_protocol::{owner_label, MergedReport};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::UserConfig;
use crate::sources;

const REPORT_BUFFER: usize = 16;
const TOP_OWNERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json { compact: bool },
    Text,
}

pub fn run(config: UserConfig, iterations: Option<u64>, format: OutputFormat) -> Result<()> {
    config.validate()?;

    let calibration = Arc::new(sources::load_calibration(&config)?);
    let screen = ScreenState::new(true);
    let monitors = sources::build_monitors(&config, &calibration, &screen)?;
    let framebuffer = sources::framebuffer_device(&config);
    let mut estimator = PowerEstimator::new(calibration, monitors, config.interval());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (report_tx, mut report_rx) = mpsc::channel(REPORT_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let watcher = tokio::spawn(sources::watch_screen(
            framebuffer,
            screen,
            shutdown_rx.clone(),
        ));
        let polling = tokio::spawn(async move {
            estimator.run(report_tx, shutdown_rx, iterations).await
        });

        let started = Instant::now();
        let mut stdout = io::stdout();
        loop {
            tokio::select! {
                report = report_rx.recv() => {
                    let Some(report) = report else { break };
                    write_report(&mut stdout, &report, format)?;
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "Failed to listen for interrupt");
                    }
                    info!("Interrupted, stopping after the current iteration");
                    let _ = shutdown_tx.send(true);
                }
            }
        }

        let _ = shutdown_tx.send(true);
        let count = polling.await?;
        watcher.await?;

        let elapsed = Duration::from_secs(started.elapsed().as_secs());
        info!(
            iterations = count,
            elapsed = %humantime::format_duration(elapsed),
            "Run finished"
        );
        Ok::<(), color_eyre::eyre::Report>(())
    })
}

fn write_report(out: &mut impl Write, report: &MergedReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json { compact: true } => {
            writeln!(out, "{}", serde_json::to_string(report)?)?;
        }
        OutputFormat::Json { compact: false } => {
            writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
        }
        OutputFormat::Text => write_text(out, report)?,
    }
    out.flush()?;
    Ok(())
}

fn write_text(out: &mut impl Write, report: &MergedReport) -> io::Result<()> {
    writeln!(
        out,
        "--- iteration {} at {} ({} ms) ---",
        report.iteration,
        report.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
        report.elapsed_ms
    )?;

    for (subsystem, scored) in &report.subsystems {
        let marker = if scored.degraded { " (degraded)" } else { "" };
        writeln!(out, "[{}] {:.3} W{}", subsystem, scored.system_watts, marker)?;
        scored.snapshot.system.log(out)?;
    }

    writeln!(out, "total {:.3} W", report.total_watts())?;
    for (uid, watts) in report.top_owners(TOP_OWNERS) {
        writeln!(out, "  {:<24} {:.3} W", owner_label(uid), watts)?;
    }
    Ok(())
}
