//! binavrod - binlog-to-Avro conversion daemon
//!
//! Usage:
//!   binavrod --binlogdir /var/lib/binavro/binlogs --avrodir /var/lib/binavro/avro
//!
//! A dedicated worker thread drives the conversion loop; client sessions
//! are served from the tokio runtime and woken through the stream hub
//! whenever the converter flushes.

mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use binavro_core::{ConversionOutcome, Converter};
use binavro_server::{CdcServer, StreamHub};

use cli::Cli;

/// Longest pause between conversion polls when no new binlog data arrives.
const TASK_DELAY_MAX: u64 = 15;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.converter_config();
    let hub = StreamHub::new(&cli.avrodir);

    let mut converter = Converter::new(config)?;
    let (file, position) = converter.position();
    info!(file, position, "starting conversion");

    {
        let hub = Arc::clone(&hub);
        converter.on_flush(move || hub.notify_data());
    }

    let running = Arc::new(AtomicBool::new(true));
    let worker = {
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("binlog-converter".into())
            .spawn(move || conversion_loop(converter, running))?
    };

    let server = CdcServer::bind(&cli.listen, Arc::clone(&hub)).await?;

    tokio::select! {
        result = server.start() => {
            error!("server stopped: {result:?}");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    running.store(false, Ordering::Relaxed);
    let _ = worker.join();
    Ok(())
}

/// The dedicated conversion worker.
///
/// Polls the binlog directory, backing off by one second per idle round up
/// to [`TASK_DELAY_MAX`] and snapping back to one second whenever progress
/// was made.
fn conversion_loop(mut converter: Converter, running: Arc<AtomicBool>) {
    let mut task_delay = 1u64;

    while running.load(Ordering::Relaxed) {
        let rows_before = converter.stats().rows;

        match converter.run_once() {
            Ok(ConversionOutcome::LastFile) => {
                let made_progress = converter.stats().rows != rows_before;
                task_delay = if made_progress {
                    1
                } else {
                    (task_delay + 1).min(TASK_DELAY_MAX)
                };
                let (file, position) = converter.position();
                info!(
                    file,
                    position,
                    "caught up with the binlog stream, next check in {task_delay}s"
                );
            }
            Ok(ConversionOutcome::OpenTransaction) => {
                info!("binlog ends inside a transaction, retrying from checkpoint");
                task_delay = 1;
            }
            Err(e) => {
                error!("conversion failed: {e}, retrying in {TASK_DELAY_MAX}s");
                task_delay = TASK_DELAY_MAX;
            }
        }

        // Interruptible sleep so shutdown stays prompt.
        for _ in 0..task_delay * 10 {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}
