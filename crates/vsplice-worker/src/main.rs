//! `vsplice <video> [prefix]`: derive scene clips from one video.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vsplice_media::{check_ffmpeg, check_ffprobe};
use vsplice_worker::{Capabilities, JobExecutor, JobRegistry, Pipeline, PipelineConfig, ResourceGuard};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vsplice_worker=info,vsplice_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(video) = args.next() else {
        bail!("usage: vsplice <video> [prefix]");
    };
    let prefix = args.next();

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let guard = Arc::new(ResourceGuard::from_config(config.guard.clone()));
    let capabilities = Capabilities::ffmpeg_defaults(&config);
    let executor = JobExecutor::new(Pipeline::new(config, capabilities, guard), JobRegistry::new());

    let handle = executor.submit(PathBuf::from(video), prefix)?;
    info!("Submitted job {}", handle.job_id);

    let result = handle.wait().await;
    executor.close();
    for record in executor.registry().list() {
        info!(job_id = %record.job_id, status = %record.status, events = record.event_seq, "Job finished");
    }

    let output = result?;
    println!("{}", output.run_dir.display());
    Ok(())
}
