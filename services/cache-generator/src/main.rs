//! Tile cache generator CLI.
//!
//! Emits machine-readable records as one JSON object per line: progress on
//! stdout, warnings and errors on stderr. Diagnostics go to `--log-file`.

use anyhow::Result;
use cache_generator::config::REMOTE_MIN_TIMEOUT;
use cache_generator::logging::{init_logging, parse_level};
use cache_generator::{render_single, single_exit_code, Args, CacheEngine, CacheJob, GeneratorConfig};
use clap::Parser;
use renderer::{ProjectDocument, ProjectRenderer};
use std::process::ExitCode;
use std::sync::Arc;
use tile_common::{CacheError, Event, EventSink, StdioSink};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _logging = match init_logging(args.log_file.as_deref(), parse_level(&args.log_level)) {
        Ok(guard) => guard,
        Err(e) => {
            StdioSink.emit(
                Event::warning("log_file_unavailable")
                    .with("path", &args.log_file)
                    .with("message", e.to_string()),
            );
            None
        }
    };

    let events: Arc<dyn EventSink> = Arc::new(StdioSink);
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match run(args, Arc::clone(&events), cancel).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let cache_error = e.downcast_ref::<CacheError>();
            let code = cache_error.map(|c| c.code()).unwrap_or("internal");
            let class = cache_error.map(|c| c.class().as_str()).unwrap_or("fatal_input");
            error!(code, error = %e, "Cache generation failed");
            events.emit(
                Event::error("fatal")
                    .with("code", code)
                    .with("class", class)
                    .with("message", format!("{:#}", e)),
            );
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args, events: Arc<dyn EventSink>, cancel: CancellationToken) -> Result<u8> {
    let config = GeneratorConfig::from_args(args)?;
    let project = ProjectDocument::load(&config.project)?;
    info!(
        project = %config.project.display(),
        layers = project.layers.len(),
        "Project loaded"
    );

    if let Some(request) = config.single.clone() {
        config.validate()?;
        let mut http_timeout = config.render_timeout();
        if config.allow_remote && http_timeout < REMOTE_MIN_TIMEOUT {
            http_timeout = REMOTE_MIN_TIMEOUT;
        }
        let renderer = Arc::new(ProjectRenderer::new(project.clone(), http_timeout)?);
        let engine = CacheEngine::new(renderer, Arc::clone(&events), cancel, &config)?;
        let outcome = render_single(&engine, &config, &project, &request, events.as_ref()).await?;
        return Ok(single_exit_code(&outcome));
    }

    let job = CacheJob::prepare(&config, &project, events.as_ref())?;
    let renderer = Arc::new(ProjectRenderer::new(project, job.render_timeout)?);
    let engine = CacheEngine::new(renderer, Arc::clone(&events), cancel, &config)?;
    let summary = engine.run(&job).await?;

    info!(
        status = summary.status.as_str(),
        generated = summary.generated,
        errors = summary.errors,
        "Cache generation finished"
    );
    Ok(summary.status.exit_code())
}

/// Cancel the run on Ctrl-C or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable");
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        tokio::signal::ctrl_c().await.ok();

        info!("Received shutdown signal, finishing current tile");
        cancel.cancel();
    });
}
