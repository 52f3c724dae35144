use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framecast_core::{
    load_config_or_default, plan_batch, run_all, validate_config, write_ndjson, BatchOptions,
    BatchSummary, Config, EventReporter, FfmpegEncoder, OrchestratorSettings, ProcessLauncher,
    RenderError, RenderOrchestrator,
};
use framecast_server::api::create_router;
use framecast_server::cli::{load_rows, BatchArgs, Cli, Command, RenderArgs};
use framecast_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr; stdout carries the event stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("FRAMECAST_CONFIG").ok().map(PathBuf::from));
    match &config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }
    let config = load_config_or_default(config_path.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    match cli.command {
        Command::Render(args) => render(&config, args).await,
        Command::Batch(args) => batch(&config, args).await,
        Command::Serve => serve(config).await,
    }
}

fn build_orchestrator(config: &Config, download_base_url: Option<String>) -> Arc<RenderOrchestrator> {
    let launcher = Arc::new(ProcessLauncher::new(config.renderer.clone()));
    let encoder = Arc::new(FfmpegEncoder::new(config.encoder.clone()));

    let mut settings = OrchestratorSettings::from_config(config);
    if let Some(url) = download_base_url {
        settings = settings.with_download_base_url(url);
    }
    Arc::new(RenderOrchestrator::new(launcher, encoder, settings))
}

async fn render(config: &Config, args: RenderArgs) -> Result<()> {
    let job = args
        .to_request()?
        .into_job(&config.render)
        .context("Invalid render request")?;
    let orchestrator = build_orchestrator(config, None);

    let (reporter, events) = EventReporter::channel();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        write_ndjson(events, &mut stdout).await
    });

    let result = orchestrator.render_with_events(&job, &reporter).await;
    drop(reporter);
    writer
        .await
        .context("Event writer stopped unexpectedly")?
        .context("Failed to write events")?;

    let outcome = result?;
    info!(
        output = %outcome.output_path.display(),
        frames = outcome.frames,
        duration_ms = outcome.duration_ms,
        "Render finished"
    );
    Ok(())
}

async fn batch(config: &Config, args: BatchArgs) -> Result<()> {
    let base = args
        .base_request()?
        .into_job(&config.render)
        .context("Invalid render options")?;
    let pattern = args.pattern()?;
    let rows = load_rows(&args.data)?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.render.output_dir.clone());

    let jobs = plan_batch(&base, &rows, &pattern, &output_dir).context("Invalid batch")?;
    info!(jobs = jobs.len(), output_dir = %output_dir.display(), "Batch planned");

    let orchestrator = build_orchestrator(config, None);
    let tasks: Vec<_> = jobs
        .into_iter()
        .enumerate()
        .map(|(index, job)| {
            let orchestrator = Arc::clone(&orchestrator);
            move || async move {
                let result = orchestrator.render(&job).await;
                match &result {
                    Ok(outcome) => info!(index, filename = %outcome.filename, "Batch job finished"),
                    Err(e) => error!(index, error = %e, "Batch job failed"),
                }
                result
            }
        })
        .collect();

    let started_at = chrono::Utc::now();
    let options = BatchOptions::new(args.concurrency).with_fail_fast(args.fail_fast);
    let outcomes = run_all(tasks, options).await.map_err(RenderError::from)?;

    let summary = BatchSummary::from_outcomes(&outcomes, started_at);
    println!(
        "{}",
        serde_json::to_string(&summary).context("Failed to serialize batch summary")?
    );

    if !summary.all_fulfilled() {
        bail!("{} of {} batch jobs failed", summary.rejected, summary.total);
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config, Some(config.server.downloads_url()));

    tokio::fs::create_dir_all(&config.render.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory {:?}",
                config.render.output_dir
            )
        })?;

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, orchestrator));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
