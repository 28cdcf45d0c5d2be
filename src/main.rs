use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use mangama_client::services::orchestrator::describe_metrics;
use mangama_client::{
    app_state::AppState, config::AppConfig, BatchEvent, BatchPhase, ImagePayload, ItemStatus,
    LivenessState,
};

/// Translate manga pages with the MangaMa service.
#[derive(Debug, Parser)]
#[command(name = "mangama", version, about)]
struct Cli {
    /// JPG or PNG pages to translate, processed in the given order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Ask the service to use GPU processing.
    #[arg(long)]
    accelerated: bool,

    /// Override MANGAMA_SERVICE_URL.
    #[arg(long)]
    service_url: Option<String>,

    /// Delete the service's temporary files after each translated page.
    #[arg(long)]
    cleanup: bool,

    /// Emit JSON logs.
    #[arg(long, env = "MANGAMA_LOG_JSON")]
    json_logs: bool,

    /// Print Prometheus metrics for the run to stderr before exiting.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize structured logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Initialize Prometheus metrics recorder
    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics recorder");
            return ExitCode::FAILURE;
        }
    };
    describe_metrics();

    // Load configuration from environment
    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }
    config.use_accelerated |= cli.accelerated;

    let mut payloads = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        match ImagePayload::from_path(path) {
            Ok(payload) => payloads.push(payload),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read image");
                return ExitCode::FAILURE;
            }
        }
    }

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize client");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(service = %state.transport.base_url(), "Checking translation service");
    state.start();
    if state.wait_until_ready().await != LivenessState::Available {
        tracing::error!("Translation service unavailable, nothing submitted");
        state.stop();
        return ExitCode::FAILURE;
    }

    let mut handle = match state.orchestrator.submit_batch(payloads) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Batch rejected");
            state.stop();
            return ExitCode::FAILURE;
        }
    };

    let total = handle.snapshot().len();
    let mut cleanups = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            BatchEvent::StatusChanged { index, status, .. } => {
                let snapshot = handle.snapshot();
                let item = &snapshot.items[index];
                match status {
                    ItemStatus::InFlight => {
                        tracing::info!("Translating {} ({} of {})", item.file_name, index + 1, total)
                    }
                    ItemStatus::Succeeded => {
                        if let Some(result) = &item.result {
                            tracing::info!(
                                regions = result.total_text_regions,
                                translated = %state.transport.resolve_image_url(&result.translated_image_url),
                                "Translated {}",
                                item.file_name
                            );
                            if cli.cleanup {
                                cleanups.extend(state.orchestrator.cleanup(result));
                            }
                        }
                    }
                    ItemStatus::Failed => {
                        if let Some(failure) = &item.failure {
                            tracing::error!(
                                kind = %failure.kind(),
                                attempts = failure.attempts,
                                "{}: {}",
                                item.file_name,
                                failure.message()
                            );
                        }
                    }
                    ItemStatus::Pending => {}
                }
            }
            BatchEvent::Retrying { index, attempt, delay, error, .. } => {
                tracing::warn!(
                    item = index + 1,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    error = %error,
                    "Retrying"
                );
            }
            BatchEvent::Finished { .. } => break,
        }
    }

    let batch = handle.wait().await;
    for task in cleanups {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Cleanup task aborted");
        }
    }
    state.liveness.stop();

    match serde_json::to_string_pretty(&batch) {
        Ok(summary) => println!("{summary}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize batch summary"),
    }
    if cli.metrics {
        eprintln!("{}", metrics_handle.render());
    }

    if batch.phase == BatchPhase::Completed && batch.count(ItemStatus::Failed) == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
