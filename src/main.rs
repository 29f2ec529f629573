// src/main.rs

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use exam_client::api::HttpExamApi;
use exam_client::config::Config;
use exam_client::error::AppError;
use exam_client::models::question::section_by_id;
use exam_client::persistence::{FileStore, KeyValueStore};
use exam_client::preflight::{self, SavedAttempt};
use exam_client::utils::format::format_time;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration from environment (.env included)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "exam-client.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    match check(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Preflight failed: {}", e);
            tracing::error!("Next step: {}", e.next_action());
            ExitCode::FAILURE
        }
    }
}

/// Checks that the candidate can sit `EXAM_ID` without opening any device.
async fn check(config: &Config) -> Result<(), AppError> {
    let exam_id: i64 = env::var("EXAM_ID")
        .map_err(|_| AppError::Config("EXAM_ID must be set".to_string()))?
        .parse()
        .map_err(|e| AppError::Config(format!("EXAM_ID is not a number: {e}")))?;

    let api = HttpExamApi::new(config)?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.snapshot_dir)?);
    tracing::info!("Checking exam {} against {}", exam_id, api.base_url());

    let report = preflight::run(&api, store, config, exam_id).await?;

    for (section, count) in &report.sections {
        let name = section_by_id(section).map_or("Unsectioned", |s| s.name);
        tracing::info!("Section {} ({}): {} question(s)", section, name, count);
    }
    match report.saved {
        SavedAttempt::None => tracing::info!("No saved attempt, a fresh start needs verification"),
        SavedAttempt::Resumable {
            time_left_seconds,
            answered,
        } => tracing::info!(
            "Saved attempt resumes with {} left and {} answer(s)",
            format_time(time_left_seconds),
            answered
        ),
        SavedAttempt::Terminated { violation_count } => tracing::warn!(
            "Saved attempt was terminated after {} tab switch(es)",
            violation_count
        ),
    }

    tracing::info!(
        "Ready: {} question(s), {} mark(s), {} on the clock, {} tab switch(es) tolerated",
        report.question_count,
        report.total_marks,
        format_time(config.exam_duration_secs),
        config.max_tab_switches
    );
    Ok(())
}
