use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use slotwatch_core::config::resolve_path;
use slotwatch_core::{
    execute, load_config, AvailabilityChecker, BrowserLauncher, ChromiumSessionFactory,
    Credentials, Execution, GmailNotifier, RunMode, RunReport, TotpGenerator,
};
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] slotwatch_core::ConfigError),
    #[error("notification error: {0}")]
    Notify(#[from] slotwatch_core::NotifyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("check run failed: {0}")]
    RunFailed(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Driving test slot checker", long_about = None)]
pub struct Cli {
    /// Path to slotwatch.toml
    #[arg(long, default_value = "configs/slotwatch.toml")]
    pub config: PathBuf,
    /// Execution mode, fixed for the life of the process
    #[arg(long, value_enum, default_value_t = ModeArg::Scheduled)]
    pub mode: ModeArg,
    /// Output format for the run report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Scheduled,
    Once,
    TestNotification,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Scheduled => RunMode::Scheduled,
            ModeArg::Once => RunMode::Once,
            ModeArg::TestNotification => RunMode::TestNotification,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn run(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_async(cli))
}

async fn run_async(cli: Cli) -> Result<()> {
    let mode = RunMode::from(cli.mode);
    let config = Arc::new(load_config(&cli.config)?);
    let config_dir = config_dir(&cli.config);
    info!(mode = %mode, config = %cli.config.display(), "starting slotwatch");

    let credentials = match mode {
        // Never opens the browser, so login material is not required.
        RunMode::TestNotification => Credentials::new("", "", ""),
        RunMode::Scheduled | RunMode::Once => Credentials::from_env()?,
    };

    let launcher = BrowserLauncher::new(&config);
    let notifier = GmailNotifier::new(config.notifier.clone(), &config_dir);
    let screenshot = resolve_path(&config_dir, &config.diagnostics.screenshot_path);
    let checker = AvailabilityChecker::new(
        Arc::clone(&config),
        credentials,
        Arc::new(ChromiumSessionFactory::new(launcher)),
        Arc::new(notifier),
        Arc::new(TotpGenerator),
    )
    .with_screenshot_path(screenshot);

    let execution = execute(mode, Arc::new(checker), &config.schedule, shutdown_signal()).await?;
    render(&execution, cli.format)?;
    match execution {
        Execution::Report(report) if report.outcome.is_failure() => {
            Err(AppError::RunFailed(report.outcome.to_string()))
        }
        _ => Ok(()),
    }
}

fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
enum ExecutionView<'a> {
    Once { report: &'a RunReport },
    TestNotification { sent: bool },
    Scheduled { metrics: &'a slotwatch_core::CheckerMetrics },
}

impl<'a> From<&'a Execution> for ExecutionView<'a> {
    fn from(execution: &'a Execution) -> Self {
        match execution {
            Execution::Report(report) => ExecutionView::Once { report },
            Execution::TestNotificationSent => ExecutionView::TestNotification { sent: true },
            Execution::Stopped(metrics) => ExecutionView::Scheduled { metrics },
        }
    }
}

fn render(execution: &Execution, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", display(execution));
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ExecutionView::from(execution))?;
            println!("{}", json);
            Ok(())
        }
    }
}

fn display(execution: &Execution) -> String {
    match execution {
        Execution::Report(report) => {
            let mut lines = vec![
                format!("Run {} at {}", report.run_id, report.started_at.to_rfc3339()),
                format!("  outcome: {}", report.outcome),
                format!("  final step: {:?}", report.final_step),
                format!("  duration: {} ms", report.duration_ms),
            ];
            if report.retry_attempts > 0 {
                lines.push(format!("  retries: {}", report.retry_attempts));
            }
            lines.join("\n")
        }
        Execution::TestNotificationSent => "Test notification sent".to_string(),
        Execution::Stopped(metrics) => format!(
            "Scheduler stopped: {} runs ({} skipped, {} failed), {} found, {} notifications sent, {} failed deliveries, {} reloads",
            metrics.runs_started,
            metrics.runs_skipped,
            metrics.runs_failed,
            metrics.availability_found,
            metrics.notifications_sent,
            metrics.notification_failures,
            metrics.reloads,
        ),
    }
}
