use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub log_level: Option<String>,
    pub file_log: Option<bool>,
    pub log_dir: Option<PathBuf>,
    pub log_file: Option<String>,
}

impl LoggingConfig {
    /// File logs land next to the run artifacts unless overridden.
    pub fn for_artifacts(artifacts_dir: &std::path::Path) -> Self {
        Self {
            log_dir: Some(artifacts_dir.join("logs")),
            ..Self::default()
        }
    }

    fn level(&self) -> String {
        self.log_level
            .clone()
            .or_else(|| std::env::var("VERIFY_LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".to_string())
    }

    fn file_enabled(&self) -> bool {
        self.file_log.unwrap_or_else(|| {
            std::env::var("VERIFY_FILE_LOG")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(false)
        })
    }

    fn dir(&self) -> PathBuf {
        std::env::var("VERIFY_LOG_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| self.log_dir.clone())
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    fn file_name(&self) -> String {
        self.log_file
            .clone()
            .or_else(|| std::env::var("VERIFY_LOG_FILE").ok())
            .unwrap_or_else(|| "bookmarks-verify.log".to_string())
    }
}

pub fn init_logging(
    config: LoggingConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if !config.file_enabled() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
        return Ok(None);
    }

    let log_dir = config.dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, config.file_name());
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_target(true),
        )
        .try_init()?;

    Ok(Some(guard))
}
