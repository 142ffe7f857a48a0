use bookmarks_verify::bookmarks;
use bookmarks_verify::browser::ChromiumLauncher;
use bookmarks_verify::config::HarnessConfig;
use bookmarks_verify::diagnostics::FsSink;
use bookmarks_verify::logging::{init_logging, LoggingConfig};
use bookmarks_verify::mock::MockPolicy;
use bookmarks_verify::runner::{ScenarioReport, ScenarioRunner};
use bookmarks_verify::scenario::Scenario;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drive Chromium through verification scenarios for the bookmarks manager.
#[derive(Parser, Debug)]
#[command(name = "bookmarks-verify", version, about, long_about = None)]
struct Cli {
    /// Explicit config file (otherwise verify.toml and the user config dir are searched).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// URL of the running app.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Show the browser window.
    #[arg(long, global = true)]
    headed: bool,

    /// Where screenshots and failure bundles go.
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,

    /// Fail any in-scope request that no mock rule answers.
    #[arg(long, global = true)]
    strict: bool,

    /// Scenarios run at the same time, each in its own browser.
    #[arg(short = 'j', long, global = true)]
    parallel: Option<usize>,

    /// Save a screenshot after every passing scenario.
    #[arg(long, global = true)]
    final_screenshot: bool,

    /// Write all reports as a JSON array to this file.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scenarios from TOML or JSON files.
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run built-in scenarios by name.
    Builtin {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List built-in scenario names.
    List,
}

impl Cli {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(dir) = &self.artifacts {
            config.artifacts_dir = dir.clone();
        }
        if self.strict {
            config.mock_policy = MockPolicy::Strict;
        }
        if let Some(n) = self.parallel {
            config.parallelism = n;
        }
        if self.final_screenshot {
            config.final_screenshot = true;
        }
    }
}

fn load_scenarios(command: &Command) -> Result<Vec<Scenario>, Box<dyn std::error::Error>> {
    match command {
        Command::Run { files } => {
            let mut scenarios = Vec::with_capacity(files.len());
            for file in files {
                scenarios.push(Scenario::from_path(file)?);
            }
            Ok(scenarios)
        }
        Command::Builtin { names } => names
            .iter()
            .map(|name| {
                bookmarks::builtin(name).ok_or_else(|| {
                    format!(
                        "unknown scenario '{}' (known: {})",
                        name,
                        bookmarks::builtin_names().join(", ")
                    )
                    .into()
                })
            })
            .collect(),
        Command::List => Ok(Vec::new()),
    }
}

fn print_summary(reports: &[ScenarioReport]) {
    for report in reports {
        match &report.failure {
            None if report.passed() => println!(
                "PASS  {} ({} steps, {}ms)",
                report.scenario, report.steps_completed, report.elapsed_ms
            ),
            None => println!("FAIL  {}: completed but was expected to fail", report.scenario),
            Some(failure) if report.passed() => println!(
                "PASS  {} (failed as expected at '{}')",
                report.scenario,
                failure.step_label.as_deref().unwrap_or("setup")
            ),
            Some(failure) => println!(
                "FAIL  {} at '{}': {}",
                report.scenario,
                failure.step_label.as_deref().unwrap_or("setup"),
                failure.message
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let _ = dotenv();
    let cli = Cli::parse();

    if let Command::List = cli.command {
        for name in bookmarks::builtin_names() {
            println!("{}", name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let artifacts = cli
        .artifacts
        .clone()
        .or_else(|| std::env::var("VERIFY_ARTIFACTS_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| HarnessConfig::default().artifacts_dir);
    let _log_guard = init_logging(LoggingConfig {
        log_level: cli.log_level.clone(),
        ..LoggingConfig::for_artifacts(&artifacts)
    })?;

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load_from(path)?,
        None => HarnessConfig::load(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let scenarios = load_scenarios(&cli.command)?;
    tracing::info!(
        "Running {} scenario(s) against {} ({} at a time)",
        scenarios.len(),
        config.base_url,
        config.parallelism
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling running scenarios");
            on_interrupt.cancel();
        }
    });

    let launcher = Arc::new(ChromiumLauncher::new(&config));
    let sink = Arc::new(FsSink::new(config.artifacts_dir.clone()));
    let runner = ScenarioRunner::new(launcher, config, sink);
    let reports = runner.run_all(&scenarios, &cancel).await;

    print_summary(&reports);
    if let Some(path) = &cli.report {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&reports)?)?;
    }

    if reports.iter().all(ScenarioReport::passed) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
