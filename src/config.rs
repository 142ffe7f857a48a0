use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HarnessError;
use crate::mock::MockPolicy;
use crate::wait::WaitOptions;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HarnessConfig {
    /// Where the app under test is served (vite dev server by default).
    pub base_url: String,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_ms: u64,
    pub step_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Hard limit for a whole scenario; `None` disables it.
    pub scenario_timeout_ms: Option<u64>,
    pub diagnostics_timeout_ms: u64,
    pub artifacts_dir: PathBuf,
    pub mock_policy: MockPolicy,
    pub request_token: Option<String>,
    pub final_screenshot: bool,
    pub parallelism: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173/".to_string(),
            headless: true,
            chrome_executable: None,
            window_width: 1280,
            window_height: 720,
            navigation_timeout_ms: 30_000,
            step_timeout_ms: 10_000,
            poll_interval_ms: 100,
            scenario_timeout_ms: Some(120_000),
            diagnostics_timeout_ms: 5_000,
            artifacts_dir: PathBuf::from("verification"),
            mock_policy: MockPolicy::PassThrough,
            request_token: Some("test-token".to_string()),
            final_screenshot: false,
            parallelism: 1,
        }
    }
}

impl HarnessConfig {
    /// First readable config from the usual locations, then env overrides.
    pub fn load() -> Self {
        let paths = vec![
            PathBuf::from("verify.toml"),
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("bookmarks-verify/config.toml"),
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".bookmarks-verify/config.toml"),
        ];

        let mut config = None;
        for path in paths {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(loaded) => {
                        tracing::info!("Loaded config from {}", path.display());
                        config = Some(loaded);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config at {}: {}", path.display(), e);
                    }
                }
            }
        }

        let mut config = config.unwrap_or_else(|| {
            tracing::info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env();
        config
    }

    /// Load an explicit file; errors are fatal here.
    pub fn load_from(path: &Path) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("VERIFY_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("VERIFY_HEADLESS") {
            self.headless = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Ok(v) = std::env::var("VERIFY_CHROME") {
            self.chrome_executable = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("VERIFY_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VERIFY_REQUEST_TOKEN") {
            self.request_token = if v.is_empty() { None } else { Some(v) };
        }
        if let Ok(v) = std::env::var("VERIFY_MOCK_POLICY") {
            match v.as_str() {
                "strict" => self.mock_policy = MockPolicy::Strict,
                "pass_through" | "passthrough" => self.mock_policy = MockPolicy::PassThrough,
                other => tracing::warn!("Ignoring unknown VERIFY_MOCK_POLICY '{}'", other),
            }
        }
        if let Some(ms) = env_u64("VERIFY_STEP_TIMEOUT_MS") {
            self.step_timeout_ms = ms;
        }
        if let Some(n) = env_u64("VERIFY_PARALLELISM") {
            self.parallelism = n as usize;
        }
    }

    /// Check values and give `base_url` a trailing slash so relative
    /// navigation stays inside the app.
    pub fn validate(&mut self) -> Result<(), HarnessError> {
        url::Url::parse(&self.base_url)
            .map_err(|e| HarnessError::Config(format!("base_url '{}': {}", self.base_url, e)))?;
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        if self.step_timeout_ms == 0 {
            return Err(HarnessError::Config("step_timeout_ms must be > 0".to_string()));
        }
        if self.navigation_timeout_ms == 0 {
            return Err(HarnessError::Config(
                "navigation_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(HarnessError::Config("parallelism must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(
            Duration::from_millis(self.step_timeout_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn scenario_timeout(&self) -> Option<Duration> {
        self.scenario_timeout_ms.map(Duration::from_millis)
    }

    pub fn diagnostics_timeout(&self) -> Duration {
        Duration::from_millis(self.diagnostics_timeout_ms)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring non-numeric {}='{}'", name, raw);
            None
        }
    }
}
