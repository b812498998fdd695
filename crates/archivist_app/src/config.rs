use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archivist_engine::{ChromeDriverSettings, JobSettings};
use clap::Parser;
use engine_logging::LogSettings;
use serde::Deserialize;
use thiserror::Error;

const APP_DIR: &str = "IAT";

/// Archive server driven over stdin/stdout by the desktop client.
#[derive(Parser, Debug)]
#[command(name = "archivist")]
#[command(about = "Archives forum conversations through a browser, driven over stdio")]
#[command(version)]
pub struct Cli {
    #[arg(long, value_name = "FILE", help = "RON configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Log at debug level")]
    pub debug: bool,

    #[arg(long, value_name = "DIR", help = "Directory receiving exported archives")]
    pub export_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory receiving server.log")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "chromedriver executable")]
    pub chromedriver: Option<PathBuf>,

    #[arg(long, help = "Run the browser without a window")]
    pub headless: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

/// Server settings. Every field has a default, so a config file only
/// names what it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub export_dir: PathBuf,
    pub log_dir: PathBuf,
    pub chromedriver_path: PathBuf,
    pub browser_binary: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    pub driver_startup_timeout_secs: u64,
    pub session_check_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub input_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::rooted_at(&default_root())
    }
}

impl ServerConfig {
    fn rooted_at(root: &Path) -> Self {
        let driver = ChromeDriverSettings::default();
        let job = JobSettings::default();
        Self {
            export_dir: root.join("export"),
            log_dir: root.join("logs"),
            chromedriver_path: driver.chromedriver_path,
            browser_binary: None,
            profile_dir: None,
            headless: false,
            driver_startup_timeout_secs: driver.startup_timeout.as_secs(),
            session_check_timeout_secs: job.check_timeout.as_secs(),
            element_timeout_secs: job.element_timeout.as_secs(),
            input_poll_interval_ms: millis(job.input_wait_slice),
        }
    }

    /// Defaults, or the contents of `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Command-line flags win over file values.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.export_dir {
            self.export_dir = dir.clone();
        }
        if let Some(dir) = &cli.log_dir {
            self.log_dir = dir.clone();
        }
        if let Some(path) = &cli.chromedriver {
            self.chromedriver_path = path.clone();
        }
        if cli.headless {
            self.headless = true;
        }
        self
    }

    pub fn log_settings(&self, debug: bool) -> LogSettings {
        LogSettings::for_server(debug, Some(self.log_dir.clone()))
    }

    pub fn driver_settings(&self) -> ChromeDriverSettings {
        ChromeDriverSettings {
            chromedriver_path: self.chromedriver_path.clone(),
            browser_binary: self.browser_binary.clone(),
            profile_dir: self.profile_dir.clone(),
            headless: self.headless,
            startup_timeout: Duration::from_secs(self.driver_startup_timeout_secs),
            ..ChromeDriverSettings::default()
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            check_timeout: Duration::from_secs(self.session_check_timeout_secs),
            element_timeout: Duration::from_secs(self.element_timeout_secs),
            input_wait_slice: Duration::from_millis(self.input_poll_interval_ms.max(1)),
            ..JobSettings::default()
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_root() -> PathBuf {
    platform_root(
        std::env::consts::OS,
        std::env::var_os("APPDATA"),
        std::env::var_os("HOME"),
    )
}

fn platform_root(os: &str, appdata: Option<OsString>, home: Option<OsString>) -> PathBuf {
    match (os, appdata, home) {
        ("windows", Some(appdata), _) => PathBuf::from(appdata).join(APP_DIR),
        ("macos", _, Some(home)) => PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join(APP_DIR),
        (_, _, Some(home)) => PathBuf::from(home).join(".iat"),
        _ => PathBuf::from(".iat"),
    }
}
