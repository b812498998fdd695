//! Browser automation seam.
//!
//! Jobs talk to the browser only through [`Browser`]; [`BrowserLauncher`]
//! starts one browser per job. The concrete implementation speaks the W3C
//! WebDriver protocol to a `chromedriver` child process.

mod webdriver;

use std::io;
use std::sync::Mutex;

use archivist_core::JobId;
use thiserror::Error;

use crate::fragment::Fragment;
use crate::signal::JobSignal;

pub use webdriver::{ChromeDriverLauncher, ChromeDriverSettings, WebDriverSession};

const NETWORK_ERROR_MARKER: &str = "net::";
const UNKNOWN_NETWORK_ERROR: &str = "ERR_UNKNOWN";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not start browser automation: {0}")]
    Startup(String),
    #[error("network error {code}: {message}")]
    Network { code: String, message: String },
    #[error("driver timed out: {0}")]
    Timeout(String),
    #[error("no such element: {0}")]
    NoSuchElement(String),
    #[error("webdriver error: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cancelled while starting")]
    Cancelled,
}

impl DriverError {
    /// Browser-reported failures mentioning a Chromium `net::` error become
    /// [`DriverError::Network`]; everything else is a protocol error.
    pub fn from_browser_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match network_error_code(&message) {
            Some(code) => DriverError::Network { code, message },
            None => DriverError::Protocol(message),
        }
    }

    pub fn network_code(&self) -> Option<&str> {
        match self {
            DriverError::Network { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// `ERR_NAME_NOT_RESOLVED` out of `unknown error: net::ERR_NAME_NOT_RESOLVED`.
pub fn network_error_code(message: &str) -> Option<String> {
    let start = message.find(NETWORK_ERROR_MARKER)? + NETWORK_ERROR_MARKER.len();
    let code: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_uppercase() || *c == '_')
        .collect();
    if code.is_empty() {
        Some(UNKNOWN_NETWORK_ERROR.to_string())
    } else {
        Some(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Css(value) | Locator::XPath(value) => value,
        }
    }
}

/// Opaque reference to an element of the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One automated browser session. Calls block until the browser answers.
pub trait Browser: Send {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    fn current_url(&mut self) -> Result<String, DriverError>;

    /// Elements matching `locator`, searched below `scope` or in the whole page.
    fn find_all(
        &mut self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    fn inner_html(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    fn quit(&mut self) -> Result<(), DriverError>;

    fn find(
        &mut self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Option<ElementHandle>, DriverError> {
        Ok(self.find_all(scope, locator)?.into_iter().next())
    }

    /// Decoded text of the inner HTML, trimmed.
    fn text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let html = self.inner_html(element)?;
        Ok(Fragment::parse(&html).text_content().trim().to_string())
    }
}

pub struct LaunchedBrowser {
    pub browser: Box<dyn Browser>,
    /// Stops the automation engine. May run on another thread than the job.
    pub release: Box<dyn FnOnce() + Send>,
}

pub trait BrowserLauncher: Send + Sync {
    /// Starts a browser for `job_id`. Waits give up early once `signal` is
    /// cancelled.
    fn launch(&self, job_id: JobId, signal: &JobSignal) -> Result<LaunchedBrowser, DriverError>;
}

enum HookState {
    Empty,
    Armed(Box<dyn FnOnce() + Send>),
    Released,
}

/// Runs a job's release action exactly once, whichever of "browser started"
/// and "job torn down" happens first.
pub struct ReleaseHook {
    state: Mutex<HookState>,
}

impl ReleaseHook {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HookState::Empty),
        }
    }

    /// Installs the action; runs it immediately if the hook was already released.
    pub fn arm(&self, action: Box<dyn FnOnce() + Send>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if matches!(*state, HookState::Released) {
            drop(state);
            action();
            return;
        }
        *state = HookState::Armed(action);
    }

    pub fn release(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *state, HookState::Released)
        };
        if let HookState::Armed(action) = previous {
            action();
        }
    }
}

impl Default for ReleaseHook {
    fn default() -> Self {
        Self::new()
    }
}
