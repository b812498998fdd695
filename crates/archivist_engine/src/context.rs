use std::backtrace::Backtrace as Trace;
use std::sync::Arc;
use std::time::{Duration, Instant};

use archivist_core::{ForumTarget, JobId, JobState, OutboundPacket};
use engine_logging::{engine_debug, engine_info, engine_warn};
use serde_json::Value;
use thiserror::Error;

use crate::driver::{Browser, DriverError, ElementHandle, Locator};
use crate::export::ExportError;
use crate::rewrite::ContentRewriter;
use crate::signal::JobSignal;
use crate::sink::PacketSink;

/// Marker present only for a signed-in member.
pub const SIGNED_IN_MARKER: &str = ".elMobileDrawer__user-panel";

/// Timing knobs for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// How long a presence check (signed-in marker, selected page) may wait.
    pub check_timeout: Duration,
    /// Upper bound for page elements to appear.
    pub element_timeout: Duration,
    /// Interval between element and URL polls.
    pub poll_interval: Duration,
    /// Longest single wait while suspended for client input.
    pub input_wait_slice: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(3),
            element_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(100),
            input_wait_slice: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job cancelled")]
    Cancelled,
    #[error("{source}")]
    Driver {
        #[source]
        source: DriverError,
        backtrace: Trace,
    },
    #[error("cannot resolve the last page from '{0}'")]
    PaginationUnresolvable(String),
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("required element missing: {0}")]
    MissingElement(String),
    #[error("{source}")]
    Export {
        #[source]
        source: ExportError,
        backtrace: Trace,
    },
}

impl JobError {
    /// Where a driver or export failure entered the job.
    pub fn backtrace(&self) -> Option<&Trace> {
        match self {
            JobError::Driver { backtrace, .. } | JobError::Export { backtrace, .. } => {
                Some(backtrace)
            }
            _ => None,
        }
    }
}

impl From<DriverError> for JobError {
    fn from(source: DriverError) -> Self {
        JobError::Driver {
            source,
            backtrace: Trace::force_capture(),
        }
    }
}

impl From<ExportError> for JobError {
    fn from(source: ExportError) -> Self {
        JobError::Export {
            source,
            backtrace: Trace::force_capture(),
        }
    }
}

/// Everything a running job uses: its browser, the output channel and the
/// signal shared with the registry.
pub struct JobContext {
    id: JobId,
    target: ForumTarget,
    browser: Box<dyn Browser>,
    sink: Arc<dyn PacketSink>,
    signal: Arc<JobSignal>,
    settings: JobSettings,
    rewriter: ContentRewriter,
    state: Option<JobState>,
}

impl JobContext {
    pub fn new(
        id: JobId,
        target: ForumTarget,
        browser: Box<dyn Browser>,
        sink: Arc<dyn PacketSink>,
        signal: Arc<JobSignal>,
        settings: JobSettings,
    ) -> Self {
        let rewriter = ContentRewriter::new(target.clone());
        Self {
            id,
            target,
            browser,
            sink,
            signal,
            settings,
            rewriter,
            state: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn target(&self) -> &ForumTarget {
        &self.target
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn rewriter(&self) -> &ContentRewriter {
        &self.rewriter
    }

    pub fn browser(&mut self) -> &mut dyn Browser {
        self.browser.as_mut()
    }

    pub fn state(&self) -> Option<&JobState> {
        self.state.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publishes `state`. Progressive states return `None` at once;
    /// interactive ones block until the client answers and return the answer.
    pub fn set_state(&mut self, state: JobState) -> Result<Option<Value>, JobError> {
        self.check_cancelled()?;
        // An answer meant for the previous state must not satisfy this one.
        self.signal.clear_input();
        engine_debug!("state => {}", state.note);
        self.sink.emit(OutboundPacket::state_changed(self.id, &state));
        let interactive = state.is_interactive();
        self.state = Some(state);
        if !interactive {
            return Ok(None);
        }
        match self.signal.wait_for_input(self.settings.input_wait_slice) {
            Some(answer) => Ok(Some(answer)),
            None => Err(JobError::Cancelled),
        }
    }

    pub fn emit(&self, packet: OutboundPacket) {
        self.sink.emit(packet);
    }

    pub fn update_progress(&self, fraction: f64) {
        self.sink.emit(OutboundPacket::progress_update(self.id, fraction));
    }

    /// Loads `url`, asking the client to retry on network failures.
    pub fn navigate(&mut self, url: &str) -> Result<(), JobError> {
        loop {
            self.check_cancelled()?;
            match self.browser.navigate(url) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let Some(code) = err.network_code().map(str::to_string) else {
                        return Err(err.into());
                    };
                    engine_warn!("network error loading {url}: {code}");
                    self.set_state(JobState::network_error(&code))?;
                    self.set_state(JobState::attempting_reconnect())?;
                }
            }
        }
    }

    pub fn current_url(&mut self) -> Result<String, JobError> {
        Ok(self.browser.current_url()?)
    }

    pub fn find(
        &mut self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, JobError> {
        Ok(self.browser.find(scope, &Locator::css(selector))?)
    }

    pub fn find_all(
        &mut self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, JobError> {
        Ok(self.browser.find_all(scope, &Locator::css(selector))?)
    }

    /// Like [`JobContext::find`], but a missing element is an error.
    pub fn require(
        &mut self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<ElementHandle, JobError> {
        self.find(scope, selector)?
            .ok_or_else(|| JobError::MissingElement(selector.to_string()))
    }

    pub fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, JobError> {
        Ok(self.browser.attribute(element, name)?)
    }

    pub fn inner_html(&mut self, element: &ElementHandle) -> Result<String, JobError> {
        Ok(self.browser.inner_html(element)?)
    }

    pub fn text(&mut self, element: &ElementHandle) -> Result<String, JobError> {
        Ok(self.browser.text(element)?)
    }

    /// Polls for `selector` until it appears (`Some`) or `timeout` passes (`None`).
    pub fn wait_for(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, JobError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_cancelled()?;
            if let Some(found) = self.find(None, selector)? {
                return Ok(Some(found));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.pause()?;
        }
    }

    /// [`JobContext::wait_for`] with the element timeout, failing when it passes.
    pub fn await_element(&mut self, selector: &str) -> Result<ElementHandle, JobError> {
        let timeout = self.settings.element_timeout;
        self.wait_for(selector, timeout)?.ok_or_else(|| JobError::Timeout {
            what: selector.to_string(),
            timeout,
        })
    }

    /// Polls the current address until it contains `fragment`. Returns whether
    /// it did before `timeout`.
    pub fn wait_until_url_contains(
        &mut self,
        fragment: &str,
        timeout: Duration,
    ) -> Result<bool, JobError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_cancelled()?;
            if self.current_url()?.contains(fragment) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.pause()?;
        }
    }

    fn pause(&self) -> Result<(), JobError> {
        if self.signal.pause(self.settings.poll_interval) {
            Ok(())
        } else {
            Err(JobError::Cancelled)
        }
    }

    /// Signs in: sends the user to the login page until the signed-in marker
    /// shows up after they press "Proceed".
    pub fn authenticate(&mut self) -> Result<(), JobError> {
        let auth_url = self.target.auth_url();
        loop {
            self.check_cancelled()?;
            if self.current_url()? != auth_url {
                self.navigate(&auth_url)?;
            }
            self.set_state(JobState::auth_required())?;

            self.set_state(JobState::validating_session())?;
            let timeout = self.settings.check_timeout;
            if self.wait_for(SIGNED_IN_MARKER, timeout)?.is_some() {
                engine_info!("session validated, proceeding");
                return Ok(());
            }
            self.set_state(JobState::session_invalid())?;
        }
    }

    /// Ends the browser session; failures are only logged.
    pub fn close_browser(&mut self) {
        if let Err(err) = self.browser.quit() {
            engine_debug!("browser quit failed: {err}");
        }
    }
}
