#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use archivist_core::{JobId, JobState, OutboundAction, OutboundPacket};
use archivist_engine::{
    Browser, BrowserLauncher, ChannelPacketSink, DriverError, ElementHandle, HandlerTable,
    JobRegistry, JobSettings, JobSignal, JsonExportWriter, LaunchedBrowser, Locator,
};
use scraper::{ElementRef, Html, Selector};
use tempfile::TempDir;

pub const ROOT: &str = "https://forum.example";
pub const PACKET_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, String>,
    current: String,
    generation: u64,
    failures: HashMap<String, (usize, String)>,
    navigations: Vec<String>,
    quits: usize,
}

impl SiteState {
    fn page(&self) -> String {
        self.pages
            .get(&self.current)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }
}

/// A scripted forum the fake browser reads pages from. Cloning shares state,
/// so a test can "click around" while a job is running.
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    pub fn set_page(&self, url: &str, html: &str) {
        let mut state = self.lock();
        state.pages.insert(url.to_string(), html.to_string());
        state.generation += 1;
    }

    /// What the user does by clicking a link in the browser window.
    pub fn show(&self, url: &str) {
        let mut state = self.lock();
        state.current = url.to_string();
        state.generation += 1;
    }

    pub fn current_url(&self) -> String {
        self.lock().current.clone()
    }

    /// The next `times` navigations to `url` fail with Chromium's `code`.
    pub fn fail_navigation(&self, url: &str, times: usize, code: &str) {
        self.lock()
            .failures
            .insert(url.to_string(), (times, code.to_string()));
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn quits(&self) -> usize {
        self.lock().quits
    }
}

pub struct FakeBrowser {
    site: FakeSite,
}

fn elements(html: &Html) -> Vec<ElementRef<'_>> {
    html.tree.root().descendants().filter_map(ElementRef::wrap).collect()
}

fn parse_handle(handle: &ElementHandle) -> Option<(u64, usize)> {
    let (generation, index) = handle.as_str().split_once(':')?;
    Some((generation.parse().ok()?, index.parse().ok()?))
}

impl FakeBrowser {
    fn with_element<T>(
        &self,
        handle: &ElementHandle,
        read: impl FnOnce(ElementRef<'_>) -> T,
    ) -> Result<T, DriverError> {
        let state = self.site.lock();
        let stale = || DriverError::Protocol(format!("stale element {}", handle.as_str()));
        let (generation, index) = parse_handle(handle).ok_or_else(stale)?;
        if generation != state.generation {
            return Err(stale());
        }
        let html = Html::parse_document(&state.page());
        let all = elements(&html);
        let element = all.get(index).copied().ok_or_else(stale)?;
        Ok(read(element))
    }
}

impl Browser for FakeBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let mut state = self.site.lock();
        state.navigations.push(url.to_string());
        if let Some((remaining, code)) = state.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::from_browser_message(format!(
                    "unknown error: net::{code}"
                )));
            }
        }
        state.current = url.to_string();
        state.generation += 1;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.site.current_url())
    }

    fn find_all(
        &mut self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let Locator::Css(css) = locator else {
            return Err(DriverError::Protocol("fake browser only supports CSS".into()));
        };
        let selector =
            Selector::parse(css).map_err(|err| DriverError::Protocol(format!("{err:?}")))?;

        let state = self.site.lock();
        let html = Html::parse_document(&state.page());
        let all = elements(&html);
        let matches: Vec<ElementRef<'_>> = match scope {
            None => html.select(&selector).collect(),
            Some(handle) => {
                let scope = parse_handle(handle)
                    .filter(|(generation, _)| *generation == state.generation)
                    .and_then(|(_, index)| all.get(index))
                    .ok_or_else(|| DriverError::Protocol("stale scope".into()))?;
                scope.select(&selector).collect()
            }
        };
        Ok(matches
            .iter()
            .filter_map(|found| all.iter().position(|e| e.id() == found.id()))
            .map(|index| ElementHandle::new(format!("{}:{index}", state.generation)))
            .collect())
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.with_element(element, |e| e.value().attr(name).map(str::to_string))
    }

    fn inner_html(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        self.with_element(element, |e| e.inner_html())
    }

    fn quit(&mut self) -> Result<(), DriverError> {
        self.site.lock().quits += 1;
        Ok(())
    }
}

/// Hands out fake browsers and counts release-hook calls.
pub struct FakeLauncher {
    site: FakeSite,
    pub releases: Arc<AtomicUsize>,
    pub launches: AtomicUsize,
    failure: Option<String>,
    stalls: bool,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            releases: Arc::new(AtomicUsize::new(0)),
            launches: AtomicUsize::new(0),
            failure: None,
            stalls: false,
        }
    }

    /// A launcher whose driver never becomes ready; it only returns once the
    /// job is cancelled.
    pub fn stalling(site: FakeSite) -> Self {
        Self {
            stalls: true,
            ..Self::new(site)
        }
    }

    pub fn failing(site: FakeSite, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(site)
        }
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl BrowserLauncher for FakeLauncher {
    fn launch(
        &self,
        _job_id: JobId,
        signal: &JobSignal,
    ) -> Result<LaunchedBrowser, DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.stalls {
            while signal.pause(Duration::from_millis(10)) {}
            return Err(DriverError::Cancelled);
        }
        if let Some(message) = &self.failure {
            return Err(DriverError::Startup(message.clone()));
        }
        let releases = self.releases.clone();
        Ok(LaunchedBrowser {
            browser: Box::new(FakeBrowser {
                site: self.site.clone(),
            }),
            release: Box::new(move || {
                releases.fetch_add(1, Ordering::SeqCst);
            }),
        })
    }
}

pub fn test_settings() -> JobSettings {
    JobSettings {
        check_timeout: Duration::from_millis(200),
        element_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(10),
        input_wait_slice: Duration::from_millis(100),
    }
}

/// A registry wired to a fake site, a temporary export directory and a
/// channel carrying every outbound packet.
pub struct Harness {
    pub site: FakeSite,
    pub launcher: Arc<FakeLauncher>,
    pub packets: Receiver<OutboundPacket>,
    pub export_dir: TempDir,
}

impl Harness {
    pub fn new(site: FakeSite) -> (Self, JobRegistry) {
        Self::build(site.clone(), FakeLauncher::new(site), HandlerTable::standard())
    }

    pub fn with_handlers(site: FakeSite, handlers: HandlerTable) -> (Self, JobRegistry) {
        Self::build(site.clone(), FakeLauncher::new(site), handlers)
    }

    pub fn with_launcher(site: FakeSite, launcher: FakeLauncher) -> (Self, JobRegistry) {
        Self::build(site, launcher, HandlerTable::standard())
    }

    fn build(
        site: FakeSite,
        launcher: FakeLauncher,
        handlers: HandlerTable,
    ) -> (Self, JobRegistry) {
        engine_logging::initialize_for_tests();
        let (tx, rx) = mpsc::channel();
        let export_dir = TempDir::new().unwrap();
        let launcher = Arc::new(launcher);
        let registry = JobRegistry::new(
            launcher.clone(),
            Arc::new(JsonExportWriter::new(export_dir.path().to_path_buf())),
            Arc::new(ChannelPacketSink::new(tx)),
            test_settings(),
        )
        .with_handlers(handlers);
        (
            Self {
                site,
                launcher,
                packets: rx,
                export_dir,
            },
            registry,
        )
    }

    pub fn next_packet(&self) -> OutboundPacket {
        self.packets
            .recv_timeout(PACKET_TIMEOUT)
            .expect("expected another packet")
    }

    /// Next `STATE_CHANGED` for `id`, skipping other packets.
    pub fn next_state(&self, id: JobId) -> JobState {
        loop {
            let packet = self.next_packet();
            if packet.action == OutboundAction::StateChanged && packet.worker_id == Some(id) {
                return JobState::from_json(&packet.data["state"]).unwrap();
            }
        }
    }

    /// Reads packets until `id` enters a state with `note`; returns everything read.
    pub fn wait_for_note(&self, id: JobId, note: &str) -> Vec<OutboundPacket> {
        let mut seen = Vec::new();
        loop {
            let packet = self.next_packet();
            let done = packet.action == OutboundAction::StateChanged
                && packet.worker_id == Some(id)
                && packet.data["state"]["note"] == note;
            seen.push(packet);
            if done {
                return seen;
            }
        }
    }

    /// Packets that arrive within `window`.
    pub fn drain_for(&self, window: Duration) -> Vec<OutboundPacket> {
        let deadline = Instant::now() + window;
        let mut seen = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.packets.recv_timeout(left) {
                Ok(packet) => seen.push(packet),
                Err(_) => break,
            }
        }
        seen
    }
}

/// Polls `condition` for up to five seconds.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PACKET_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Blocking reader fed line by line from the test, standing in for stdin.
pub struct LineFeed {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl LineFeed {
    pub fn new() -> (Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel();
        (
            tx,
            Self {
                rx,
                pending: Vec::new(),
            },
        )
    }
}

impl Read for LineFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

pub fn send_line(tx: &Sender<Vec<u8>>, line: &str) {
    tx.send(format!("{line}\n").into_bytes()).unwrap();
}

pub fn signed_in_page() -> String {
    r#"<html><body><div class="elMobileDrawer__user-panel">Alice</div></body></html>"#.to_string()
}

pub fn login_page() -> String {
    r#"<html><body><form id="login"></form></body></html>"#.to_string()
}

pub fn auth_url() -> String {
    format!("{ROOT}/login")
}

pub fn messenger_url() -> String {
    format!("{ROOT}/messenger")
}
