use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use archivist_core::JobId;
use engine_logging::{engine_debug, engine_info, engine_warn};
use reqwest::Method;
use serde_json::{json, Value};

use super::{Browser, BrowserLauncher, DriverError, ElementHandle, LaunchedBrowser, Locator};
use crate::signal::JobSignal;

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ChromeDriverSettings {
    pub chromedriver_path: PathBuf,
    pub browser_binary: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ChromeDriverSettings {
    fn default() -> Self {
        Self {
            chromedriver_path: PathBuf::from("chromedriver"),
            browser_binary: None,
            profile_dir: None,
            headless: false,
            startup_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ChromeDriverSettings {
    /// `capabilities` body for a new Chrome session.
    pub fn capabilities(&self) -> Value {
        let mut args = vec!["--disable-infobars".to_string()];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(dir) = &self.profile_dir {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        let mut chrome_options = json!({ "args": args });
        if let Some(binary) = &self.browser_binary {
            chrome_options["binary"] = json!(binary.display().to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome_options,
                }
            }
        })
    }
}

/// Starts one `chromedriver` child per job and opens a session on it.
#[derive(Debug, Clone, Default)]
pub struct ChromeDriverLauncher {
    settings: ChromeDriverSettings,
}

impl ChromeDriverLauncher {
    pub fn new(settings: ChromeDriverSettings) -> Self {
        Self { settings }
    }

    fn spawn_driver(&self, port: u16) -> Result<Child, DriverError> {
        Command::new(&self.settings.chromedriver_path)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                DriverError::Startup(format!(
                    "cannot run {}: {err}",
                    self.settings.chromedriver_path.display()
                ))
            })
    }
}

impl BrowserLauncher for ChromeDriverLauncher {
    fn launch(&self, job_id: JobId, signal: &JobSignal) -> Result<LaunchedBrowser, DriverError> {
        let port = free_local_port()?;
        let child = Arc::new(Mutex::new(self.spawn_driver(port)?));
        engine_info!("chromedriver for {job_id} listening on port {port}");

        let base_url = format!("http://127.0.0.1:{port}");
        let session =
            WebDriverSession::start(&base_url, &self.settings, signal).map_err(|err| match err {
                DriverError::Cancelled | DriverError::Startup(_) => err,
                other => DriverError::Startup(other.to_string()),
            });
        let session = match session {
            Ok(session) => session,
            Err(err) => {
                stop_child(&child);
                return Err(err);
            }
        };

        Ok(LaunchedBrowser {
            browser: Box::new(session),
            release: Box::new(move || stop_child(&child)),
        })
    }
}

fn free_local_port() -> Result<u16, DriverError> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn stop_child(child: &Mutex<Child>) {
    let mut child = child.lock().unwrap_or_else(|p| p.into_inner());
    if let Err(err) = child.kill() {
        engine_debug!("chromedriver already stopped: {err}");
    }
    let _ = child.wait();
}

/// A W3C WebDriver session driven through blocking calls.
pub struct WebDriverSession {
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverSession {
    /// Waits until the endpoint reports ready, then creates a session.
    /// Gives up with [`DriverError::Cancelled`] once `signal` is cancelled.
    pub fn start(
        base_url: &str,
        settings: &ChromeDriverSettings,
        signal: &JobSignal,
    ) -> Result<Self, DriverError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| DriverError::Startup(err.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        wait_until_ready(&runtime, &http, &base_url, settings.startup_timeout, signal)?;

        let created = runtime.block_on(send(
            &http,
            Method::POST,
            format!("{base_url}/session"),
            Some(settings.capabilities()),
        ))?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("session response without sessionId".into()))?
            .to_string();
        engine_debug!("webdriver session {session_id} created");

        Ok(Self {
            runtime,
            http,
            base_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{path}", self.base_url, self.session_id);
        self.runtime.block_on(send(&self.http, method, url, body))
    }
}

impl Browser for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.call(Method::POST, "/url", Some(json!({ "url": url })))?;
        engine_info!("current_url => {url}");
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        let value = self.call(Method::GET, "/url", None)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol(format!("unexpected url value: {value}")))
    }

    fn find_all(
        &mut self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let path = match scope {
            Some(element) => format!("/element/{}/elements", element.as_str()),
            None => "/elements".to_string(),
        };
        let (using, value) = match locator {
            Locator::Css(selector) => ("css selector", selector),
            Locator::XPath(expression) => ("xpath", expression),
        };
        let found = self.call(
            Method::POST,
            &path,
            Some(json!({ "using": using, "value": value })),
        )?;
        let Some(items) = found.as_array() else {
            return Err(DriverError::Protocol(format!("unexpected elements value: {found}")));
        };
        Ok(items
            .iter()
            .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(ElementHandle::new)
            .collect())
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = self.call(
            Method::GET,
            &format!("/element/{}/attribute/{name}", element.as_str()),
            None,
        )?;
        Ok(value.as_str().map(str::to_string))
    }

    fn inner_html(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self.call(
            Method::GET,
            &format!("/element/{}/property/innerHTML", element.as_str()),
            None,
        )?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn quit(&mut self) -> Result<(), DriverError> {
        self.call(Method::DELETE, "", None)?;
        Ok(())
    }
}

fn wait_until_ready(
    runtime: &tokio::runtime::Runtime,
    http: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
    signal: &JobSignal,
) -> Result<(), DriverError> {
    let deadline = Instant::now() + timeout;
    let status_url = format!("{base_url}/status");
    loop {
        match runtime.block_on(send(http, Method::GET, status_url.clone(), None)) {
            Ok(status) if status.get("ready").and_then(Value::as_bool) == Some(true) => {
                return Ok(());
            }
            Ok(_) => engine_debug!("webdriver at {base_url} not ready yet"),
            Err(err) => engine_debug!("webdriver at {base_url} unreachable: {err}"),
        }
        if Instant::now() >= deadline {
            engine_warn!("webdriver at {base_url} not ready after {timeout:?}");
            return Err(DriverError::Startup(format!(
                "webdriver at {base_url} not ready after {timeout:?}"
            )));
        }
        if !signal.pause(STATUS_POLL_INTERVAL) {
            return Err(DriverError::Cancelled);
        }
    }
}

/// Sends one command and unwraps the W3C `{"value": ...}` envelope.
async fn send(
    http: &reqwest::Client,
    method: Method,
    url: String,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = http.request(method, &url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(map_transport_error)?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    let error = value.get("error").and_then(Value::as_str);
    if status.is_success() && error.is_none() {
        return Ok(value);
    }
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(match error.unwrap_or_default() {
        "no such element" => DriverError::NoSuchElement(message),
        "timeout" | "script timeout" => DriverError::Timeout(message),
        "session not created" => DriverError::Startup(message),
        _ if message.is_empty() => DriverError::Protocol(format!("{url} answered {status}")),
        _ => DriverError::from_browser_message(message),
    })
}

fn map_transport_error(err: reqwest::Error) -> DriverError {
    if err.is_timeout() {
        DriverError::Timeout(err.to_string())
    } else {
        DriverError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_reflect_settings() {
        let settings = ChromeDriverSettings {
            headless: true,
            profile_dir: Some(PathBuf::from("/tmp/profile")),
            browser_binary: Some(PathBuf::from("/opt/chrome")),
            ..ChromeDriverSettings::default()
        };
        let caps = settings.capabilities();
        let options = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"];

        assert_eq!(options["binary"], json!("/opt/chrome"));
        let args: Vec<&str> = options["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--user-data-dir=/tmp/profile"));
    }

    #[test]
    fn missing_chromedriver_is_a_startup_error() {
        let launcher = ChromeDriverLauncher::new(ChromeDriverSettings {
            chromedriver_path: PathBuf::from("/nonexistent/chromedriver"),
            ..ChromeDriverSettings::default()
        });
        let err = launcher.launch(JobId::new(), &JobSignal::new()).err().unwrap();
        assert!(matches!(err, DriverError::Startup(_)));
    }
}
