//! Archivist engine: job runtime, browser automation and content rewriting.
mod command;
mod context;
mod driver;
mod export;
mod filename;
mod fragment;
mod handler;
mod persist;
mod registry;
mod rewrite;
mod runner;
mod signal;
mod sink;
mod workers;

pub use command::{CommandError, CommandLoop, ExitReason, LoopSummary};
pub use context::{JobContext, JobError, JobSettings, SIGNED_IN_MARKER};
pub use driver::{
    network_error_code, Browser, BrowserLauncher, ChromeDriverLauncher, ChromeDriverSettings,
    DriverError, ElementHandle, LaunchedBrowser, Locator, ReleaseHook, WebDriverSession,
};
pub use export::{ExportError, ExportWriter, JsonExportWriter};
pub use filename::export_file_name;
pub use fragment::{Element, Fragment, Node};
pub use handler::{HandlerEntry, HandlerFactory, HandlerTable, JobHandler};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use registry::{DispatchError, JobHandle, JobNotFound, JobRegistry};
pub use rewrite::{ContentRewriter, MAX_QUOTE_DEPTH};
pub use signal::JobSignal;
pub use sink::{ChannelPacketSink, PacketSink, WriterPacketSink};
pub use workers::{MessengerWorker, PageLayout, Paging, TopicWorker, MESSENGER_V4, TOPIC_V4};
