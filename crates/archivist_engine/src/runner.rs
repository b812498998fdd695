use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use archivist_core::{ForumTarget, JobId, JobState, OutboundPacket};
use engine_logging::{engine_debug, engine_error, engine_info};

use crate::context::{JobContext, JobError, JobSettings};
use crate::driver::{BrowserLauncher, ReleaseHook};
use crate::export::ExportWriter;
use crate::handler::JobHandler;
use crate::signal::JobSignal;
use crate::sink::PacketSink;

/// Everything a job thread needs, moved into it at spawn time.
pub(crate) struct JobLaunch {
    pub id: JobId,
    pub target: ForumTarget,
    pub handler: Box<dyn JobHandler>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub exporter: Arc<dyn ExportWriter>,
    pub sink: Arc<dyn PacketSink>,
    pub signal: Arc<JobSignal>,
    pub release: Arc<ReleaseHook>,
    pub settings: JobSettings,
    /// Unregisters the job once the thread is done.
    pub on_exit: Box<dyn FnOnce() + Send>,
}

/// Body of a job thread: start the browser, sign in, run the handler, export
/// and report, then tear down.
pub(crate) fn run_job(launch: JobLaunch) {
    let JobLaunch {
        id,
        target,
        handler,
        launcher,
        exporter,
        sink,
        signal,
        release,
        settings,
        on_exit,
    } = launch;

    sink.emit(OutboundPacket::state_changed(id, &JobState::initializing()));

    if signal.is_cancelled() {
        on_exit();
        return;
    }

    engine_info!("starting chromedriver");
    let launched = match launcher.launch(id, &signal) {
        Ok(launched) => launched,
        Err(err) if signal.is_cancelled() => {
            engine_info!("job {id} cancelled while starting chromedriver: {err}");
            on_exit();
            return;
        }
        Err(err) => {
            engine_error!("failed to start chromedriver: {err}");
            sink.emit(OutboundPacket::chromedriver_error(id, Some(err.to_string())));
            on_exit();
            return;
        }
    };
    release.arm(launched.release);
    sink.emit(OutboundPacket::chromedriver_started(id));

    let mut ctx = JobContext::new(id, target, launched.browser, sink, signal, settings);
    install_panic_trace_hook();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        archive(&mut ctx, handler.as_ref(), exporter.as_ref())
    }));
    match outcome {
        Ok(Ok(())) | Ok(Err(JobError::Cancelled)) => {}
        // Tearing down the browser under a running call fails that call.
        Ok(Err(err)) if ctx.is_cancelled() => engine_debug!("job {id} stopped: {err}"),
        Ok(Err(err)) => {
            engine_error!("job {id} failed: {}", error_report(&err));
            report_internal_error(&mut ctx);
        }
        Err(payload) => {
            let trace = take_panic_trace().unwrap_or_default();
            engine_error!(
                "job {id} panicked: {}\n{trace}",
                panic_message(payload.as_ref())
            );
            report_internal_error(&mut ctx);
        }
    }

    if ctx.is_cancelled() {
        engine_info!("job {id} cancelled");
    }
    ctx.close_browser();
    release.release();
    on_exit();
}

fn archive(
    ctx: &mut JobContext,
    handler: &dyn JobHandler,
    exporter: &dyn ExportWriter,
) -> Result<(), JobError> {
    ctx.authenticate()?;
    let Some(result) = handler.execute(ctx)? else {
        return Ok(());
    };
    // Nothing is exported once the client has given up on the job.
    ctx.check_cancelled()?;

    let path = exporter.write(ctx.id(), &result)?;
    ctx.emit(OutboundPacket::result_available(ctx.id(), &path.display().to_string()));
    ctx.set_state(JobState::result_available())?;
    Ok(())
}

/// Blocks until the client acknowledges the failure or cancels the job.
fn report_internal_error(ctx: &mut JobContext) {
    let _ = ctx.set_state(JobState::internal_error());
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a hook that records where a panic happened and its backtrace for
/// the panicking thread, then defers to the previous hook.
fn install_panic_trace_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = format!("{info}\n{}", Backtrace::force_capture());
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// The error, each of its causes, and the backtrace of where it entered the job.
fn error_report(err: &JobError) -> String {
    let mut report = err.to_string();
    let mut last = report.clone();
    let mut cause = err.source();
    while let Some(current) = cause {
        let text = current.to_string();
        if text != last {
            let _ = write!(report, "\n  caused by: {text}");
        }
        last = text;
        cause = current.source();
    }
    if let Some(backtrace) = err.backtrace() {
        let _ = write!(report, "\n{backtrace}");
    }
    report
}
