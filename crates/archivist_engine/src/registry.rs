use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use archivist_core::{
    DispatchRequest, ForumTarget, ForumVersion, JobId, JobKind, OutboundPacket, TargetError,
};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use serde_json::Value;
use thiserror::Error;

use crate::context::JobSettings;
use crate::driver::{BrowserLauncher, ReleaseHook};
use crate::export::ExportWriter;
use crate::handler::{HandlerEntry, HandlerTable};
use crate::runner::{run_job, JobLaunch};
use crate::signal::JobSignal;
use crate::sink::PacketSink;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported forum version {0}")]
    UnsupportedVersion(i64),
    #[error("unsupported worker {worker_type} for {version}")]
    UnsupportedWorker {
        worker_type: String,
        version: ForumVersion,
    },
    #[error(transparent)]
    InvalidTarget(#[from] TargetError),
    #[error("could not start job thread: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no job with id {0}")]
pub struct JobNotFound(pub JobId);

/// Registry-side view of a running job.
pub struct JobHandle {
    id: JobId,
    kind: JobKind,
    version: ForumVersion,
    signal: Arc<JobSignal>,
    release: Arc<ReleaseHook>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn version(&self) -> ForumVersion {
        self.version
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Cancels the job and stops its browser without waiting for the thread.
    fn stop(&self) {
        self.signal.cancel();
        self.release.release();
    }

    fn join(&self) {
        let thread = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                engine_error!("job thread {} ended with a panic", self.id);
            }
        }
    }
}

type JobMap = Arc<Mutex<HashMap<JobId, Arc<JobHandle>>>>;

fn lock_map(map: &JobMap) -> MutexGuard<'_, HashMap<JobId, Arc<JobHandle>>> {
    map.lock().unwrap_or_else(|p| p.into_inner())
}

/// Owns every live job. The map lock is held only for single map operations,
/// never while a job is started, waited on or joined.
pub struct JobRegistry {
    jobs: JobMap,
    handlers: HandlerTable,
    launcher: Arc<dyn BrowserLauncher>,
    exporter: Arc<dyn ExportWriter>,
    sink: Arc<dyn PacketSink>,
    settings: JobSettings,
}

impl JobRegistry {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        exporter: Arc<dyn ExportWriter>,
        sink: Arc<dyn PacketSink>,
        settings: JobSettings,
    ) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            handlers: HandlerTable::standard(),
            launcher,
            exporter,
            sink,
            settings,
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    /// Validates the request, announces a fresh id, registers the job and
    /// starts its thread.
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<JobId, DispatchError> {
        let version = ForumVersion::from_number(request.ic.version)
            .ok_or(DispatchError::UnsupportedVersion(request.ic.version))?;
        let unsupported = || DispatchError::UnsupportedWorker {
            worker_type: request.worker_type.clone(),
            version,
        };
        let kind = JobKind::from_tag(&request.worker_type).ok_or_else(&unsupported)?;
        let HandlerEntry::Implemented(factory) = self.handlers.lookup(kind, version) else {
            return Err(unsupported());
        };
        let target = ForumTarget::new(version, &request.ic.root_url)?;

        let id = JobId::new();
        self.sink.emit(OutboundPacket::uuid_available(id));

        let handle = Arc::new(JobHandle {
            id,
            kind,
            version,
            signal: Arc::new(JobSignal::new()),
            release: Arc::new(ReleaseHook::new()),
            thread: Mutex::new(None),
        });
        lock_map(&self.jobs).insert(id, handle.clone());

        let jobs = self.jobs.clone();
        let launch = JobLaunch {
            id,
            target,
            handler: factory(),
            launcher: self.launcher.clone(),
            exporter: self.exporter.clone(),
            sink: self.sink.clone(),
            signal: handle.signal.clone(),
            release: handle.release.clone(),
            settings: self.settings.clone(),
            on_exit: Box::new(move || {
                lock_map(&jobs).remove(&id);
                engine_debug!("job {id} unregistered");
            }),
        };
        let spawned = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || run_job(launch));
        match spawned {
            Ok(thread) => {
                *handle.thread.lock().unwrap_or_else(|p| p.into_inner()) = Some(thread);
                engine_info!("dispatched {kind} job {id} for {version}");
                Ok(id)
            }
            Err(err) => {
                lock_map(&self.jobs).remove(&id);
                Err(DispatchError::Spawn(err))
            }
        }
    }

    pub fn lookup(&self, id: JobId) -> Result<Arc<JobHandle>, JobNotFound> {
        lock_map(&self.jobs).get(&id).cloned().ok_or(JobNotFound(id))
    }

    /// Hands the client's answer to the job's current interactive state.
    pub fn deliver_input(&self, id: JobId, value: Value) -> Result<(), JobNotFound> {
        let job = self.lookup(id)?;
        job.signal.deliver(value);
        Ok(())
    }

    /// Removes the job, cancels it, stops its browser and waits for its thread.
    pub fn terminate(&self, id: JobId) -> Result<(), JobNotFound> {
        let job = lock_map(&self.jobs).remove(&id).ok_or(JobNotFound(id))?;
        engine_info!("terminating job {id}");
        job.stop();
        job.join();
        Ok(())
    }

    /// Terminates every registered job and returns how many there were.
    pub fn shutdown_all(&self) -> usize {
        let jobs: Vec<Arc<JobHandle>> = lock_map(&self.jobs).drain().map(|(_, job)| job).collect();
        if !jobs.is_empty() {
            engine_warn!("shutting down {} running jobs", jobs.len());
        }
        for job in &jobs {
            job.stop();
        }
        for job in &jobs {
            job.join();
        }
        jobs.len()
    }

    pub fn len(&self) -> usize {
        lock_map(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<JobId> {
        lock_map(&self.jobs).keys().copied().collect()
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
