use std::io::BufRead;

use archivist_core::{decode, InboundAction, InboundPacket, JobId, MalformedPacket};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use thiserror::Error;

use crate::registry::{DispatchError, JobNotFound, JobRegistry};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] MalformedPacket),
    #[error("invalid {action} payload: {source}")]
    InvalidPayload {
        action: InboundAction,
        source: serde_json::Error,
    },
    #[error("{0} requires a worker_id")]
    MissingWorkerId(InboundAction),
    #[error("'{0}' is not a job id")]
    InvalidWorkerId(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    NotFound(#[from] JobNotFound),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Terminate,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub reason: ExitReason,
    /// Jobs still registered at exit, all of which were shut down.
    pub jobs_torn_down: usize,
}

enum Flow {
    Continue,
    Exit,
}

/// Reads packets line by line and routes them to the registry until
/// `TERMINATE` or end of input.
pub struct CommandLoop {
    registry: JobRegistry,
}

impl CommandLoop {
    pub fn new(registry: JobRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn run<R: BufRead>(&self, input: R) -> LoopSummary {
        let mut reason = ExitReason::EndOfStream;
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    engine_error!("failed to read input: {err}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.handle_line(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => {
                    reason = ExitReason::Terminate;
                    break;
                }
                Err(err) => engine_warn!("ignoring packet: {err}"),
            }
        }

        match reason {
            ExitReason::Terminate => engine_info!("terminate requested"),
            ExitReason::EndOfStream => engine_info!("input closed"),
        }
        let jobs_torn_down = self.registry.shutdown_all();
        LoopSummary {
            reason,
            jobs_torn_down,
        }
    }

    fn handle_line(&self, line: &str) -> Result<Flow, CommandError> {
        let packet = decode(line)?;
        engine_debug!("received {}", packet.action);
        self.handle(packet)
    }

    fn handle(&self, packet: InboundPacket) -> Result<Flow, CommandError> {
        match packet.action {
            InboundAction::DispatchWorker => {
                let request = packet.dispatch_request().map_err(|source| {
                    CommandError::InvalidPayload {
                        action: packet.action,
                        source,
                    }
                })?;
                self.registry.dispatch(&request)?;
            }
            InboundAction::StateInput => {
                let id = job_id(&packet)?
                    .ok_or(CommandError::MissingWorkerId(InboundAction::StateInput))?;
                self.registry.deliver_input(id, packet.client_object())?;
            }
            InboundAction::TerminateWorker => match job_id(&packet)? {
                Some(id) => self.registry.terminate(id)?,
                None => engine_debug!("TERMINATE_WORKER without worker_id ignored"),
            },
            InboundAction::Terminate => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }
}

fn job_id(packet: &InboundPacket) -> Result<Option<JobId>, CommandError> {
    packet
        .worker_id
        .as_deref()
        .map(|raw| {
            raw.parse()
                .map_err(|_| CommandError::InvalidWorkerId(raw.to_string()))
        })
        .transpose()
}
