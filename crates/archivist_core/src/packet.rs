//! Line-delimited JSON packets exchanged with the controlling client.
//!
//! Every line is one JSON object of the shape
//! `{"worker_id": <string|null>, "shared_action": <TAG>, "data": {...}}`.
//! Inbound and outbound packets use disjoint action vocabularies.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::job::DispatchRequest;
use crate::state::JobState;
use crate::JobId;

const KEY_WORKER_ID: &str = "worker_id";
const KEY_ACTION: &str = "shared_action";
const KEY_DATA: &str = "data";

/// One packet as written on the wire, in either direction.
#[derive(Serialize)]
struct WireLine<'a> {
    worker_id: Option<String>,
    shared_action: &'static str,
    data: &'a Map<String, Value>,
}

/// Client → server actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundAction {
    DispatchWorker,
    StateInput,
    TerminateWorker,
    Terminate,
}

impl InboundAction {
    pub const ALL: [InboundAction; 4] = [
        InboundAction::DispatchWorker,
        InboundAction::StateInput,
        InboundAction::TerminateWorker,
        InboundAction::Terminate,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            InboundAction::DispatchWorker => "DISPATCH_WORKER",
            InboundAction::StateInput => "STATE_INPUT",
            InboundAction::TerminateWorker => "TERMINATE_WORKER",
            InboundAction::Terminate => "TERMINATE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.tag() == tag)
    }

    /// Actions whose `data` field must be a JSON object.
    pub fn requires_data(self) -> bool {
        matches!(self, InboundAction::DispatchWorker | InboundAction::StateInput)
    }
}

impl fmt::Display for InboundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Server → client actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundAction {
    UuidAvailable,
    ChromedriverStarted,
    ChromedriverError,
    StateChanged,
    ProgressUpdate,
    ResultAvailable,
}

impl OutboundAction {
    pub const ALL: [OutboundAction; 6] = [
        OutboundAction::UuidAvailable,
        OutboundAction::ChromedriverStarted,
        OutboundAction::ChromedriverError,
        OutboundAction::StateChanged,
        OutboundAction::ProgressUpdate,
        OutboundAction::ResultAvailable,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            OutboundAction::UuidAvailable => "UUID_AVAILABLE",
            OutboundAction::ChromedriverStarted => "CHROMEDRIVER_STARTED",
            OutboundAction::ChromedriverError => "CHROMEDRIVER_ERROR",
            OutboundAction::StateChanged => "STATE_CHANGED",
            OutboundAction::ProgressUpdate => "PROGRESS_UPDATE",
            OutboundAction::ResultAvailable => "RESULT_AVAILABLE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.tag() == tag)
    }
}

impl fmt::Display for OutboundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPacket {
    #[error("malformed packet: empty line")]
    Empty,
    #[error("malformed packet: invalid json: {0}")]
    Syntax(String),
    #[error("malformed packet: expected a json object")]
    NotAnObject,
    #[error("malformed packet: missing 'shared_action'")]
    MissingAction,
    #[error("malformed packet: unknown action '{0}'")]
    UnknownAction(String),
    #[error("malformed packet: 'worker_id' must be a string")]
    InvalidWorkerId,
    #[error("malformed packet: {0} requires 'data' to be an object")]
    DataNotAnObject(InboundAction),
}

/// A decoded client packet. Payload keys are validated by whoever consumes them.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    pub worker_id: Option<String>,
    pub action: InboundAction,
    pub data: Map<String, Value>,
}

impl InboundPacket {
    pub fn new(worker_id: Option<String>, action: InboundAction) -> Self {
        Self {
            worker_id,
            action,
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Typed `DISPATCH_WORKER` payload.
    pub fn dispatch_request(&self) -> Result<DispatchRequest, serde_json::Error> {
        serde_json::from_value(Value::Object(self.data.clone()))
    }

    /// The value a client answered an interactive state with.
    ///
    /// Clients normally send `{"client_object": ...}`; any other payload is
    /// passed through as a whole so an empty object still counts as an answer.
    pub fn client_object(&self) -> Value {
        match self.data.get("client_object") {
            Some(value) => value.clone(),
            None => Value::Object(self.data.clone()),
        }
    }

    /// Renders the packet the way a client would send it.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireLine {
            worker_id: self.worker_id.clone(),
            shared_action: self.action.tag(),
            data: &self.data,
        })
    }
}

impl FromStr for InboundPacket {
    type Err = MalformedPacket;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        decode(line)
    }
}

/// Decodes one inbound line.
pub fn decode(line: &str) -> Result<InboundPacket, MalformedPacket> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(MalformedPacket::Empty);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|err| MalformedPacket::Syntax(err.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(MalformedPacket::NotAnObject);
    };

    let action = match object.get(KEY_ACTION) {
        Some(Value::String(tag)) => InboundAction::from_tag(tag)
            .ok_or_else(|| MalformedPacket::UnknownAction(tag.clone()))?,
        Some(other) => return Err(MalformedPacket::UnknownAction(other.to_string())),
        None => return Err(MalformedPacket::MissingAction),
    };

    let worker_id = match object.remove(KEY_WORKER_ID) {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id),
        Some(_) => return Err(MalformedPacket::InvalidWorkerId),
    };

    let data = match object.remove(KEY_DATA) {
        Some(Value::Object(map)) => map,
        _ if action.requires_data() => return Err(MalformedPacket::DataNotAnObject(action)),
        _ => Map::new(),
    };

    Ok(InboundPacket {
        worker_id,
        action,
        data,
    })
}

/// A server notification.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPacket {
    pub worker_id: Option<JobId>,
    pub action: OutboundAction,
    pub data: Map<String, Value>,
}

impl OutboundPacket {
    pub fn new(worker_id: Option<JobId>, action: OutboundAction) -> Self {
        Self {
            worker_id,
            action,
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// `UUID_AVAILABLE` carries no `worker_id`: the client does not know the id yet.
    pub fn uuid_available(job_id: JobId) -> Self {
        Self::new(None, OutboundAction::UuidAvailable)
            .with_data("uuid", Value::String(job_id.to_string()))
    }

    pub fn chromedriver_started(job_id: JobId) -> Self {
        Self::new(Some(job_id), OutboundAction::ChromedriverStarted)
    }

    pub fn chromedriver_error(job_id: JobId, trace: Option<String>) -> Self {
        Self::new(Some(job_id), OutboundAction::ChromedriverError)
            .with_data("stacktrace", trace.map_or(Value::Null, Value::String))
    }

    pub fn state_changed(job_id: JobId, state: &JobState) -> Self {
        Self::new(Some(job_id), OutboundAction::StateChanged).with_data("state", state.to_json())
    }

    /// Progress is clamped to `[0, 1]`; NaN is reported as `0`.
    pub fn progress_update(job_id: JobId, progress: f64) -> Self {
        let clamped = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        let value = serde_json::Number::from_f64(clamped).map_or(Value::Null, Value::Number);
        Self::new(Some(job_id), OutboundAction::ProgressUpdate).with_data("progress", value)
    }

    pub fn result_available(job_id: JobId, path: &str) -> Self {
        Self::new(Some(job_id), OutboundAction::ResultAvailable)
            .with_data("path", Value::String(path.to_string()))
    }

    /// Parses a line produced by [`encode`]. Used by clients and tests.
    pub fn parse(line: &str) -> Result<Self, MalformedPacket> {
        let value: Value = serde_json::from_str(line.trim())
            .map_err(|err| MalformedPacket::Syntax(err.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(MalformedPacket::NotAnObject);
        };
        let action = match object.get(KEY_ACTION) {
            Some(Value::String(tag)) => OutboundAction::from_tag(tag)
                .ok_or_else(|| MalformedPacket::UnknownAction(tag.clone()))?,
            Some(other) => return Err(MalformedPacket::UnknownAction(other.to_string())),
            None => return Err(MalformedPacket::MissingAction),
        };
        let worker_id = match object.remove(KEY_WORKER_ID) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => {
                Some(id.parse().map_err(|_| MalformedPacket::InvalidWorkerId)?)
            }
            Some(_) => return Err(MalformedPacket::InvalidWorkerId),
        };
        let data = match object.remove(KEY_DATA) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Ok(Self {
            worker_id,
            action,
            data,
        })
    }
}

/// Encodes one outbound packet as a single line (without the trailing newline).
pub fn encode(packet: &OutboundPacket) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireLine {
        worker_id: packet.worker_id.map(|id| id.to_string()),
        shared_action: packet.action.tag(),
        data: &packet.data,
    })
}
