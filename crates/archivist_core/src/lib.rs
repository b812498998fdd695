//! Archivist core: protocol packets, job states and the archive model.
mod archive;
mod job;
mod markup;
mod packet;
mod state;
mod target;

pub use archive::{ArchiveResult, ContentType, Post, UserData};
pub use job::{DispatchRequest, JobId, JobKind, TargetDescriptor};
pub use markup::{clean_page_url, strip_url_scheme};
pub use packet::{
    decode, encode, InboundAction, InboundPacket, MalformedPacket, OutboundAction,
    OutboundPacket,
};
pub use state::{ButtonAction, ButtonConfig, JobState};
pub use target::{ForumTarget, ForumVersion, TargetError};
