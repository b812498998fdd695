//! Job handlers for each supported job kind.
mod layout;
mod messenger;
mod pages;
mod topic;

pub use layout::{PageLayout, Paging, MESSENGER_V4, TOPIC_V4};
pub use messenger::MessengerWorker;
pub use topic::TopicWorker;
