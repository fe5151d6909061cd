//! Event sources feeding a [`HarRecorder`](crate::HarRecorder)
//!
//! - [`CollectionExporter`] replays a batch of collected events
//! - [`LiveRecorder`] records from a live browser session

pub mod body;
mod collection;
mod live;

pub use collection::{sort_events, CollectionExporter, EVENT_ORDER};
pub use live::LiveRecorder;
