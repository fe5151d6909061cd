//! bidi-har - Record WebDriver BiDi network and navigation events as HAR
//!
//! Events are fed to a [`HarRecorder`], either replayed from a collected
//! batch ([`adapters::CollectionExporter`]) or streamed from a live browser
//! session ([`adapters::LiveRecorder`]), and exported as a HAR 1.2 archive.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp,
    clippy::multiple_crate_versions
)]

/// Log at debug level when the given debug flag is set
macro_rules! debug_log {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            ::tracing::debug!($($arg)+);
        }
    };
}

/// Log a soft failure at warn level when the given debug flag is set
macro_rules! warn_log {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            ::tracing::warn!($($arg)+);
        }
    };
}

pub mod adapters;
pub mod config;
pub mod error;
pub mod event;
pub mod har;
pub mod recorder;
pub mod task_queue;
pub mod time;
pub mod transport;

pub use config::{HeaderValueFormatter, LiveConfig, RecorderConfig};
pub use error::{HarError, Result};
pub use event::Event;
pub use har::Har;
pub use recorder::HarRecorder;
pub use task_queue::TaskQueue;
