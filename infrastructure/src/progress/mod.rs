//! Progress delivery adapters

mod broadcast;

pub use broadcast::ProgressBroadcaster;
