//! Notifications raised by state transitions
//!
//! Delivery happens after commit through a set of sinks: the database inbox
//! and the websocket channel.

mod model;
mod service;
mod sink;

pub use model::*;
pub use service::Notifier;
pub use sink::{DatabaseSink, NotificationSink};
