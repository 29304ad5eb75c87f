//! Worker engine for offcast.
//!
//! This crate implements the request-interception layer: resource
//! classification, the caching strategies, the install/activate lifecycle,
//! the push/notification bridge, and background-sync replay. The gateway
//! binary drives it; nothing in here binds a socket.

pub mod classify;
pub mod fetch;
pub mod lifecycle;
pub mod push;
pub mod response;
pub mod strategy;
pub mod sync;
pub mod worker;

pub use classify::{Classifier, Decision, RequestMode, ResourceClass};
pub use fetch::{FetchClient, FetchConfig, FetchResponse};
pub use lifecycle::{LifecycleController, WorkerState};
pub use push::{ClientCommand, Notification, NotificationBridge};
pub use response::{ServedFrom, WorkerRequest, WorkerResponse};
pub use sync::{DrainReport, SyncEngine, SyncPolicy};
pub use worker::{ControlMessage, ControlReply, Worker};
