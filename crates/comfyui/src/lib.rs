//! ComfyUI bridge: synchronous jobs over an asynchronous backend.
//!
//! Provides typed message parsing, binary frame decoding, the event
//! classifier, WebSocket and HTTP API clients, per-job state, the job
//! registry, and the coordinator that ties one caller to one job's
//! event stream.

pub mod api;
pub mod classifier;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod frame;
pub mod job;
pub mod messages;
pub mod processor;
pub mod registry;
