//! Shared domain types for the ComfyUI sync bridge.
//!
//! Holds the job identifier, the requested response encoding, the
//! artifact sink contract, startup configuration parsing, and the
//! domain error types shared by the bridge, the sinks and the HTTP surface.

pub mod config;
pub mod error;
pub mod sink;
pub mod types;
