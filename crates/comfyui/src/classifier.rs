//! Event classifier for a job's backend message stream.
//!
//! Maps one raw WebSocket frame onto the handful of outcomes the job
//! listener acts on. Text frames carry lifecycle information; binary
//! frames carry the image payload. Classification is pure: it never
//! touches job state, the listener applies the result.

use tokio_tungstenite::tungstenite::Message;

use crate::frame::{decode_artifact, Artifact, FrameError};
use crate::messages::{parse_message, ComfyUIMessage, ErrorData};

/// Informational events that never change job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Backend queue depth broadcast.
    Queue { remaining: i32 },
    /// The prompt started executing.
    Started,
    /// Nodes served from cache.
    Cached { nodes: Vec<String> },
    /// A node started executing. `is_target` is set when it is the node
    /// whose output the caller asked for (the artifact should follow soon).
    Node { node: String, is_target: bool },
    /// Step-level progress inside a node.
    Step { value: i32, max: i32 },
    /// A node finished and reported output.
    NodeOutput { node: String },
}

/// Result of classifying one backend frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Progress(Progress),
    /// Execution finished without error.
    TerminalSuccess,
    /// Execution failed; carries a human-readable message.
    TerminalError(String),
    /// Execution was cancelled externally.
    TerminalInterrupted,
    /// A binary frame decoded into a valid image.
    ArtifactReceived(Artifact),
    /// A binary frame could not be decoded. Non-fatal.
    DecodeError(FrameError),
    /// The backend sent a close frame.
    Closed,
    /// Anything the bridge does not act on (unknown types, pings, ...).
    Ignored(String),
}

/// Classify one WebSocket frame for a job targeting `target_node_id`.
pub fn classify(message: &Message, target_node_id: i64) -> Classified {
    match message {
        Message::Text(text) => classify_text(text, target_node_id),
        Message::Binary(data) => classify_binary(data),
        Message::Close(_) => Classified::Closed,
        Message::Ping(_) | Message::Pong(_) => Classified::Ignored("ping/pong".to_string()),
        Message::Frame(_) => Classified::Ignored("raw frame".to_string()),
    }
}

/// Classify a JSON text frame.
pub fn classify_text(text: &str, target_node_id: i64) -> Classified {
    let message = match parse_message(text) {
        Ok(message) => message,
        Err(e) => return Classified::Ignored(format!("unrecognised text message: {e}")),
    };

    match message {
        ComfyUIMessage::Status(data) => Classified::Progress(Progress::Queue {
            remaining: data.status.exec_info.queue_remaining,
        }),
        ComfyUIMessage::ExecutionStart(_) => Classified::Progress(Progress::Started),
        ComfyUIMessage::ExecutionCached(data) => {
            Classified::Progress(Progress::Cached { nodes: data.nodes })
        }
        // `node: null` is how older backends announce the end of a prompt.
        ComfyUIMessage::Executing(data) => match data.node {
            Some(node) => {
                let is_target = node == target_node_id.to_string();
                Classified::Progress(Progress::Node { node, is_target })
            }
            None => Classified::TerminalSuccess,
        },
        ComfyUIMessage::Progress(data) => Classified::Progress(Progress::Step {
            value: data.value,
            max: data.max,
        }),
        ComfyUIMessage::Executed(data) => {
            Classified::Progress(Progress::NodeOutput { node: data.node })
        }
        ComfyUIMessage::ExecutionSuccess(_) => Classified::TerminalSuccess,
        ComfyUIMessage::ExecutionInterrupted(_) => Classified::TerminalInterrupted,
        ComfyUIMessage::ExecutionError(data) => {
            Classified::TerminalError(execution_error_message(&data))
        }
    }
}

/// Classify a binary frame: strip the header and decode the image.
pub fn classify_binary(data: &[u8]) -> Classified {
    match decode_artifact(data) {
        Ok(artifact) => Classified::ArtifactReceived(artifact),
        Err(e) => Classified::DecodeError(e),
    }
}

fn execution_error_message(data: &ErrorData) -> String {
    let message = data.exception_message.trim();
    let detail = match (data.exception_type.is_empty(), message.is_empty()) {
        (true, true) => "unknown error".to_string(),
        (true, false) => message.to_string(),
        (false, true) => data.exception_type.clone(),
        (false, false) => format!("{}: {message}", data.exception_type),
    };

    match (&data.node_id, &data.node_type) {
        (Some(id), Some(kind)) => format!("node {id} ({kind}) failed: {detail}"),
        (Some(id), None) => format!("node {id} failed: {detail}"),
        _ => detail,
    }
}
