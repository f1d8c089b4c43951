//! The `(action, data)` frame vocabulary.
//!
//! Everything exchanged over a session websocket is a pair of an action
//! name and a string payload whose meaning depends on the action. The
//! executor produces outbound frames; the session layer encodes them as
//! JSON text messages.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// All actions that can appear in a frame.
///
/// `Format`, `Run`, `Stop`, and `ClearOutput` are sent by the client;
/// the rest are server-to-client only. `ClearOutput` is also echoed back
/// by the server so the client can use it as a drain fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Format the source in the payload; on success the reply carries the
    /// formatted source under this same action.
    Format,
    /// Build and run the source in the payload.
    Run,
    /// Cancel any in-flight action.
    Stop,
    /// Clear the output console; no payload.
    ClearOutput,
    /// Highlight the given lines; payload is a JSON list of integers.
    MarkLines,
    /// Append the payload to the stdout console.
    AppendStdout,
    /// Append the payload to the stderr console.
    AppendStderr,
    /// A new profile report is available; payload is a JSON object with
    /// `name` and `id` fields.
    ReportProfile,
    /// An action started; payload is an optional message.
    StatusStarted,
    /// Progress or diagnostics for an on-going action; payload required.
    StatusUpdate,
    /// An action stopped; always the final frame of an action.
    StatusStopped,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Format => "Format",
            Action::Run => "Run",
            Action::Stop => "Stop",
            Action::ClearOutput => "ClearOutput",
            Action::MarkLines => "MarkLines",
            Action::AppendStdout => "AppendStdout",
            Action::AppendStderr => "AppendStderr",
            Action::ReportProfile => "ReportProfile",
            Action::StatusStarted => "StatusStarted",
            Action::StatusUpdate => "StatusUpdate",
            Action::StatusStopped => "StatusStopped",
        }
    }
}

/// A single frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// The action name.
    pub action: Action,
    /// Payload; interpretation depends on `action`.
    pub data: String,
}

impl Frame {
    /// Create a frame.
    pub fn new(action: Action, data: impl Into<String>) -> Self {
        Self {
            action,
            data: data.into(),
        }
    }
}

/// Ordered, non-blocking emission channel from an executor to its session.
///
/// All frames of a session funnel through one channel, so emissions from
/// child-process readers and the action task can never interleave partial
/// messages. A closed channel means the session is gone; sends are then
/// silently dropped and the action winds down on its own.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameSender {
    /// Wrap an existing channel.
    pub fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { tx }
    }

    /// Emit a frame. Transport failures are permanent; they are absorbed
    /// here and observable via [`FrameSender::is_closed`].
    pub fn send(&self, action: Action, data: impl Into<String>) {
        let _ = self.tx.send(Frame::new(action, data));
    }

    /// Whether the receiving session is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
