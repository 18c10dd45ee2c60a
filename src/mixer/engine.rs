use std::io;

use tokio::sync::{mpsc, oneshot};

use super::status::{CodecInfo, Progress};

/// Failure reported by the engine for a running execution
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFailure {
    pub message: String,
    /// The process ended because it was asked to terminate
    pub terminated: bool,
}

/// Lifecycle message of one engine process
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Start { command: String },
    Progress(Progress),
    CodecInfo(CodecInfo),
    Done,
    Error(EngineFailure),
}

/// Channels of a spawned engine process
#[derive(Debug)]
pub struct EngineHandle {
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
    /// Fire to ask the process to terminate
    pub terminate: oneshot::Sender<()>,
}

/// External process that executes a synthesized argument list
pub trait Engine: Send + Sync {
    /// Program name used when rendering commands for display
    fn program(&self) -> String;

    /// Spawn one execution. Must be called from within a tokio runtime.
    fn spawn(&self, args: Vec<String>) -> io::Result<EngineHandle>;
}
