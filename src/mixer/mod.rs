//! Argument synthesis and execution tracking for output containers.

pub mod command_builder;
pub mod engine;
pub mod ffmpeg;
pub mod status;

use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub use command_builder::{InputGroup, MixCommand, MixPlan, MixRequest, synthesize};
pub use engine::{Engine, EngineEvent, EngineFailure, EngineHandle};
pub use ffmpeg::FfmpegEngine;
pub use status::{CodecInfo, MixState, MixStatus, Progress, StatusSnapshot};

/// Invoked with every snapshot appended by the engine's events
pub type StatusCallback = Box<dyn FnMut(&StatusSnapshot) + Send>;

/// Feed engine events of `execution` into `state` until the engine goes away.
///
/// `scratch` (the chapter metadata file) is kept alive for the whole run.
pub async fn drive(
    state: Arc<Mutex<MixState>>,
    execution: Uuid,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    mut callback: Option<StatusCallback>,
    scratch: Option<NamedTempFile>,
) {
    while let Some(event) = events.recv().await {
        let snapshot = state.lock().apply(execution, event);
        if let (Some(snapshot), Some(callback)) = (snapshot, callback.as_mut()) {
            callback(&snapshot);
        }
    }

    // channel closed without a terminal event
    let snapshot = {
        let mut state = state.lock();
        if state.execution() == Some(execution) && state.state().is_active() {
            warn!("Engine of execution {} exited without a result", execution);
            state.fail(execution, "engine exited without reporting a result")
        } else {
            None
        }
    };
    if let (Some(snapshot), Some(callback)) = (snapshot, callback.as_mut()) {
        callback(&snapshot);
    }

    drop(scratch);
}
