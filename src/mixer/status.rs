//! Execution status log and the state machine that appends to it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::{EngineEvent, EngineFailure};
use crate::error::MixError;
use crate::tracks::parse_clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MixStatus {
    Idle,
    Mixing,
    /// Reserved; the engine cannot suspend
    Paused,
    Done,
    Canceled,
    Error,
}

impl MixStatus {
    /// An execution is live in this state
    pub fn is_active(&self) -> bool {
        matches!(self, MixStatus::Mixing | MixStatus::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MixStatus::Done | MixStatus::Canceled | MixStatus::Error)
    }
}

/// Engine progress report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    pub frames: Option<u64>,
    pub current_fps: Option<f64>,
    pub current_kbps: Option<f64>,
    /// Output size so far, in bytes
    pub target_size: Option<u64>,
    /// Output position as `HH:MM:SS.micros`
    pub timemark: Option<String>,
    pub percent: Option<f64>,
}

/// Input description reported by the engine before it starts writing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodecInfo {
    pub format: Option<String>,
    pub duration: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
}

/// One entry of the status log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub execution: Option<Uuid>,
    pub state: MixStatus,
    pub command: Option<String>,
    pub codec_info: Option<CodecInfo>,
    pub progress: Option<Progress>,
    pub error: Option<String>,
}

impl StatusSnapshot {
    fn idle() -> Self {
        Self {
            timestamp: Utc::now(),
            execution: None,
            state: MixStatus::Idle,
            command: None,
            codec_info: None,
            progress: None,
            error: None,
        }
    }
}

/// Append-only status log of one output container plus the handle of its
/// live execution.
#[derive(Debug)]
pub struct MixState {
    log: Vec<StatusSnapshot>,
    expected_duration: Option<f64>,
    terminate: Option<oneshot::Sender<()>>,
}

impl Default for MixState {
    fn default() -> Self {
        Self::new()
    }
}

impl MixState {
    pub fn new() -> Self {
        Self {
            log: vec![StatusSnapshot::idle()],
            expected_duration: None,
            terminate: None,
        }
    }

    pub fn state(&self) -> MixStatus {
        self.current().state
    }

    /// Newest snapshot
    pub fn current(&self) -> &StatusSnapshot {
        // the log always holds the initial idle entry
        &self.log[self.log.len() - 1]
    }

    pub fn log(&self) -> &[StatusSnapshot] {
        &self.log
    }

    /// Id of the newest execution, if any was started
    pub fn execution(&self) -> Option<Uuid> {
        self.current().execution
    }

    /// Start a new execution, recording the rendered command.
    ///
    /// `expected_duration` (seconds) drives percent complete.
    pub fn begin(
        &mut self,
        command: String,
        expected_duration: Option<f64>,
    ) -> Result<Uuid, MixError> {
        if self.state().is_active() {
            return Err(MixError::AlreadyMixing);
        }
        let execution = Uuid::new_v4();
        self.expected_duration = expected_duration.filter(|d| *d > 0.0);
        self.terminate = None;

        let snapshot = StatusSnapshot {
            timestamp: Utc::now(),
            execution: Some(execution),
            state: MixStatus::Mixing,
            command: Some(command),
            codec_info: None,
            progress: None,
            error: None,
        };
        info!("Execution {} started", execution);
        self.push(snapshot);
        Ok(execution)
    }

    /// Attach the terminate signal of the spawned engine
    pub fn attach(&mut self, terminate: oneshot::Sender<()>) {
        self.terminate = Some(terminate);
    }

    /// Apply an engine event of `execution`.
    ///
    /// Returns the appended snapshot, or `None` when the event was dropped
    /// (stale execution or terminal state).
    pub fn apply(&mut self, execution: Uuid, event: EngineEvent) -> Option<StatusSnapshot> {
        if self.execution() != Some(execution) {
            debug!("Dropping event of stale execution {}", execution);
            return None;
        }
        if !self.state().is_active() {
            match &event {
                EngineEvent::Error(EngineFailure {
                    terminated: true, ..
                }) if self.state() == MixStatus::Canceled => {
                    debug!("Suppressing termination error of canceled execution {}", execution)
                }
                _ => debug!("Dropping {:?} after {:?}", event, self.state()),
            }
            return None;
        }

        let mut next = self.next(MixStatus::Mixing);
        match event {
            EngineEvent::Start { command } => next.command = Some(command),
            EngineEvent::CodecInfo(info) => next.codec_info = Some(info),
            EngineEvent::Progress(mut progress) => {
                if progress.percent.is_none() {
                    progress.percent = self.percent(progress.timemark.as_deref());
                }
                next.progress = Some(progress);
            }
            EngineEvent::Done => {
                next.state = MixStatus::Done;
                self.terminate = None;
                info!("Execution {} finished", execution);
            }
            EngineEvent::Error(failure) => {
                next.state = MixStatus::Error;
                next.error = Some(failure.message);
                self.terminate = None;
                warn!("Execution {} failed", execution);
            }
        }
        Some(self.push(next))
    }

    /// Record an engine-side failure outside the event stream, e.g. a spawn
    /// error or an engine that went away without a terminal event.
    pub fn fail(&mut self, execution: Uuid, message: impl Into<String>) -> Option<StatusSnapshot> {
        self.apply(
            execution,
            EngineEvent::Error(EngineFailure {
                message: message.into(),
                terminated: false,
            }),
        )
    }

    /// Cancel the live execution and signal the engine to terminate
    pub fn cancel(&mut self) -> Result<StatusSnapshot, MixError> {
        if !self.state().is_active() {
            return Err(MixError::NotStarted);
        }
        let snapshot = self.next(MixStatus::Canceled);
        if let Some(terminate) = self.terminate.take() {
            // engine may already be gone
            let _ = terminate.send(());
        }
        info!("Execution {:?} canceled", snapshot.execution);
        Ok(self.push(snapshot))
    }

    pub fn pause(&mut self) -> Result<StatusSnapshot, MixError> {
        if !self.state().is_active() {
            return Err(MixError::NotStarted);
        }
        Err(MixError::PauseUnsupported)
    }

    // Copy of the newest entry with a fresh timestamp
    fn next(&self, state: MixStatus) -> StatusSnapshot {
        StatusSnapshot {
            timestamp: Utc::now(),
            state,
            error: None,
            ..self.current().clone()
        }
    }

    fn push(&mut self, snapshot: StatusSnapshot) -> StatusSnapshot {
        self.log.push(snapshot.clone());
        snapshot
    }

    fn percent(&self, timemark: Option<&str>) -> Option<f64> {
        let duration = self.expected_duration?;
        let position = parse_clock(timemark?);
        Some((position / duration * 100.0).clamp(0.0, 100.0))
    }
}
