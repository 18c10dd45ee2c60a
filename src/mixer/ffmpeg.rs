use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::engine::{Engine, EngineEvent, EngineFailure, EngineHandle};
use super::status::{CodecInfo, Progress};

/// Arguments placed before every synthesized list
const BASE_ARGS: [&str; 6] = [
    "-hide_banner",
    "-nostdin",
    "-y",
    "-progress",
    "pipe:1",
    "-nostats",
];

/// Lines of stderr kept for error messages
const STDERR_TAIL: usize = 5;

pub const TERMINATED_MESSAGE: &str = "ffmpeg was killed with signal SIGTERM";

static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Input #\d+, (.+), from '").expect("valid input regex"));
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Duration: ([^,]+)").expect("valid duration regex"));
static STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Stream #\d+:\d+\S*: (Audio|Video): (.+)$").expect("valid stream regex")
});

/// Runs executions with the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    program: PathBuf,
}

impl FfmpegEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Full argument list handed to the process
    pub fn full_args(args: &[String]) -> Vec<String> {
        BASE_ARGS
            .iter()
            .map(|a| a.to_string())
            .chain(args.iter().cloned())
            .collect()
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Engine for FfmpegEngine {
    fn program(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    fn spawn(&self, args: Vec<String>) -> io::Result<EngineHandle> {
        let args = Self::full_args(&args);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let command = std::iter::once(self.program.to_string_lossy().to_string())
            .chain(args)
            .collect::<Vec<_>>()
            .join(" ");
        info!("Started: {}", command);

        let (events, receiver) = mpsc::unbounded_channel();
        let (terminate, terminate_rx) = oneshot::channel();
        let _ = events.send(EngineEvent::Start { command });

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::spawn(supervise(child, stdout, stderr, events, terminate_rx));

        Ok(EngineHandle {
            events: receiver,
            terminate,
        })
    }
}

async fn supervise(
    mut child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    events: mpsc::UnboundedSender<EngineEvent>,
    mut terminate: oneshot::Receiver<()>,
) {
    let progress_task = stdout.map(|out| tokio::spawn(read_progress(out, events.clone())));
    let stderr_task = stderr.map(|err| tokio::spawn(read_stderr(err, events.clone())));

    let mut requested = false;
    let status = tokio::select! {
        status = child.wait() => status,
        signal = &mut terminate => {
            // a dropped sender only means nobody can cancel anymore
            if signal.is_ok() {
                requested = true;
                send_terminate(&mut child);
            }
            child.wait().await
        }
    };

    if let Some(task) = progress_task {
        let _ = task.await;
    }
    let tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let event = match status {
        Ok(status) if status.success() => EngineEvent::Done,
        Ok(status) if was_terminated(&status, requested) => EngineEvent::Error(EngineFailure {
            message: TERMINATED_MESSAGE.to_string(),
            terminated: true,
        }),
        Ok(status) => EngineEvent::Error(EngineFailure {
            message: failure_message(&status, &tail),
            terminated: false,
        }),
        Err(e) => EngineEvent::Error(EngineFailure {
            message: format!("Failed to wait for ffmpeg: {}", e),
            terminated: false,
        }),
    };
    debug!("ffmpeg finished: {:?}", event);
    let _ = events.send(event);
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to ffmpeg ({}), killing", e);
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill ffmpeg: {}", e);
    }
}

// ffmpeg traps SIGTERM and exits with 255, so a requested stop counts too
#[cfg(unix)]
fn was_terminated(status: &ExitStatus, requested: bool) -> bool {
    use std::os::unix::process::ExitStatusExt;
    requested || status.signal() == Some(nix::sys::signal::Signal::SIGTERM as i32)
}

#[cfg(not(unix))]
fn was_terminated(_status: &ExitStatus, requested: bool) -> bool {
    requested
}

fn failure_message(status: &ExitStatus, tail: &[String]) -> String {
    if tail.is_empty() {
        format!("ffmpeg failed with status: {}", status)
    } else {
        format!("ffmpeg failed: {}", tail.join("\n"))
    }
}

async fn read_progress(out: impl AsyncRead + Unpin, events: mpsc::UnboundedSender<EngineEvent>) {
    let mut lines = BufReader::new(out).lines();
    let mut parser = ProgressParser::default();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(progress) = parser.feed(&line) {
            let _ = events.send(EngineEvent::Progress(progress));
        }
    }
}

// Returns the last lines of stderr
async fn read_stderr(
    err: impl AsyncRead + Unpin,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> Vec<String> {
    let mut lines = BufReader::new(err).lines();
    let mut parser = CodecInfoParser::default();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(info) = parser.feed(&line) {
            let _ = events.send(EngineEvent::CodecInfo(info));
        }
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// Accumulates `-progress` key/value blocks
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: Progress,
}

impl ProgressParser {
    /// Feed one line; returns a report when a block is complete
    pub fn feed(&mut self, line: &str) -> Option<Progress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            "frame" => self.current.frames = value.parse().ok(),
            "fps" => self.current.current_fps = value.parse().ok(),
            "bitrate" => {
                self.current.current_kbps = value.trim_end_matches("kbits/s").trim().parse().ok()
            }
            "total_size" => self.current.target_size = value.parse().ok(),
            "out_time" => {
                self.current.timemark = Some(value.to_string()).filter(|v| v != "N/A")
            }
            "progress" => return Some(std::mem::take(&mut self.current)),
            _ => {}
        }
        None
    }
}

/// Collects the input description ffmpeg prints before processing
#[derive(Debug, Default)]
pub struct CodecInfoParser {
    info: CodecInfo,
    in_metadata_input: bool,
    reported: bool,
}

impl CodecInfoParser {
    /// Feed one stderr line; returns the description once the header ends
    pub fn feed(&mut self, line: &str) -> Option<CodecInfo> {
        if self.reported {
            return None;
        }

        if let Some(caps) = INPUT_RE.captures(line) {
            let format = &caps[1];
            // the chapter input carries no streams
            self.in_metadata_input = format == "ffmetadata";
            if !self.in_metadata_input && self.info.format.is_none() {
                self.info.format = Some(format.to_string());
            }
            return None;
        }
        if self.in_metadata_input {
            return None;
        }

        if let Some(caps) = DURATION_RE.captures(line) {
            if self.info.duration.is_none() {
                self.info.duration = Some(caps[1].trim().to_string());
            }
        } else if let Some(caps) = STREAM_RE.captures(line) {
            let slot = match &caps[1] {
                "Audio" => &mut self.info.audio,
                _ => &mut self.info.video,
            };
            if slot.is_none() {
                *slot = Some(caps[2].trim().to_string());
            }
        } else if line.starts_with("Output #") || line.starts_with("Stream mapping:") {
            self.reported = true;
            if self.info != CodecInfo::default() {
                return Some(std::mem::take(&mut self.info));
            }
        }
        None
    }
}
