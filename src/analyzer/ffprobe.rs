use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use super::Prober;
use super::metadata::ProbeResult;
use crate::error::ProbeError;

/// Probes files by running ffprobe
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeResult, ProbeError>> + Send {
        let program = self.program.clone();
        let path = path.to_path_buf();
        async move {
            let output = run_ffprobe(&program, &path).await?;
            let result: ProbeResult = serde_json::from_str(&output)?;
            debug!(
                "Probed {}: {} stream(s), {} chapter(s)",
                path.display(),
                result.streams.len(),
                result.chapters.len()
            );
            Ok(result)
        }
    }
}

/// Run ffprobe and return its JSON output
async fn run_ffprobe(program: &Path, input: &Path) -> Result<String, ProbeError> {
    let output = Command::new(program)
        .args([
            "-v",
            "error",
            "-show_format",
            "-show_streams",
            "-show_chapters",
            "-of",
            "json",
        ])
        .arg(input)
        .output()
        .await
        .map_err(ProbeError::Spawn)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::Failed(stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
