use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::EngineConfig;

/// Availability of the external tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyStatus {
    pub ffmpeg: bool,
    pub ffprobe: bool,
}

impl DependencyStatus {
    /// Check the configured engine binaries
    pub fn check(engine: &EngineConfig) -> Self {
        Self {
            ffmpeg: check_command(&engine.ffmpeg_path, &["-version"]),
            ffprobe: check_command(&engine.ffprobe_path, &["-version"]),
        }
    }

    pub fn all_present(&self) -> bool {
        self.ffmpeg && self.ffprobe
    }
}

/// Check if a command runs successfully
fn check_command(cmd: &Path, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_binaries_are_reported() {
        let engine = EngineConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/trackmix-ffmpeg"),
            ffprobe_path: PathBuf::from("/nonexistent/trackmix-ffprobe"),
            pad_spaced_metadata: false,
        };
        let status = DependencyStatus::check(&engine);
        assert!(!status.ffmpeg);
        assert!(!status.ffprobe);
        assert!(!status.all_present());
    }
}
