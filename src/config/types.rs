use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// External engine locations and argument quirks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg binary, resolved through PATH when relative
    pub ffmpeg_path: PathBuf,
    /// ffprobe binary
    pub ffprobe_path: PathBuf,
    /// Pad metadata values containing spaces with a trailing space
    pub pad_spaced_metadata: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            pad_spaced_metadata: false,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Suffix appended to the first input's stem for the default output name
    pub suffix: String,
    /// Container extension of the default output
    pub container: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "_mix".to_string(),
            container: "mkv".to_string(),
        }
    }
}

/// Import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Extensions picked up when a directory is imported
    pub extensions: Vec<String>,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "mkv", "mka", "mks", "mp4", "m4v", "m4a", "mov", "avi", "webm", "ts", "m2ts",
                "flac", "opus", "ogg", "mp3", "ac3", "eac3", "dts", "srt", "ass", "ssa",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
            recursive: false,
        }
    }
}

impl ImportConfig {
    /// Check if a path has one of the configured extensions
    pub fn accepts(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                self.extensions
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(e))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn import_extension_match_ignores_case() {
        let import = ImportConfig::default();
        assert!(import.accepts(Path::new("/media/Movie.MKV")));
        assert!(import.accepts(Path::new("subs.srt")));
        assert!(!import.accepts(Path::new("notes.txt")));
        assert!(!import.accepts(Path::new("no_extension")));
    }
}
