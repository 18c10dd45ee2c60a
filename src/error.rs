use std::fmt::{self, Display};
use std::path::PathBuf;

use thiserror::Error;

use crate::ids::TrackId;

/// Kind of entity a caller-facing lookup refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Track,
    /// Either container kind, when the caller did not say which
    Container,
    SourceContainer,
    OutputContainer,
    ChapterList,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Track => "track",
            EntityKind::Container => "container",
            EntityKind::SourceContainer => "source container",
            EntityKind::OutputContainer => "output container",
            EntityKind::ChapterList => "chapter list",
        };
        f.write_str(name)
    }
}

/// A lookup referenced an id that does not exist (or was removed)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {id} not found")]
pub struct NotFound {
    pub kind: EntityKind,
    pub id: u64,
}

impl NotFound {
    pub fn new(kind: EntityKind, id: impl Into<u64>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Failure reported by the probe collaborator
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to execute ffprobe: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("ffprobe failed: {0}")]
    Failed(String),
    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Import-time failure for a single file
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no read access to {}", path.display())]
    NoReadAccess { path: PathBuf },
    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },
    #[error("probing {} failed: {source}", path.display())]
    ProbeFailed {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },
    #[error("probing {} was interrupted: {reason}", path.display())]
    Interrupted { path: PathBuf, reason: String },
}

/// All failures of an import batch; the batch is rejected as a whole
#[derive(Debug, Error)]
pub struct ImportBatchError {
    pub failures: Vec<ImportError>,
}

impl Display for ImportBatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import failed for {} file(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

/// Conversion request rejected before it reaches a track overlay
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("unsupported codec: {codec}")]
    UnsupportedCodec { codec: String },
    #[error("invalid conversion options: {}", fields.join(", "))]
    InvalidOptions { fields: Vec<String> },
}

/// Synthesis and execution precondition failures
#[derive(Debug, Error)]
pub enum MixError {
    #[error("no output path configured")]
    NoOutput,
    #[error("no tracks selected")]
    NoIngredients,
    #[error("output path collides with the input of track(s) {}", format_ids(track_ids))]
    InvalidOutput { track_ids: Vec<TrackId> },
    #[error("an execution is already in progress")]
    AlreadyMixing,
    #[error("no execution in progress")]
    NotStarted,
    #[error("the engine does not support pausing")]
    PauseUnsupported,
    #[error("failed to write chapter metadata: {0}")]
    ChapterMetadata(#[source] std::io::Error),
}

fn format_ids(ids: &[TrackId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Umbrella error for caller-facing library operations
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Import(#[from] ImportBatchError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Mix(#[from] MixError),
}

/// Configuration file failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{0}")]
    Invalid(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
