pub mod output;
pub mod source;

use std::path::Path;

pub use output::OutputContainer;
pub use source::{FormatInfo, SourceContainer};

use crate::ids::{ChapterListId, ContainerId, TrackId};

/// Borrowed view over either container variant
#[derive(Debug, Clone, Copy)]
pub enum ContainerRef<'a> {
    Source(&'a SourceContainer),
    Output(&'a OutputContainer),
}

impl<'a> ContainerRef<'a> {
    pub fn id(&self) -> ContainerId {
        match self {
            ContainerRef::Source(c) => c.id(),
            ContainerRef::Output(c) => c.id(),
        }
    }

    /// File path; outputs may not have one yet
    pub fn path(&self) -> Option<&'a Path> {
        match *self {
            ContainerRef::Source(c) => Some(c.path()),
            ContainerRef::Output(c) => c.path(),
        }
    }

    pub fn tracks(&self) -> &'a [TrackId] {
        match *self {
            ContainerRef::Source(c) => c.tracks(),
            ContainerRef::Output(c) => c.tracks(),
        }
    }

    pub fn chapters(&self) -> Option<ChapterListId> {
        match self {
            ContainerRef::Source(c) => c.chapters(),
            ContainerRef::Output(c) => c.chapters(),
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, ContainerRef::Output(_))
    }
}
