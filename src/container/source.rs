use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::analyzer::FormatProbe;
use crate::ids::{ChapterListId, ContainerId, TrackId};
use crate::tracks::Track;

/// Container-level probed attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatInfo {
    pub format_name: Option<String>,
    pub duration: Option<f64>,
    pub bitrate: Option<u64>,
    pub size: Option<u64>,
}

impl From<&FormatProbe> for FormatInfo {
    fn from(probe: &FormatProbe) -> Self {
        Self {
            format_name: probe.format_name.clone(),
            duration: probe.duration,
            bitrate: probe.bit_rate,
            size: probe.size,
        }
    }
}

/// Read-mostly model of a probed input file
#[derive(Debug, Clone)]
pub struct SourceContainer {
    id: ContainerId,
    path: PathBuf,
    format: FormatInfo,
    tags: BTreeMap<String, String>,
    tracks: Vec<TrackId>,
    chapters: Option<ChapterListId>,
    pub(crate) removed: bool,
}

impl SourceContainer {
    pub fn new(
        id: ContainerId,
        path: impl Into<PathBuf>,
        format: FormatInfo,
        tags: BTreeMap<String, String>,
        tracks: Vec<TrackId>,
        chapters: Option<ChapterListId>,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            format,
            tags,
            tracks,
            chapters,
            removed: false,
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &FormatInfo {
        &self.format
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tracks(&self) -> &[TrackId] {
        &self.tracks
    }

    pub fn chapters(&self) -> Option<ChapterListId> {
        self.chapters
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Insert a copied track right after `after`, or at the end when `after`
    /// is not part of this container. Original tracks are ignored.
    pub fn add_copied_track(&mut self, copy: &Track, after: Option<TrackId>) {
        if copy.is_original() {
            warn!(
                "Refusing to add original track {} to container {} as a copy",
                copy.id(),
                self.id
            );
            return;
        }
        if self.tracks.contains(&copy.id()) {
            return;
        }
        let position = after
            .and_then(|id| self.tracks.iter().position(|&t| t == id))
            .map(|p| p + 1)
            .unwrap_or(self.tracks.len());
        self.tracks.insert(position, copy.id());
    }

    /// Remove a copied track; original tracks stay
    pub fn remove_copied_track(&mut self, track: &Track) {
        if track.is_original() {
            warn!(
                "Refusing to remove original track {} from container {}",
                track.id(),
                self.id
            );
            return;
        }
        self.tracks.retain(|&t| t != track.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::CodecType;
    use crate::ids::IdAllocator;
    use crate::tracks::tests::track;

    #[test]
    fn copies_insert_after_their_original() {
        let ids = IdAllocator::new();
        let video = track(&ids, "/a.mkv", 0, CodecType::Video);
        let audio = track(&ids, "/a.mkv", 1, CodecType::Audio);
        let mut container = SourceContainer::new(
            ids.container(),
            "/a.mkv",
            FormatInfo::default(),
            BTreeMap::new(),
            vec![video.id(), audio.id()],
            None,
        );

        let copy = video.copy(&ids);
        container.add_copied_track(&copy, Some(video.id()));
        assert_eq!(container.tracks(), &[video.id(), copy.id(), audio.id()]);

        container.remove_copied_track(&copy);
        assert_eq!(container.tracks(), &[video.id(), audio.id()]);
    }

    #[test]
    fn original_tracks_are_protected() {
        let ids = IdAllocator::new();
        let video = track(&ids, "/a.mkv", 0, CodecType::Video);
        let mut container = SourceContainer::new(
            ids.container(),
            "/a.mkv",
            FormatInfo::default(),
            BTreeMap::new(),
            vec![video.id()],
            None,
        );

        container.remove_copied_track(&video);
        container.add_copied_track(&video, None);
        assert_eq!(container.tracks(), &[video.id()]);
    }
}
