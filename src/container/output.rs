use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::ids::{ChapterListId, ContainerId, TrackId};
use crate::mixer::{MixState, MixStatus, StatusSnapshot};
use crate::overlay::{self, TagEdit};

/// Caller-built model of a file to produce.
///
/// The track order is the output stream order.
#[derive(Debug)]
pub struct OutputContainer {
    id: ContainerId,
    path: Option<PathBuf>,
    tags: BTreeMap<String, TagEdit>,
    tracks: Vec<TrackId>,
    chapters: Option<ChapterListId>,
    pub(crate) removed: bool,
    mix: Arc<Mutex<MixState>>,
}

impl OutputContainer {
    pub fn new(id: ContainerId) -> Self {
        Self {
            id,
            path: None,
            tags: BTreeMap::new(),
            tracks: Vec::new(),
            chapters: None,
            removed: false,
            mix: Arc::new(Mutex::new(MixState::new())),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn tracks(&self) -> &[TrackId] {
        &self.tracks
    }

    pub fn contains(&self, track: TrackId) -> bool {
        self.tracks.contains(&track)
    }

    /// Append a track; a track already selected is left in place
    pub fn add_track(&mut self, track: TrackId) {
        let end = self.tracks.len();
        self.insert_track(end, track);
    }

    /// Insert at `position`, clamped to the end
    pub fn insert_track(&mut self, position: usize, track: TrackId) {
        if self.contains(track) {
            debug!("Track {} already in output {}", track, self.id);
            return;
        }
        let position = position.min(self.tracks.len());
        self.tracks.insert(position, track);
    }

    /// Drop a track from the selection; the track itself lives on
    pub fn remove_track(&mut self, track: TrackId) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|&t| t != track);
        self.tracks.len() != before
    }

    /// Move a track to a new position in the output order
    pub fn move_track(&mut self, track: TrackId, position: usize) -> bool {
        let Some(from) = self.tracks.iter().position(|&t| t == track) else {
            warn!("Track {} is not part of output {}", track, self.id);
            return false;
        };
        let id = self.tracks.remove(from);
        let position = position.min(self.tracks.len());
        self.tracks.insert(position, id);
        true
    }

    /// Pending container-level tag edits
    pub fn tag_edits(&self) -> &BTreeMap<String, TagEdit> {
        &self.tags
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        overlay::effective_tags(&BTreeMap::new(), &self.tags)
    }

    pub fn set_tag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(name.into(), TagEdit::Set(value.into()));
    }

    /// Clear the tag in the produced file
    pub fn unset_tag(&mut self, name: impl Into<String>) {
        self.tags.insert(name.into(), TagEdit::Unset);
    }

    pub fn chapters(&self) -> Option<ChapterListId> {
        self.chapters
    }

    pub fn set_chapters(&mut self, chapters: Option<ChapterListId>) {
        self.chapters = chapters;
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Shared execution state, also held by a running driver
    pub fn mix_state(&self) -> Arc<Mutex<MixState>> {
        Arc::clone(&self.mix)
    }

    pub fn status(&self) -> MixStatus {
        self.mix.lock().state()
    }

    pub fn current_status(&self) -> StatusSnapshot {
        self.mix.lock().current().clone()
    }

    pub fn status_log(&self) -> Vec<StatusSnapshot> {
        self.mix.lock().log().to_vec()
    }
}
