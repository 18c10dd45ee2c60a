//! Editable tracks over immutable probed streams.
//!
//! A [`Track`] is a shared core (identity, source file, probed snapshot,
//! overlay of pending edits) plus a per-variant payload in [`TrackKind`].
//! Reads prefer overlay values; writes only touch the overlay.

pub mod audio;
pub mod media;
pub mod options;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

pub use audio::{AudioEdit, Conversion};
pub use media::{MediaInfo, ProbedStream, parse_clock};
pub use options::ArgStyle;

use crate::analyzer::StreamProbe;
use crate::conversion;
use crate::error::ConversionError;
use crate::ids::{IdAllocator, TrackId};
use crate::overlay::{self, TagEdit};

/// Fallback when neither an edit nor the probe names a codec
pub const UNKNOWN_CODEC: &str = "unknown";

/// Renders extra per-track arguments given `(input_index, output_index)`
pub type OptionHook = Arc<dyn Fn(usize, usize) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
    Attachment,
    Data,
}

impl TrackType {
    pub fn name(&self) -> &'static str {
        match self {
            TrackType::Video => "video",
            TrackType::Audio => "audio",
            TrackType::Subtitle => "subtitle",
            TrackType::Attachment => "attachment",
            TrackType::Data => "data",
        }
    }

    /// Whether the engine can offset this kind of stream in time
    pub fn supports_delay(&self) -> bool {
        matches!(
            self,
            TrackType::Video | TrackType::Audio | TrackType::Subtitle
        )
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pending attachment edits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentEdit {
    pub filename: Option<String>,
    pub mimetype: Option<String>,
}

/// Variant payload holding the type-specific edits
#[derive(Debug, Clone, PartialEq)]
pub enum TrackKind {
    Video,
    Audio(AudioEdit),
    Subtitle,
    Attachment(AttachmentEdit),
    Data,
}

/// Edits shared by every track type
#[derive(Clone, Default)]
pub struct Overlay {
    pub tags: BTreeMap<String, TagEdit>,
    pub dispositions: Option<BTreeMap<String, bool>>,
    pub delay_ms: Option<i64>,
    pub hooks: Vec<OptionHook>,
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("tags", &self.tags)
            .field("dispositions", &self.dispositions)
            .field("delay_ms", &self.delay_ms)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Overlay {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.dispositions.is_none()
            && self.delay_ms.is_none()
            && self.hooks.is_empty()
    }
}

#[derive(Debug)]
pub struct Track {
    id: TrackId,
    source_path: PathBuf,
    is_original: bool,
    probed: Arc<ProbedStream>,
    overlay: Overlay,
    kind: TrackKind,
}

impl Track {
    /// Build an original track from a probed stream
    pub fn from_probe(ids: &IdAllocator, source_path: &Path, stream: &StreamProbe) -> Self {
        Self::from_snapshot(ids, source_path, Arc::new(ProbedStream::from_probe(stream)))
    }

    pub fn from_snapshot(ids: &IdAllocator, source_path: &Path, probed: Arc<ProbedStream>) -> Self {
        let kind = match probed.media {
            MediaInfo::Video { .. } => TrackKind::Video,
            MediaInfo::Audio { .. } => TrackKind::Audio(AudioEdit::default()),
            MediaInfo::Subtitle => TrackKind::Subtitle,
            MediaInfo::Attachment { .. } => TrackKind::Attachment(AttachmentEdit::default()),
            MediaInfo::Data => TrackKind::Data,
        };
        Self {
            id: ids.track(),
            source_path: source_path.to_path_buf(),
            is_original: true,
            probed,
            overlay: Overlay::default(),
            kind,
        }
    }

    /// Duplicate this track.
    ///
    /// The copy shares the probed snapshot, gets a fresh identity and owns an
    /// independent clone of every pending edit.
    pub fn copy(&self, ids: &IdAllocator) -> Track {
        Track {
            id: ids.track(),
            source_path: self.source_path.clone(),
            is_original: false,
            probed: Arc::clone(&self.probed),
            overlay: self.overlay.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn is_original(&self) -> bool {
        self.is_original
    }

    /// Index of the stream within its source file
    pub fn index(&self) -> usize {
        self.probed.index
    }

    pub fn probed(&self) -> &ProbedStream {
        &self.probed
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn kind(&self) -> &TrackKind {
        &self.kind
    }

    pub fn track_type(&self) -> TrackType {
        match self.kind {
            TrackKind::Video => TrackType::Video,
            TrackKind::Audio(_) => TrackType::Audio,
            TrackKind::Subtitle => TrackType::Subtitle,
            TrackKind::Attachment(_) => TrackType::Attachment,
            TrackKind::Data => TrackType::Data,
        }
    }

    /// Effective codec; never fails
    pub fn codec(&self) -> String {
        let converted = match &self.kind {
            TrackKind::Audio(edit) => edit.conversion.as_ref().map(|c| c.codec.as_str()),
            _ => None,
        };
        match overlay::effective(self.probed.codec.as_deref(), converted) {
            Some(codec) => codec.to_string(),
            None => {
                warn!("Track {} has no known codec", self.id);
                UNKNOWN_CODEC.to_string()
            }
        }
    }

    // Tags

    pub fn tags(&self) -> BTreeMap<String, String> {
        overlay::effective_tags(&self.probed.tags, &self.overlay.tags)
    }

    pub fn tag(&self, name: &str) -> Option<String> {
        let edited = self.overlay.tags.get(name).map(TagEdit::value);
        match edited {
            Some(value) => value.map(str::to_string),
            None => self.probed.tags.get(name).cloned(),
        }
    }

    pub fn set_tag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.overlay
            .tags
            .insert(name.into(), TagEdit::Set(value.into()));
    }

    /// Mark a tag as explicitly cleared
    pub fn unset_tag(&mut self, name: impl Into<String>) {
        self.overlay.tags.insert(name.into(), TagEdit::Unset);
    }

    /// Drop a pending tag edit, returning to the probed value
    pub fn revert_tag(&mut self, name: &str) {
        self.overlay.tags.remove(name);
    }

    // Dispositions

    pub fn dispositions(&self) -> BTreeMap<String, bool> {
        match &self.overlay.dispositions {
            Some(flags) => flags.clone(),
            None => self.probed.dispositions(),
        }
    }

    pub fn set_disposition(&mut self, name: impl Into<String>, value: bool) {
        let probed = &self.probed;
        self.overlay
            .dispositions
            .get_or_insert_with(|| probed.dispositions())
            .insert(name.into(), value);
    }

    pub fn set_dispositions(&mut self, flags: BTreeMap<String, bool>) {
        self.overlay.dispositions = Some(flags);
    }

    // Timing

    /// Duration in seconds; 0 when unknown or malformed
    pub fn duration(&self) -> f64 {
        match self.probed.duration_tag() {
            Some(clock) => parse_clock(clock),
            None => self.probed.duration_secs.unwrap_or(0.0),
        }
    }

    /// Playback offset in whole milliseconds; always 0 for types without delay
    pub fn delay_ms(&self) -> i64 {
        if !self.track_type().supports_delay() {
            return 0;
        }
        self.overlay.delay_ms.unwrap_or(0)
    }

    pub fn delay(&self) -> f64 {
        self.delay_ms() as f64 / 1000.0
    }

    pub fn set_delay(&mut self, seconds: f64) {
        if !self.track_type().supports_delay() {
            warn!(
                "Ignoring delay on {} track {}: not supported",
                self.track_type(),
                self.id
            );
            return;
        }
        self.overlay.delay_ms = Some((seconds * 1000.0).round() as i64);
    }

    // Type-specific attributes

    pub fn bitrate(&self) -> Option<u64> {
        let edited = match &self.kind {
            TrackKind::Audio(edit) => edit.bitrate.as_ref(),
            _ => None,
        };
        overlay::effective(self.probed.bitrate.as_ref(), edited).copied()
    }

    pub fn channels(&self) -> Option<u32> {
        match (&self.kind, &self.probed.media) {
            (TrackKind::Audio(edit), MediaInfo::Audio { channels, .. }) => {
                overlay::effective(channels.as_ref(), edit.channels.as_ref()).copied()
            }
            _ => None,
        }
    }

    pub fn sample_rate(&self) -> Option<u64> {
        match &self.probed.media {
            MediaInfo::Audio { sample_rate, .. } => *sample_rate,
            _ => None,
        }
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self.probed.media {
            MediaInfo::Video {
                width: Some(w),
                height: Some(h),
            } => Some((w, h)),
            _ => None,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match (&self.kind, &self.probed.media) {
            (TrackKind::Attachment(edit), MediaInfo::Attachment { filename, .. }) => {
                overlay::effective(filename.as_deref(), edit.filename.as_deref())
            }
            _ => None,
        }
    }

    pub fn mimetype(&self) -> Option<&str> {
        match (&self.kind, &self.probed.media) {
            (TrackKind::Attachment(edit), MediaInfo::Attachment { mimetype, .. }) => {
                overlay::effective(mimetype.as_deref(), edit.mimetype.as_deref())
            }
            _ => None,
        }
    }

    pub fn set_filename(&mut self, filename: impl Into<String>) {
        match &mut self.kind {
            TrackKind::Attachment(edit) => edit.filename = Some(filename.into()),
            _ => warn!("Ignoring filename on non-attachment track {}", self.id),
        }
    }

    pub fn set_mimetype(&mut self, mimetype: impl Into<String>) {
        match &mut self.kind {
            TrackKind::Attachment(edit) => edit.mimetype = Some(mimetype.into()),
            _ => warn!("Ignoring mimetype on non-attachment track {}", self.id),
        }
    }

    // Audio conversion

    /// The pending conversion request, if any
    pub fn conversion(&self) -> Option<&Conversion> {
        match &self.kind {
            TrackKind::Audio(edit) => edit.conversion.as_ref(),
            _ => None,
        }
    }

    /// Request a validated codec conversion; state is untouched on failure
    pub fn convert(&mut self, options: &Value) -> Result<(), ConversionError> {
        let TrackKind::Audio(edit) = &mut self.kind else {
            let codec = options
                .get("codec")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_CODEC);
            return Err(ConversionError::UnsupportedCodec {
                codec: codec.to_string(),
            });
        };

        let options = conversion::validate(options)?;
        if let Some(bitrate) = options.bitrate() {
            edit.bitrate = Some(bitrate);
        }
        if let Some(channels) = options.channels() {
            edit.channels = Some(channels);
        }
        edit.conversion = Some(Conversion::validated(options));
        Ok(())
    }

    /// Override the bitrate.
    ///
    /// Without a pending conversion this pins the conversion codec to the
    /// current effective codec, so the change still re-encodes. A track with
    /// no known codec ignores the override and keeps stream copy.
    pub fn set_bitrate(&mut self, bitrate: u64) {
        let current = self.codec();
        let track_type = self.track_type();
        let id = self.id;
        match &mut self.kind {
            TrackKind::Audio(edit) => {
                if edit.conversion.is_none() {
                    if current == UNKNOWN_CODEC {
                        warn!("Ignoring bitrate on track {}: no known codec to re-encode with", id);
                        return;
                    }
                    edit.conversion = Some(Conversion::pinned(current));
                }
                edit.bitrate = Some(bitrate);
            }
            _ => warn!("Ignoring bitrate on {} track {}", track_type, self.id),
        }
    }

    pub fn set_channels(&mut self, channels: u32) {
        let track_type = self.track_type();
        match &mut self.kind {
            TrackKind::Audio(edit) => edit.channels = Some(channels),
            _ => warn!("Ignoring channels on {} track {}", track_type, self.id),
        }
    }

    /// Drop any conversion and audio overrides
    pub fn clear_conversion(&mut self) {
        if let TrackKind::Audio(edit) = &mut self.kind {
            *edit = AudioEdit::default();
        }
    }

    pub fn is_converting(&self) -> bool {
        self.conversion().is_some()
    }

    // Argument emission

    pub fn add_option_hook(&mut self, hook: OptionHook) {
        self.overlay.hooks.push(hook);
    }

    /// Arguments mapping this track from input `input` to output slot `out`
    pub fn build_options(&self, input: usize, out: usize) -> Vec<String> {
        self.build_options_with(input, out, ArgStyle::default())
    }

    pub fn build_options_with(&self, input: usize, out: usize, style: ArgStyle) -> Vec<String> {
        let index = self.index();
        let mut args = vec!["-map".to_string(), format!("{}:{}", input, index)];

        if !self.is_converting() {
            args.extend([format!("-c:{}", out), "copy".to_string()]);
        }

        for hook in &self.overlay.hooks {
            args.extend(hook(input, out));
        }

        args.extend([
            format!("-map_metadata:s:{}", out),
            format!("{}:s:{}", input, index),
        ]);

        for (key, edit) in &self.overlay.tags {
            args.extend([format!("-metadata:s:{}", out), style.metadata(key, edit)]);
        }

        if let Some(flags) = &self.overlay.dispositions {
            args.extend([
                format!("-disposition:{}", out),
                options::render_dispositions(flags),
            ]);
        }

        match &self.kind {
            TrackKind::Audio(edit) => args.extend(edit.build_options(out)),
            TrackKind::Attachment(_) => {
                if let (Some(filename), Some(mimetype)) = (self.filename(), self.mimetype()) {
                    args.extend([
                        format!("-metadata:s:{}", out),
                        style.metadata_value("filename", filename),
                        format!("-metadata:s:{}", out),
                        style.metadata_value("mimetype", mimetype),
                    ]);
                }
            }
            TrackKind::Video | TrackKind::Subtitle | TrackKind::Data => {}
        }

        args
    }
}
