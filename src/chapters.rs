//! Chapter lists and their ffmetadata serialization.

use std::path::{Path, PathBuf};

use crate::analyzer::ChapterProbe;
use crate::ids::ChapterListId;
use crate::overlay::effective;

/// Header line of the engine's metadata text format
pub const METADATA_HEADER: &str = ";FFMETADATA1";

#[derive(Debug, Clone, PartialEq)]
struct ChapterFields {
    id: i64,
    time_base: String,
    start: i64,
    end: i64,
    title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ChapterEdit {
    id: Option<i64>,
    time_base: Option<String>,
    start: Option<i64>,
    end: Option<i64>,
    title: Option<String>,
}

/// One chapter; every field can be overridden independently
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterEntry {
    probed: ChapterFields,
    edit: ChapterEdit,
}

impl ChapterEntry {
    pub fn new(id: i64, time_base: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            probed: ChapterFields {
                id,
                time_base: time_base.into(),
                start,
                end,
                title: None,
            },
            edit: ChapterEdit::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.probed.title = Some(title.into());
        self
    }

    pub fn from_probe(probe: &ChapterProbe) -> Self {
        let entry = Self::new(probe.id, probe.time_base.clone(), probe.start, probe.end);
        match probe.title() {
            Some(title) => entry.with_title(title),
            None => entry,
        }
    }

    pub fn id(&self) -> i64 {
        self.edit.id.unwrap_or(self.probed.id)
    }

    pub fn time_base(&self) -> &str {
        effective(Some(self.probed.time_base.as_str()), self.edit.time_base.as_deref())
            .unwrap_or_default()
    }

    pub fn start(&self) -> i64 {
        self.edit.start.unwrap_or(self.probed.start)
    }

    pub fn end(&self) -> i64 {
        self.edit.end.unwrap_or(self.probed.end)
    }

    pub fn title(&self) -> Option<&str> {
        effective(self.probed.title.as_deref(), self.edit.title.as_deref())
    }

    pub fn set_id(&mut self, id: i64) {
        self.edit.id = Some(id);
    }

    pub fn set_time_base(&mut self, time_base: impl Into<String>) {
        self.edit.time_base = Some(time_base.into());
    }

    pub fn set_start(&mut self, start: i64) {
        self.edit.start = Some(start);
    }

    pub fn set_end(&mut self, end: i64) {
        self.edit.end = Some(end);
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.edit.title = Some(title.into());
    }

    /// Drop all pending edits
    pub fn revert(&mut self) {
        self.edit = ChapterEdit::default();
    }

    pub fn is_modified(&self) -> bool {
        self.edit != ChapterEdit::default()
    }

    /// Start in seconds, derived from the time base
    pub fn start_secs(&self) -> f64 {
        self.start() as f64 * time_base_factor(self.time_base())
    }

    fn write_metadata(&self, out: &mut String) {
        out.push_str("[CHAPTER]\n");
        out.push_str(&format!("TIMEBASE={}\n", self.time_base()));
        out.push_str(&format!("START={}\n", self.start()));
        out.push_str(&format!("END={}\n", self.end()));
        out.push_str(&format!("title={}\n", escape(self.title().unwrap_or_default())));
    }
}

// "1/1000" -> 0.001
fn time_base_factor(time_base: &str) -> f64 {
    match time_base.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 0.0,
        },
        None => time_base.trim().parse().unwrap_or(0.0),
    }
}

/// Escape characters that are special in metadata values
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Chapters of one source file
#[derive(Debug, Clone)]
pub struct ChapterList {
    id: ChapterListId,
    source_path: PathBuf,
    entries: Vec<ChapterEntry>,
}

impl ChapterList {
    pub fn new(id: ChapterListId, source_path: impl Into<PathBuf>, entries: Vec<ChapterEntry>) -> Self {
        Self {
            id,
            source_path: source_path.into(),
            entries,
        }
    }

    pub fn from_probe(id: ChapterListId, source_path: &Path, chapters: &[ChapterProbe]) -> Self {
        Self::new(
            id,
            source_path,
            chapters.iter().map(ChapterEntry::from_probe).collect(),
        )
    }

    pub fn id(&self) -> ChapterListId {
        self.id
    }

    /// File the chapters were probed from
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn entries(&self) -> &[ChapterEntry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, position: usize) -> Option<&mut ChapterEntry> {
        self.entries.get_mut(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.entries.iter().any(ChapterEntry::is_modified)
    }

    /// Full metadata text with one block per chapter
    pub fn to_metadata(&self) -> String {
        let mut out = format!("{}\n", METADATA_HEADER);
        for entry in &self.entries {
            entry.write_metadata(&mut out);
        }
        out
    }
}

/// Metadata text carrying nothing but the header
pub fn empty_metadata() -> String {
    format!("{}\n", METADATA_HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdAllocator;

    fn list() -> ChapterList {
        let ids = IdAllocator::new();
        ChapterList::new(
            ids.chapter_list(),
            "/media/a.mkv",
            vec![
                ChapterEntry::new(1, "1/1000", 0, 60_000).with_title("Opening"),
                ChapterEntry::new(2, "1/1000", 60_000, 120_000),
            ],
        )
    }

    #[test]
    fn edits_shadow_probed_fields() {
        let mut chapters = list();
        assert!(!chapters.is_modified());

        let entry = chapters.entry_mut(1).unwrap();
        entry.set_title("Part; Two");
        entry.set_end(125_000);
        assert_eq!(entry.title(), Some("Part; Two"));
        assert_eq!(entry.end(), 125_000);
        assert_eq!(entry.start(), 60_000);
        assert!(chapters.is_modified());

        chapters.entry_mut(1).unwrap().revert();
        assert!(!chapters.is_modified());
    }

    #[test]
    fn serializes_chapter_blocks_in_field_order() {
        let mut chapters = list();
        chapters.entry_mut(1).unwrap().set_title("Part; Two");

        let expected = "\
;FFMETADATA1
[CHAPTER]
TIMEBASE=1/1000
START=0
END=60000
title=Opening
[CHAPTER]
TIMEBASE=1/1000
START=60000
END=120000
title=Part\\; Two
";
        assert_eq!(chapters.to_metadata(), expected);
    }

    #[test]
    fn start_seconds_follow_time_base() {
        let entry = ChapterEntry::new(1, "1/1000", 90_500, 100_000);
        assert_eq!(entry.start_secs(), 90.5);
        assert_eq!(empty_metadata(), ";FFMETADATA1\n");
    }
}
