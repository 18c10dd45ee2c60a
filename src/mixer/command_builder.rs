//! Engine argument synthesis for an output container.
//!
//! Tracks are grouped into engine inputs by `(source path, delay)`, since the
//! time offset is an input-level property. Per-track argument groups are then
//! ordered by output slot, because the engine numbers output streams in the
//! order their mapping arguments appear.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::chapters::{ChapterList, empty_metadata};
use crate::error::MixError;
use crate::overlay::TagEdit;
use crate::tracks::options::render_offset;
use crate::tracks::{ArgStyle, Track};

/// Everything the synthesizer reads from an output container
#[derive(Debug, Clone, Copy)]
pub struct MixRequest<'a> {
    pub output: &'a Path,
    /// Tracks in output order
    pub tracks: &'a [&'a Track],
    pub tags: &'a BTreeMap<String, TagEdit>,
    pub chapters: Option<&'a ChapterList>,
    pub style: ArgStyle,
}

/// One engine input: a source file at one time offset
#[derive(Debug)]
pub struct InputGroup<'a> {
    pub path: &'a Path,
    pub delay_ms: i64,
    /// `(output slot, track)` in output order
    pub tracks: Vec<(usize, &'a Track)>,
}

// Sort key of an argument group; chapter mapping precedes every track slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Chapters,
    Track(usize),
}

/// Grouped, collision-checked inputs ready to render
#[derive(Debug)]
pub struct MixPlan<'a> {
    request: MixRequest<'a>,
    inputs: Vec<InputGroup<'a>>,
    custom_chapters: Option<String>,
}

/// Rendered argument list plus the chapter metadata input text
#[derive(Debug, Clone, PartialEq)]
pub struct MixCommand {
    pub args: Vec<String>,
    /// Number of `-i` inputs, the chapter input included
    pub input_count: usize,
    /// Contents expected at the chapter metadata path
    pub chapter_metadata: String,
}

impl MixCommand {
    /// Shell-like rendering for logs and status snapshots
    pub fn render(&self, program: &str) -> String {
        let mut line = program.to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("'{}'", arg.replace('\'', "'\\''")));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl<'a> MixPlan<'a> {
    /// Group tracks into inputs and reject outputs that overwrite an input
    pub fn new(request: MixRequest<'a>) -> Result<Self, MixError> {
        if request.tracks.is_empty() {
            return Err(MixError::NoIngredients);
        }

        let inputs = group_inputs(request.tracks);

        let output = resolve_path(request.output);
        let colliding: Vec<_> = inputs
            .iter()
            .filter(|input| resolve_path(input.path) == output)
            .flat_map(|input| input.tracks.iter().map(|(_, track)| track.id()))
            .collect();
        if !colliding.is_empty() {
            return Err(MixError::InvalidOutput {
                track_ids: colliding,
            });
        }

        let custom_chapters = request
            .chapters
            .filter(|list| list.is_modified())
            .map(ChapterList::to_metadata);

        Ok(Self {
            request,
            inputs,
            custom_chapters,
        })
    }

    pub fn inputs(&self) -> &[InputGroup<'a>] {
        &self.inputs
    }

    /// Text for the leading chapter input
    pub fn chapter_metadata(&self) -> String {
        self.custom_chapters.clone().unwrap_or_else(empty_metadata)
    }

    /// Longest selected track, in seconds
    pub fn expected_duration(&self) -> Option<f64> {
        self.request
            .tracks
            .iter()
            .map(|track| track.duration())
            .reduce(f64::max)
            .filter(|d| *d > 0.0)
    }

    /// Render the final argument list with the chapter input at `metadata_path`
    pub fn render(&self, metadata_path: &Path) -> MixCommand {
        let mut declarations = vec![
            "-f".to_string(),
            "ffmetadata".to_string(),
            "-i".to_string(),
            metadata_path.to_string_lossy().to_string(),
        ];
        let mut groups: Vec<(Slot, Vec<String>)> = Vec::new();
        let chapter_source = self.request.chapters.map(ChapterList::source_path);

        for (position, input) in self.inputs.iter().enumerate() {
            let input_index = position + 1;

            if input.delay_ms != 0 {
                declarations.extend(["-itsoffset".to_string(), render_offset(input.delay_ms)]);
            } else if self.custom_chapters.is_none() && chapter_source == Some(input.path) {
                groups.push((
                    Slot::Chapters,
                    vec!["-map_chapters".to_string(), input_index.to_string()],
                ));
            }

            declarations.extend(["-i".to_string(), input.path.to_string_lossy().to_string()]);

            for &(out, track) in &input.tracks {
                groups.push((
                    Slot::Track(out),
                    track.build_options_with(input_index, out, self.request.style),
                ));
            }
        }

        groups.sort_by_key(|(slot, _)| *slot);

        let mut args = declarations;
        args.extend(groups.into_iter().flat_map(|(_, group)| group));

        for (key, edit) in self.request.tags {
            args.extend(["-metadata".to_string(), self.request.style.metadata(key, edit)]);
        }

        args.push(self.request.output.to_string_lossy().to_string());

        MixCommand {
            args,
            input_count: self.inputs.len() + 1,
            chapter_metadata: self.chapter_metadata(),
        }
    }
}

/// Plan and render in one step
pub fn synthesize(request: MixRequest<'_>, metadata_path: &Path) -> Result<MixCommand, MixError> {
    Ok(MixPlan::new(request)?.render(metadata_path))
}

/// Resolve symlinks and `..` so two spellings of one file compare equal.
///
/// A path that does not exist yet (the usual output) is resolved through its
/// parent directory, falling back to a purely lexical cleanup.
pub fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let normalized = normalize(path);
    match (normalized.parent(), normalized.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(normalized),
        _ => normalized,
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

// path -> delay -> tracks, each level in order of first appearance
fn group_inputs<'a>(tracks: &[&'a Track]) -> Vec<InputGroup<'a>> {
    let mut by_path: Vec<(&'a Path, Vec<InputGroup<'a>>)> = Vec::new();

    for (out, &track) in tracks.iter().enumerate() {
        let path = track.source_path();
        let delay_ms = track.delay_ms();

        let at = match by_path.iter().position(|(p, _)| *p == path) {
            Some(at) => at,
            None => {
                by_path.push((path, Vec::new()));
                by_path.len() - 1
            }
        };
        let delays = &mut by_path[at].1;
        match delays.iter_mut().find(|group| group.delay_ms == delay_ms) {
            Some(group) => group.tracks.push((out, track)),
            None => delays.push(InputGroup {
                path,
                delay_ms,
                tracks: vec![(out, track)],
            }),
        }
    }

    by_path.into_iter().flat_map(|(_, groups)| groups).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::CodecType;
    use crate::chapters::ChapterEntry;
    use crate::ids::IdAllocator;
    use crate::tracks::tests::track;

    const META: &str = "/tmp/chapters.txt";

    fn request<'a>(
        output: &'a Path,
        tracks: &'a [&'a Track],
        tags: &'a BTreeMap<String, TagEdit>,
    ) -> MixRequest<'a> {
        MixRequest {
            output,
            tracks,
            tags,
            chapters: None,
            style: ArgStyle::default(),
        }
    }

    fn inputs(args: &[String]) -> Vec<String> {
        args.windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].clone())
            .collect()
    }

    fn maps(args: &[String]) -> Vec<String> {
        args.windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].clone())
            .collect()
    }

    #[test]
    fn three_tracks_two_files_one_delayed() {
        let ids = IdAllocator::new();
        let video = track(&ids, "/media/a.mkv", 0, CodecType::Video);
        let audio = track(&ids, "/media/a.mkv", 1, CodecType::Audio);
        let mut subtitle = track(&ids, "/media/b.mkv", 2, CodecType::Subtitle);
        subtitle.set_delay(2.0);

        let tracks = [&video, &audio, &subtitle];
        let tags = BTreeMap::new();
        let command = synthesize(
            request(Path::new("/out/mix.mkv"), &tracks, &tags),
            Path::new(META),
        )
        .unwrap();

        assert_eq!(command.input_count, 3);
        assert_eq!(inputs(&command.args), vec![META, "/media/a.mkv", "/media/b.mkv"]);

        let offset = command.args.iter().position(|a| a == "-itsoffset").unwrap();
        assert_eq!(command.args[offset + 1], "2");
        assert_eq!(command.args[offset + 2], "-i");
        assert_eq!(command.args[offset + 3], "/media/b.mkv");

        assert_eq!(maps(&command.args), vec!["1:0", "1:1", "2:2"]);
        assert_eq!(command.args.last().unwrap(), "/out/mix.mkv");
        assert_eq!(command.chapter_metadata, ";FFMETADATA1\n");
    }

    #[test]
    fn same_path_different_delays_are_distinct_inputs() {
        let ids = IdAllocator::new();
        let first = track(&ids, "/media/a.mkv", 1, CodecType::Audio);
        let mut second = first.copy(&ids);
        second.set_delay(0.5);
        let third = track(&ids, "/media/a.mkv", 0, CodecType::Video);

        let tracks = [&first, &second, &third];
        let tags = BTreeMap::new();
        let plan = MixPlan::new(request(Path::new("/out.mkv"), &tracks, &tags)).unwrap();

        assert_eq!(plan.inputs().len(), 2);
        assert_eq!(plan.inputs()[0].delay_ms, 0);
        assert_eq!(plan.inputs()[0].tracks.len(), 2);
        assert_eq!(plan.inputs()[1].delay_ms, 500);

        let command = plan.render(Path::new(META));
        assert_eq!(
            inputs(&command.args),
            vec![META, "/media/a.mkv", "/media/a.mkv"]
        );
        // output order wins over input grouping
        assert_eq!(maps(&command.args), vec!["1:1", "2:1", "1:0"]);
    }

    #[test]
    fn reordering_tracks_reorders_mappings_only() {
        let ids = IdAllocator::new();
        let a = track(&ids, "/media/a.mkv", 0, CodecType::Video);
        let b = track(&ids, "/media/b.mkv", 1, CodecType::Audio);
        let tags = BTreeMap::new();

        let forward = [&a, &b];
        let args = synthesize(request(Path::new("/o.mkv"), &forward, &tags), Path::new(META))
            .unwrap()
            .args;
        assert_eq!(maps(&args), vec!["1:0", "2:1"]);

        let reversed = [&b, &a];
        let args = synthesize(request(Path::new("/o.mkv"), &reversed, &tags), Path::new(META))
            .unwrap()
            .args;
        assert_eq!(inputs(&args), vec![META, "/media/b.mkv", "/media/a.mkv"]);
        assert_eq!(maps(&args), vec!["1:1", "2:0"]);
        let first_map = args.iter().position(|a| a == "-map").unwrap();
        assert_eq!(args[first_map + 2], "-c:0");
    }

    #[test]
    fn collision_names_every_colliding_track() {
        let ids = IdAllocator::new();
        let a = track(&ids, "/media/a.mkv", 0, CodecType::Video);
        let b = track(&ids, "/media/b.mkv", 0, CodecType::Video);
        let mut c = track(&ids, "/media/a.mkv", 1, CodecType::Audio);
        c.set_delay(1.0);

        let tracks = [&a, &b, &c];
        let tags = BTreeMap::new();
        let err = MixPlan::new(request(Path::new("/media/a.mkv"), &tracks, &tags)).unwrap_err();
        match err {
            MixError::InvalidOutput { track_ids } => assert_eq!(track_ids, vec![a.id(), c.id()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn collision_sees_through_dot_dot() {
        let ids = IdAllocator::new();
        let a = track(&ids, "/media/a.mkv", 0, CodecType::Video);
        let tracks = [&a];
        let tags = BTreeMap::new();

        for output in ["/media/sub/../a.mkv", "/media/./a.mkv", "/media//a.mkv"] {
            let err = MixPlan::new(request(Path::new(output), &tracks, &tags)).unwrap_err();
            assert!(
                matches!(&err, MixError::InvalidOutput { track_ids } if track_ids == &[a.id()]),
                "{output}: {err}"
            );
        }
        assert!(MixPlan::new(request(Path::new("/media/sub/../b.mkv"), &tracks, &tags)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn collision_sees_through_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.mkv");
        std::fs::write(&input, b"").unwrap();
        std::os::unix::fs::symlink(&input, dir.path().join("link.mkv")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("alias")).unwrap();

        let ids = IdAllocator::new();
        let a = track(&ids, input.to_str().unwrap(), 0, CodecType::Video);
        let tracks = [&a];
        let tags = BTreeMap::new();

        for output in [dir.path().join("link.mkv"), dir.path().join("alias").join("a.mkv")] {
            let err = MixPlan::new(request(&output, &tracks, &tags)).unwrap_err();
            assert!(matches!(err, MixError::InvalidOutput { .. }), "{}", output.display());
        }
        let fresh = dir.path().join("alias").join("out.mkv");
        assert!(MixPlan::new(request(&fresh, &tracks, &tags)).is_ok());
    }

    #[test]
    fn container_tags_follow_track_groups() {
        let ids = IdAllocator::new();
        let a = track(&ids, "/media/a.mkv", 0, CodecType::Video);
        let tracks = [&a];
        let tags = BTreeMap::from([
            ("comment".to_string(), TagEdit::Unset),
            ("title".to_string(), TagEdit::Set("My Film".to_string())),
        ]);
        let mut req = request(Path::new("/o.mkv"), &tracks, &tags);
        req.style = ArgStyle {
            pad_spaced_values: true,
        };
        let args = synthesize(req, Path::new(META)).unwrap().args;
        let n = args.len();
        assert_eq!(
            &args[n - 5..],
            &["-metadata", "comment=", "-metadata", "title=My Film ", "/o.mkv"]
        );
    }

    #[test]
    fn unmodified_chapters_map_from_their_source() {
        let ids = IdAllocator::new();
        let b = track(&ids, "/media/b.mkv", 0, CodecType::Video);
        let a = track(&ids, "/media/a.mkv", 1, CodecType::Audio);
        let mut chapters = ChapterList::new(
            ids.chapter_list(),
            "/media/a.mkv",
            vec![ChapterEntry::new(1, "1/1000", 0, 1000).with_title("One")],
        );

        let tracks = [&b, &a];
        let tags = BTreeMap::new();
        let mut req = request(Path::new("/o.mkv"), &tracks, &tags);
        req.chapters = Some(&chapters);
        let args = synthesize(req, Path::new(META)).unwrap().args;
        let at = args.iter().position(|a| a == "-map_chapters").unwrap();
        assert_eq!(args[at + 1], "2");
        assert!(at < args.iter().position(|a| a == "-map").unwrap());

        chapters.entry_mut(0).unwrap().set_title("Renamed");
        let mut req = request(Path::new("/o.mkv"), &tracks, &tags);
        req.chapters = Some(&chapters);
        let command = synthesize(req, Path::new(META)).unwrap();
        assert!(!command.args.contains(&"-map_chapters".to_string()));
        assert!(command.chapter_metadata.contains("title=Renamed"));
    }

    #[test]
    fn expected_duration_is_longest_track() {
        let ids = IdAllocator::new();
        let mut probe = crate::tracks::tests::stream(0, CodecType::Video, "h264");
        probe.duration = Some(30.0);
        let long = Track::from_probe(&ids, Path::new("/a.mkv"), &probe);
        let short = track(&ids, "/a.mkv", 1, CodecType::Audio);
        let tracks = [&short, &long];
        let tags = BTreeMap::new();
        let plan = MixPlan::new(request(Path::new("/o.mkv"), &tracks, &tags)).unwrap();
        assert_eq!(plan.expected_duration(), Some(30.0));
    }

    #[test]
    fn render_quotes_spaced_arguments() {
        let command = MixCommand {
            args: vec!["-i".to_string(), "/my files/a.mkv".to_string()],
            input_count: 1,
            chapter_metadata: String::new(),
        };
        assert_eq!(command.render("ffmpeg"), "ffmpeg -i '/my files/a.mkv'");
    }
}
