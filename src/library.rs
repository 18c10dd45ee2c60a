//! Process-wide identity maps and the caller-facing operations over them.
//!
//! Containers are tombstoned rather than deleted so running executions and
//! other containers can keep referring to their tracks.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyzer::{ProbeResult, Prober};
use crate::chapters::ChapterList;
use crate::container::{ContainerRef, FormatInfo, OutputContainer, SourceContainer};
use crate::error::{
    EntityKind, Error, ImportBatchError, ImportError, MixError, NotFound, Result,
};
use crate::ids::{ChapterListId, ContainerId, IdAllocator, TrackId};
use crate::mixer::{
    self, Engine, MixCommand, MixPlan, MixRequest, StatusCallback, StatusSnapshot,
};
use crate::tracks::{ArgStyle, Track};

#[derive(Debug, Default)]
pub struct Library {
    ids: IdAllocator,
    style: ArgStyle,
    tracks: HashMap<TrackId, Track>,
    sources: BTreeMap<ContainerId, SourceContainer>,
    outputs: BTreeMap<ContainerId, OutputContainer>,
    chapter_lists: HashMap<ChapterListId, ChapterList>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `style` when rendering engine arguments
    pub fn with_style(style: ArgStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    pub fn style(&self) -> ArgStyle {
        self.style
    }

    // Lookups

    pub fn track(&self, id: TrackId) -> Result<&Track, NotFound> {
        self.tracks
            .get(&id)
            .ok_or_else(|| NotFound::new(EntityKind::Track, id))
    }

    pub fn track_mut(&mut self, id: TrackId) -> Result<&mut Track, NotFound> {
        self.tracks
            .get_mut(&id)
            .ok_or_else(|| NotFound::new(EntityKind::Track, id))
    }

    pub fn source(&self, id: ContainerId) -> Result<&SourceContainer, NotFound> {
        self.sources
            .get(&id)
            .filter(|c| !c.is_removed())
            .ok_or_else(|| NotFound::new(EntityKind::SourceContainer, id))
    }

    fn source_mut(&mut self, id: ContainerId) -> Result<&mut SourceContainer, NotFound> {
        self.sources
            .get_mut(&id)
            .filter(|c| !c.is_removed())
            .ok_or_else(|| NotFound::new(EntityKind::SourceContainer, id))
    }

    pub fn output(&self, id: ContainerId) -> Result<&OutputContainer, NotFound> {
        self.outputs
            .get(&id)
            .filter(|c| !c.is_removed())
            .ok_or_else(|| NotFound::new(EntityKind::OutputContainer, id))
    }

    pub fn output_mut(&mut self, id: ContainerId) -> Result<&mut OutputContainer, NotFound> {
        self.outputs
            .get_mut(&id)
            .filter(|c| !c.is_removed())
            .ok_or_else(|| NotFound::new(EntityKind::OutputContainer, id))
    }

    pub fn chapter_list(&self, id: ChapterListId) -> Result<&ChapterList, NotFound> {
        self.chapter_lists
            .get(&id)
            .ok_or_else(|| NotFound::new(EntityKind::ChapterList, id))
    }

    pub fn chapter_list_mut(&mut self, id: ChapterListId) -> Result<&mut ChapterList, NotFound> {
        self.chapter_lists
            .get_mut(&id)
            .ok_or_else(|| NotFound::new(EntityKind::ChapterList, id))
    }

    // Enumeration, tombstones filtered

    pub fn sources(&self) -> impl Iterator<Item = &SourceContainer> {
        self.sources.values().filter(|c| !c.is_removed())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputContainer> {
        self.outputs.values().filter(|c| !c.is_removed())
    }

    /// Live containers of both kinds, in creation order
    pub fn containers(&self) -> Vec<ContainerRef<'_>> {
        let mut all: Vec<ContainerRef<'_>> = self
            .sources()
            .map(ContainerRef::Source)
            .chain(self.outputs().map(ContainerRef::Output))
            .collect();
        all.sort_by_key(|c| c.id());
        all
    }

    /// Tombstone a container of either kind
    pub fn remove_container(&mut self, id: ContainerId) -> Result<(), NotFound> {
        if let Ok(source) = self.source_mut(id) {
            source.removed = true;
        } else if let Ok(output) = self.output_mut(id) {
            output.removed = true;
        } else {
            return Err(NotFound::new(EntityKind::Container, id));
        }
        info!("Removed container {}", id);
        Ok(())
    }

    // Import

    /// Probe `paths` in parallel and add one source container per file.
    ///
    /// All-or-nothing: if any file fails, nothing is added and every failure
    /// is reported.
    pub async fn import<P>(&mut self, prober: Arc<P>, paths: &[PathBuf]) -> Result<Vec<ContainerId>>
    where
        P: Prober + 'static,
    {
        let mut set = JoinSet::new();
        let mut tasks = HashMap::with_capacity(paths.len());
        for (position, path) in paths.iter().cloned().enumerate() {
            let prober = Arc::clone(&prober);
            let task_path = path.clone();
            let handle = set.spawn(async move {
                let result = probe_file(prober.as_ref(), &task_path).await;
                (position, task_path, result)
            });
            tasks.insert(handle.id(), (position, path));
        }

        let mut probed = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, path, Ok(result))) => probed.push((position, path, result)),
                Ok((position, _, Err(e))) => failures.push((position, e)),
                Err(e) => {
                    warn!("Probe task failed: {}", e);
                    if let Some((position, path)) = tasks.remove(&e.id()) {
                        failures.push((
                            position,
                            ImportError::Interrupted {
                                path,
                                reason: e.to_string(),
                            },
                        ));
                    }
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(position, _)| *position);
            let failures: Vec<ImportError> = failures.into_iter().map(|(_, e)| e).collect();
            warn!("Import rejected: {} of {} file(s) failed", failures.len(), paths.len());
            return Err(Error::Import(ImportBatchError { failures }));
        }

        probed.sort_by_key(|(position, _, _)| *position);
        let ids = probed
            .into_iter()
            .map(|(_, path, result)| self.add_source(&path, &result))
            .collect();
        Ok(ids)
    }

    /// Build a source container from an already obtained probe result
    pub fn add_source(&mut self, path: &Path, probe: &ProbeResult) -> ContainerId {
        let id = self.ids.container();

        let mut tracks = Vec::with_capacity(probe.streams.len());
        for stream in &probe.streams {
            let track = Track::from_probe(&self.ids, path, stream);
            tracks.push(track.id());
            self.tracks.insert(track.id(), track);
        }

        let chapters = (!probe.chapters.is_empty()).then(|| {
            let list = ChapterList::from_probe(self.ids.chapter_list(), path, &probe.chapters);
            let list_id = list.id();
            self.chapter_lists.insert(list_id, list);
            list_id
        });

        info!(
            "Imported {} as container {} ({} track(s))",
            path.display(),
            id,
            tracks.len()
        );
        let container = SourceContainer::new(
            id,
            path,
            FormatInfo::from(&probe.format),
            probe.format.tags.clone(),
            tracks,
            chapters,
        );
        self.sources.insert(id, container);
        id
    }

    // Track duplication

    /// Copy a track without attaching it to any container
    pub fn copy_track(&mut self, id: TrackId) -> Result<TrackId, NotFound> {
        let copy = self.track(id)?.copy(&self.ids);
        let copy_id = copy.id();
        self.tracks.insert(copy_id, copy);
        debug!("Copied track {} as {}", id, copy_id);
        Ok(copy_id)
    }

    /// Copy a track of a source container and list the copy right after it
    pub fn duplicate_track(&mut self, container: ContainerId, track: TrackId) -> Result<TrackId, NotFound> {
        if !self.source(container)?.tracks().contains(&track) {
            return Err(NotFound::new(EntityKind::Track, track));
        }
        let copy_id = self.copy_track(track)?;
        let copy = &self.tracks[&copy_id];
        let source = self
            .sources
            .get_mut(&container)
            .ok_or_else(|| NotFound::new(EntityKind::SourceContainer, container))?;
        source.add_copied_track(copy, Some(track));
        Ok(copy_id)
    }

    /// Drop a copied track from a source container; originals are kept
    pub fn remove_copied_track(&mut self, container: ContainerId, track: TrackId) -> Result<(), NotFound> {
        let track = self
            .tracks
            .get(&track)
            .ok_or_else(|| NotFound::new(EntityKind::Track, track))?;
        let source = self
            .sources
            .get_mut(&container)
            .filter(|c| !c.is_removed())
            .ok_or_else(|| NotFound::new(EntityKind::SourceContainer, container))?;
        source.remove_copied_track(track);
        Ok(())
    }

    // Output editing

    pub fn create_output(&mut self) -> ContainerId {
        let id = self.ids.container();
        self.outputs.insert(id, OutputContainer::new(id));
        debug!("Created output container {}", id);
        id
    }

    pub fn set_output_path(&mut self, output: ContainerId, path: impl Into<PathBuf>) -> Result<(), NotFound> {
        self.output_mut(output)?.set_path(path);
        Ok(())
    }

    pub fn add_track(&mut self, output: ContainerId, track: TrackId) -> Result<(), NotFound> {
        self.track(track)?;
        self.output_mut(output)?.add_track(track);
        Ok(())
    }

    pub fn insert_track(&mut self, output: ContainerId, position: usize, track: TrackId) -> Result<(), NotFound> {
        self.track(track)?;
        self.output_mut(output)?.insert_track(position, track);
        Ok(())
    }

    pub fn remove_track(&mut self, output: ContainerId, track: TrackId) -> Result<(), NotFound> {
        if !self.output_mut(output)?.remove_track(track) {
            return Err(NotFound::new(EntityKind::Track, track));
        }
        Ok(())
    }

    pub fn move_track(&mut self, output: ContainerId, track: TrackId, position: usize) -> Result<(), NotFound> {
        if !self.output_mut(output)?.move_track(track, position) {
            return Err(NotFound::new(EntityKind::Track, track));
        }
        Ok(())
    }

    pub fn set_output_tag(
        &mut self,
        output: ContainerId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), NotFound> {
        self.output_mut(output)?.set_tag(name, value);
        Ok(())
    }

    pub fn unset_output_tag(&mut self, output: ContainerId, name: impl Into<String>) -> Result<(), NotFound> {
        self.output_mut(output)?.unset_tag(name);
        Ok(())
    }

    pub fn set_chapters(&mut self, output: ContainerId, chapters: Option<ChapterListId>) -> Result<(), NotFound> {
        if let Some(list) = chapters {
            self.chapter_list(list)?;
        }
        self.output_mut(output)?.set_chapters(chapters);
        Ok(())
    }

    // Execution

    /// Render the engine arguments for `output` without running anything
    pub fn preview(&self, output: ContainerId, metadata_path: &Path) -> Result<MixCommand> {
        let (container, path, tracks, chapters) = self.resolve(output)?;
        let plan = MixPlan::new(MixRequest {
            output: path,
            tracks: &tracks,
            tags: container.tag_edits(),
            chapters,
            style: self.style,
        })?;
        Ok(plan.render(metadata_path))
    }

    /// Start an execution of `output` on `engine`.
    ///
    /// Only precondition failures are returned; engine-side failures land
    /// in the status log and reach `callback`. Needs a tokio runtime.
    pub fn mix(
        &self,
        output: ContainerId,
        engine: &dyn Engine,
        mut callback: Option<StatusCallback>,
    ) -> Result<Uuid> {
        let (container, path, tracks, chapters) = self.resolve(output)?;
        let plan = MixPlan::new(MixRequest {
            output: path,
            tracks: &tracks,
            tags: container.tag_edits(),
            chapters,
            style: self.style,
        })?;

        let state = container.mix_state();
        if state.lock().state().is_active() {
            return Err(MixError::AlreadyMixing.into());
        }

        let scratch = write_metadata(&plan.chapter_metadata()).map_err(MixError::ChapterMetadata)?;
        let command = plan.render(scratch.path());
        let rendered = command.render(&engine.program());

        let (execution, begun) = {
            let mut state = state.lock();
            let execution = state.begin(rendered, plan.expected_duration())?;
            (execution, state.current().clone())
        };
        if let Some(callback) = callback.as_mut() {
            callback(&begun);
        }

        match engine.spawn(command.args) {
            Ok(handle) => {
                state.lock().attach(handle.terminate);
                tokio::spawn(mixer::drive(
                    state,
                    execution,
                    handle.events,
                    callback,
                    Some(scratch),
                ));
            }
            Err(e) => {
                warn!("Failed to start engine for output {}: {}", output, e);
                let snapshot = state
                    .lock()
                    .fail(execution, format!("Failed to start {}: {}", engine.program(), e));
                if let (Some(snapshot), Some(callback)) = (snapshot, callback.as_mut()) {
                    callback(&snapshot);
                }
            }
        }
        Ok(execution)
    }

    pub fn cancel(&self, output: ContainerId) -> Result<StatusSnapshot> {
        Ok(self.output(output)?.mix_state().lock().cancel()?)
    }

    /// Always rejected; the engine cannot suspend
    pub fn pause(&self, output: ContainerId) -> Result<StatusSnapshot> {
        Ok(self.output(output)?.mix_state().lock().pause()?)
    }

    pub fn status(&self, output: ContainerId) -> Result<StatusSnapshot, NotFound> {
        Ok(self.output(output)?.current_status())
    }

    pub fn status_log(&self, output: ContainerId) -> Result<Vec<StatusSnapshot>, NotFound> {
        Ok(self.output(output)?.status_log())
    }

    // Output container, its path and its tracks, checked in that order
    #[allow(clippy::type_complexity)]
    fn resolve(
        &self,
        output: ContainerId,
    ) -> Result<(&OutputContainer, &Path, Vec<&Track>, Option<&ChapterList>)> {
        let container = self.output(output)?;
        let path = container.path().ok_or(MixError::NoOutput)?;
        if container.tracks().is_empty() {
            return Err(MixError::NoIngredients.into());
        }
        let tracks = container
            .tracks()
            .iter()
            .map(|&id| self.track(id))
            .collect::<Result<Vec<_>, _>>()?;
        let chapters = container
            .chapters()
            .map(|id| self.chapter_list(id))
            .transpose()?;
        Ok((container, path, tracks, chapters))
    }
}

/// Access checks followed by the probe itself
async fn probe_file<P: Prober>(prober: &P, path: &Path) -> Result<ProbeResult, ImportError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ImportError::NoReadAccess {
            path: path.to_path_buf(),
        })?;
    if !metadata.is_file() {
        return Err(ImportError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    tokio::fs::File::open(path)
        .await
        .map_err(|_| ImportError::NoReadAccess {
            path: path.to_path_buf(),
        })?;

    prober
        .probe(path)
        .await
        .map_err(|source| ImportError::ProbeFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn write_metadata(text: &str) -> std::io::Result<NamedTempFile> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("trackmix-chapters-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};

    use crate::error::ProbeError;
    use crate::mixer::{EngineEvent, EngineFailure, EngineHandle, MixStatus};

    struct FakeProber {
        results: HashMap<PathBuf, serde_json::Value>,
    }

    impl Prober for FakeProber {
        fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeResult, ProbeError>> + Send {
            let result = match self.results.get(path) {
                Some(value) => serde_json::from_value(value.clone()).map_err(ProbeError::from),
                None => Err(ProbeError::Failed("Invalid data found".to_string())),
            };
            async move { result }
        }
    }

    type Spawned = (mpsc::UnboundedSender<EngineEvent>, oneshot::Receiver<()>);

    #[derive(Default)]
    struct FakeEngine {
        fail: bool,
        runs: Mutex<Vec<Vec<String>>>,
        handles: Mutex<Vec<Spawned>>,
    }

    impl FakeEngine {
        fn emit(&self, event: EngineEvent) {
            let handles = self.handles.lock();
            let (events, _) = handles.last().expect("engine was spawned");
            events.send(event).expect("driver is listening");
        }
    }

    impl Engine for FakeEngine {
        fn program(&self) -> String {
            "ffmpeg".to_string()
        }

        fn spawn(&self, args: Vec<String>) -> io::Result<EngineHandle> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"));
            }
            self.runs.lock().push(args);
            let (tx, events) = mpsc::unbounded_channel();
            let (terminate, terminate_rx) = oneshot::channel();
            self.handles.lock().push((tx, terminate_rx));
            Ok(EngineHandle { events, terminate })
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn probe_json() -> serde_json::Value {
        json!({
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "tags": {"DURATION": "00:00:10.000000000"}},
                {"index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2, "sample_rate": "48000"},
                {"index": 2, "codec_type": "subtitle", "codec_name": "subrip", "disposition": {"default": 1}}
            ],
            "format": {"format_name": "matroska,webm", "duration": "10.0", "tags": {"title": "Sample"}},
            "chapters": [
                {"id": 0, "time_base": "1/1000", "start": 0, "end": 5000, "tags": {"title": "Intro"}}
            ]
        })
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        a: PathBuf,
        b: PathBuf,
        prober: Arc<FakeProber>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mkv");
        let b = dir.path().join("b.mkv");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let prober = Arc::new(FakeProber {
            results: HashMap::from([(a.clone(), probe_json()), (b.clone(), probe_json())]),
        });
        Fixture {
            _dir: dir,
            a,
            b,
            prober,
        }
    }

    async fn imported() -> (Fixture, Library, ContainerId, ContainerId) {
        let fx = fixture();
        let mut library = Library::new();
        let ids = library
            .import(Arc::clone(&fx.prober), &[fx.a.clone(), fx.b.clone()])
            .await
            .unwrap();
        (fx, library, ids[0], ids[1])
    }

    #[tokio::test]
    async fn import_builds_source_containers() {
        let (fx, library, a, _) = imported().await;

        let source = library.source(a).unwrap();
        assert_eq!(source.path(), fx.a.as_path());
        assert_eq!(source.tracks().len(), 3);
        assert_eq!(source.format().format_name.as_deref(), Some("matroska,webm"));
        assert_eq!(source.tags().get("title").map(String::as_str), Some("Sample"));

        let video = library.track(source.tracks()[0]).unwrap();
        assert!(video.is_original());
        assert_eq!(video.resolution(), Some((1920, 1080)));
        assert_eq!(video.duration(), 10.0);

        let chapters = library.chapter_list(source.chapters().unwrap()).unwrap();
        assert_eq!(chapters.entries()[0].title(), Some("Intro"));
        assert_eq!(library.containers().len(), 2);
    }

    #[tokio::test]
    async fn import_is_all_or_nothing() {
        let fx = fixture();
        let missing = fx.a.with_file_name("missing.mkv");
        let unprobed = fx.a.with_file_name("c.mkv");
        std::fs::write(&unprobed, b"c").unwrap();
        let dir = fx.a.parent().unwrap().to_path_buf();

        let mut library = Library::new();
        let err = library
            .import(
                Arc::clone(&fx.prober),
                &[fx.a.clone(), missing, dir, unprobed],
            )
            .await
            .unwrap_err();

        let Error::Import(batch) = err else {
            panic!("expected an import error");
        };
        assert_eq!(batch.failures.len(), 3);
        assert!(matches!(batch.failures[0], ImportError::NoReadAccess { .. }));
        assert!(matches!(batch.failures[1], ImportError::NotAFile { .. }));
        assert!(matches!(batch.failures[2], ImportError::ProbeFailed { .. }));
        assert_eq!(library.sources().count(), 0);
    }

    struct PanickingProber {
        inner: Arc<FakeProber>,
        panics_on: PathBuf,
    }

    impl Prober for PanickingProber {
        fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeResult, ProbeError>> + Send {
            if path == self.panics_on {
                panic!("prober crashed on {}", path.display());
            }
            self.inner.probe(path)
        }
    }

    #[tokio::test]
    async fn crashed_probe_task_rejects_the_batch() {
        let fx = fixture();
        let prober = Arc::new(PanickingProber {
            inner: Arc::clone(&fx.prober),
            panics_on: fx.b.clone(),
        });

        let mut library = Library::new();
        let err = library
            .import(prober, &[fx.a.clone(), fx.b.clone()])
            .await
            .unwrap_err();

        let Error::Import(batch) = err else {
            panic!("expected an import error");
        };
        assert_eq!(batch.failures.len(), 1);
        assert!(matches!(&batch.failures[0], ImportError::Interrupted { path, .. } if *path == fx.b));
        assert_eq!(library.sources().count(), 0);
    }

    #[tokio::test]
    async fn lookups_report_kind_and_id() {
        let (_fx, mut library, a, _) = imported().await;
        let output = library.create_output();

        let err = library.track(TrackId::from_raw(999)).unwrap_err();
        assert_eq!(err, NotFound::new(EntityKind::Track, 999u64));
        assert_eq!(library.output(a).unwrap_err().kind, EntityKind::OutputContainer);
        assert_eq!(library.source(output).unwrap_err().kind, EntityKind::SourceContainer);
        assert!(library.add_track(output, TrackId::from_raw(999)).is_err());
        assert!(library.output(output).unwrap().tracks().is_empty());
    }

    #[tokio::test]
    async fn duplicate_inserts_after_original_and_protects_originals() {
        let (_fx, mut library, a, _) = imported().await;
        let originals = library.source(a).unwrap().tracks().to_vec();

        let copy = library.duplicate_track(a, originals[1]).unwrap();
        assert_eq!(
            library.source(a).unwrap().tracks(),
            &[originals[0], originals[1], copy, originals[2]]
        );
        assert!(!library.track(copy).unwrap().is_original());

        library.remove_copied_track(a, originals[1]).unwrap();
        library.remove_copied_track(a, copy).unwrap();
        assert_eq!(library.source(a).unwrap().tracks(), originals.as_slice());
        // the copy still exists, only unlisted
        assert!(library.track(copy).is_ok());
    }

    #[tokio::test]
    async fn removed_containers_are_hidden() {
        let (_fx, mut library, a, b) = imported().await;
        let track = library.source(a).unwrap().tracks()[0];
        library.remove_container(a).unwrap();

        assert!(library.source(a).is_err());
        assert_eq!(library.sources().map(|s| s.id()).collect::<Vec<_>>(), vec![b]);
        assert!(library.track(track).is_ok());
        assert_eq!(
            library.remove_container(a).unwrap_err(),
            NotFound::new(EntityKind::Container, a)
        );
    }

    #[tokio::test]
    async fn mix_preconditions_leave_state_idle() {
        let (fx, mut library, a, _) = imported().await;
        let engine = FakeEngine::default();
        let output = library.create_output();

        let err = library.mix(output, &engine, None).unwrap_err();
        assert!(matches!(err, Error::Mix(MixError::NoOutput)));

        library.set_output_path(output, "/out/mix.mkv").unwrap();
        let err = library.mix(output, &engine, None).unwrap_err();
        assert!(matches!(err, Error::Mix(MixError::NoIngredients)));

        let video = library.source(a).unwrap().tracks()[0];
        library.add_track(output, video).unwrap();
        library.set_output_path(output, &fx.a).unwrap();
        let err = library.mix(output, &engine, None).unwrap_err();
        match err {
            Error::Mix(MixError::InvalidOutput { track_ids }) => assert_eq!(track_ids, vec![video]),
            other => panic!("unexpected error: {other}"),
        }

        assert!(engine.runs.lock().is_empty());
        assert_eq!(library.status(output).unwrap().state, MixStatus::Idle);
        assert_eq!(library.status_log(output).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mix_runs_and_records_lifecycle() {
        let (fx, mut library, a, b) = imported().await;
        let engine = FakeEngine::default();
        let output = library.create_output();
        library.set_output_path(output, fx.a.with_file_name("out.mkv")).unwrap();

        let video = library.source(a).unwrap().tracks()[0];
        let audio = library.source(a).unwrap().tracks()[1];
        let subtitle = library.source(b).unwrap().tracks()[2];
        library.track_mut(subtitle).unwrap().set_delay(2.0);
        for track in [video, audio, subtitle] {
            library.add_track(output, track).unwrap();
        }
        library.set_output_tag(output, "title", "Mixed").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        library
            .mix(
                output,
                &engine,
                Some(Box::new(move |s: &StatusSnapshot| sink.lock().push(s.state))),
            )
            .unwrap();

        let args = engine.runs.lock()[0].clone();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        let offset = args.iter().position(|a| a == "-itsoffset").unwrap();
        assert_eq!(args[offset + 1], "2");
        assert_eq!(args[offset + 3], fx.b.to_string_lossy());
        assert!(library.status(output).unwrap().command.unwrap().starts_with("ffmpeg -f ffmetadata"));

        engine.emit(EngineEvent::Progress(Default::default()));
        engine.emit(EngineEvent::Done);
        settle().await;

        assert_eq!(
            *seen.lock(),
            vec![MixStatus::Mixing, MixStatus::Mixing, MixStatus::Done]
        );
        assert_eq!(library.status(output).unwrap().state, MixStatus::Done);

        // a finished execution can be started again
        library.mix(output, &engine, None).unwrap();
        assert_eq!(engine.runs.lock().len(), 2);
    }

    #[tokio::test]
    async fn cancel_suppresses_the_kill_error() {
        let (fx, mut library, a, _) = imported().await;
        let engine = FakeEngine::default();
        let output = library.create_output();
        library.set_output_path(output, fx.a.with_file_name("out.mkv")).unwrap();
        let audio = library.source(a).unwrap().tracks()[1];
        library.add_track(output, audio).unwrap();

        assert!(matches!(
            library.cancel(output),
            Err(Error::Mix(MixError::NotStarted))
        ));

        library.mix(output, &engine, None).unwrap();
        assert!(matches!(
            library.mix(output, &engine, None),
            Err(Error::Mix(MixError::AlreadyMixing))
        ));
        assert!(matches!(
            library.pause(output),
            Err(Error::Mix(MixError::PauseUnsupported))
        ));

        let canceled = library.cancel(output).unwrap();
        assert_eq!(canceled.state, MixStatus::Canceled);
        {
            let mut handles = engine.handles.lock();
            assert!(handles[0].1.try_recv().is_ok());
        }
        let entries = library.status_log(output).unwrap().len();

        engine.emit(EngineEvent::Error(EngineFailure {
            message: "ffmpeg was killed with signal SIGTERM".to_string(),
            terminated: true,
        }));
        settle().await;

        assert_eq!(library.status_log(output).unwrap().len(), entries);
        assert_eq!(library.status(output).unwrap().state, MixStatus::Canceled);
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded_not_returned() {
        let (fx, mut library, a, _) = imported().await;
        let engine = FakeEngine {
            fail: true,
            ..Default::default()
        };
        let output = library.create_output();
        library.set_output_path(output, fx.a.with_file_name("out.mkv")).unwrap();
        library.add_track(output, library.source(a).unwrap().tracks()[0]).unwrap();

        library.mix(output, &engine, None).unwrap();
        let status = library.status(output).unwrap();
        assert_eq!(status.state, MixStatus::Error);
        assert!(status.error.unwrap().contains("ffmpeg not found"));
    }

    #[tokio::test]
    async fn copied_track_converted_to_opus_in_preview() {
        let (fx, mut library, a, _) = imported().await;
        let audio = library.source(a).unwrap().tracks()[1];
        let copy = library.duplicate_track(a, audio).unwrap();
        library
            .track_mut(copy)
            .unwrap()
            .convert(&json!({"codec": "opus", "bitrate": 192000}))
            .unwrap();

        let output = library.create_output();
        library.set_output_path(output, fx.a.with_file_name("out.mkv")).unwrap();
        library.add_track(output, audio).unwrap();
        library.add_track(output, copy).unwrap();

        let command = library.preview(output, Path::new("/tmp/meta.txt")).unwrap();
        let args = command.args;
        let libopus = args.iter().position(|a| a == "libopus").unwrap();
        assert_eq!(args[libopus - 1], "-c:1");
        assert_eq!(args[libopus + 1], "-b:1");
        assert_eq!(args[libopus + 2], "192000");
        assert!(args.windows(2).any(|w| w[0] == "-c:0" && w[1] == "copy"));
        // both tracks come from one input
        assert_eq!(command.input_count, 2);
    }
}
