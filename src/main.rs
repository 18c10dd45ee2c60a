use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};
use walkdir::WalkDir;

use trackmix::Library;
use trackmix::analyzer::FfprobeProber;
use trackmix::config::AppConfig;
use trackmix::container::SourceContainer;
use trackmix::ids::{ContainerId, TrackId};
use trackmix::mixer::{FfmpegEngine, MixStatus, StatusSnapshot};
use trackmix::tracks::{Track, TrackType};
use trackmix::utils::{self, DependencyStatus, format_duration, format_file_size};

/// Select, edit and remux tracks from several media files with ffmpeg
#[derive(Parser, Debug)]
#[command(name = "trackmix", version, about)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the containers, tracks and chapters of media files
    Probe {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Build one output file from tracks of the inputs
    Mix(MixArgs),
    /// Verify that ffmpeg and ffprobe can be run
    Check,
}

#[derive(Args, Debug)]
struct MixArgs {
    /// Output file (default: next to the first input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Select a track as INPUT:STREAM (0-based); all tracks when omitted
    #[arg(long = "track", value_name = "INPUT:STREAM", value_parser = parse_track_ref)]
    tracks: Vec<TrackRef>,

    /// Add a copy of a track after the selected ones
    #[arg(long = "copy", value_name = "INPUT:STREAM", value_parser = parse_track_ref)]
    copies: Vec<TrackRef>,

    /// Offset a selected track in time
    #[arg(long = "delay", value_name = "INPUT:STREAM=SECONDS", value_parser = parse_delay)]
    delays: Vec<(TrackRef, f64)>,

    /// Convert a selected audio track to opus at the given bitrate
    #[arg(long = "opus", value_name = "INPUT:STREAM=BITRATE", value_parser = parse_opus)]
    opus: Vec<(TrackRef, u64)>,

    /// Set a container tag
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Clear a container tag
    #[arg(long = "untag", value_name = "KEY")]
    untags: Vec<String>,

    /// Print the ffmpeg command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Input files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

/// Stream `stream` of input number `input`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackRef {
    input: usize,
    stream: usize,
}

fn parse_track_ref(s: &str) -> Result<TrackRef, String> {
    let (input, stream) = s
        .split_once(':')
        .ok_or_else(|| format!("expected INPUT:STREAM, got '{}'", s))?;
    Ok(TrackRef {
        input: input.trim().parse().map_err(|_| format!("invalid input number '{}'", input))?,
        stream: stream.trim().parse().map_err(|_| format!("invalid stream index '{}'", stream))?,
    })
}

fn parse_assignment<T: std::str::FromStr>(s: &str) -> Result<(TrackRef, T), String> {
    let (track, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INPUT:STREAM=VALUE, got '{}'", s))?;
    let value = value.trim().parse().map_err(|_| format!("invalid value '{}'", value))?;
    Ok((parse_track_ref(track)?, value))
}

fn parse_delay(s: &str) -> Result<(TrackRef, f64), String> {
    parse_assignment(s)
}

fn parse_opus(s: &str) -> Result<(TrackRef, u64), String> {
    parse_assignment(s)
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = utils::init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load(),
    };
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Probe { paths } => probe(&config, &paths).await,
        Command::Mix(args) => mix(&config, args).await,
        Command::Check => check(&config),
    }
}

/// Expand directories into their media files and make every path absolute
fn expand_inputs(config: &AppConfig, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let depth = if config.import.recursive { usize::MAX } else { 1 };
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .max_depth(depth)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && config.import.accepts(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            debug!("Expanded {} into {} file(s)", path.display(), found.len());
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
        .into_iter()
        .map(|p| std::path::absolute(&p).with_context(|| format!("Invalid path {}", p.display())))
        .collect()
}

async fn import(config: &AppConfig, paths: &[PathBuf]) -> Result<(Library, Vec<ContainerId>)> {
    let files = expand_inputs(config, paths)?;
    if files.is_empty() {
        bail!("No media files found");
    }
    let prober = Arc::new(FfprobeProber::new(&config.engine.ffprobe_path));
    let mut library = Library::with_style(config.arg_style());
    let sources = library.import(prober, &files).await?;
    Ok((library, sources))
}

async fn probe(config: &AppConfig, paths: &[PathBuf]) -> Result<()> {
    let (library, sources) = import(config, paths).await?;
    for (position, id) in sources.iter().enumerate() {
        let source = library.source(*id)?;
        print_source(&library, position, source)?;
    }
    Ok(())
}

fn print_source(library: &Library, position: usize, source: &SourceContainer) -> Result<()> {
    let format = source.format();
    println!(
        "Input {}: {} [{}]",
        position,
        source.path().display(),
        format.format_name.as_deref().unwrap_or("unknown format")
    );
    println!(
        "  duration {}, size {}",
        format.duration.map(format_duration).unwrap_or_else(|| "?".to_string()),
        format.size.map(format_file_size).unwrap_or_else(|| "?".to_string()),
    );
    for (key, value) in source.tags() {
        println!("  {}: {}", key, value);
    }

    for &id in source.tracks() {
        let track = library.track(id)?;
        println!("  {}", describe_track(track));
    }

    if let Some(list) = source.chapters() {
        let chapters = library.chapter_list(list)?;
        println!("  {} chapter(s)", chapters.len());
        for entry in chapters.entries() {
            println!(
                "    {} {}",
                format_duration(entry.start_secs()),
                entry.title().unwrap_or("")
            );
        }
    }
    Ok(())
}

fn describe_track(track: &Track) -> String {
    let mut line = format!("#{} {} {}", track.index(), track.track_type(), track.codec());
    match track.track_type() {
        TrackType::Video => {
            if let Some((w, h)) = track.resolution() {
                line.push_str(&format!(" {}x{}", w, h));
            }
        }
        TrackType::Audio => {
            if let Some(channels) = track.channels() {
                line.push_str(&format!(" {}ch", channels));
            }
            if let Some(rate) = track.sample_rate() {
                line.push_str(&format!(" {} Hz", rate));
            }
        }
        TrackType::Attachment => {
            if let Some(name) = track.filename() {
                line.push_str(&format!(" {}", name));
            }
        }
        TrackType::Subtitle | TrackType::Data => {}
    }
    if let Some(bitrate) = track.bitrate() {
        line.push_str(&format!(" {} kb/s", bitrate / 1000));
    }
    let duration = track.duration();
    if duration > 0.0 {
        line.push_str(&format!(" {}", format_duration(duration)));
    }
    for key in ["language", "title"] {
        if let Some(value) = track.tag(key) {
            line.push_str(&format!(" {}={}", key, value));
        }
    }
    let flags: Vec<String> = track
        .dispositions()
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
    if !flags.is_empty() {
        line.push_str(&format!(" ({})", flags.join(", ")));
    }
    line
}

fn lookup(library: &Library, sources: &[ContainerId], r: TrackRef) -> Result<TrackId> {
    let container = sources
        .get(r.input)
        .ok_or_else(|| anyhow!("No input number {}", r.input))?;
    let source = library.source(*container)?;
    source
        .tracks()
        .iter()
        .copied()
        .find(|&id| library.track(id).is_ok_and(|t| t.index() == r.stream))
        .ok_or_else(|| anyhow!("Input {} has no stream {}", r.input, r.stream))
}

async fn mix(config: &AppConfig, args: MixArgs) -> Result<()> {
    let (mut library, sources) = import(config, &args.inputs).await?;
    let output = library.create_output();

    let first_input = library.source(sources[0])?.path().to_path_buf();
    let output_path = match &args.output {
        Some(path) => std::path::absolute(path).context("Invalid output path")?,
        None => config.default_output(&first_input),
    };
    library.set_output_path(output, &output_path)?;

    // (reference, selected track), in output order
    let mut selected: Vec<(TrackRef, TrackId)> = Vec::new();
    if args.tracks.is_empty() && args.copies.is_empty() {
        for (input, &container) in sources.iter().enumerate() {
            for &id in library.source(container)?.tracks() {
                let stream = library.track(id)?.index();
                selected.push((TrackRef { input, stream }, id));
            }
        }
    } else {
        for &r in &args.tracks {
            selected.push((r, lookup(&library, &sources, r)?));
        }
        for &r in &args.copies {
            let original = lookup(&library, &sources, r)?;
            let copy = library.duplicate_track(sources[r.input], original)?;
            selected.push((r, copy));
        }
    }
    for &(_, id) in &selected {
        library.add_track(output, id)?;
    }

    // edits go to the last selected track for a reference
    let target = |r: TrackRef| {
        selected
            .iter()
            .rev()
            .find(|(sel, _)| *sel == r)
            .map(|&(_, id)| id)
            .ok_or_else(|| anyhow!("Track {}:{} is not selected", r.input, r.stream))
    };
    for &(r, seconds) in &args.delays {
        library.track_mut(target(r)?)?.set_delay(seconds);
    }
    for &(r, bitrate) in &args.opus {
        library
            .track_mut(target(r)?)?
            .convert(&json!({"codec": "opus", "bitrate": bitrate}))
            .with_context(|| format!("Cannot convert track {}:{}", r.input, r.stream))?;
    }
    for (key, value) in &args.tags {
        library.set_output_tag(output, key, value)?;
    }
    for key in &args.untags {
        library.unset_output_tag(output, key)?;
    }
    let chapters = sources
        .iter()
        .find_map(|&id| library.source(id).ok().and_then(|s| s.chapters()));
    library.set_chapters(output, chapters)?;

    if args.dry_run {
        let command = library.preview(output, Path::new("chapters.ffmetadata"))?;
        let mut full = command.clone();
        full.args = FfmpegEngine::full_args(&command.args);
        println!("{}", full.render(&config.engine.ffmpeg_path.to_string_lossy()));
        return Ok(());
    }

    run(&library, output, &FfmpegEngine::new(&config.engine.ffmpeg_path)).await?;
    println!("Wrote {}", output_path.display());
    Ok(())
}

/// Run the execution until it reaches a terminal state; Ctrl-C cancels
async fn run(library: &Library, output: ContainerId, engine: &FfmpegEngine) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusSnapshot>();
    library.mix(
        output,
        engine,
        Some(Box::new(move |snapshot: &StatusSnapshot| {
            let _ = tx.send(snapshot.clone());
        })),
    )?;

    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                report(&snapshot);
                if snapshot.state.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, canceling execution");
                match library.cancel(output) {
                    Ok(snapshot) => report(&snapshot),
                    Err(e) => debug!("Cancel ignored: {}", e),
                }
                // wait for the engine to exit
                while rx.recv().await.is_some() {}
                break;
            }
        }
    }
    eprintln!();

    let status = library.status(output)?;
    match status.state {
        MixStatus::Done => Ok(()),
        MixStatus::Canceled => bail!("Canceled"),
        _ => Err(anyhow!(
            status.error.unwrap_or_else(|| "ffmpeg did not finish".to_string())
        )),
    }
}

fn report(snapshot: &StatusSnapshot) {
    match (&snapshot.state, &snapshot.progress) {
        (MixStatus::Mixing, Some(progress)) => {
            let percent = progress
                .percent
                .map(|p| format!("{:5.1}%", p))
                .unwrap_or_else(|| "  ?  ".to_string());
            let size = progress.target_size.map(format_file_size).unwrap_or_default();
            let time = progress.timemark.as_deref().unwrap_or("-");
            eprint!("\r{} {} {}    ", percent, time, size);
        }
        (MixStatus::Mixing, None) => {
            if let Some(command) = &snapshot.command {
                debug!("{}", command);
            }
        }
        (state, _) => eprint!("\r{:?}    ", state),
    }
}

fn check(config: &AppConfig) -> Result<()> {
    let status = DependencyStatus::check(&config.engine);
    println!("config:  {}", AppConfig::config_path().display());
    println!(
        "ffmpeg:  {} ({})",
        config.engine.ffmpeg_path.display(),
        if status.ffmpeg { "ok" } else { "missing" }
    );
    println!(
        "ffprobe: {} ({})",
        config.engine.ffprobe_path.display(),
        if status.ffprobe { "ok" } else { "missing" }
    );
    if !status.all_present() {
        bail!("Required tools are missing");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_references() {
        assert_eq!(
            parse_track_ref("1:3").unwrap(),
            TrackRef {
                input: 1,
                stream: 3
            }
        );
        assert!(parse_track_ref("1").is_err());
        assert!(parse_track_ref("a:1").is_err());

        let (r, delay) = parse_delay("0:2=-1.5").unwrap();
        assert_eq!(r.stream, 2);
        assert_eq!(delay, -1.5);
        assert_eq!(parse_opus("0:1=192000").unwrap().1, 192_000);
        assert!(parse_opus("0:1=fast").is_err());
        assert_eq!(
            parse_tag("title=A = B").unwrap(),
            ("title".to_string(), "A = B".to_string())
        );
    }

    #[test]
    fn cli_accepts_mix_options() {
        let cli = Cli::try_parse_from([
            "trackmix", "mix", "-o", "out.mkv", "--track", "0:0", "--copy", "0:1", "--opus",
            "0:1=128000", "--tag", "title=Film", "--untag", "comment", "--dry-run", "a.mkv",
        ])
        .unwrap();
        let Command::Mix(args) = cli.command else {
            panic!("expected mix");
        };
        assert_eq!(args.tracks.len(), 1);
        assert_eq!(args.copies.len(), 1);
        assert_eq!(args.opus[0].1, 128_000);
        assert!(args.dry_run);
        assert_eq!(args.inputs, vec![PathBuf::from("a.mkv")]);
    }
}
