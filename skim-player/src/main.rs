//! skim-player binary
//!
//! Plays a recording through the skim engine, skipping or re-timing
//! portions according to a persisted analysis timeline.

use anyhow::{bail, Context, Result};
use clap::Parser;
use skim_common::PlayerConfig;
use skim_player::audio::decoder::SymphoniaReaderFactory;
use skim_player::audio::output::AudioOutput;
use skim_player::audio::reader::ReaderRegistry;
use skim_player::playback::session::PlaybackSession;
use skim_player::playback::timeline::{self, FragmentedTimeline, TMSection};
use skim_player::playback::worker::MediaSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "skim-player", about = "Timeline-driven media player")]
struct Args {
    /// Media file to play
    media: PathBuf,

    /// Persisted analysis timeline (JSON array of sections). Without it the
    /// whole recording plays unedited.
    #[arg(long)]
    timeline: Option<PathBuf>,

    /// Audio stream index within the container
    #[arg(long, default_value_t = 0)]
    stream_index: usize,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output device name (overrides configuration)
    #[arg(long)]
    device: Option<String>,

    /// Decode without opening an audio device (headless check)
    #[arg(long)]
    no_audio: bool,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.list_devices {
        for name in AudioOutput::list_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = PlayerConfig::load(args.config.as_deref())?;

    let mut registry = ReaderRegistry::new();
    let symphonia = Arc::new(SymphoniaReaderFactory);
    for extension in SymphoniaReaderFactory::EXTENSIONS {
        registry.register(extension, symphonia.clone());
    }
    let registry = Arc::new(registry);

    let media = MediaSource {
        path: args.media.clone(),
        stream_index: args.stream_index,
    };

    // Explicit timeline, else a cached one keyed to the recording, else the
    // whole stream unedited.
    let timeline_path = args.timeline.clone().or_else(|| {
        let cache_dir = config.cache_dir.as_ref()?;
        let stem = args.media.file_stem()?;
        let cached = cache_dir.join(format!("{}.timeline.json", stem.to_string_lossy()));
        cached.exists().then_some(cached)
    });

    let timeline = match &timeline_path {
        Some(path) => {
            let sections = timeline::load_sections(path)
                .with_context(|| format!("loading timeline {}", path.display()))?;
            info!("Loaded {} timeline sections from {}", sections.len(), path.display());
            FragmentedTimeline::from_sections(sections)
        }
        None => {
            // No analysis: one included section covering the whole stream.
            let stream = registry.probe(&media.path, media.stream_index)?;
            let Some(duration) = stream.duration else {
                bail!(
                    "{} does not report a duration; pass --timeline",
                    media.path.display()
                );
            };
            FragmentedTimeline::from_sections([TMSection::new(0.0, duration)?])
        }
    };

    let total = timeline.virtual_duration();
    let mut session = PlaybackSession::open(media, registry, timeline, &config)?;

    let device = args.device.as_deref().or(config.device.as_deref());
    let _output = if args.no_audio {
        None
    } else {
        Some(AudioOutput::start(
            device,
            session.spec(),
            session.buffer_handle(),
            session.playing_flag(),
            session.queue_handle(),
        )?)
    };

    session.play();
    info!("Playing {:.1}s of edited audio", total);

    let drain_frames = session.spec().sample_rate as usize;
    loop {
        std::thread::sleep(Duration::from_millis(500));

        if args.no_audio {
            // Headless: consume the buffer ourselves.
            session.buffer_handle().lock().unwrap().read(drain_frames);
        }
        if let Some(err) = session.take_error() {
            session.stop();
            bail!("playback failed: {err}");
        }

        info!(
            "position {:>6.1}s / {:.1}s (buffered {:.2}s)",
            session.position().min(total),
            total,
            session.buffered()
        );
        if session.decode_finished() && session.buffered() < 0.01 {
            break;
        }
    }

    session.stop();
    info!("Done");
    Ok(())
}
