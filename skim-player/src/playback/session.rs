//! Playback session
//!
//! Wires one media stream to the decode worker and owns everything the
//! control surface touches: the timeline, the control queue, the decoded
//! audio buffer, and the synchronization clock. All control is posted as
//! tasks and observed cooperatively by the worker; the session itself never
//! blocks on decoding.

use crate::audio::reader::ReaderRegistry;
use crate::audio::types::AudioSpec;
use crate::error::{Error, Result};
use crate::playback::audio_buffer::AudioBuffer;
use crate::playback::clock::SynchronizationClock;
use crate::playback::timeline::{FragmentedTimeline, TMSection};
use crate::playback::worker::{spawn_worker, ControlQueue, MediaSource, WorkerContext};
use skim_common::PlayerConfig;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tracing::{info, trace};

/// Playback position bookkeeping: the clock measures wall time since the
/// last seek, `base` anchors it to virtual time.
struct ClockState {
    clock: SynchronizationClock,
    base: f64,
}

/// One playback session over one media stream.
pub struct PlaybackSession {
    media: MediaSource,
    spec: AudioSpec,
    queue: Arc<ControlQueue>,
    buffer: Arc<Mutex<AudioBuffer>>,
    timeline: Arc<RwLock<FragmentedTimeline>>,
    clock: Mutex<ClockState>,
    playing: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<Error>>>,
    commands_posted: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    /// Open a session: probe the stream, size the buffer, start the decode
    /// worker. The session starts paused with the clock stopped.
    pub fn open(
        media: MediaSource,
        registry: Arc<ReaderRegistry>,
        timeline: FragmentedTimeline,
        config: &PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let stream = registry.probe(&media.path, media.stream_index)?;
        // Work at the source rate; layouts wider than stereo are averaged
        // down on ingest.
        let spec = AudioSpec::new(stream.sample_rate, stream.channels.min(2));
        info!(
            path = %media.path.display(),
            stream_index = media.stream_index,
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "opening playback session"
        );

        let buffer = Arc::new(Mutex::new(AudioBuffer::new(
            spec,
            config.buffer_duration,
            config.buffer_size_margin,
        )?));
        let timeline = Arc::new(RwLock::new(timeline));
        let done = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(None));
        let queue = Arc::new(ControlQueue::new());

        let commands_posted = Arc::new(AtomicU64::new(0));
        {
            let commands_posted = Arc::clone(&commands_posted);
            queue.add_observer(Arc::new(move || {
                let posted = commands_posted.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(posted, "control command posted");
            }));
        }

        let ctx = WorkerContext::new(
            media.clone(),
            registry,
            Arc::clone(&timeline),
            Arc::clone(&buffer),
            config.chunk_duration,
            config.seek_threshold,
            Arc::clone(&done),
            Arc::clone(&last_error),
        );
        let worker = spawn_worker(ctx, Arc::clone(&queue));

        Ok(Self {
            media,
            spec,
            queue,
            buffer,
            timeline,
            clock: Mutex::new(ClockState {
                clock: SynchronizationClock::new(),
                base: 0.0,
            }),
            playing: Arc::new(AtomicBool::new(false)),
            done,
            last_error,
            commands_posted,
            worker: Some(worker),
        })
    }

    pub fn media(&self) -> &MediaSource {
        &self.media
    }

    /// Working audio format of this session.
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Shared decoded-audio buffer; the output consumer reads from it at its
    /// own cadence.
    pub fn buffer_handle(&self) -> Arc<Mutex<AudioBuffer>> {
        Arc::clone(&self.buffer)
    }

    /// Control queue handle, e.g. for marshalling output-thread failures.
    pub fn queue_handle(&self) -> Arc<ControlQueue> {
        Arc::clone(&self.queue)
    }

    /// Shared flag the output consumer checks before pulling samples.
    pub fn playing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.playing)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Start or continue playback.
    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
        self.clock.lock().unwrap().clock.resume();
    }

    /// Pause playback, freezing the reported position.
    pub fn pause(&self) {
        self.playing.store(false, Ordering::Release);
        self.clock.lock().unwrap().clock.suspend();
    }

    /// Seek to a virtual timepoint. The command is observed by the worker at
    /// its next drain; the reported position re-anchors immediately.
    pub fn seek(&self, virtual_time: f64) {
        let target = virtual_time.max(0.0);
        self.queue
            .add_task("seek", move |ctx: &mut WorkerContext| ctx.seek(target));

        let mut state = self.clock.lock().unwrap();
        state.base = target;
        state.clock.stop();
        if self.playing.load(Ordering::Acquire) {
            state.clock.resume();
        }
    }

    /// Apply a fresh analysis section. This is the only mutation entry point
    /// exposed to analysis producers; the worker observes the grown timeline
    /// at its next drain.
    pub fn apply_section(&self, section: TMSection) {
        self.timeline.write().unwrap().add_or_update_section(section);
        self.queue.add_task("timeline-updated", |ctx: &mut WorkerContext| {
            ctx.timeline_updated()
        });
    }

    /// Advance the analyzed-scope watermark without adding a section (the
    /// analyzed span turned out to be fully excluded).
    pub fn extend_scope(&self, time_scope: f64) {
        self.timeline.write().unwrap().extend_time_scope(time_scope);
        self.queue.add_task("timeline-updated", |ctx: &mut WorkerContext| {
            ctx.timeline_updated()
        });
    }

    /// Current virtual playback position in seconds.
    pub fn position(&self) -> f64 {
        let state = self.clock.lock().unwrap();
        state.base + state.clock.seconds()
    }

    /// Total virtual duration currently mappable.
    pub fn virtual_duration(&self) -> f64 {
        self.timeline.read().unwrap().virtual_duration()
    }

    /// Seconds of decoded audio waiting in the buffer.
    pub fn buffered(&self) -> f64 {
        self.buffer.lock().unwrap().duration()
    }

    /// True once the worker has decoded everything reachable.
    pub fn decode_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Take the most recent worker-side error, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.last_error.lock().unwrap().take()
    }

    /// Control commands posted so far (observer-fed, for diagnostics).
    pub fn commands_posted(&self) -> u64 {
        self.commands_posted.load(Ordering::Relaxed)
    }

    /// Stop the session: enqueue a cooperative stop, join the worker, reset
    /// the clock. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.queue
                .add_task("stop", |ctx: &mut WorkerContext| ctx.request_stop());
            let _ = handle.join();
        }
        self.playing.store(false, Ordering::Release);
        let mut state = self.clock.lock().unwrap();
        state.clock.stop();
        state.base = 0.0;
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::testing::{RampFactory, RAMP_RATE};
    use std::path::PathBuf;
    use std::time::Duration;

    fn registry() -> Arc<ReaderRegistry> {
        let mut registry = ReaderRegistry::new();
        registry.register("ramp", Arc::new(RampFactory));
        Arc::new(registry)
    }

    fn open_session(timeline: FragmentedTimeline) -> PlaybackSession {
        PlaybackSession::open(
            MediaSource {
                path: PathBuf::from("test.ramp"),
                stream_index: 0,
            },
            registry(),
            timeline,
            &PlayerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_session_decodes_and_reports_progress() {
        let timeline = FragmentedTimeline::from_sections([
            TMSection::new(0.0, 0.5).unwrap(),
            TMSection::excluded(0.5, 1.0).unwrap(),
        ]);
        let mut session = open_session(timeline);
        assert_eq!(session.spec().sample_rate, RAMP_RATE);
        assert!((session.virtual_duration() - 0.5).abs() < 1e-9);

        for _ in 0..200 {
            if session.decode_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(session.decode_finished());
        assert!(session.take_error().is_none());
        assert!((session.buffered() - 0.5).abs() < 0.01);

        session.stop();
    }

    #[test]
    fn test_position_follows_clock_not_decode() {
        let timeline = FragmentedTimeline::from_sections([TMSection::new(0.0, 1.0).unwrap()]);
        let mut session = open_session(timeline);

        assert_eq!(session.position(), 0.0);
        assert!(!session.is_playing());

        session.play();
        std::thread::sleep(Duration::from_millis(50));
        session.pause();
        let paused_at = session.position();
        assert!(paused_at > 0.03, "position {paused_at}");

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(session.position(), paused_at);

        // Seek re-anchors the reported position immediately.
        session.seek(0.75);
        assert!((session.position() - 0.75).abs() < 0.01);

        session.stop();
    }

    #[test]
    fn test_analysis_updates_are_counted_and_observed() {
        let mut session = open_session(FragmentedTimeline::new());
        assert_eq!(session.virtual_duration(), 0.0);

        session.apply_section(TMSection::new(0.0, 0.25).unwrap());
        session.apply_section(TMSection::excluded(0.25, 0.75).unwrap());
        session.apply_section(TMSection::new(0.75, 1.0).unwrap());
        session.extend_scope(1.0);

        assert!((session.virtual_duration() - 0.5).abs() < 1e-9);
        assert_eq!(session.commands_posted(), 4);

        for _ in 0..200 {
            if session.decode_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(session.decode_finished());
        assert!((session.buffered() - 0.5).abs() < 0.01);

        session.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_joins_worker() {
        let timeline = FragmentedTimeline::from_sections([TMSection::new(0.0, 1.0).unwrap()]);
        let mut session = open_session(timeline);
        session.play();
        session.stop();
        assert!(!session.is_playing());
        session.stop();
    }
}
