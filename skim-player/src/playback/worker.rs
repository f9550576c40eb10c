//! Decode worker
//!
//! Single worker thread that pulls virtual-time ranges from the timeline,
//! reads raw frames through a stream reader, and pushes staged audio into
//! the session's buffer. Its only blocking point is the control queue wait;
//! everything else is non-blocking CPU work performed between drains.
//!
//! Control flow per step: map the next ~1 s virtual chunk through the
//! timeline, decode the source spans it names (reopening the reader for
//! skips beyond the seek threshold rather than assuming seekability), stage
//! and buffer the audio, advance the cursor. A partial mapping parks the
//! worker on the queue until a timeline update arrives; a full buffer backs
//! off briefly; reader EOF flags completion. Cancellation is cooperative: a
//! stop command is drained like any other task.

use crate::audio::reader::{ReaderRegistry, StreamReader};
use crate::audio::types::RawFrame;
use crate::error::{Error, Result};
use crate::playback::audio_buffer::AudioBuffer;
use crate::playback::task_queue::TaskQueue;
use crate::playback::timeline::FragmentedTimeline;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Back-off while the audio buffer is at its fill level
const BUFFER_FULL_BACKOFF: Duration = Duration::from_millis(10);

/// Slop when comparing source timepoints against frame boundaries
const SOURCE_EPS: f64 = 1e-9;

/// Control queue carrying commands into the decode worker
pub type ControlQueue = TaskQueue<WorkerContext>;

/// The media stream a session decodes from
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub path: PathBuf,
    pub stream_index: usize,
}

/// Outcome of one decode step, driving the worker's next blocking decision
enum StepOutcome {
    /// Audio was staged or the cursor advanced
    Progressed,
    /// Buffer at fill level; back off briefly
    BufferFull,
    /// Mapping exhausted the analyzed scope; park until a timeline update
    WaitForTimeline,
    /// Reader hit end of stream
    Finished,
}

/// Mutable state owned by the decode worker thread. Control tasks posted
/// through the queue execute against this context on the worker thread.
pub struct WorkerContext {
    media: MediaSource,
    registry: Arc<ReaderRegistry>,
    timeline: Arc<RwLock<FragmentedTimeline>>,
    buffer: Arc<Mutex<AudioBuffer>>,

    /// Virtual seconds mapped per decode step
    chunk_duration: f64,
    /// Source gap beyond which the reader is reopened instead of decoded
    /// through
    seek_threshold: f64,

    reader: Option<Box<dyn StreamReader>>,
    /// Frame read but extending past the current mapping, kept for the next
    /// step
    pending: Option<RawFrame>,
    /// Source timepoint decoding has reached (end of the last frame read)
    reader_pos: f64,
    /// Virtual-time decode cursor
    cursor: f64,
    source_eof: bool,
    stop_requested: bool,

    done: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<Error>>>,
}

impl WorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        media: MediaSource,
        registry: Arc<ReaderRegistry>,
        timeline: Arc<RwLock<FragmentedTimeline>>,
        buffer: Arc<Mutex<AudioBuffer>>,
        chunk_duration: f64,
        seek_threshold: f64,
        done: Arc<AtomicBool>,
        last_error: Arc<Mutex<Option<Error>>>,
    ) -> Self {
        Self {
            media,
            registry,
            timeline,
            buffer,
            chunk_duration,
            seek_threshold,
            reader: None,
            pending: None,
            reader_pos: 0.0,
            cursor: 0.0,
            source_eof: false,
            stop_requested: false,
            done,
            last_error,
        }
    }

    /// Seek to a virtual timepoint: resolve it to a source position under
    /// the current timeline, discard buffered audio, and restart decoding
    /// there. Fails with `OutOfScope` for positions past the analyzed end.
    pub fn seek(&mut self, virtual_time: f64) -> Result<()> {
        let target = virtual_time.max(0.0);
        let source = self.timeline.read().unwrap().source_position(target)?;
        info!(virtual_time = target, source, "seeking");

        self.cursor = target;
        self.reader = None;
        self.pending = None;
        self.source_eof = false;
        self.done.store(false, Ordering::Release);

        let mut buffer = self.buffer.lock().unwrap();
        buffer.clear();
        Ok(())
    }

    /// The timeline grew or changed; nothing to update eagerly, the next
    /// step re-queries it. Posting this task exists to wake a parked worker.
    pub fn timeline_updated(&mut self) -> Result<()> {
        trace!("timeline updated");
        Ok(())
    }

    /// Cooperative stop, observed by the worker loop after this drain.
    pub fn request_stop(&mut self) -> Result<()> {
        debug!("stop requested");
        self.stop_requested = true;
        Ok(())
    }

    fn open_reader(&mut self, start_at: f64) -> Result<()> {
        debug!(start_at, "opening reader");
        self.reader = Some(
            self.registry
                .open(&self.media.path, self.media.stream_index, start_at)?,
        );
        self.pending = None;
        self.reader_pos = start_at;
        Ok(())
    }

    fn report(&self, err: Error) {
        error!("decode worker error: {}", err);
        *self.last_error.lock().unwrap() = Some(err);
    }

    /// One decode step. Pure CPU work; never blocks on the queue.
    fn step(&mut self) -> Result<StepOutcome> {
        if self.buffer.lock().unwrap().is_full() {
            return Ok(StepOutcome::BufferFull);
        }

        let requested_end = self.cursor + self.chunk_duration;
        let mapping = {
            let timeline = self.timeline.read().unwrap();
            match timeline.map_time_range(self.cursor, requested_end) {
                Ok(mapping) => mapping,
                Err(Error::OutOfScope { .. }) => return Ok(StepOutcome::WaitForTimeline),
                Err(e) => return Err(e),
            }
        };

        if mapping.ranges.is_empty() {
            // Nothing mappable yet at the cursor. If the recording itself is
            // exhausted there is nothing left to wait for.
            if self.stream_exhausted() {
                return Ok(StepOutcome::Finished);
            }
            return Ok(StepOutcome::WaitForTimeline);
        }

        let read_end = mapping.source_end().expect("non-empty mapping");
        let first_begin = mapping.ranges[0].source_begin;
        if self.reader.is_none() {
            self.open_reader(first_begin)?;
        } else {
            // A timeline edit can remap the cursor behind the forward-only
            // reader; re-invoke it rather than assuming seekability.
            let resume_from = self.pending.as_ref().map(|f| f.start).unwrap_or(self.reader_pos);
            if first_begin < resume_from - 0.01 {
                self.open_reader(first_begin)?;
            }
        }

        loop {
            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => match self.reader.as_mut().expect("reader open").next_frame()? {
                    Some(frame) => frame,
                    None => {
                        self.source_eof = true;
                        break;
                    }
                },
            };

            if frame.start >= read_end - SOURCE_EPS {
                // Extends past this mapping; the next step picks it up.
                self.pending = Some(frame);
                break;
            }

            self.reader_pos = frame.end();
            {
                let mut buffer = self.buffer.lock().unwrap();
                let chunks = buffer.stage(&frame, &mapping)?;
                for chunk in chunks {
                    buffer.put(&chunk)?;
                }
            }

            // Skipping a long excluded span: reopen the reader at the next
            // mapped range instead of decoding through the gap.
            if let Some(next_begin) = mapping.next_source_begin_after(frame.end()) {
                if next_begin - frame.end() > self.seek_threshold {
                    self.open_reader(next_begin)?;
                }
            }
        }

        self.cursor = mapping.virtual_end;

        if self.source_eof {
            return Ok(StepOutcome::Finished);
        }
        Ok(StepOutcome::Progressed)
    }

    /// True when decoding has consumed the recording: the reader reported
    /// EOF, or the analyzed scope covers the whole stream and the cursor sits
    /// at the mappable end.
    fn stream_exhausted(&self) -> bool {
        if self.source_eof {
            return true;
        }
        let Some(duration) = self.reader.as_ref().and_then(|r| r.info().duration) else {
            return false;
        };
        let timeline = self.timeline.read().unwrap();
        timeline.time_scope() >= duration - SOURCE_EPS
            && self.cursor >= timeline.virtual_duration() - SOURCE_EPS
    }
}

/// Spawn the decode worker thread.
pub fn spawn_worker(mut ctx: WorkerContext, queue: Arc<ControlQueue>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("skim-decode".into())
        .spawn(move || run(&mut ctx, &queue))
        .expect("failed to spawn decode worker thread")
}

fn run(ctx: &mut WorkerContext, queue: &ControlQueue) {
    info!("Decode worker started");
    // Park on the queue only when there is nothing productive to do;
    // otherwise drain pending commands without blocking between steps.
    let mut park = false;

    loop {
        let drained = if park {
            queue.wait_for_and_run(ctx)
        } else {
            queue.run_all(ctx)
        };
        if let Err(err) = drained {
            // A failing task marshals an error from another thread onto this
            // one; report it and go idle until the next command.
            ctx.report(err);
            park = true;
            continue;
        }
        if ctx.stop_requested {
            break;
        }

        match ctx.step() {
            Ok(StepOutcome::Progressed) => park = false,
            Ok(StepOutcome::BufferFull) => {
                park = false;
                std::thread::sleep(BUFFER_FULL_BACKOFF);
            }
            Ok(StepOutcome::WaitForTimeline) => park = true,
            Ok(StepOutcome::Finished) => {
                if !ctx.done.swap(true, Ordering::AcqRel) {
                    info!(cursor = ctx.cursor, "decoding finished");
                }
                park = true;
            }
            Err(err) => {
                ctx.report(err);
                ctx.done.store(true, Ordering::Release);
                park = true;
            }
        }
    }
    info!("Decode worker stopped");
}
