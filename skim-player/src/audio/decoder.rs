//! Symphonia-backed stream reader
//!
//! Decodes container formats (WAV, FLAC, MP3, Vorbis, MP4/AAC) into raw
//! frames. Positioning uses a coarse container seek followed by
//! decode-and-skip: the reader may yield frames starting slightly before the
//! requested position and lets the consumer's mapping discard the excess,
//! which keeps positioning sample-accurate without trusting codec seek
//! precision.

use crate::audio::reader::{ReaderFactory, StreamReader};
use crate::audio::types::{RawFrame, SampleData, SampleLayout, StreamInfo};
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Factory for all symphonia-supported container formats.
pub struct SymphoniaReaderFactory;

impl SymphoniaReaderFactory {
    /// Extensions this factory is conventionally registered under.
    pub const EXTENSIONS: &'static [&'static str] =
        &["wav", "flac", "mp3", "ogg", "m4a", "mp4", "aac"];
}

impl ReaderFactory for SymphoniaReaderFactory {
    fn open(
        &self,
        path: &Path,
        stream_index: usize,
        start_at: f64,
    ) -> Result<Box<dyn StreamReader>> {
        Ok(Box::new(SymphoniaReader::open(path, stream_index, start_at)?))
    }

    fn probe(&self, path: &Path, stream_index: usize) -> Result<StreamInfo> {
        let reader = SymphoniaReader::open(path, stream_index, 0.0)?;
        Ok(reader.info())
    }
}

struct SymphoniaReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    info: StreamInfo,
    /// Fallback position when packets carry no usable timestamp
    next_start: f64,
}

impl SymphoniaReader {
    fn open(path: &Path, stream_index: usize, start_at: f64) -> Result<Self> {
        debug!(
            "Opening {} (stream {}, from {:.3}s)",
            path.display(),
            stream_index,
            start_at
        );

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open {}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .nth(stream_index)
            .ok_or_else(|| {
                Error::Decode(format!(
                    "{}: no audio track at index {}",
                    path.display(),
                    stream_index
                ))
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let time_base = codec_params.time_base;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;
        let duration = codec_params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        if start_at > 0.0 {
            match format.seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time: Time::from(start_at),
                    track_id: Some(track_id),
                },
            ) {
                Ok(seeked) => {
                    decoder.reset();
                    debug!("Seeked to ts {} (requested {:.3}s)", seeked.actual_ts, start_at);
                }
                Err(e) => {
                    // Fall back to decoding from the stream head; the mapping
                    // discards everything before the requested position.
                    warn!("Seek to {:.3}s failed ({}), decoding from start", start_at, e);
                }
            }
        }

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
            info: StreamInfo {
                sample_rate,
                channels,
                duration,
            },
            next_start: 0.0,
        })
    }

    fn frame_start(&self, ts: u64) -> f64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                time.seconds as f64 + time.frac
            }
            None => self.next_start,
        }
    }
}

impl StreamReader for SymphoniaReader {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Error reading packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let start = self.frame_start(packet.ts());
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let frame = raw_frame_from_decoded(&decoded, self.info.sample_rate, start);
                    self.next_start = frame.end();
                    return Ok(Some(frame));
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // Malformed packet; skip it and keep going (recoverable).
                    warn!("Decode error, skipping packet: {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decode failed: {}", e)));
                }
            }
        }
    }
}

/// Convert a decoded buffer into a raw frame, preserving the decoded dtype
/// for the common formats and normalizing exotic widths to f32 at the edge.
fn raw_frame_from_decoded(decoded: &AudioBufferRef, sample_rate: u32, start: f64) -> RawFrame {
    let channels = decoded.spec().channels.count() as u16;

    let data = match decoded {
        AudioBufferRef::F32(buf) => SampleData::F32(collect_planar(buf, |v| v)),
        AudioBufferRef::F64(buf) => SampleData::F64(collect_planar(buf, |v| v)),
        AudioBufferRef::S32(buf) => SampleData::I32(collect_planar(buf, |v| v)),
        AudioBufferRef::S16(buf) => SampleData::I16(collect_planar(buf, |v| v)),
        AudioBufferRef::U8(buf) => SampleData::U8(collect_planar(buf, |v| v)),
        AudioBufferRef::S24(buf) => {
            SampleData::F32(collect_planar(buf, |v| v.inner() as f32 / 8_388_608.0))
        }
        AudioBufferRef::U24(buf) => SampleData::F32(collect_planar(buf, |v| {
            (v.inner() as i32 - 8_388_608) as f32 / 8_388_608.0
        })),
        AudioBufferRef::U16(buf) => {
            SampleData::F32(collect_planar(buf, |v| (v as i32 - 32_768) as f32 / 32_768.0))
        }
        AudioBufferRef::U32(buf) => {
            SampleData::F32(collect_planar(buf, |v| (v as i32) as f32 / i32::MAX as f32))
        }
        AudioBufferRef::S8(buf) => {
            SampleData::F32(collect_planar(buf, |v| v as f32 / i8::MAX as f32))
        }
    };

    RawFrame {
        data,
        layout: SampleLayout::Planar,
        channels,
        sample_rate,
        start,
    }
}

fn collect_planar<S, T, F>(buf: &symphonia::core::audio::AudioBuffer<S>, convert: F) -> Vec<T>
where
    S: symphonia::core::sample::Sample,
    F: Fn(S) -> T,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    let mut out = Vec::with_capacity(channels * frames);
    for ch in 0..channels {
        out.extend(buf.chan(ch)[..frames].iter().copied().map(&convert));
    }
    out
}
