//! # Skim Player Library (skim-player)
//!
//! Timeline-driven decode-and-resynthesis engine.
//!
//! **Purpose:** Play back a recording while skipping or re-timing portions of
//! it according to an edit/analysis timeline (e.g. removing silent segments),
//! keeping audio duration natural and playback position consistent.
//!
//! **Architecture:** Single decode worker thread fed by a control task queue,
//! producing into a bounded circular audio buffer consumed by the output
//! device callback. Decoding uses symphonia, resampling uses rubato, output
//! uses cpal.

pub mod audio;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
pub use playback::session::PlaybackSession;
