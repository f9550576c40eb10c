//! Fragmented playback timeline
//!
//! Maps "virtual" time (playback position in the edited recording, after
//! exclusions) onto "source" time (timestamps within the original recording).
//! The timeline is an ordered set of disjoint sections, each carrying an
//! inclusion flag and a playback-rate modifier; gaps between sections are
//! implicitly excluded. A `time_scope` watermark tracks how far into the
//! recording edit decisions exist; queries beyond it are answered partially
//! ("wait for more analysis") or rejected.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Tolerance for virtual-time comparisons (seconds)
const TIME_EPS: f64 = 1e-9;

/// A single timeline section: a maximal contiguous source-time span with one
/// inclusion state and playback rate.
///
/// Sections are immutable once constructed; timeline mutations replace
/// sections rather than editing them in place. A `playback_rate` of 2.0 plays
/// the span twice as fast, so its virtual duration is half its source
/// duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SectionRecord", into = "SectionRecord")]
pub struct TMSection {
    source_begin: f64,
    source_end: f64,
    playback_rate: f64,
    included: bool,
}

impl TMSection {
    /// Create an included section playing at normal speed.
    pub fn new(source_begin: f64, source_end: f64) -> Result<Self> {
        Self::with_rate(source_begin, source_end, 1.0)
    }

    /// Create an included section with a playback-rate modifier.
    pub fn with_rate(source_begin: f64, source_end: f64, playback_rate: f64) -> Result<Self> {
        Self::build(source_begin, source_end, playback_rate, true)
    }

    /// Create an excluded section (skipped during playback).
    pub fn excluded(source_begin: f64, source_end: f64) -> Result<Self> {
        Self::build(source_begin, source_end, 1.0, false)
    }

    fn build(source_begin: f64, source_end: f64, playback_rate: f64, included: bool) -> Result<Self> {
        if !source_begin.is_finite() || !source_end.is_finite() || source_begin >= source_end {
            return Err(Error::InvalidSection(format!(
                "section bounds must satisfy begin < end, got [{source_begin}, {source_end})"
            )));
        }
        if !playback_rate.is_finite() || playback_rate <= 0.0 {
            return Err(Error::InvalidSection(format!(
                "playback rate must be a positive real, got {playback_rate}"
            )));
        }
        Ok(Self {
            source_begin,
            source_end,
            playback_rate,
            included,
        })
    }

    pub fn source_begin(&self) -> f64 {
        self.source_begin
    }

    pub fn source_end(&self) -> f64 {
        self.source_end
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn included(&self) -> bool {
        self.included
    }

    /// Virtual playback duration of this section. Zero for excluded sections.
    pub fn virtual_duration(&self) -> f64 {
        if self.included {
            (self.source_end - self.source_begin) / self.playback_rate
        } else {
            0.0
        }
    }

    /// Copy of this section truncated to `[begin, end)`. The caller
    /// guarantees a non-empty intersection.
    fn truncated(&self, begin: f64, end: f64) -> Self {
        debug_assert!(begin < end);
        Self {
            source_begin: begin.max(self.source_begin),
            source_end: end.min(self.source_end),
            playback_rate: self.playback_rate,
            included: self.included,
        }
    }
}

/// Serialized form of a section; validated on deserialization so a persisted
/// timeline can never smuggle in an invalid section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SectionRecord {
    source_begin: f64,
    source_end: f64,
    #[serde(default = "default_rate")]
    playback_rate: f64,
    #[serde(default = "default_included")]
    included: bool,
}

fn default_rate() -> f64 {
    1.0
}

fn default_included() -> bool {
    true
}

impl TryFrom<SectionRecord> for TMSection {
    type Error = Error;

    fn try_from(record: SectionRecord) -> Result<Self> {
        TMSection::build(
            record.source_begin,
            record.source_end,
            record.playback_rate,
            record.included,
        )
    }
}

impl From<TMSection> for SectionRecord {
    fn from(section: TMSection) -> Self {
        SectionRecord {
            source_begin: section.source_begin,
            source_end: section.source_end,
            playback_rate: section.playback_rate,
            included: section.included,
        }
    }
}

/// One mapped source span: read `[source_begin, source_end)` at
/// `playback_rate` to realize part of a virtual interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedRange {
    pub source_begin: f64,
    pub source_end: f64,
    pub playback_rate: f64,
}

impl MappedRange {
    /// Virtual duration realized by reading this span.
    pub fn virtual_duration(&self) -> f64 {
        (self.source_end - self.source_begin) / self.playback_rate
    }
}

/// Result of mapping a virtual `[begin, end)` query onto the timeline.
///
/// `virtual_end` may fall short of the requested end when the analyzed scope
/// is exhausted; the caller then waits for more analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeMappingResult {
    pub virtual_begin: f64,
    pub virtual_end: f64,
    pub ranges: Vec<MappedRange>,
}

impl RangeMappingResult {
    /// Virtual duration covered by this mapping.
    pub fn mapped_duration(&self) -> f64 {
        self.virtual_end - self.virtual_begin
    }

    /// True when the mapping stopped short of the requested end.
    pub fn is_partial(&self, requested_end: f64) -> bool {
        self.virtual_end + TIME_EPS < requested_end
    }

    /// Last source timepoint this mapping needs to read up to.
    pub fn source_end(&self) -> Option<f64> {
        self.ranges.last().map(|r| r.source_end)
    }

    /// Source begin of the first mapped range starting at or after `t`.
    /// Used by the decode worker to decide whether to seek over a gap.
    pub fn next_source_begin_after(&self, t: f64) -> Option<f64> {
        self.ranges
            .iter()
            .find(|r| r.source_begin >= t)
            .map(|r| r.source_begin)
    }
}

/// Ordered, non-overlapping set of timeline sections covering a prefix of
/// source time up to the `time_scope` watermark.
///
/// Cumulative virtual offsets are cached and rebuilt on mutation, so mapping
/// queries are a binary search plus a short walk.
#[derive(Debug, Clone, Default)]
pub struct FragmentedTimeline {
    /// Sections sorted by `source_begin`, pairwise disjoint
    sections: Vec<TMSection>,

    /// Virtual time at which each section starts (prefix sums of virtual
    /// durations); `virtual_offsets.len() == sections.len()`
    virtual_offsets: Vec<f64>,

    /// Furthest source time for which an edit decision exists; grows only
    time_scope: f64,
}

impl FragmentedTimeline {
    /// Create an empty timeline with zero scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct a timeline from persisted sections.
    pub fn from_sections<I>(sections: I) -> Self
    where
        I: IntoIterator<Item = TMSection>,
    {
        let mut timeline = Self::new();
        for section in sections {
            timeline.add_or_update_section(section);
        }
        timeline
    }

    /// Furthest analyzed source time.
    pub fn time_scope(&self) -> f64 {
        self.time_scope
    }

    /// Current sections, sorted by source begin.
    pub fn sections(&self) -> &[TMSection] {
        &self.sections
    }

    /// Total virtual playback time currently mappable.
    pub fn virtual_duration(&self) -> f64 {
        match (self.virtual_offsets.last(), self.sections.last()) {
            (Some(offset), Some(section)) => offset + section.virtual_duration(),
            _ => 0.0,
        }
    }

    /// Advance the analyzed-scope watermark. The scope only grows; smaller
    /// values are ignored.
    pub fn extend_time_scope(&mut self, new_scope: f64) {
        if new_scope > self.time_scope {
            self.time_scope = new_scope;
        }
    }

    /// Insert a section, splitting or truncating any overlapping existing
    /// sections so the non-overlap invariant holds, and advance `time_scope`
    /// to at least the section's end.
    pub fn add_or_update_section(&mut self, section: TMSection) {
        let mut updated: Vec<TMSection> = Vec::with_capacity(self.sections.len() + 2);
        for old in self.sections.drain(..) {
            if old.source_end <= section.source_begin || old.source_begin >= section.source_end {
                updated.push(old);
                continue;
            }
            // Overlap: keep the non-overlapping remainders of the old section
            if old.source_begin < section.source_begin {
                updated.push(old.truncated(old.source_begin, section.source_begin));
            }
            if old.source_end > section.source_end {
                updated.push(old.truncated(section.source_end, old.source_end));
            }
        }

        let insert_at = updated
            .iter()
            .position(|s| s.source_begin > section.source_begin)
            .unwrap_or(updated.len());
        updated.insert(insert_at, section);

        self.sections = updated;
        self.rebuild_offsets();
        self.extend_time_scope(section.source_end);

        debug!(
            sections = self.sections.len(),
            time_scope = self.time_scope,
            "timeline section applied"
        );
    }

    fn rebuild_offsets(&mut self) {
        self.virtual_offsets.clear();
        let mut acc = 0.0;
        for section in &self.sections {
            self.virtual_offsets.push(acc);
            acc += section.virtual_duration();
        }
    }

    /// Map a virtual `[begin, end)` interval onto source-time ranges.
    ///
    /// Walks the section list from the section covering `begin`, accumulating
    /// source spans scaled by each section's playback rate until the
    /// requested virtual duration is consumed or the analyzed scope is
    /// exhausted (partial result). Excluded sections contribute no ranges but
    /// advance the source cursor. A point exactly on a section boundary
    /// belongs to the following section. Adjacent source-contiguous ranges
    /// with equal rate are merged.
    pub fn map_time_range(&self, virtual_begin: f64, virtual_end: f64) -> Result<RangeMappingResult> {
        if virtual_end < virtual_begin {
            return Err(Error::InvalidRange {
                begin: virtual_begin,
                end: virtual_end,
            });
        }

        let begin = virtual_begin.max(0.0);
        let total = self.virtual_duration();
        if begin > total + TIME_EPS {
            return Err(Error::OutOfScope {
                requested: begin,
                available: total,
            });
        }

        let mut ranges: Vec<MappedRange> = Vec::new();
        let mut cursor = begin;

        // Sections before the last offset <= begin are fully consumed;
        // bisect instead of walking the whole prefix.
        let start = self
            .virtual_offsets
            .partition_point(|&offset| offset <= begin)
            .saturating_sub(1);

        for (section, &offset) in self.sections[start..]
            .iter()
            .zip(&self.virtual_offsets[start..])
        {
            if virtual_end - cursor <= TIME_EPS {
                break;
            }
            let section_virtual = section.virtual_duration();
            // Boundary tie-break: a point at `offset + section_virtual`
            // belongs to the *next* section, so skip on `<=`.
            if offset + section_virtual <= cursor {
                continue;
            }

            let skip = (cursor - offset).max(0.0);
            let take = (section_virtual - skip).min(virtual_end - cursor);
            if take <= 0.0 {
                continue;
            }

            let source_from = section.source_begin + skip * section.playback_rate;
            let source_to = (source_from + take * section.playback_rate).min(section.source_end);

            match ranges.last_mut() {
                Some(last)
                    if (last.source_end - source_from).abs() <= TIME_EPS
                        && last.playback_rate == section.playback_rate =>
                {
                    last.source_end = source_to;
                }
                _ => ranges.push(MappedRange {
                    source_begin: source_from,
                    source_end: source_to,
                    playback_rate: section.playback_rate,
                }),
            }
            cursor += take;
        }

        Ok(RangeMappingResult {
            virtual_begin: begin,
            virtual_end: cursor,
            ranges,
        })
    }

    /// Source timepoint corresponding to a virtual timepoint (seek support).
    ///
    /// Uses the same boundary tie-break and scope rules as
    /// [`map_time_range`](Self::map_time_range). A query exactly at the
    /// mappable end resolves to the last included section's source end.
    pub fn source_position(&self, virtual_time: f64) -> Result<f64> {
        let vt = virtual_time.max(0.0);
        let total = self.virtual_duration();
        if vt > total + TIME_EPS {
            return Err(Error::OutOfScope {
                requested: vt,
                available: total,
            });
        }

        for (section, &offset) in self.sections.iter().zip(&self.virtual_offsets) {
            let section_virtual = section.virtual_duration();
            if section_virtual > 0.0 && vt < offset + section_virtual {
                return Ok(section.source_begin + (vt - offset) * section.playback_rate);
            }
        }

        Ok(self
            .sections
            .iter()
            .rev()
            .find(|s| s.included())
            .map(|s| s.source_end)
            .unwrap_or(0.0))
    }
}

/// Read persisted analysis sections (a JSON array of section records) for a
/// previously analyzed recording.
pub fn load_sections(path: &Path) -> Result<Vec<TMSection>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::InvalidSection(format!("{}: {}", path.display(), e)))
}
