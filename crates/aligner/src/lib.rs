pub mod homophones;
pub mod matcher;
pub mod script;

pub use homophones::HomophoneTable;
pub use script::{Script, ScriptSegment, SpeakerZone};

use std::collections::BTreeSet;
use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use matcher::{LocalAlignment, MATCH_SCORE, smith_waterman};

/// Characters kept behind the cursor in the windowed search.
const WINDOW_BEHIND: usize = 20;
/// Characters searched ahead of the cursor.
const WINDOW_AHEAD: usize = 600;
/// Characters of the next zone visible past the active zone's end.
const CROSS_ZONE_LOOKAHEAD: usize = 100;
/// Consecutive failures that trigger a whole-script search.
const RESYNC_AFTER_FAILURES: u32 = 3;
/// Minimum raw score for any emission.
const MIN_MATCH_SCORE_SINGLE: i32 = 10;
const MIN_MATCH_SCORE_MULTI: i32 = 6;
/// Tolerance factor applied to the confident threshold in alignment mode.
const ALIGNMENT_TOLERANCE: f64 = 0.75;
/// Floor on the confident threshold outside alignment mode.
const CONFIDENT_FLOOR: f64 = 0.50;
/// Zone consumption fraction that auto-advances to the next zone.
const ZONE_COMPLETE_PROGRESS: f64 = 0.95;
/// Queries shorter than this (normalized) are rejected outright.
const MIN_QUERY_CHARS: usize = 3;

/// One script line matched against live ASR output.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedLine {
    pub segment_index: usize,
    pub source: String,
    pub target: String,
    /// Normalized alignment score in [0, 1].
    pub score: f64,
    pub low_confidence: bool,
    pub speaker: Option<String>,
    pub is_global_resync: bool,
    /// Cursor position after this match was applied.
    pub cursor_position: usize,
    /// Fraction of the active zone consumed, in [0, 1].
    pub zone_progress: f64,
}

/// Maps noisy ASR transcripts onto a pre-loaded bilingual script.
///
/// Keeps a cursor into the script's normalized text and searches a window
/// around it; repeated failures fall back to a whole-script search. In
/// multi-speaker scripts the window is further constrained to the active
/// speaker zone, with a short lookahead into the next zone so a speaker
/// handover is caught automatically.
///
/// Never errors: an unmatchable input returns `None`.
pub struct ScriptAligner {
    script: Script,
    homophones: HomophoneTable,
    cursor: usize,
    consecutive_failures: u32,
    /// Segments of the most recent confident match; used to suppress
    /// emitting the same line twice.
    last_matched_segments: HashSet<usize>,
    current_zone: usize,
    /// Confidently matched final segments of the active zone.
    zone_final_segments_matched: HashSet<usize>,
}

impl ScriptAligner {
    pub fn new(script: Script) -> Self {
        info!(
            segments = script.segments().len(),
            chars = script.len_chars(),
            zones = script.zones().len(),
            multi_speaker = script.is_multi_speaker(),
            "Script loaded for alignment"
        );
        Self {
            script,
            homophones: HomophoneTable::new(),
            cursor: 0,
            consecutive_failures: 0,
            last_matched_segments: HashSet::new(),
            current_zone: 0,
            zone_final_segments_matched: HashSet::new(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(Script::parse(text))
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_zone_index(&self) -> usize {
        self.current_zone
    }

    /// Name of the active zone's speaker, if any.
    pub fn current_speaker(&self) -> Option<&str> {
        self.script
            .zones()
            .get(self.current_zone)
            .and_then(|z| z.speaker.as_deref())
    }

    /// Manually moves to the next speaker zone.
    pub fn advance_speaker(&mut self) {
        if self.current_zone + 1 < self.script.zones().len() {
            self.switch_zone(self.current_zone + 1);
        }
    }

    /// Manually moves back to the previous speaker zone.
    pub fn previous_speaker(&mut self) {
        if self.current_zone > 0 {
            self.switch_zone(self.current_zone - 1);
        }
    }

    fn switch_zone(&mut self, zone_index: usize) {
        self.current_zone = zone_index;
        self.cursor = self.script.zones()[zone_index].char_start;
        self.consecutive_failures = 0;
        self.last_matched_segments.clear();
        self.zone_final_segments_matched.clear();
        debug!(
            zone = zone_index,
            speaker = ?self.current_speaker(),
            cursor = self.cursor,
            "Switched speaker zone"
        );
    }

    /// Automatic zone advance (cross-zone match or zone exhaustion): the
    /// cursor resets to the zone start but duplicate-suppression state for
    /// the finished zone is simply dropped.
    fn auto_advance_zone(&mut self) {
        if self.current_zone + 1 < self.script.zones().len() {
            self.current_zone += 1;
            self.cursor = self.script.zones()[self.current_zone].char_start;
            self.zone_final_segments_matched.clear();
            debug!(
                zone = self.current_zone,
                speaker = ?self.current_speaker(),
                "Auto-advanced to next speaker zone"
            );
        }
    }

    /// Matches one finalised transcript against the script.
    ///
    /// `threshold` is the confident-match threshold; in alignment mode it
    /// is relaxed by 25% so short noisy fragments still lock on. Returns
    /// the newly matched lines, or `None` when nothing (new) matched.
    pub fn match_transcript(
        &mut self,
        text: &str,
        threshold: f64,
        alignment_mode: bool,
    ) -> Option<Vec<MatchedLine>> {
        let query = script::normalize(text);
        if query.len() < MIN_QUERY_CHARS {
            return None;
        }
        if self.script.is_empty() {
            return None;
        }

        self.try_match(&query, threshold, alignment_mode, false)
    }

    fn try_match(
        &mut self,
        query: &[char],
        threshold: f64,
        alignment_mode: bool,
        is_zone_retry: bool,
    ) -> Option<Vec<MatchedLine>> {
        let multi = self.script.is_multi_speaker();
        let total = self.script.len_chars();
        let zone = self.script.zones()[self.current_zone].clone();

        let (win_start, win_end) = self.search_window(&zone, multi, total);

        let global = (!multi && self.consecutive_failures >= RESYNC_AFTER_FAILURES)
            || win_start >= win_end;

        let (target, offset) = if global {
            (self.script.full_chars(), 0)
        } else {
            (&self.script.full_chars()[win_start..win_end], win_start)
        };

        let min_score = if multi {
            MIN_MATCH_SCORE_MULTI
        } else {
            MIN_MATCH_SCORE_SINGLE
        };

        let alignment = smith_waterman(query, target, &self.homophones);
        let Some(LocalAlignment {
            score,
            target_start,
            target_end,
        }) = alignment.filter(|a| a.score >= min_score)
        else {
            self.consecutive_failures += 1;
            debug!(
                failures = self.consecutive_failures,
                global, "No script match for transcript"
            );
            return None;
        };

        let global_start = offset + target_start;
        let global_end = offset + target_end;
        let normalized_score =
            score as f64 / (MATCH_SCORE as f64 * query.len() as f64);
        let effective_threshold = if alignment_mode {
            threshold * ALIGNMENT_TOLERANCE
        } else {
            threshold.max(CONFIDENT_FLOOR)
        };

        if normalized_score < effective_threshold {
            // Low-confidence: surface the lines but leave all state except
            // the failure counter untouched.
            self.consecutive_failures += 1;
            let lines = self.build_lines(
                global_start,
                global_end,
                normalized_score,
                true,
                global,
                &zone,
            );
            debug!(
                score = normalized_score,
                lines = lines.len(),
                "Low-confidence script match"
            );
            return if lines.is_empty() { None } else { Some(lines) };
        }

        // Confident match entirely inside the next zone's lookahead span:
        // hand over to that zone and rescore there, once.
        if multi && !is_zone_retry && global_start >= zone.char_end {
            self.auto_advance_zone();
            return self.try_match(query, threshold, alignment_mode, true);
        }

        let matched: BTreeSet<usize> = self.script.char_to_segment()[global_start..global_end]
            .iter()
            .copied()
            .collect();
        let new_segments: Vec<usize> = matched
            .iter()
            .copied()
            .filter(|idx| !self.last_matched_segments.contains(idx))
            .collect();

        if multi
            && let Some(&last_in_zone) = matched.iter().max()
            && last_in_zone + 1 == zone.segment_range.1
        {
            self.zone_final_segments_matched.insert(last_in_zone);
        }

        self.cursor = global_end;
        self.consecutive_failures = 0;
        self.last_matched_segments = matched.into_iter().collect();

        let zone_progress = zone_progress(&zone, self.cursor);
        let zone_finished = !self.zone_final_segments_matched.is_empty();

        let lines: Vec<MatchedLine> = new_segments
            .iter()
            .map(|&idx| {
                let segment = &self.script.segments()[idx];
                MatchedLine {
                    segment_index: idx,
                    source: segment.source.clone(),
                    target: segment.target.clone(),
                    score: normalized_score.min(1.0),
                    low_confidence: false,
                    speaker: segment.speaker.clone(),
                    is_global_resync: global,
                    cursor_position: self.cursor,
                    zone_progress,
                }
            })
            .collect();

        // Zone exhausted: move on so the next utterance searches the right
        // speaker's text.
        if multi && (zone_progress >= ZONE_COMPLETE_PROGRESS || zone_finished) {
            self.auto_advance_zone();
        }

        if lines.is_empty() {
            debug!(cursor = self.cursor, "Match repeated last emitted lines, suppressed");
            None
        } else {
            Some(lines)
        }
    }

    /// Search window around the cursor, intersected with the active zone
    /// (plus cross-zone lookahead) in multi-speaker scripts.
    fn search_window(&self, zone: &SpeakerZone, multi: bool, total: usize) -> (usize, usize) {
        let behind = self.cursor.saturating_sub(WINDOW_BEHIND);
        let ahead = (self.cursor + WINDOW_AHEAD).min(total);

        if !multi {
            return (behind, ahead);
        }

        let has_next = self.current_zone + 1 < self.script.zones().len();
        let zone_end = if has_next {
            (zone.char_end + CROSS_ZONE_LOOKAHEAD).min(total)
        } else {
            zone.char_end
        };

        (behind.max(zone.char_start), ahead.min(zone_end))
    }

    /// Lines for a low-confidence emission (no duplicate suppression).
    fn build_lines(
        &self,
        global_start: usize,
        global_end: usize,
        score: f64,
        low_confidence: bool,
        is_global_resync: bool,
        zone: &SpeakerZone,
    ) -> Vec<MatchedLine> {
        let matched: BTreeSet<usize> = self.script.char_to_segment()[global_start..global_end]
            .iter()
            .copied()
            .collect();
        matched
            .into_iter()
            .map(|idx| {
                let segment = &self.script.segments()[idx];
                MatchedLine {
                    segment_index: idx,
                    source: segment.source.clone(),
                    target: segment.target.clone(),
                    score: score.min(1.0),
                    low_confidence,
                    speaker: segment.speaker.clone(),
                    is_global_resync,
                    cursor_position: self.cursor,
                    zone_progress: zone_progress(zone, self.cursor),
                }
            })
            .collect()
    }
}

fn zone_progress(zone: &SpeakerZone, cursor: usize) -> f64 {
    let len = zone.char_end.saturating_sub(zone.char_start);
    if len == 0 {
        return 1.0;
    }
    let consumed = cursor.saturating_sub(zone.char_start).min(len);
    consumed as f64 / len as f64
}
