/// Parsed bilingual script.
///
/// Line format: `<source> ||| <target>` with optional leading numbering
/// (`[N]`, `N.`, `(N)`). Lines of the form `===SPEAKER:<name>===` open a
/// speaker zone; anything else without a `|||` separator is ignored.
///
/// Matching works on `full_chars`, the concatenation of every segment's
/// normalized form; `char_to_segment` maps each position back to its
/// owning segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    segments: Vec<ScriptSegment>,
    full_chars: Vec<char>,
    char_to_segment: Vec<usize>,
    zones: Vec<SpeakerZone>,
    multi_speaker: bool,
}

/// One bilingual script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSegment {
    pub index: usize,
    pub source: String,
    pub target: String,
    pub normalized: String,
    /// Range of this segment inside `full_chars`.
    pub char_start: usize,
    pub char_end: usize,
    pub speaker: Option<String>,
}

/// A contiguous run of segments assigned to one speaker. Single-speaker
/// scripts carry exactly one synthetic zone spanning everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerZone {
    pub char_start: usize,
    pub char_end: usize,
    pub speaker: Option<String>,
    /// Segment indices `[start, end)` covered by this zone.
    pub segment_range: (usize, usize),
}

/// Matching normalization: keep letters and digits (CJK included),
/// lowercased; drop whitespace and all punctuation.
pub fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl Script {
    /// Parses a script blob. Unparseable lines are skipped, never fatal;
    /// the result may be empty.
    pub fn parse(text: &str) -> Self {
        let mut segments: Vec<ScriptSegment> = Vec::new();
        let mut full_chars: Vec<char> = Vec::new();
        let mut char_to_segment: Vec<usize> = Vec::new();
        let mut current_speaker: Option<String> = None;
        let mut multi_speaker = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = parse_speaker_header(line) {
                current_speaker = Some(name);
                multi_speaker = true;
                continue;
            }

            let Some((source, target)) = line.split_once("|||") else {
                continue;
            };
            let source = strip_numbering(source.trim()).to_string();
            let target = target.trim().to_string();

            let normalized_chars = normalize(&source);
            if normalized_chars.is_empty() {
                continue;
            }

            let index = segments.len();
            let char_start = full_chars.len();
            char_to_segment.extend(std::iter::repeat_n(index, normalized_chars.len()));
            full_chars.extend(normalized_chars.iter().copied());

            segments.push(ScriptSegment {
                index,
                source,
                target,
                normalized: normalized_chars.into_iter().collect(),
                char_start,
                char_end: full_chars.len(),
                speaker: current_speaker.clone(),
            });
        }

        let zones = build_zones(&segments, multi_speaker, full_chars.len());

        Self {
            segments,
            full_chars,
            char_to_segment,
            zones,
            multi_speaker,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total normalized length in characters.
    pub fn len_chars(&self) -> usize {
        self.full_chars.len()
    }

    pub fn segments(&self) -> &[ScriptSegment] {
        &self.segments
    }

    pub fn full_chars(&self) -> &[char] {
        &self.full_chars
    }

    pub fn char_to_segment(&self) -> &[usize] {
        &self.char_to_segment
    }

    pub fn zones(&self) -> &[SpeakerZone] {
        &self.zones
    }

    pub fn is_multi_speaker(&self) -> bool {
        self.multi_speaker
    }

    /// Serialises back to the line format this was parsed from.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut last_speaker: Option<&Option<String>> = None;
        for segment in &self.segments {
            if self.multi_speaker
                && last_speaker != Some(&segment.speaker)
                && let Some(name) = &segment.speaker
            {
                out.push_str(&format!("===SPEAKER:{}===\n", name));
            }
            last_speaker = Some(&segment.speaker);
            out.push_str(&format!("{} ||| {}\n", segment.source, segment.target));
        }
        out
    }
}

fn build_zones(
    segments: &[ScriptSegment],
    multi_speaker: bool,
    total_chars: usize,
) -> Vec<SpeakerZone> {
    if segments.is_empty() {
        return Vec::new();
    }

    if !multi_speaker {
        return vec![SpeakerZone {
            char_start: 0,
            char_end: total_chars,
            speaker: None,
            segment_range: (0, segments.len()),
        }];
    }

    let mut zones: Vec<SpeakerZone> = Vec::new();
    for segment in segments {
        match zones.last_mut() {
            Some(zone) if zone.speaker == segment.speaker => {
                zone.char_end = segment.char_end;
                zone.segment_range.1 = segment.index + 1;
            }
            _ => zones.push(SpeakerZone {
                char_start: segment.char_start,
                char_end: segment.char_end,
                speaker: segment.speaker.clone(),
                segment_range: (segment.index, segment.index + 1),
            }),
        }
    }
    zones
}

fn parse_speaker_header(line: &str) -> Option<String> {
    let inner = line.strip_prefix("===SPEAKER:")?.strip_suffix("===")?;
    let name = inner.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Strips a leading `[N]`, `(N)` or `N.` line number.
fn strip_numbering(s: &str) -> &str {
    let t = s.trim_start();

    for (open, close) in [('[', ']'), ('(', ')')] {
        if let Some(rest) = t.strip_prefix(open)
            && let Some(end) = rest.find(close)
            && end > 0
            && rest[..end].chars().all(|c| c.is_ascii_digit())
        {
            return rest[end + 1..].trim_start();
        }
    }

    let digits = t.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && t[digits..].starts_with('.') {
        return t[digits + 1..].trim_start();
    }

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = "[1] 今天天氣很好 ||| The weather is nice today\n\
                         [2] 我們開始會議 ||| Let's start the meeting\n";

    #[test]
    fn parses_numbered_bilingual_lines() {
        let script = Script::parse(BASIC);
        assert_eq!(script.segments().len(), 2);
        assert_eq!(script.segments()[0].source, "今天天氣很好");
        assert_eq!(script.segments()[0].target, "The weather is nice today");
        assert_eq!(script.segments()[1].source, "我們開始會議");
        assert!(!script.is_multi_speaker());
        assert_eq!(script.zones().len(), 1);
    }

    #[test]
    fn numbering_variants_are_stripped() {
        let script = Script::parse("1. 第一句 ||| one\n(2) 第二句 ||| two\n[3] 第三句 ||| three\n");
        let sources: Vec<&str> = script.segments().iter().map(|s| s.source.as_str()).collect();
        assert_eq!(sources, vec!["第一句", "第二句", "第三句"]);
    }

    #[test]
    fn lines_without_separator_are_ignored()  {
        let script = Script::parse("註解行\n今天 ||| today\n# another comment\n");
        assert_eq!(script.segments().len(), 1);
    }

    #[test]
    fn char_map_covers_full_text_exactly() {
        let script = Script::parse(BASIC);
        let total: usize = script
            .segments()
            .iter()
            .map(|s| s.normalized.chars().count())
            .sum();
        assert_eq!(script.len_chars(), total);
        assert_eq!(script.char_to_segment().len(), script.len_chars());
        for (k, &seg_idx) in script.char_to_segment().iter().enumerate() {
            let seg = &script.segments()[seg_idx];
            assert!(
                (seg.char_start..seg.char_end).contains(&k),
                "char {k} maps to segment {seg_idx} outside its range"
            );
        }
        for seg in script.segments() {
            assert_eq!(seg.char_end - seg.char_start, seg.normalized.chars().count());
        }
    }

    #[test]
    fn speaker_headers_create_zones() {
        let script = Script::parse(
            "===SPEAKER:A===\n[1] hello ||| 你好\n===SPEAKER:B===\n[2] goodbye ||| 再見\n",
        );
        assert!(script.is_multi_speaker());
        assert_eq!(script.zones().len(), 2);
        assert_eq!(script.zones()[0].speaker.as_deref(), Some("A"));
        assert_eq!(script.zones()[1].speaker.as_deref(), Some("B"));
        assert_eq!(script.zones()[0].segment_range, (0, 1));
        assert_eq!(script.zones()[1].segment_range, (1, 2));
    }

    #[test]
    fn consecutive_same_speaker_runs_merge_into_one_zone() {
        let script = Script::parse(
            "===SPEAKER:A===\n甲一 ||| a1\n甲二 ||| a2\n===SPEAKER:B===\n乙一 ||| b1\n",
        );
        assert_eq!(script.zones().len(), 2);
        assert_eq!(script.zones()[0].segment_range, (0, 2));
        assert_eq!(
            script.zones()[0].char_end,
            script.segments()[1].char_end
        );
    }

    #[test]
    fn normalization_drops_punctuation_and_lowercases() {
        assert_eq!(normalize("你好，世界！ Hello."), "你好世界hello".chars().collect::<Vec<_>>());
        assert_eq!(normalize("  ，。！？  "), Vec::<char>::new());
    }

    #[test]
    fn serialise_then_reparse_is_identity() {
        let script = Script::parse(BASIC);
        let reparsed = Script::parse(&script.to_text());
        assert_eq!(script, reparsed);

        let multi = Script::parse(
            "===SPEAKER:A===\n[1] hello ||| 你好\n===SPEAKER:B===\n[2] goodbye ||| 再見\n",
        );
        let reparsed = Script::parse(&multi.to_text());
        assert_eq!(multi, reparsed);
    }

    #[test]
    fn empty_and_garbage_scripts_parse_to_empty() {
        assert!(Script::parse("").is_empty());
        assert!(Script::parse("no separators here\njust prose\n").is_empty());
        assert!(Script::parse("，。 ||| punctuation only source\n").is_empty());
    }
}
