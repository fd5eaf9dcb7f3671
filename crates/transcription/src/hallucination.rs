/// Filter for transcripts that ASR models invent on silent or noisy audio.
///
/// Two lists with different blast radii:
/// - substring entries mark watermark/credit strings that only appear when
///   the whole window is hallucinated; one hit drops the entire result.
/// - exact entries are short interjections and greetings; they drop the
///   result only when the text (punctuation stripped) IS the entry, so a
///   real sentence that merely contains one survives.
pub struct HallucinationFilter {
    substrings: Vec<String>,
    exact: Vec<String>,
}

/// Subtitle credits, watermarks and channel names.
const SUBSTRING_BLACKLIST: &[&str] = &[
    "字幕提供",
    "字幕來源",
    "字幕来源",
    "提供字幕",
    "本字幕",
    "自動產生",
    "多謝您的觀看",
    "感謝您的觀看",
    "請不吝點贊訂閱",
    "歡迎訂閱",
    "amara",
    "subtitles",
    "copyright",
    "©",
    "ming pao",
    "youtube",
    "facebook",
    "mbc",
    "tvbs",
];

/// Brief interjections and greetings, matched whole after punctuation
/// stripping.
const EXACT_BLACKLIST: &[&str] = &[
    "謝謝",
    "謝謝你",
    "谢谢",
    "谢谢你",
    "thank you",
    "thanks",
    "you're welcome",
    "hello",
    "大家好",
    "yeah",
    "right",
    "okay",
    "go",
    "嗯",
    "啊",
    "哦",
    "喔",
    "哎",
    "呀",
];

impl HallucinationFilter {
    pub fn new(extra_substrings: &[String], extra_exact: &[String]) -> Self {
        let substrings = SUBSTRING_BLACKLIST
            .iter()
            .map(|s| s.to_lowercase())
            .chain(extra_substrings.iter().map(|s| s.to_lowercase()))
            .collect();
        let exact = EXACT_BLACKLIST
            .iter()
            .copied()
            .chain(extra_exact.iter().map(String::as_str))
            .map(strip_punctuation)
            .collect();
        Self { substrings, exact }
    }

    /// True if the text should be dropped entirely.
    pub fn is_hallucination(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if self.substrings.iter().any(|h| lower.contains(h.as_str())) {
            return true;
        }

        let stripped = strip_punctuation(&lower);
        if stripped.is_empty() {
            return true;
        }
        self.exact.iter().any(|e| e == &stripped)
    }
}

impl Default for HallucinationFilter {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

/// Lowercases and keeps only letters and digits (CJK included).
fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
