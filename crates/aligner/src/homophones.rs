use std::collections::HashSet;

/// Groups of characters Mandarin ASR frequently confuses because they share
/// a pronunciation. Every pair inside a group is equivalent for scoring.
const CONFUSION_GROUPS: &[&str] = &[
    "氣汽器",
    "在再",
    "的得地",
    "他她它",
    "是事市視試適勢",
    "做作坐座",
    "以已",
    "和合",
    "話化畫",
    "週周州洲",
    "曆歷力立例",
    "紀記計繼技際濟",
    "向象像項",
    "公工功攻",
    "會匯惠慧",
    "見件建健鍵",
    "間堅監兼",
    "師詩施濕",
    "需須",
    "聽廳",
    "份分",
    "程成城誠",
    "意義易異議億",
    "理裡李禮",
    "智至制致質置",
    "資姿諮",
    "科顆棵",
    "金今津",
    "新心辛欣",
    "數樹術述",
    "管館",
    "經精京驚",
    "律綠慮率",
    "效校笑",
    "約月越悅閱",
    "據具距聚巨",
    "標錶表",
    "價架假嫁",
    "購構夠",
    "報抱",
    "保寶飽",
    "級及即極急集籍",
];

/// Symmetric homophone equivalence table.
///
/// Lookup is one hash probe on the ordered pair, done only on mismatching
/// characters in the alignment inner loop.
pub struct HomophoneTable {
    pairs: HashSet<(char, char)>,
}

impl HomophoneTable {
    pub fn new() -> Self {
        let mut pairs = HashSet::new();
        for group in CONFUSION_GROUPS {
            let chars: Vec<char> = group.chars().collect();
            for (i, &a) in chars.iter().enumerate() {
                for &b in &chars[i + 1..] {
                    pairs.insert(ordered(a, b));
                }
            }
        }
        Self { pairs }
    }

    /// True if `a` and `b` are distinct registered homophones.
    pub fn equivalent(&self, a: char, b: char) -> bool {
        a != b && self.pairs.contains(&ordered(a, b))
    }
}

impl Default for HomophoneTable {
    fn default() -> Self {
        Self::new()
    }
}

fn ordered(a: char, b: char) -> (char, char) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_pairs_are_symmetric() {
        let t = HomophoneTable::new();
        assert!(t.equivalent('氣', '汽'));
        assert!(t.equivalent('汽', '氣'));
        assert!(t.equivalent('在', '再'));
    }

    #[test]
    fn identical_characters_are_not_homophones() {
        let t = HomophoneTable::new();
        assert!(!t.equivalent('氣', '氣'));
    }

    #[test]
    fn unrelated_characters_do_not_match() {
        let t = HomophoneTable::new();
        assert!(!t.equivalent('氣', '天'));
        assert!(!t.equivalent('a', 'b'));
    }

    #[test]
    fn groups_are_transitively_paired() {
        let t = HomophoneTable::new();
        // all pairs within one group, not just adjacent entries
        assert!(t.equivalent('氣', '器'));
        assert!(t.equivalent('汽', '器'));
    }
}
