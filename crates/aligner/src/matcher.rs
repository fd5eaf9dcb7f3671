use crate::homophones::HomophoneTable;

/// Score for an exact character match.
pub const MATCH_SCORE: i32 = 3;
/// Score for a registered homophone substitution (75% of a match).
const HOMOPHONE_SCORE: i32 = 2;
const MISMATCH_SCORE: i32 = -1;
const GAP_SCORE: i32 = -2;

/// Best local alignment of a query inside a target span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAlignment {
    /// Raw alignment score.
    pub score: i32,
    /// First target index covered by the alignment (inclusive).
    pub target_start: usize,
    /// One past the last target index covered (exclusive).
    pub target_end: usize,
}

// Traceback moves.
const STOP: u8 = 0;
const DIAG: u8 = 1;
const UP: u8 = 2;
const LEFT: u8 = 3;

/// Smith–Waterman local alignment with homophone-tolerant substitution.
///
/// The DP matrix is O(|query|·|target|); both are allocated once per call.
/// Queries are bounded by ASR window length (~200 chars) and targets by the
/// search window (~600 chars) outside global resync.
pub fn smith_waterman(
    query: &[char],
    target: &[char],
    homophones: &HomophoneTable,
) -> Option<LocalAlignment> {
    if query.is_empty() || target.is_empty() {
        return None;
    }

    let m = query.len();
    let n = target.len();
    let width = n + 1;
    let mut score = vec![0i32; (m + 1) * width];
    let mut moves = vec![STOP; (m + 1) * width];

    let mut best_score = 0i32;
    let mut best_cell = (0usize, 0usize);

    for i in 1..=m {
        for j in 1..=n {
            let q = query[i - 1];
            let t = target[j - 1];
            let substitution = if q == t {
                MATCH_SCORE
            } else if homophones.equivalent(q, t) {
                HOMOPHONE_SCORE
            } else {
                MISMATCH_SCORE
            };

            let diag = score[(i - 1) * width + (j - 1)] + substitution;
            let up = score[(i - 1) * width + j] + GAP_SCORE;
            let left = score[i * width + (j - 1)] + GAP_SCORE;

            let (cell, mv) = if diag >= up && diag >= left && diag > 0 {
                (diag, DIAG)
            } else if up >= left && up > 0 {
                (up, UP)
            } else if left > 0 {
                (left, LEFT)
            } else {
                (0, STOP)
            };

            score[i * width + j] = cell;
            moves[i * width + j] = mv;

            if cell > best_score {
                best_score = cell;
                best_cell = (i, j);
            }
        }
    }

    if best_score <= 0 {
        return None;
    }

    // Traceback to the first consumed target character.
    let (mut i, mut j) = best_cell;
    let mut target_start = best_cell.1;
    while i > 0 && j > 0 {
        match moves[i * width + j] {
            DIAG => {
                i -= 1;
                j -= 1;
                target_start = j;
            }
            UP => {
                i -= 1;
            }
            LEFT => {
                j -= 1;
                target_start = j;
            }
            _ => break,
        }
    }

    Some(LocalAlignment {
        score: best_score,
        target_start,
        target_end: best_cell.1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn align(query: &str, target: &str) -> Option<LocalAlignment> {
        smith_waterman(&chars(query), &chars(target), &HomophoneTable::new())
    }

    #[test]
    fn exact_match_scores_three_per_char() {
        let a = align("今天天氣很好", "今天天氣很好").unwrap();
        assert_eq!(a.score, 18);
        assert_eq!(a.target_start, 0);
        assert_eq!(a.target_end, 6);
    }

    #[test]
    fn locates_query_inside_longer_target() {
        let a = align("開始會議", "今天天氣很好我們開始會議謝謝").unwrap();
        assert_eq!(a.score, 12);
        assert_eq!(a.target_start, 8);
        assert_eq!(a.target_end, 12);
    }

    #[test]
    fn homophone_substitution_scores_two() {
        let a = align("今天天汽很好", "今天天氣很好").unwrap();
        assert_eq!(a.score, 5 * MATCH_SCORE + 2);
        assert_eq!(a.target_start, 0);
        assert_eq!(a.target_end, 6);
    }

    #[test]
    fn single_insertion_costs_a_gap() {
        // query has one extra character relative to the target span
        let a = align("我們那開始會議", "我們開始會議").unwrap();
        assert_eq!(a.score, 6 * MATCH_SCORE - 2);
        assert_eq!(a.target_start, 0);
        assert_eq!(a.target_end, 6);
    }

    #[test]
    fn unrelated_strings_align_weakly_or_not_at_all() {
        let a = align("完全無關", "今天天氣很好");
        assert!(a.is_none() || a.unwrap().score < 6);
    }

    #[test]
    fn empty_inputs_return_none() {
        assert!(align("", "目標").is_none());
        assert!(align("查詢", "").is_none());
    }
}
