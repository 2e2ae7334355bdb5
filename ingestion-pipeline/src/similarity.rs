//! Fuzzy text similarity for catching re-worded extractor output.
//!
//! The score combines a character-level matching-blocks ratio (weight 0.7)
//! with a word-level Jaccard index (weight 0.3). The character ratio
//! dominates because repeated extractor output is usually near-verbatim; the
//! Jaccard term still catches reordering and small paraphrases.

use std::collections::HashSet;

/// Normalization used for comparison only (lighter than the fingerprint
/// normalization): lowercase, collapse whitespace runs, fold common
/// full-width CJK punctuation to ASCII, trim.
pub fn normalize_for_comparison(text: &str) -> String {
    let lowered = text.to_lowercase();

    let folded: String = lowered
        .chars()
        .map(|c| match c {
            '，' => ',',
            '。' => '.',
            '！' => '!',
            '？' => '?',
            '：' => ':',
            '；' => ';',
            '“' | '”' => '"',
            '‘' | '’' => '\'',
            c => c,
        })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity in `[0, 1]`. Empty input scores 0; inputs equal after
/// normalization score exactly 1; everything else is the weighted
/// combination described in the module docs. Symmetric in its arguments.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let norm_a = normalize_for_comparison(a);
    let norm_b = normalize_for_comparison(b);

    if norm_a == norm_b {
        return 1.0;
    }

    let chars_a: Vec<char> = norm_a.chars().collect();
    let chars_b: Vec<char> = norm_b.chars().collect();
    let char_ratio = sequence_ratio(&chars_a, &chars_b);

    let words_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let words_b: HashSet<&str> = norm_b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return char_ratio;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    let jaccard = intersection as f64 / union as f64;

    0.7 * char_ratio + 0.3 * jaccard
}

/// Ratcliff/Obershelp ratio: twice the number of matching characters (summed
/// over recursively-found longest matching blocks) divided by the total
/// length of both sequences.
fn sequence_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_chars(a, b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (start_a, start_b, len) = longest_matching_block(a, b);
    if len == 0 {
        return 0;
    }

    len + matching_chars(&a[..start_a], &b[..start_b])
        + matching_chars(&a[start_a + len..], &b[start_b + len..])
}

/// Longest common contiguous block between `a` and `b`, found with a rolling
/// suffix-length row. Ties break on the position pair `(min, max)` of the
/// block starts, which is invariant under argument swap, keeping the
/// overall ratio symmetric.
fn longest_matching_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best: (usize, usize, usize) = (0, 0, 0);
    let mut prev = vec![0_usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        let mut curr = vec![0_usize; b.len() + 1];
        for (j, &cb) in b.iter().enumerate() {
            if ca != cb {
                continue;
            }
            let len = prev[j] + 1;
            curr[j + 1] = len;

            let start_a = i + 1 - len;
            let start_b = j + 1 - len;
            let candidate_key = (start_a.min(start_b), start_a.max(start_b));
            let best_key = (best.0.min(best.1), best.0.max(best.1));

            if len > best.2 || (len == best.2 && best.2 > 0 && candidate_key < best_key) {
                best = (start_a, start_b, len);
            }
        }
        prev = curr;
    }

    best
}
