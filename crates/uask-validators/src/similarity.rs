//! Lexical similarity between two responses.
//!
//! Ratcliff/Obershelp "gestalt" matching: find the longest common block,
//! recurse on both sides of it, and score `2 * matched / total`.

use tracing::info;

/// Threshold used when a suite does not set its own.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Similarity ratio in `[0.0, 1.0]`, case-insensitive.
///
/// Returns 0.0 when either side is empty. The pair is ordered before
/// matching so the score does not depend on argument order. There is no
/// junk heuristic: frequent characters in long replies still match.
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let (first, second) = if a <= b { (&a, &b) } else { (&b, &a) };

    let x: Vec<char> = first.chars().collect();
    let y: Vec<char> = second.chars().collect();
    let total = x.len() + y.len();
    if total == 0 {
        return 0.0;
    }
    2.0 * matched_chars(&x, &y) as f64 / total as f64
}

/// Similarity meets `threshold`.
pub fn are_semantically_similar(a: &str, b: &str, threshold: f64) -> bool {
    let score = calculate_similarity(a, b);
    info!("similarity: {:.2} (threshold: {})", score, threshold);
    score >= threshold
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        total += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    total
}

/// Longest common block in `a[alo..ahi]` × `b[blo..bhi]`.
///
/// Ties resolve to the block that ends earliest in `a`, then in `b`.
fn longest_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo;
            if a[i] == b[j] {
                let k = prev[col] + 1;
                cur[col + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            } else {
                cur[col + 1] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}
