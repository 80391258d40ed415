//! Splitting long text into numbered, platform-sized thread chunks
//!
//! Words are packed greedily. Space for the `" (i/N)"` suffix is reserved
//! up front, and packing is repeated with a wider reservation whenever the
//! chunk count gains a digit, so the suffix almost never forces a re-trim.
//!
//! Numbering is kept as long as one body char fits beside the suffix. Below
//! that (a limit under 7 chars for a single-digit thread) the chunks go out
//! unnumbered.

use crate::finalize::{char_len, ELLIPSIS};

/// Length of `" (i/N)"` for the widest `i` of a thread with `n` chunks
fn suffix_reserve(digits: usize) -> usize {
    // " (" + i + "/" + N + ")"
    4 + 2 * digits
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

pub fn numbering_suffix(index: usize, total: usize) -> String {
    format!(" ({}/{})", index, total)
}

/// Hard-cut a word that cannot fit on its own into ellipsis-suffixed pieces
fn hard_cut(word: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if budget <= 1 {
        return chars.iter().map(|c| c.to_string()).collect();
    }
    let step = budget - 1;
    let mut pieces: Vec<String> = chars
        .chunks(step)
        .map(|chunk| {
            let mut piece: String = chunk.iter().collect();
            piece.push(ELLIPSIS);
            piece
        })
        .collect();
    // The final piece ends the word, so it gets no ellipsis when it fits
    if let Some(last) = pieces.last_mut() {
        last.pop();
    }
    pieces
}

/// Greedy word packing; paragraph breaks become `'\n'` inside a chunk
fn pack(text: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        let mut first_in_paragraph = true;
        for word in paragraph.split_whitespace() {
            let separator = if first_in_paragraph { '\n' } else { ' ' };
            first_in_paragraph = false;

            let word_len = char_len(word);
            if word_len > budget {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(hard_cut(word, budget));
                continue;
            }

            if current.is_empty() {
                current.push_str(word);
            } else if char_len(&current) + 1 + word_len <= budget {
                current.push(separator);
                current.push_str(word);
            } else {
                chunks.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split `text` into chunks that are each at most `max_len` chars,
/// numbering suffix included.
///
/// Text that already fits is returned as a single unnumbered chunk.
pub fn segment(text: &str, max_len: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= max_len {
        return vec![trimmed.to_string()];
    }

    let mut width = 1;
    let chunks = loop {
        let reserve = suffix_reserve(width);
        if reserve >= max_len {
            // The suffix alone would fill the chunk
            return pack(trimmed, max_len.max(1));
        }
        let chunks = pack(trimmed, max_len - reserve);
        let needed = digits(chunks.len());
        if needed <= width {
            break chunks;
        }
        width = needed;
    };

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            let suffix = numbering_suffix(i + 1, total);
            let room = max_len - char_len(&suffix);
            let body = if char_len(&body) > room {
                let mut cut: String = body.chars().take(room.saturating_sub(1)).collect();
                cut.truncate(cut.trim_end().len());
                cut.push(ELLIPSIS);
                cut
            } else {
                body
            };
            format!("{}{}", body, suffix)
        })
        .collect()
}

/// Remove a trailing `" (i/N)"` suffix, returning the chunk body
pub fn strip_suffix(chunk: &str) -> &str {
    let Some(open) = chunk.rfind(" (") else {
        return chunk;
    };
    let tail = &chunk[open + 2..];
    let Some(inner) = tail.strip_suffix(')') else {
        return chunk;
    };
    match inner.split_once('/') {
        Some((i, n))
            if !i.is_empty()
                && !n.is_empty()
                && i.chars().all(|c| c.is_ascii_digit())
                && n.chars().all(|c| c.is_ascii_digit()) =>
        {
            &chunk[..open]
        }
        _ => chunk,
    }
}
