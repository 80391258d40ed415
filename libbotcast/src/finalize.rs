//! Turning a generated draft into a post that satisfies a [`PostPolicy`]
//!
//! Each step is a plain function so it can be tested on its own.
//! [`finalize`] chains them in a fixed order and trims last, which means a
//! required substring appended early can still be cut by the final trim.
//!
//! All lengths are counted in `char`s.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{FinalizedPost, PostPolicy};

/// Joins an appended required substring to the text
pub const REQUIRED_SEPARATOR: &str = " — ";

pub const ELLIPSIS: char = '…';

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('“', '”'),
    ('‘', '’'),
    ('«', '»'),
];

const SENTENCE_PUNCT: &[char] = &['.', ',', '!', '?'];

/// Left behind when a forbidden substring is cut from the end of a line
const DANGLING: &[char] = &[' ', '—', '–', '-', '|', ':'];

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Strip one layer of quotes wrapping the whole text
pub fn unwrap_quotes(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return trimmed.to_string();
    };

    for &(open, close) in QUOTE_PAIRS {
        if first == open && last == close {
            let inner = &trimmed[open.len_utf8()..trimmed.len() - close.len_utf8()];
            if inner.contains(open) || inner.contains(close) {
                // Several quoted spans, not one wrapper
                return trimmed.to_string();
            }
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn is_link(token: &str) -> bool {
    let lowered = token.to_lowercase();
    lowered.contains("://") || lowered.starts_with("www.")
}

/// Split a token where a punctuation mark is glued to the next word
fn split_after_punctuation(token: &str) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let Some(&next) = chars.get(i + 1) else {
            continue;
        };
        let glued = match c {
            ',' | '!' | '?' => next.is_alphabetic(),
            // "end.Next" but not "U.S.A" or "3.14"
            '.' => prev.is_some_and(char::is_lowercase) && next.is_uppercase(),
            _ => false,
        };
        if glued {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn normalize_line(line: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    for raw in line.split_whitespace() {
        let pieces = if is_link(raw) {
            vec![raw.to_string()]
        } else {
            split_after_punctuation(raw)
        };
        for piece in pieces {
            let punctuation_only = piece.chars().all(|c| SENTENCE_PUNCT.contains(&c));
            match tokens.last_mut() {
                Some(last) if punctuation_only => last.push_str(&piece),
                _ => tokens.push(piece),
            }
        }
    }
    tokens.join(" ")
}

/// Collapse all whitespace to single spaces and fix spacing around `.,!?`
pub fn normalize_whitespace(text: &str) -> String {
    normalize_line(text)
}

/// Like [`normalize_whitespace`] but keeps line breaks between non-empty lines
pub fn normalize_paragraphs(text: &str) -> String {
    text.lines()
        .map(normalize_line)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Byte range of the first case-insensitive match of `needle`
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    'outer: for (start, _) in haystack.char_indices() {
        let mut end = start;
        let mut hay = haystack[start..].chars();
        for n in needle.chars() {
            match hay.next() {
                Some(h) if chars_eq_ignore_case(h, n) => end += h.len_utf8(),
                _ => continue 'outer,
            }
        }
        return Some((start, end));
    }
    None
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    find_ignore_case(haystack, needle).is_some()
}

/// Cut to `max_length` chars, ending in an ellipsis when anything was removed
pub fn trim_to_length(text: &str, max_length: usize) -> String {
    if char_len(text) <= max_length {
        return text.to_string();
    }
    if max_length == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(max_length - 1).collect();
    cut.truncate(cut.trim_end().len());
    cut.push(ELLIPSIS);
    cut
}

/// Append each missing required substring after [`REQUIRED_SEPARATOR`].
///
/// When an append would overflow `max_length`, the original text (not the
/// appended parts) is shortened to make room.
pub fn enforce_required(text: &str, required: &[String], max_length: usize) -> String {
    let mut body = text.to_string();
    let mut appended: Vec<&str> = Vec::new();
    let sep_len = char_len(REQUIRED_SEPARATOR);

    let compose = |body: &str, appended: &[&str]| -> String {
        let tail = appended.join(REQUIRED_SEPARATOR);
        match (body.is_empty(), tail.is_empty()) {
            (_, true) => body.to_string(),
            (true, false) => tail,
            (false, false) => format!("{}{}{}", body, REQUIRED_SEPARATOR, tail),
        }
    };

    for needle in required {
        let needle = needle.trim();
        if needle.is_empty() || contains_ignore_case(&compose(&body, &appended), needle) {
            continue;
        }
        appended.push(needle);

        let suffix_len: usize = appended.iter().map(|a| sep_len + char_len(a)).sum();
        if !body.is_empty() && char_len(&body) + suffix_len > max_length && suffix_len < max_length
        {
            body = trim_to_length(&body, max_length - suffix_len);
        }
    }

    compose(&body, &appended)
}

fn trim_dangling(line: &str) -> &str {
    line.trim_matches(|c| DANGLING.contains(&c))
}

/// Remove every case-insensitive occurrence of each forbidden substring
pub fn enforce_forbidden(text: &str, forbidden: &[String]) -> String {
    let mut out = text.to_string();
    let mut removed = false;
    for needle in forbidden.iter().filter(|f| !f.trim().is_empty()) {
        while let Some((start, end)) = find_ignore_case(&out, needle) {
            out.replace_range(start..end, " ");
            removed = true;
        }
    }
    if !removed {
        return out;
    }
    out.lines()
        .map(|line| trim_dangling(&normalize_line(line)).to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `tag` appears as a whole word, ignoring case and surrounding
/// punctuation, so `#rust` does not match `#rustacean`
pub fn contains_tag(text: &str, tag: &str) -> bool {
    let tag = tag.trim();
    text.split_whitespace().any(|word| {
        word.trim_matches(|c: char| {
            SENTENCE_PUNCT.contains(&c) || matches!(c, ';' | ':' | '(' | ')' | '"' | '\'')
        })
        .to_lowercase()
            == tag.to_lowercase()
    })
}

/// Top up to `min_tags` tags from `pool`, sampling without replacement
pub fn enforce_tags<R: Rng + ?Sized>(
    text: &str,
    pool: &[String],
    min_tags: usize,
    rng: &mut R,
) -> String {
    let (present, missing): (Vec<&String>, Vec<&String>) = pool
        .iter()
        .filter(|t| !t.trim().is_empty())
        .partition(|t| contains_tag(text, t));

    if present.len() >= min_tags {
        return text.to_string();
    }

    let needed = min_tags - present.len();
    let picked: Vec<&str> = missing
        .choose_multiple(rng, needed)
        .map(|t| t.as_str())
        .collect();
    if picked.is_empty() {
        return text.to_string();
    }

    let tags = picked.join(" ");
    if text.is_empty() {
        tags
    } else {
        format!("{} {}", text, tags)
    }
}

fn run<R: Rng + ?Sized>(
    draft: &str,
    policy: &PostPolicy,
    budget: usize,
    keep_lines: bool,
    rng: &mut R,
) -> FinalizedPost {
    let text = unwrap_quotes(draft);
    let text = if keep_lines {
        normalize_paragraphs(&text)
    } else {
        normalize_whitespace(&text)
    };
    let text = enforce_required(&text, &policy.required_substrings, budget);
    let text = enforce_forbidden(&text, &policy.forbidden_substrings);
    // A required substring may only have been present inside a removed one
    let text = enforce_required(&text, &policy.required_substrings, budget);
    let text = enforce_tags(&text, &policy.tag_pool, policy.min_tags, rng);
    FinalizedPost::new(trim_to_length(&text, budget))
}

/// Finalize `draft` into a single post no longer than `policy.max_length`
pub fn finalize<R: Rng + ?Sized>(draft: &str, policy: &PostPolicy, rng: &mut R) -> FinalizedPost {
    run(draft, policy, policy.max_length, false, rng)
}

/// Finalize `draft` for threading: line breaks survive and the length
/// budget is `total_budget` instead of the per-post limit
pub fn finalize_long<R: Rng + ?Sized>(
    draft: &str,
    policy: &PostPolicy,
    total_budget: usize,
    rng: &mut R,
) -> FinalizedPost {
    run(draft, policy, total_budget, true, rng)
}
