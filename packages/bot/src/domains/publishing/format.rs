//! Post text formatting under the platform character limit.
//!
//! All lengths are counted in chars so multi-byte titles never get split
//! inside a code point.

use chrono::{DateTime, Utc};

use crate::domains::documents::Document;

/// Hard limit for a post's text.
pub const MAX_POST_CHARS: usize = 500;

pub const ELLIPSIS: &str = "...";

pub const HASHTAG_SUFFIX: &str = "\n\n#F1Threads";

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Truncate `text` to at most `limit` chars.
///
/// Text that fits is returned unchanged. Otherwise the cut is made at the last
/// whitespace before `limit - 3` chars (or exactly there when the text has no
/// whitespace) and an ellipsis is appended. Limits of 3 or less yield "".
pub fn truncate_text(text: &str, limit: usize) -> String {
    if char_len(text) <= limit {
        return text.to_string();
    }

    let budget = match limit.checked_sub(char_len(ELLIPSIS)) {
        Some(b) if b > 0 => b,
        _ => return String::new(),
    };

    // Byte offset of the char at position `budget`
    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let prefix = &text[..cut];

    match prefix.rfind(char::is_whitespace) {
        Some(boundary) => format!("{}{}", &prefix[..boundary], ELLIPSIS),
        None => format!("{}{}", prefix, ELLIPSIS),
    }
}

/// `21-03-2025 15:05 UTC`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%d-%m-%Y %H:%M UTC").to_string()
}

fn post_header(title: &str, published: DateTime<Utc>, link: Option<&str>) -> String {
    let mut header = format!(
        "New document: {}\nPublished on: {}\n",
        title,
        format_timestamp(published)
    );
    if let Some(link) = link {
        header.push_str(&format!("Link: {}\n", link));
    }
    header.push_str("\nAI Summary: ");
    header
}

/// Full post text for a document: header, summary cut to the remaining
/// budget, and the hashtag suffix. Never longer than [`MAX_POST_CHARS`].
pub fn format_post_text(
    title: &str,
    published: DateTime<Utc>,
    link: Option<&str>,
    summary: &str,
) -> String {
    let suffix_len = char_len(HASHTAG_SUFFIX);

    let mut header = post_header(title, published, link);
    if char_len(&header) + suffix_len > MAX_POST_CHARS {
        let fixed = char_len(&header) - char_len(title);
        let title_budget = MAX_POST_CHARS.saturating_sub(fixed + suffix_len);
        header = post_header(&truncate_text(title, title_budget), published, link);
    }

    let budget = MAX_POST_CHARS.saturating_sub(char_len(&header) + suffix_len);
    let text = format!(
        "{}{}{}",
        header,
        truncate_text(summary, budget),
        HASHTAG_SUFFIX
    );

    // Only reachable with an absurdly long link
    if char_len(&text) > MAX_POST_CHARS {
        return truncate_text(&text, MAX_POST_CHARS);
    }
    text
}

/// Text-only notice for a document withdrawn by the publisher.
pub fn recall_notice(doc: &Document) -> String {
    format!(
        "Document recalled: {}\nOriginally published on: {}",
        doc.title,
        format_timestamp(doc.published)
    )
}
