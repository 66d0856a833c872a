use crate::core::dataset::{CleanRecord, CommentRecord};
use once_cell::sync::Lazy;
use regex::Regex;

// Scheme-prefixed token up to the next whitespace. Input is lowercased
// before matching, so this also catches HTTP://... forms.
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+").expect("valid URL regex"));

/// Pictographic/emoji codepoints removed during normalization. Covers the
/// emoji presentation blocks plus the joiners and selectors used to compose
/// multi-codepoint emoji.
fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F000}'..='\u{1FAFF}'   // cards, emoticons, pictographs, transport, extended
        | '\u{2600}'..='\u{27BF}'   // miscellaneous symbols, dingbats
        | '\u{2B00}'..='\u{2BFF}'   // arrows and stars with emoji presentation
        | '\u{2300}'..='\u{23FF}'   // technical symbols (watches, hourglasses)
        | '\u{FE0F}'                // variation selector-16
        | '\u{200D}'                // zero-width joiner
        | '\u{20E3}'                // combining enclosing keycap
        | '\u{3030}' | '\u{303D}' | '\u{3297}' | '\u{3299}')
}

/// Deterministic comment cleaning: lowercase, strip URLs, strip emoji,
/// collapse whitespace, trim. Pure and idempotent; later steps rely on the
/// earlier ones (URL removal must happen before whitespace collapsing).
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_urls = URL_RE.replace_all(&lowered, "");
    let no_emoji: String = no_urls.chars().filter(|c| !is_emoji(*c)).collect();
    no_emoji.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply [`normalize`] to every record, dropping rows without source text
/// and rows whose cleaned text comes out empty (pure URL/emoji/whitespace
/// comments). Order is preserved; this stage never fails.
pub fn normalize_records(records: Vec<CommentRecord>) -> Vec<CleanRecord> {
    records
        .into_iter()
        .filter_map(|record| {
            let comment = record.comment?;
            let comment_clean = normalize(&comment);
            if comment_clean.is_empty() {
                return None;
            }
            Some(CleanRecord {
                author: record.author,
                comment,
                likes: record.likes,
                published_at: record.published_at,
                comment_clean,
            })
        })
        .collect()
}
