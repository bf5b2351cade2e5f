//! Plain-text cleanup for inbound Mastodon status bodies.
//!
//! Mastodon delivers `content` as sanitized HTML. Before a post is used as
//! prompt text, line breaks become newlines, every remaining tag is dropped,
//! and (for mentions) `@handle` tokens are removed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Any tag, tolerant of quoted attribute values containing `>`.
static HTML_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<("[^"]*"|'[^']*'|[^'">])*>"#).unwrap());

/// `@handle` tokens (the local part only, as Mastodon renders them in text).
static MENTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([a-zA-Z0-9_]+)").unwrap());

/// Replace `<br>` / `<br />` with newlines, then delete all other tags.
pub fn normalize_content(raw: &str) -> String {
    let with_breaks = raw.replace("<br />", "\n").replace("<br>", "\n");
    HTML_TAG_PATTERN.replace_all(&with_breaks, "").into_owned()
}

/// Delete every `@name` token, leaving the surrounding text as is.
pub fn strip_mentions(text: &str) -> String {
    MENTION_PATTERN.replace_all(text, "").into_owned()
}

/// Normalization used for text addressed to the bot.
pub fn normalize_mention(raw: &str) -> String {
    strip_mentions(&normalize_content(raw))
}

/// Everything before the first newline.
pub fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_br_becomes_newline() {
        assert_eq!(normalize_content("a<br>b<br />c"), "a\nb\nc");
        assert!(!normalize_content("<br><br />").contains("<br"));
    }

    #[test]
    fn test_tags_are_removed() {
        let out = normalize_content(r#"<p>hello <a href="https://x" rel="a>b">link</a></p>"#);
        assert_eq!(out, "hello link");
        assert!(!out.contains('<'));
    }

    #[test]
    fn test_single_quoted_attribute() {
        assert_eq!(normalize_content("<span class='h-card'>x</span>"), "x");
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(normalize_content("きょうは晴れ。"), "きょうは晴れ。");
        assert_eq!(normalize_content("a > b"), "a > b");
    }

    #[test]
    fn test_strip_mentions() {
        assert_eq!(strip_mentions("@alice hi @bob_2 there"), " hi  there");
        assert_eq!(strip_mentions("mail me at x"), "mail me at x");
    }

    #[test]
    fn test_normalize_mention_real_status() {
        let raw = r#"<p><span class="h-card"><a href="https://mstdn.example/@kita_kitsune" class="u-url mention">@<span>kita_kitsune</span></a></span> こんにちは<br />元気？</p>"#;
        assert_eq!(normalize_mention(raw), " こんにちは\n元気？");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("猫が寿司を握る話\n#大喜利ドリーマー"), "猫が寿司を握る話");
        assert_eq!(first_line("single"), "single");
        assert_eq!(first_line(""), "");
    }
}
