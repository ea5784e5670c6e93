//! Filesystem-safe names derived from untrusted video titles.

use once_cell::sync::Lazy;
use regex::Regex;

/// Path separators, characters other filesystems or the downloader's output
/// template treat specially, and control characters (newlines included).
static UNSAFE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\|:*?"<>%\x00-\x1f\x7f]"#).unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Budget in UTF-8 bytes. File names are limited to 255 bytes, and the stem
/// suffix plus `.src.<ext>` must still fit after the slug.
pub const MAX_BYTES: usize = 180;
const FALLBACK: &str = "audio";

/// Turns a title into a single path component.
///
/// The result never contains a separator, never starts with a dot and is
/// never empty, so joining it onto a directory cannot escape that directory
/// or create a new one.
pub fn slugify(title: &str) -> String {
    let stripped = UNSAFE_RE.replace_all(title, "");
    let collapsed = SPACE_RE.replace_all(stripped.trim(), " ");
    let trimmed = collapsed.trim_start_matches(['.', ' ']).trim_end();

    let slug = truncate_bytes(trimmed, MAX_BYTES)
        .trim_end_matches(['.', ' '])
        .to_string();

    if slug.is_empty() {
        FALLBACK.to_string()
    } else {
        slug
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_separators_and_traversal() {
        assert_eq!(slugify("../../etc/passwd"), "etcpasswd");
        assert_eq!(slugify("AC/DC - Back In Black"), "ACDC - Back In Black");
        assert_eq!(slugify(r"a\b|c"), "abc");
    }

    #[test]
    fn test_strips_newlines_and_collapses_spaces() {
        assert_eq!(slugify("line one\nline   two\t"), "line oneline two");
        assert_eq!(slugify("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_no_leading_dot_or_empty_result() {
        assert_eq!(slugify(".hidden"), "hidden");
        assert_eq!(slugify("..."), FALLBACK);
        assert_eq!(slugify("///"), FALLBACK);
        assert_eq!(slugify(""), FALLBACK);
    }

    #[test]
    fn test_keeps_unicode_and_limits_length() {
        assert_eq!(slugify("Песня — 日本語"), "Песня — 日本語");
        let long = "x".repeat(500);
        assert_eq!(slugify(&long).len(), MAX_BYTES);
    }

    #[test]
    fn test_multibyte_titles_capped_by_bytes() {
        let cjk = "日本語のとても長い動画タイトル".repeat(20);
        let slug = slugify(&cjk);
        assert!(slug.len() <= MAX_BYTES, "{} bytes", slug.len());
        assert!(cjk.starts_with(&slug));
        // 3-byte chars: 180 is a boundary, so nothing is lost beyond the budget
        assert_eq!(slug.len(), MAX_BYTES);

        let cyrillic = "Очень длинное название ".repeat(20);
        assert!(slugify(&cyrillic).len() <= MAX_BYTES);

        let mixed = format!("a{}", "日".repeat(100));
        let slug = slugify(&mixed);
        assert_eq!(slug.len(), 178);
        assert!(slug.is_char_boundary(slug.len()));
    }

    #[test]
    fn test_template_characters_removed() {
        assert_eq!(slugify("100% <live> \"mix\"?"), "100 live mix");
    }
}
