use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[\w.\-]+").unwrap());
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'\-]*").unwrap());

/// Removes URLs and @mentions, unwraps #hashtags, collapses whitespace.
/// Case is preserved so style signals can still see capitals.
pub fn strip_noise(text: &str) -> String {
    let text = URL_RE.replace_all(text, " ");
    let text = MENTION_RE.replace_all(&text, " ");
    let text = HASHTAG_RE.replace_all(&text, "$1");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

/// [`strip_noise`] plus lowercasing and curly-apostrophe folding.
pub fn clean(text: &str) -> String {
    strip_noise(text).to_lowercase().replace('\u{2019}', "'")
}

/// Word tokens of already-cleaned text. Emoji are not tokens; see [`emoji_chars`].
pub fn tokenize(cleaned: &str) -> Vec<&str> {
    WORD_RE
        .find_iter(cleaned)
        .map(|m| m.as_str().trim_end_matches(['\'', '-']))
        .filter(|token| !token.is_empty())
        .collect()
}

/// Candidate emoji: every non-ASCII char that is neither a letter, digit nor whitespace.
pub fn emoji_chars(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars()
        .filter(|c| !c.is_ascii() && !c.is_alphanumeric() && !c.is_whitespace())
}

/// Uppercase letters over all cased letters; 0 for text without letters.
pub fn caps_ratio(text: &str) -> f64 {
    let (upper, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(upper, letters), c| {
            (upper + usize::from(c.is_uppercase()), letters + 1)
        });
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_links_and_mentions() {
        let cleaned = clean("Check   this https://example.com/x?y=1 out @alice.bsky.social #RustLang!");
        assert_eq!(cleaned, "check this out rustlang!");
    }

    #[test]
    fn test_strip_noise_keeps_case() {
        assert_eq!(strip_noise("  HELLO\n\tWorld "), "HELLO World");
    }

    #[test]
    fn test_tokenize_keeps_contractions() {
        let cleaned = clean("I don’t think it's BAD... self-care, ok?");
        assert_eq!(
            tokenize(&cleaned),
            vec!["i", "don't", "think", "it's", "bad", "self-care", "ok"]
        );
    }

    #[test]
    fn test_emoji_chars() {
        let found: String = emoji_chars("great 🔥 job ❤️ naïve").collect();
        assert!(found.contains('🔥'));
        assert!(found.contains('❤'));
        assert!(!found.contains('ï'));
    }

    #[test]
    fn test_caps_ratio() {
        assert_eq!(caps_ratio(""), 0.0);
        assert_eq!(caps_ratio("1234 !!"), 0.0);
        assert!((caps_ratio("ABcd") - 0.5).abs() < f64::EPSILON);
    }
}
