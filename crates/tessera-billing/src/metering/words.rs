//! Billable word counting for chat messages
//!
//! A token counts as a billable word when it carries at least one
//! alphanumeric character. That excludes the two classes the billing
//! policy exempts: URLs (matched explicitly) and emoji or other
//! pictographic glyphs, which carry no alphanumerics at all. Punctuation
//! runs ("!!!", "---") fall out for the same reason.

/// Count the billable words in a chat message
pub fn billable_word_count(text: &str) -> u32 {
    text.split_whitespace()
        .filter(|token| is_billable_token(token))
        .count() as u32
}

fn is_billable_token(token: &str) -> bool {
    !is_url(token) && token.chars().any(char::is_alphanumeric)
}

fn is_url(token: &str) -> bool {
    let lower = token.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words() {
        assert_eq!(billable_word_count("hello there, how are you"), 5);
        assert_eq!(billable_word_count(""), 0);
        assert_eq!(billable_word_count("   "), 0);
    }

    #[test]
    fn test_urls_excluded() {
        assert_eq!(billable_word_count("check https://example.com/page now"), 2);
        assert_eq!(billable_word_count("HTTP://EXAMPLE.COM"), 0);
        assert_eq!(billable_word_count("www.example.com is my site"), 3);
    }

    #[test]
    fn test_emoji_excluded() {
        assert_eq!(billable_word_count("hi \u{1F44B}\u{1F44B}"), 1);
        assert_eq!(billable_word_count("\u{1F602} \u{2764}\u{FE0F} \u{1F680}"), 0);
        // A word with a trailing emoji still counts as one word
        assert_eq!(billable_word_count("wow\u{1F525} amazing"), 2);
    }

    #[test]
    fn test_punctuation_runs_excluded() {
        assert_eq!(billable_word_count("!!! ??? --"), 0);
        assert_eq!(billable_word_count("really?! yes."), 2);
    }

    #[test]
    fn test_numbers_count() {
        assert_eq!(billable_word_count("call me at 8 pm"), 5);
    }
}
