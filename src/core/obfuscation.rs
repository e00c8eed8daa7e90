//! At-rest obfuscation of captured text.
//!
//! A 13-position rotation of ASCII letters. It keeps casual readers of the
//! log directory from reading sentences verbatim; it is not encryption.
//! Applying it twice returns the input.

/// Rotate every ASCII letter by 13 places, leaving everything else intact.
pub fn transform(text: &str) -> String {
    text.chars().map(rotate).collect()
}

/// Alias of [`transform`] for call sites that are decoding.
pub fn reveal(text: &str) -> String {
    transform(text)
}

fn rotate(c: char) -> char {
    match c {
        'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
        'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(transform("Hello, World!"), "Uryyb, Jbeyq!");
        assert_eq!(transform("hi."), "uv.");
        assert_eq!(transform("NOPQ abcz"), "ABCD nopm");
    }

    #[test]
    fn test_empty_and_non_letters() {
        assert_eq!(transform(""), "");
        assert_eq!(transform("0123 ?!.,\t\n"), "0123 ?!.,\t\n");
    }

    #[test]
    fn test_self_inverse_printable_ascii() {
        let printable: String = (0x20u8..0x7f).map(char::from).collect();
        assert_eq!(transform(&transform(&printable)), printable);
    }

    #[test]
    fn test_unicode_letters_untouched() {
        let text = "Grüße, Ωmega Ñandú 東京";
        let once = transform(text);
        assert!(once.contains('ü'));
        assert!(once.contains('Ω'));
        assert!(once.contains("東京"));
        assert_eq!(reveal(&once), text);
    }

    #[test]
    fn test_case_preserved() {
        let out = transform("AbC");
        assert_eq!(out, "NoP");
    }
}
